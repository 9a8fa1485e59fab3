//! Advisory syntax check for cleaned files.
//!
//! JSON is parsed for real. Script and stylesheet sources only get a
//! delimiter-balance check that skips strings and comments, which is enough
//! to catch a removal that cut a block in half.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::structured::{is_json, is_script};

/// Result of [`validate_syntax`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyntaxReport {
    pub valid: bool,
    pub issues: Vec<String>,
}

impl SyntaxReport {
    fn ok() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
        }
    }

    fn with_issues(issues: Vec<String>) -> Self {
        Self {
            valid: issues.is_empty(),
            issues,
        }
    }
}

/// Check `code` for obvious breakage. Unknown file types are always valid.
pub fn validate_syntax(code: &str, path: &str) -> SyntaxReport {
    if is_json(path) {
        return match serde_json::from_str::<serde_json::Value>(code) {
            Ok(_) => SyntaxReport::ok(),
            Err(e) => SyntaxReport::with_issues(vec![format!("invalid JSON: {}", e)]),
        };
    }
    if is_script(path) {
        return SyntaxReport::with_issues(check_balance(code, true));
    }
    if path.ends_with(".css") || path.ends_with(".scss") {
        return SyntaxReport::with_issues(check_balance(code, false));
    }
    SyntaxReport::ok()
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Lexical token relevant to the balance check and literal rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Open { delim: char, line: usize },
    Close { delim: char, line: usize },
    /// A quoted literal; `body` is the byte range between the quotes.
    Literal {
        quote: char,
        body: Range<usize>,
        terminated: bool,
    },
}

/// Tokenize `code`, skipping comments. A `'` or `"` with no closing quote on
/// its line is plain text, so markup apostrophes do not swallow the
/// attributes that follow them. Template literals may span lines.
pub(crate) fn scan(code: &str, line_comments: bool) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = code.char_indices().peekable();
    let mut line = 1;

    while let Some((i, c)) = chars.next() {
        match c {
            '\n' => line += 1,
            '"' | '\'' | '`' => {
                let mut lookahead = chars.clone();
                let mut literal_line = line;
                let mut end = code.len();
                let mut terminated = false;
                while let Some((j, next)) = lookahead.next() {
                    match next {
                        '\\' => {
                            if let Some((_, '\n')) = lookahead.next() {
                                literal_line += 1;
                            }
                        }
                        '\n' if c != '`' => {
                            end = j;
                            break;
                        }
                        '\n' => literal_line += 1,
                        _ if next == c => {
                            end = j;
                            terminated = true;
                            break;
                        }
                        _ => {}
                    }
                }
                if terminated || c == '`' {
                    chars = lookahead;
                    line = literal_line;
                    tokens.push(Token::Literal {
                        quote: c,
                        body: i + 1..end,
                        terminated,
                    });
                }
            }
            '/' if line_comments && matches!(chars.peek(), Some((_, '/'))) => {
                for (_, next) in chars.by_ref() {
                    if next == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                let mut prev = '\0';
                for (_, next) in chars.by_ref() {
                    if next == '\n' {
                        line += 1;
                    }
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            '(' | '[' | '{' => tokens.push(Token::Open { delim: c, line }),
            ')' | ']' | '}' => tokens.push(Token::Close { delim: c, line }),
            _ => {}
        }
    }
    tokens
}

fn check_balance(code: &str, line_comments: bool) -> Vec<String> {
    let mut issues = Vec::new();
    let mut stack: Vec<(char, usize)> = Vec::new();

    for token in scan(code, line_comments) {
        match token {
            Token::Open { delim, line } => stack.push((delim, line)),
            Token::Close { delim, line } => match stack.pop() {
                Some((open, _)) if closing_for(open) == delim => {}
                Some((open, opened_at)) => issues.push(format!(
                    "line {}: '{}' closes '{}' opened on line {}",
                    line, delim, open, opened_at
                )),
                None => issues.push(format!("line {}: unmatched '{}'", line, delim)),
            },
            Token::Literal {
                quote,
                terminated: false,
                ..
            } => issues.push(format!("unterminated {} literal", quote)),
            Token::Literal { .. } => {}
        }
    }

    for (open, opened_at) in stack {
        issues.push(format!("line {}: unclosed '{}'", opened_at, open));
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_json() {
        assert!(validate_syntax("{\"a\": [1, 2]}", "package.json").valid);
    }

    #[test]
    fn test_invalid_json_reports_issue() {
        let report = validate_syntax("{\"a\": 1,}", "package.json");
        assert!(!report.valid);
        assert!(report.issues[0].starts_with("invalid JSON"));
    }

    #[test]
    fn test_balanced_script_with_tricky_strings() {
        let code = "const s = \"(\"; // )\nconst t = `${a}]`; /* { */\nfn(s, t);\n";
        assert!(validate_syntax(code, "src/a.ts").valid);
    }

    #[test]
    fn test_unclosed_block_is_reported() {
        let report = validate_syntax("export default defineConfig({\n  plugins: [\n", "vite.config.ts");
        assert!(!report.valid);
        assert_eq!(report.issues.len(), 3);
    }

    #[test]
    fn test_mismatched_closer() {
        let report = validate_syntax("a(]\n", "src/a.js");
        assert!(!report.valid);
        assert!(report.issues[0].contains("closes '('"));
    }

    #[test]
    fn test_stray_apostrophe_is_plain_text() {
        let tokens = scan("<p>Don't</p><a href=\"x\">(</a>\n", false);
        let literals: Vec<&Token> = tokens
            .iter()
            .filter(|t| matches!(t, Token::Literal { .. }))
            .collect();
        assert_eq!(literals.len(), 1);
        assert!(matches!(literals[0], Token::Literal { quote: '"', .. }));
        assert!(tokens.contains(&Token::Open { delim: '(', line: 1 }));
    }

    #[test]
    fn test_literal_body_excludes_quotes() {
        let code = "a = 'x;y' + `m\nn`;";
        let bodies: Vec<&str> = scan(code, true)
            .into_iter()
            .filter_map(|t| match t {
                Token::Literal { body, .. } => Some(&code[body]),
                _ => None,
            })
            .collect();
        assert_eq!(bodies, vec!["x;y", "m\nn"]);
    }

    #[test]
    fn test_unknown_type_is_valid() {
        assert!(validate_syntax("((((", "README.md").valid);
    }
}
