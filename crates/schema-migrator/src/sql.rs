//! SQL statement splitting.
//!
//! A `;` ends a statement only at the top level. Inside a single- or
//! double-quoted string, an escape string (`E'it\'s'`), a dollar-quoted body
//! (`$$ ... $$`, `$fn$ ... $fn$`), a `--` line comment or a `/* */` block
//! comment it is plain text.

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuote,
    /// `E'...'`: backslash escapes the next character.
    EscapeString,
    DoubleQuote,
    Dollar(String),
    LineComment,
    /// Postgres block comments nest.
    BlockComment(usize),
}

/// Split `sql` into statements, without their terminating `;`.
///
/// Statements are trimmed; empty and comment-only statements are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match &state {
            State::Normal => match c {
                ';' => {
                    push_statement(&mut statements, &current);
                    current.clear();
                    i += 1;
                    continue;
                }
                '\'' if is_escape_prefix(&chars, i) => state = State::EscapeString,
                '\'' => state = State::SingleQuote,
                '"' => state = State::DoubleQuote,
                '-' if next == Some('-') => {
                    current.push_str("--");
                    state = State::LineComment;
                    i += 2;
                    continue;
                }
                '/' if next == Some('*') => {
                    current.push_str("/*");
                    state = State::BlockComment(1);
                    i += 2;
                    continue;
                }
                '$' if i == 0 || !is_ident_char(chars[i - 1]) => {
                    if let Some(tag) = dollar_tag(&chars, i) {
                        let len = tag.chars().count();
                        current.push_str(&tag);
                        state = State::Dollar(tag);
                        i += len;
                        continue;
                    }
                }
                _ => {}
            },
            State::SingleQuote => {
                if c == '\'' {
                    if next == Some('\'') {
                        current.push_str("''");
                        i += 2;
                        continue;
                    }
                    state = State::Normal;
                }
            }
            State::EscapeString => match c {
                '\\' => {
                    current.push(c);
                    if let Some(escaped) = next {
                        current.push(escaped);
                    }
                    i += 2;
                    continue;
                }
                '\'' if next == Some('\'') => {
                    current.push_str("''");
                    i += 2;
                    continue;
                }
                '\'' => state = State::Normal,
                _ => {}
            },
            State::DoubleQuote => {
                if c == '"' {
                    state = State::Normal;
                }
            }
            State::Dollar(tag) => {
                if c == '$' && starts_with_at(&chars, i, tag) {
                    let len = tag.chars().count();
                    current.push_str(tag);
                    state = State::Normal;
                    i += len;
                    continue;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                let depth = *depth;
                if c == '*' && next == Some('/') {
                    current.push_str("*/");
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    i += 2;
                    continue;
                }
                if c == '/' && next == Some('*') {
                    current.push_str("/*");
                    state = State::BlockComment(depth + 1);
                    i += 2;
                    continue;
                }
            }
        }
        current.push(c);
        i += 1;
    }

    push_statement(&mut statements, &current);
    statements
}

/// True when `statement` has nothing but whitespace and comments.
pub fn is_comment_only(statement: &str) -> bool {
    let chars: Vec<char> = statement.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            let mut depth = 0usize;
            while i < chars.len() {
                if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
                    depth += 1;
                    i += 2;
                } else if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    depth -= 1;
                    i += 2;
                    if depth == 0 {
                        break;
                    }
                } else {
                    i += 1;
                }
            }
        } else {
            return false;
        }
    }
    true
}

fn push_statement(statements: &mut Vec<String>, current: &str) {
    let trimmed = current.trim();
    if !trimmed.is_empty() && !is_comment_only(trimmed) {
        statements.push(trimmed.to_string());
    }
}

/// `$tag$` starting at `start`, if any. Tags follow identifier rules, so
/// positional parameters like `$1` are not tags.
fn dollar_tag(chars: &[char], start: usize) -> Option<String> {
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '$' {
            return Some(chars[start..=i].iter().collect());
        }
        let valid = if i == start + 1 {
            c.is_alphabetic() || c == '_'
        } else {
            c.is_alphanumeric() || c == '_'
        };
        if !valid {
            return None;
        }
        i += 1;
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// The quote at `quote` opens an escape string: it follows a lone `E`/`e`.
fn is_escape_prefix(chars: &[char], quote: usize) -> bool {
    match quote.checked_sub(1).map(|p| chars[p]) {
        Some('E') | Some('e') => quote < 2 || !is_ident_char(chars[quote - 2]),
        _ => false,
    }
}

fn starts_with_at(chars: &[char], start: usize, needle: &str) -> bool {
    let mut i = start;
    for n in needle.chars() {
        if chars.get(i) != Some(&n) {
            return false;
        }
        i += 1;
    }
    true
}
