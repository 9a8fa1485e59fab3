//! Structured cleanup for well-known file shapes and post-cleanup normalization.

use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use crate::catalog::ProprietaryRules;
use crate::sanitizer::strip_pattern;

const DEPENDENCY_SECTIONS: &[&str] = &[
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

const BUILD_CONFIG_STEMS: &[&str] = &[
    "vite", "webpack", "next", "rollup", "astro", "svelte", "nuxt", "remix",
];

const BUILD_CONFIG_EXTENSIONS: &[&str] = &["js", "cjs", "mjs", "ts", "cts", "mts"];

const SCRIPT_EXTENSIONS: &[&str] = &[
    "js", "jsx", "cjs", "mjs", "ts", "tsx", "cts", "mts", "vue", "svelte", "astro",
];

/// File shapes that get structure-aware cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileShape {
    PackageManifest,
    BuildConfig,
    HtmlEntry,
    Other,
}

impl FileShape {
    pub fn of(path: &str) -> Self {
        let name = file_name(path);
        if name == "package.json" {
            return FileShape::PackageManifest;
        }
        if let Some((stem, ext)) = name.split_once(".config.") {
            if BUILD_CONFIG_STEMS.contains(&stem) && BUILD_CONFIG_EXTENSIONS.contains(&ext) {
                return FileShape::BuildConfig;
            }
        }
        if name.ends_with(".html") || name.ends_with(".htm") {
            return FileShape::HtmlEntry;
        }
        FileShape::Other
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn extension(path: &str) -> Option<&str> {
    file_name(path).rsplit_once('.').map(|(_, ext)| ext)
}

pub(crate) fn is_json(path: &str) -> bool {
    extension(path) == Some("json")
}

pub(crate) fn is_script(path: &str) -> bool {
    extension(path)
        .map(|ext| SCRIPT_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Remove suspicious dependencies and the scripts that invoke them.
///
/// Returns `None` when the manifest does not parse or nothing was removed,
/// leaving the original text untouched.
pub(crate) fn clean_manifest(
    rules: &ProprietaryRules,
    content: &str,
) -> Option<(String, Vec<String>)> {
    let mut manifest: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "package manifest is not valid JSON, skipping structured cleanup");
            return None;
        }
    };
    let root = manifest.as_object_mut()?;

    let mut removed_deps = Vec::new();
    for section in DEPENDENCY_SECTIONS {
        if let Some(deps) = root.get_mut(*section).and_then(Value::as_object_mut) {
            deps.retain(|name, _| {
                if rules.is_suspicious_dependency(name) {
                    removed_deps.push(name.clone());
                    false
                } else {
                    true
                }
            });
        }
    }

    let mut removed_scripts = Vec::new();
    if let Some(scripts) = root.get_mut("scripts").and_then(Value::as_object_mut) {
        scripts.retain(|name, command| {
            let invokes_vendor = command
                .as_str()
                .map(|cmd| rules.dependency_names().any(|dep| cmd.contains(dep)))
                .unwrap_or(false);
            if invokes_vendor {
                removed_scripts.push(name.clone());
            }
            !invokes_vendor
        });
    }

    if removed_deps.is_empty() && removed_scripts.is_empty() {
        return None;
    }

    let mut changes = Vec::new();
    if !removed_deps.is_empty() {
        removed_deps.sort();
        removed_deps.dedup();
        changes.push(format!(
            "Removed proprietary dependencies: {}",
            removed_deps.join(", ")
        ));
    }
    if !removed_scripts.is_empty() {
        changes.push(format!(
            "Removed scripts invoking proprietary tooling: {}",
            removed_scripts.join(", ")
        ));
    }

    let mut serialized = serde_json::to_string_pretty(&manifest).ok()?;
    serialized.push('\n');
    Some((serialized, changes))
}

/// Strip vendor `<script>` blocks, vendor `<meta>` tags and vendor `data-*`
/// attributes from an HTML entry file.
pub(crate) fn clean_html(rules: &ProprietaryRules, text: &mut String, changes: &mut Vec<String>) {
    if let Some(re) = rules.vendor_script() {
        strip_pattern(text, re, "Removed vendor script tags", changes);
    }
    if let Some(re) = rules.vendor_meta() {
        strip_pattern(text, re, "Removed vendor meta tags", changes);
    }
    if let Some(re) = rules.vendor_attribute() {
        strip_pattern(text, re, "Stripped vendor data attributes", changes);
    }
}

/// Trim trailing whitespace, collapse runs of blank lines and repair commas
/// left dangling by earlier removals. In scripts only lines that differ from
/// `original` are repaired, so sparse arrays the author wrote survive.
pub(crate) fn normalize(path: &str, original: &str, text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(trimmed);
        out.push('\n');
    }
    if !text.ends_with('\n') {
        out.pop();
    }

    if is_json(path) {
        let every_line = vec![true; out.lines().count() + 1];
        repair_commas(&out, &every_line, true)
    } else if is_script(path) {
        let untouched: HashSet<&str> = original.lines().map(str::trim_end).collect();
        let edited: Vec<bool> = out.lines().map(|l| !untouched.contains(l)).collect();
        repair_commas(&out, &edited, false)
    } else {
        out
    }
}

/// Drop commas that are doubled (`a, , b`) or lead a list (`[ , a`) on the
/// lines flagged in `edited`. When `json` is set, also drop trailing commas
/// before `}` / `]`. String literals and comments are left alone.
fn repair_commas(text: &str, edited: &[bool], json: bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut line = 0;
    let mut last_significant: Option<char> = None;

    while i < chars.len() {
        let c = chars[i];
        let skipped_to = match c {
            '"' | '\'' | '`' => {
                last_significant = Some(c);
                Some(skip_string(&chars, i))
            }
            '/' if !json && chars.get(i + 1) == Some(&'/') => Some(
                chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map(|p| i + p)
                    .unwrap_or(chars.len()),
            ),
            '/' if !json && chars.get(i + 1) == Some(&'*') => Some(find_block_end(&chars, i + 2)),
            _ => None,
        };
        if let Some(end) = skipped_to {
            out.extend(&chars[i..end]);
            line += chars[i..end].iter().filter(|&&ch| ch == '\n').count();
            i = end;
            continue;
        }

        if c == ',' && edited.get(line).copied().unwrap_or(false) {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace()).copied();
            let leading = matches!(last_significant, Some('[') | Some(','));
            let doubled = next == Some(',');
            let trailing = json && matches!(next, Some('}') | Some(']'));
            if leading || doubled || trailing {
                i += 1;
                continue;
            }
        }
        if c == '\n' {
            line += 1;
        }
        out.push(c);
        if !c.is_whitespace() {
            last_significant = Some(c);
        }
        i += 1;
    }
    out
}

fn skip_string(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\n' if quote != '`' => return i,
            ch if ch == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

fn find_block_end(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}
