//! Content sanitizer.
//!
//! [`Sanitizer::clean_file_content`] applies the catalog to one file in a
//! fixed order:
//!
//! 1. filename-based removal (short-circuits everything else)
//! 2. import statements and content regexes
//! 3. telemetry literal neutralization
//! 4. structured cleanup of package manifests, build configs and HTML entry files
//! 5. whitespace / trailing-comma normalization, only when an earlier step changed the file
//!
//! Every step that actually changes the text appends one entry to
//! [`CleaningResult::changes`].

use std::ops::Range;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::catalog::ProprietaryRules;
use crate::structured::{self, is_script, FileShape};
use crate::syntax::{scan, Token};
use crate::Result;

/// One file of the user's source tree. Identity is the path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Outcome of cleaning a single file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CleaningResult {
    pub path: String,
    pub original_content: String,
    pub cleaned_content: String,
    /// Human-readable descriptions, in the order the steps ran.
    pub changes: Vec<String>,
    /// The file must not be published at all.
    pub removed: bool,
}

impl CleaningResult {
    fn untouched(path: &str, content: &str) -> Self {
        Self {
            path: path.to_string(),
            original_content: content.to_string(),
            cleaned_content: content.to_string(),
            changes: Vec::new(),
            removed: false,
        }
    }

    /// Whether publication differs from the original file.
    pub fn is_modified(&self) -> bool {
        self.removed || self.cleaned_content != self.original_content
    }
}

/// Batch cleaning outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CleaningReport {
    /// One result per input file, in input order.
    pub results: Vec<CleaningResult>,
    pub files_changed: usize,
    pub files_removed: usize,
    pub total_changes: usize,
    /// SHA-256 over the published `(path, content)` pairs sorted by path.
    pub digest: String,
}

impl CleaningReport {
    /// Results that will be published (not removed).
    pub fn published(&self) -> impl Iterator<Item = &CleaningResult> {
        self.results.iter().filter(|r| !r.removed)
    }
}

/// Applies a [`ProprietaryRules`] catalog to source files.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    rules: Arc<ProprietaryRules>,
}

impl Sanitizer {
    pub fn new(rules: ProprietaryRules) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    /// Share an already-compiled catalog.
    pub fn from_shared(rules: Arc<ProprietaryRules>) -> Self {
        Self { rules }
    }

    /// Sanitizer over [`ProprietaryRules::default_catalog`].
    pub fn with_default_catalog() -> Result<Self> {
        Ok(Self::new(ProprietaryRules::default_catalog()?))
    }

    pub fn rules(&self) -> &ProprietaryRules {
        &self.rules
    }

    /// Cheap membership pre-filter. When this returns false no content rule
    /// can match, so [`Self::clean_file_content`] leaves the file untouched
    /// (unless its path is subject to removal).
    pub fn needs_cleaning(&self, content: &str) -> bool {
        let lowered = content.to_lowercase();
        self.rules
            .keywords()
            .iter()
            .any(|k| lowered.contains(k.as_str()))
    }

    /// Clean one file.
    pub fn clean_file_content(&self, path: &str, content: &str) -> CleaningResult {
        if let Some(reason) = self.rules.removal_reason(path) {
            debug!(path = %path, reason = %reason, "Dropping proprietary file");
            return CleaningResult {
                path: path.to_string(),
                original_content: content.to_string(),
                cleaned_content: String::new(),
                changes: vec![format!("Removed file ({})", reason)],
                removed: true,
            };
        }

        if !self.needs_cleaning(content) {
            return CleaningResult::untouched(path, content);
        }

        let mut text = content.to_string();
        let mut changes = Vec::new();

        for pattern in self
            .rules
            .import_patterns()
            .iter()
            .chain(self.rules.content_patterns())
        {
            strip_pattern(&mut text, &pattern.regex, &pattern.description, &mut changes);
        }

        let neutralized = match self.rules.telemetry_domains() {
            Some(domains) => neutralize_telemetry(&mut text, domains, is_script(path)),
            None => 0,
        };
        if neutralized > 0 {
            changes.push(format!(
                "Neutralized {} telemetry reference{}",
                neutralized,
                if neutralized == 1 { "" } else { "s" }
            ));
        }

        match FileShape::of(path) {
            FileShape::PackageManifest => {
                if let Some((cleaned, manifest_changes)) =
                    structured::clean_manifest(&self.rules, &text)
                {
                    text = cleaned;
                    changes.extend(manifest_changes);
                }
            }
            FileShape::BuildConfig => {
                for pattern in self.rules.hidden_plugin_patterns() {
                    strip_pattern(&mut text, &pattern.regex, &pattern.description, &mut changes);
                }
            }
            FileShape::HtmlEntry => structured::clean_html(&self.rules, &mut text, &mut changes),
            FileShape::Other => {}
        }

        if text != content {
            let normalized = structured::normalize(path, content, &text);
            if normalized != text {
                text = normalized;
                changes.push("Normalized whitespace and trailing commas".to_string());
            }
        }

        CleaningResult {
            path: path.to_string(),
            original_content: content.to_string(),
            cleaned_content: text,
            changes,
            removed: false,
        }
    }

    /// Clean a batch of files.
    pub fn clean_files(&self, files: &[SourceFile]) -> CleaningReport {
        let results: Vec<CleaningResult> = files
            .iter()
            .map(|f| self.clean_file_content(&f.path, &f.content))
            .collect();

        let files_changed = results.iter().filter(|r| r.is_modified()).count();
        let files_removed = results.iter().filter(|r| r.removed).count();
        let total_changes = results.iter().map(|r| r.changes.len()).sum();

        let mut published: Vec<&CleaningResult> = results.iter().filter(|r| !r.removed).collect();
        published.sort_by(|a, b| a.path.cmp(&b.path));
        let mut hasher = Sha256::new();
        for result in published {
            hasher.update(result.path.as_bytes());
            hasher.update([0u8]);
            hasher.update(result.cleaned_content.as_bytes());
            hasher.update([0u8]);
        }

        CleaningReport {
            results,
            files_changed,
            files_removed,
            total_changes,
            digest: hex::encode(hasher.finalize()),
        }
    }
}

/// Remove every match of `regex`, recording `description` only if the text
/// really changed.
pub(crate) fn strip_pattern(
    text: &mut String,
    regex: &Regex,
    description: &str,
    changes: &mut Vec<String>,
) {
    if !regex.is_match(text) {
        return;
    }
    let replaced = regex.replace_all(text, "").into_owned();
    if replaced != *text {
        *text = replaced;
        changes.push(description.to_string());
    }
}

/// Empty every string literal whose own body mentions a telemetry domain,
/// keeping its quotes. Returns the number of literals emptied.
fn neutralize_telemetry(text: &mut String, domains: &Regex, line_comments: bool) -> usize {
    let bodies: Vec<Range<usize>> = scan(text, line_comments)
        .into_iter()
        .filter_map(|token| match token {
            Token::Literal {
                body,
                terminated: true,
                ..
            } if domains.is_match(&text[body.clone()]) => Some(body),
            _ => None,
        })
        .collect();
    for body in bodies.iter().rev() {
        text.replace_range(body.clone(), "");
    }
    bodies.len()
}
