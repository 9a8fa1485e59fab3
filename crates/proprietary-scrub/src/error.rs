//! Error types for proprietary-scrub

use thiserror::Error;

/// Errors that can occur while building a rule catalog.
#[derive(Error, Debug)]
pub enum ScrubError {
    /// A rule's regular expression failed to compile
    #[error("invalid pattern for rule '{rule}': {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    /// A rule was declared with an empty literal
    #[error("rule '{0}' has an empty value")]
    EmptyRule(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_displays_rule_name() {
        let source = regex::Regex::new("(unclosed").unwrap_err();
        let err = ScrubError::InvalidPattern {
            rule: "hidden-plugin".to_string(),
            source,
        };
        assert!(err.to_string().contains("hidden-plugin"));
    }
}
