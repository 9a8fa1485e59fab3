//! Ignorable-vs-fatal classification of statement failures.
//!
//! An ignorable failure means the change was already applied by an earlier
//! (possibly partial) run. The vocabulary is engine specific, so it lives in
//! an explicit rule list rather than in the executor's control flow.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MigrationError;
use crate::Result;

/// Verdict for one failed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Ignorable,
    Fatal,
}

/// One way of recognizing an already-applied change.
#[derive(Debug, Clone)]
pub enum ClassificationRule {
    /// Case-insensitive substring of the error message.
    Substring(String),
    /// Regex over the error message.
    Pattern(Regex),
    /// Engine error code (SQLSTATE for Postgres).
    SqlState(String),
}

impl ClassificationRule {
    fn matches(&self, message: &str, code: Option<&str>) -> bool {
        match self {
            ClassificationRule::Substring(needle) => {
                message.to_lowercase().contains(&needle.to_lowercase())
            }
            ClassificationRule::Pattern(regex) => regex.is_match(message),
            ClassificationRule::SqlState(state) => match code {
                Some(code) => code.eq_ignore_ascii_case(state),
                None => message.split(':').any(|part| part.trim() == state),
            },
        }
    }
}

/// Postgres SQLSTATEs that mean "already exists".
pub const POSTGRES_DUPLICATE_STATES: &[&str] = &[
    "42P07", // duplicate_table
    "42710", // duplicate_object
    "42723", // duplicate_function
    "42P06", // duplicate_schema
    "42701", // duplicate_column
    "42P04", // duplicate_database
    "23505", // unique_violation
];

const POSTGRES_DUPLICATE_PATTERN: &str = r#"(?i)\b(relation|type|function|procedure|policy|trigger|index|constraint|schema|extension|column|role|publication|view|sequence)\b.*\balready exists\b"#;

/// Ordered list of [`ClassificationRule`]s. Anything no rule matches is fatal.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    rules: Vec<ClassificationRule>,
}

impl ErrorClassifier {
    /// A classifier that treats every failure as fatal.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Vocabulary for PostgreSQL-backed targets.
    pub fn postgres() -> Result<Self> {
        let pattern = Regex::new(POSTGRES_DUPLICATE_PATTERN)
            .map_err(|e| MigrationError::Validation(format!("duplicate pattern: {}", e)))?;
        let mut classifier = Self::empty()
            .with_rule(ClassificationRule::Substring("already exists".to_string()))
            .with_rule(ClassificationRule::Substring("duplicate key".to_string()))
            .with_rule(ClassificationRule::Pattern(pattern));
        for state in POSTGRES_DUPLICATE_STATES {
            classifier = classifier.with_rule(ClassificationRule::SqlState(state.to_string()));
        }
        Ok(classifier)
    }

    pub fn with_rule(mut self, rule: ClassificationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Compile and add a message regex.
    pub fn with_pattern(self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| MigrationError::Validation(format!("invalid pattern '{}': {}", pattern, e)))?;
        Ok(self.with_rule(ClassificationRule::Pattern(regex)))
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn classify(&self, message: &str, code: Option<&str>) -> ErrorClass {
        if self.rules.iter().any(|r| r.matches(message, code)) {
            ErrorClass::Ignorable
        } else {
            ErrorClass::Fatal
        }
    }

    /// Classify a statement failure. Only query errors can be ignorable.
    pub fn classify_error(&self, err: &MigrationError) -> ErrorClass {
        match err {
            MigrationError::Query { .. } => self.classify(&err.message(), err.sql_state()),
            _ => ErrorClass::Fatal,
        }
    }
}
