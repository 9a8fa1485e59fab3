//! Error types for schema-migrator

use thiserror::Error;

/// Errors that can occur while migrating a database
#[derive(Error, Debug)]
pub enum MigrationError {
    /// The database rejected a statement
    #[error("query failed ({status}): {message}")]
    Query {
        status: u16,
        message: String,
        /// SQLSTATE, when the backend reported one
        code: Option<String>,
    },

    /// The management token was rejected
    #[error("database credentials rejected ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    /// Any other non-2xx response from the management API
    #[error("management API {operation} failed ({status}): {body}")]
    RemoteApi {
        operation: String,
        status: u16,
        body: String,
    },

    /// Invalid rule or input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Network or client-side HTTP failure
    #[error("Transport error: {0}")]
    Transport(String),
}

impl MigrationError {
    /// HTTP status reported on the phase result.
    pub fn http_status(&self) -> u16 {
        match self {
            MigrationError::Query { .. } => 500,
            MigrationError::Unauthorized { status, .. } => *status,
            MigrationError::RemoteApi { status, .. } if *status >= 400 => *status,
            MigrationError::RemoteApi { .. } => 502,
            MigrationError::Validation(_) => 400,
            MigrationError::Transport(_) => 502,
        }
    }

    /// Text used for ignorable/fatal classification.
    pub fn message(&self) -> String {
        match self {
            MigrationError::Query { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn sql_state(&self) -> Option<&str> {
        match self {
            MigrationError::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MigrationError {
    fn from(err: reqwest::Error) -> Self {
        MigrationError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_exposes_code_and_message() {
        let err = MigrationError::Query {
            status: 400,
            message: "relation \"t\" already exists".to_string(),
            code: Some("42P07".to_string()),
        };
        assert_eq!(err.sql_state(), Some("42P07"));
        assert_eq!(err.message(), "relation \"t\" already exists");
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn test_unauthorized_keeps_status() {
        let err = MigrationError::Unauthorized {
            status: 403,
            body: "forbidden".to_string(),
        };
        assert_eq!(err.http_status(), 403);
    }
}
