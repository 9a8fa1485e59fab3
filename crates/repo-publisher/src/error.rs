//! Error types for repo-publisher

use thiserror::Error;

/// Errors that can occur while publishing to the source host
#[derive(Error, Debug)]
pub enum PublishError {
    /// The identity endpoint rejected the token
    #[error("GitHub token rejected ({status}): {body}")]
    InvalidToken { status: u16, body: String },

    /// The token is valid but cannot write repositories
    #[error("GitHub token lacks the 'repo' scope (granted: {granted}); create a token with repository write access")]
    InsufficientScope { granted: String },

    /// Any other non-2xx response, captured verbatim
    #[error("GitHub {operation} failed ({status}): {body}")]
    RemoteApi {
        operation: String,
        status: u16,
        body: String,
    },

    /// A resource that must exist after creation could not be resolved
    #[error("Not found: {0}")]
    NotFound(String),

    /// Nothing to publish or malformed input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Network or client-side HTTP failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body did not have the expected shape
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl PublishError {
    /// HTTP status reported on the phase result.
    pub fn http_status(&self) -> u16 {
        match self {
            PublishError::InvalidToken { .. } => 401,
            PublishError::InsufficientScope { .. } => 403,
            PublishError::RemoteApi { status, .. } if *status >= 400 => *status,
            PublishError::RemoteApi { .. } => 502,
            PublishError::NotFound(_) => 404,
            PublishError::Validation(_) => 400,
            PublishError::Transport(_) => 502,
            PublishError::Decode(_) => 502,
        }
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PublishError::Decode(err.to_string())
        } else {
            PublishError::Transport(err.to_string())
        }
    }
}
