//! Error types for deploy-driver

use thiserror::Error;

/// Errors that can occur while driving a deployment
#[derive(Error, Debug)]
pub enum DeployError {
    /// The version check answered 401
    #[error("Coolify rejected the API token (401); generate a new token under Keys & Tokens")]
    InvalidToken { body: String },

    /// The version check answered 403
    #[error("Coolify API token lacks permission (403); the token needs read and write access")]
    PermissionDenied { body: String },

    /// The version check answered 404
    #[error("Coolify API not found at {url} (404); check the instance URL and that the API is enabled")]
    ApiNotFound { url: String },

    /// Any other non-2xx response, captured verbatim
    #[error("Coolify {operation} failed ({status}): {body}")]
    RemoteApi {
        operation: String,
        status: u16,
        body: String,
    },

    /// A required remote resource could not be resolved or created
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or malformed input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The build reached a failed or exited state
    #[error("Deployment failed with status '{status}'")]
    BuildFailed {
        status: String,
        /// Tail of the build log, when it could be fetched
        logs: Option<String>,
    },

    /// A later step failed after this run created the project, which was then
    /// deleted
    #[error("{source} (rolled back project {project_uuid})")]
    RolledBack {
        project_uuid: String,
        /// Set when the project could not be deleted
        cleanup_error: Option<String>,
        source: Box<DeployError>,
    },

    /// Network or client-side HTTP failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body did not have the expected shape
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl DeployError {
    /// Map a failed version check onto its specific error.
    pub fn from_version_check(url: &str, status: u16, body: String) -> Self {
        match status {
            401 => DeployError::InvalidToken { body },
            403 => DeployError::PermissionDenied { body },
            404 => DeployError::ApiNotFound {
                url: url.to_string(),
            },
            _ => DeployError::RemoteApi {
                operation: "connectivity check".to_string(),
                status,
                body,
            },
        }
    }

    /// The error that caused a rollback, or `self`.
    pub fn root(&self) -> &DeployError {
        match self {
            DeployError::RolledBack { source, .. } => source.root(),
            other => other,
        }
    }

    /// Project deleted by rollback, if any.
    pub fn rolled_back_project(&self) -> Option<&str> {
        match self {
            DeployError::RolledBack { project_uuid, .. } => Some(project_uuid),
            _ => None,
        }
    }

    /// Build log tail attached to a failed build.
    pub fn build_logs(&self) -> Option<&str> {
        match self.root() {
            DeployError::BuildFailed { logs, .. } => logs.as_deref(),
            _ => None,
        }
    }

    /// HTTP status reported on the phase result.
    pub fn http_status(&self) -> u16 {
        match self {
            DeployError::InvalidToken { .. } => 401,
            DeployError::PermissionDenied { .. } => 403,
            DeployError::ApiNotFound { .. } => 404,
            DeployError::RemoteApi { status, .. } if *status >= 400 => *status,
            DeployError::RemoteApi { .. } => 502,
            DeployError::NotFound(_) => 404,
            DeployError::Validation(_) => 400,
            DeployError::BuildFailed { .. } => 500,
            DeployError::RolledBack { source, .. } => source.http_status(),
            DeployError::Transport(_) => 502,
            DeployError::Decode(_) => 502,
        }
    }
}

impl From<reqwest::Error> for DeployError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DeployError::Decode(err.to_string())
        } else {
            DeployError::Transport(err.to_string())
        }
    }
}
