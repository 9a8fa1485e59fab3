//! Error taxonomy for the liberation pipeline
//!
//! Every component error is wrapped in [`LiberationError`] at the phase
//! boundary and classified into an [`ErrorKind`] for reporting.

use deploy_driver::DeployError;
use proprietary_scrub::ScrubError;
use repo_publisher::PublishError;
use schema_migrator::MigrationError;
use serde::{Deserialize, Serialize};

/// Failure classes reported on phase results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Bad or underscoped credential; terminal, no retry
    Auth,
    /// A remote resource could not be resolved
    NotFound,
    /// The resource already exists
    Conflict,
    /// Unclassified non-2xx or transport failure
    RemoteApi,
    /// Poll budget exhausted before a terminal state
    Indeterminate,
    /// Input rejected before any network call
    Validation,
}

#[derive(Debug, thiserror::Error)]
pub enum LiberationError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Scrub(#[from] ScrubError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

fn remote_kind(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::Auth,
        404 => ErrorKind::NotFound,
        409 | 422 => ErrorKind::Conflict,
        _ => ErrorKind::RemoteApi,
    }
}

impl LiberationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LiberationError::Validation(_) | LiberationError::Config(_) => ErrorKind::Validation,
            LiberationError::Scrub(_) => ErrorKind::Validation,
            LiberationError::Publish(err) => match err {
                PublishError::InvalidToken { .. } | PublishError::InsufficientScope { .. } => {
                    ErrorKind::Auth
                }
                PublishError::RemoteApi { status, .. } => remote_kind(*status),
                PublishError::NotFound(_) => ErrorKind::NotFound,
                PublishError::Validation(_) => ErrorKind::Validation,
                PublishError::Transport(_) | PublishError::Decode(_) => ErrorKind::RemoteApi,
            },
            LiberationError::Migration(err) => match err {
                MigrationError::Unauthorized { .. } => ErrorKind::Auth,
                MigrationError::Query { .. } => ErrorKind::RemoteApi,
                MigrationError::RemoteApi { status, .. } => remote_kind(*status),
                MigrationError::Validation(_) => ErrorKind::Validation,
                MigrationError::Transport(_) => ErrorKind::RemoteApi,
            },
            LiberationError::Deploy(err) => match err.root() {
                DeployError::InvalidToken { .. } | DeployError::PermissionDenied { .. } => {
                    ErrorKind::Auth
                }
                DeployError::ApiNotFound { .. } | DeployError::NotFound(_) => ErrorKind::NotFound,
                DeployError::RemoteApi { status, .. } => remote_kind(*status),
                DeployError::Validation(_) => ErrorKind::Validation,
                _ => ErrorKind::RemoteApi,
            },
        }
    }

    /// HTTP status reported on the phase result.
    pub fn http_status(&self) -> u16 {
        match self {
            LiberationError::Validation(_) | LiberationError::Scrub(_) => 400,
            LiberationError::Config(_) => 500,
            LiberationError::Publish(err) => err.http_status(),
            LiberationError::Migration(err) => err.http_status(),
            LiberationError::Deploy(err) => err.http_status(),
        }
    }
}
