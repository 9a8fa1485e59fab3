//! Deployment history port
//!
//! The surrounding application keeps its own deployment history. When a
//! request carries a `deploymentId`, the orchestrator reports each status
//! transition through a [`DeploymentRecorder`]. Recording failures are logged
//! and never affect the pipeline outcome.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Status of a deployment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Liberating,
    Published,
    Migrated,
    Deploying,
    Deployed,
    /// Build still running when polling stopped
    Building,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::Liberating => "liberating",
            DeploymentStatus::Published => "published",
            DeploymentStatus::Migrated => "migrated",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Deployed => "deployed",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Failed => "failed",
        }
    }
}

#[async_trait]
pub trait DeploymentRecorder: Send + Sync {
    /// Store a status transition. `detail` is a short message or URL.
    async fn record(
        &self,
        deployment_id: &str,
        status: DeploymentStatus,
        detail: Option<&str>,
    ) -> Result<()>;
}

/// Discards every transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

#[async_trait]
impl DeploymentRecorder for NoopRecorder {
    async fn record(
        &self,
        _deployment_id: &str,
        _status: DeploymentStatus,
        _detail: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }
}
