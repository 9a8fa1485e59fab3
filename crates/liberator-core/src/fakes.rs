//! In-memory collaborators for orchestrator tests (testing only)

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use deploy_driver::DeployPlatform;
use repo_publisher::SourceHost;
use schema_migrator::DatabaseApi;

use crate::backend::BackendProvider;
use crate::error::LiberationError;
use crate::recorder::{DeploymentRecorder, DeploymentStatus};
use crate::request::{CoolifyCredentials, GitHubCredentials, SupabaseCredentials};
use crate::Result;

/// Hands out pre-built ports and counts how often each was requested.
#[derive(Default)]
pub struct FakeBackends {
    host: Option<Arc<dyn SourceHost>>,
    database: Option<Arc<dyn DatabaseApi>>,
    platform: Option<Arc<dyn DeployPlatform>>,
    requested: Mutex<Vec<&'static str>>,
}

impl FakeBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_host(mut self, host: Arc<dyn SourceHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_database(mut self, database: Arc<dyn DatabaseApi>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_platform(mut self, platform: Arc<dyn DeployPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Port names in request order (`github`, `supabase`, `coolify`).
    pub fn requested(&self) -> Vec<&'static str> {
        self.requested.lock().unwrap().clone()
    }

    fn take<T: ?Sized>(&self, name: &'static str, port: &Option<Arc<T>>) -> Result<Arc<T>> {
        self.requested.lock().unwrap().push(name);
        port.clone()
            .ok_or_else(|| LiberationError::Config(format!("no fake {} backend", name)))
    }
}

impl BackendProvider for FakeBackends {
    fn source_host(&self, _creds: &GitHubCredentials) -> Result<Arc<dyn SourceHost>> {
        self.take("github", &self.host)
    }

    fn database(&self, _creds: &SupabaseCredentials) -> Result<Arc<dyn DatabaseApi>> {
        self.take("supabase", &self.database)
    }

    fn deploy_platform(&self, _creds: &CoolifyCredentials) -> Result<Arc<dyn DeployPlatform>> {
        self.take("coolify", &self.platform)
    }
}

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTransition {
    pub deployment_id: String,
    pub status: DeploymentStatus,
    pub detail: Option<String>,
}

/// Keeps every transition in memory.
#[derive(Debug, Default)]
pub struct MemoryDeploymentRecorder {
    transitions: Mutex<Vec<RecordedTransition>>,
    fail: bool,
}

impl MemoryDeploymentRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write fails after being stored.
    pub fn failing() -> Self {
        MemoryDeploymentRecorder {
            transitions: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn transitions(&self) -> Vec<RecordedTransition> {
        self.transitions.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<DeploymentStatus> {
        self.transitions().into_iter().map(|t| t.status).collect()
    }
}

#[async_trait]
impl DeploymentRecorder for MemoryDeploymentRecorder {
    async fn record(
        &self,
        deployment_id: &str,
        status: DeploymentStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        self.transitions.lock().unwrap().push(RecordedTransition {
            deployment_id: deployment_id.to_string(),
            status,
            detail: detail.map(str::to_string),
        });
        if self.fail {
            return Err(LiberationError::Config("history store unavailable".to_string()));
        }
        Ok(())
    }
}
