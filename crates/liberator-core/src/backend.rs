//! Per-request construction of the remote ports
//!
//! Credentials arrive with each request, so clients are built per request by
//! a [`BackendProvider`] rather than once at startup.

use std::sync::Arc;

use deploy_driver::{CoolifyClient, CoolifyConfig, DeployPlatform};
use repo_publisher::{GitHubClient, GitHubConfig, SourceHost};
use schema_migrator::{DatabaseApi, SupabaseClient, SupabaseConfig};

use crate::config::LiberatorConfig;
use crate::request::{CoolifyCredentials, GitHubCredentials, SupabaseCredentials};
use crate::Result;

pub trait BackendProvider: Send + Sync {
    fn source_host(&self, creds: &GitHubCredentials) -> Result<Arc<dyn SourceHost>>;

    fn database(&self, creds: &SupabaseCredentials) -> Result<Arc<dyn DatabaseApi>>;

    fn deploy_platform(&self, creds: &CoolifyCredentials) -> Result<Arc<dyn DeployPlatform>>;
}

/// Builds the real HTTP clients.
#[derive(Debug, Clone)]
pub struct HttpBackendProvider {
    config: LiberatorConfig,
}

impl HttpBackendProvider {
    pub fn new(config: LiberatorConfig) -> Self {
        HttpBackendProvider { config }
    }
}

impl BackendProvider for HttpBackendProvider {
    fn source_host(&self, creds: &GitHubCredentials) -> Result<Arc<dyn SourceHost>> {
        let api_url = creds
            .api_url
            .as_deref()
            .unwrap_or(&self.config.github_api_url);
        let config = GitHubConfig::new(&creds.token)
            .with_api_url(api_url)
            .with_user_agent(&self.config.user_agent);
        Ok(Arc::new(GitHubClient::new(config)?))
    }

    fn database(&self, creds: &SupabaseCredentials) -> Result<Arc<dyn DatabaseApi>> {
        let api_url = creds
            .api_url
            .as_deref()
            .unwrap_or(&self.config.supabase_api_url);
        let mut config = SupabaseConfig::new(&creds.project_ref, &creds.access_token)
            .with_api_url(api_url)
            .with_user_agent(&self.config.user_agent);
        if let (Some(url), Some(key)) = (&creds.project_url, &creds.service_role_key) {
            config = config.with_service_role(url, key);
        }
        Ok(Arc::new(SupabaseClient::new(config)?))
    }

    fn deploy_platform(&self, creds: &CoolifyCredentials) -> Result<Arc<dyn DeployPlatform>> {
        let config =
            CoolifyConfig::new(&creds.base_url, &creds.token).with_user_agent(&self.config.user_agent);
        Ok(Arc::new(CoolifyClient::new(config)?))
    }
}
