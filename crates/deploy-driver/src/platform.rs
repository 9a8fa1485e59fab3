//! Deployment platform port
//!
//! The subset of a Coolify-like API the driver depends on: projects, servers,
//! applications, environment variables, deploy trigger, status and logs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Environment applications are created in.
pub const DEFAULT_ENVIRONMENT: &str = "production";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub uuid: String,
    pub name: String,
    pub ip: String,
    pub reachable: bool,
}

/// Request to register a server over SSH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewServer {
    pub name: String,
    pub ip: String,
    pub private_key_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub uuid: String,
    pub name: String,
    /// Owning project, when the platform reports it
    pub project_uuid: Option<String>,
    /// Public URL assigned by the platform
    pub fqdn: Option<String>,
}

/// How the platform builds the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AppSource {
    /// Convention-based build of a Git repository the platform can clone
    /// directly (public, or a URL carrying its own credentials)
    Nixpacks {
        git_repository: String,
        git_branch: String,
    },
    /// Convention-based build of a private repository fetched through a
    /// GitHub App registered on the platform
    #[serde(rename = "github-app")]
    GitHubApp {
        github_app_uuid: String,
        git_repository: String,
        git_branch: String,
    },
    /// Build from an inline Dockerfile
    Dockerfile { dockerfile: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub project_uuid: String,
    pub server_uuid: String,
    pub environment_name: String,
    pub name: String,
    pub ports_exposes: String,
    pub source: AppSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
    /// Exposed to the build as well as the running container
    #[serde(default)]
    pub is_build_time: bool,
}

impl EnvVar {
    pub fn build_time(key: &str, value: &str) -> Self {
        EnvVar {
            key: key.to_string(),
            value: value.to_string(),
            is_build_time: true,
        }
    }

    pub fn runtime(key: &str, value: &str) -> Self {
        EnvVar {
            key: key.to_string(),
            value: value.to_string(),
            is_build_time: false,
        }
    }
}

/// Port over the deployment platform API.
#[async_trait]
pub trait DeployPlatform: Send + Sync {
    /// Cheap authenticated connectivity check; returns the platform version.
    async fn version(&self) -> Result<String>;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    async fn create_project(&self, name: &str, description: &str) -> Result<Project>;

    async fn delete_project(&self, uuid: &str) -> Result<()>;

    async fn list_servers(&self) -> Result<Vec<Server>>;

    async fn create_server(&self, server: &NewServer) -> Result<Server>;

    async fn list_applications(&self) -> Result<Vec<Application>>;

    async fn create_application(&self, app: &NewApplication) -> Result<Application>;

    async fn delete_application(&self, uuid: &str) -> Result<()>;

    async fn list_envs(&self, app_uuid: &str) -> Result<Vec<EnvVar>>;

    /// Create a variable. Fails with a 409 `RemoteApi` error when the key
    /// already exists.
    async fn create_env(&self, app_uuid: &str, env: &EnvVar) -> Result<()>;

    /// Update an existing variable by key.
    async fn update_env(&self, app_uuid: &str, env: &EnvVar) -> Result<()>;

    /// Queue a deployment; returns the deployment id.
    async fn deploy(&self, app_uuid: &str) -> Result<String>;

    /// Raw application status (`running:healthy`, `exited`, `building`, ...).
    async fn application_status(&self, app_uuid: &str) -> Result<String>;

    /// Build log of a deployment as plain text.
    async fn deployment_logs(&self, deployment_uuid: &str) -> Result<String>;
}
