//! Coolify REST client
//!
//! Implements [`DeployPlatform`] against the Coolify v4 `/api/v1` API.

use std::fmt;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Method, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::DeployError;
use crate::platform::{
    AppSource, Application, DeployPlatform, EnvVar, NewApplication, NewServer, Project, Server,
};
use crate::Result;

/// Coolify client configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct CoolifyConfig {
    /// Instance URL, without trailing slash
    pub base_url: String,
    /// API token
    #[serde(skip_serializing)]
    pub token: String,
    pub user_agent: String,
}

impl fmt::Debug for CoolifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoolifyConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl CoolifyConfig {
    pub fn new(base_url: &str, token: &str) -> Self {
        CoolifyConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            user_agent: concat!("liberator/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn api_url(&self) -> String {
        format!("{}/api/v1", self.base_url)
    }
}

/// Coolify API client
pub struct CoolifyClient {
    config: CoolifyConfig,
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct UuidResponse {
    uuid: String,
}

#[derive(Deserialize)]
struct ProjectResponse {
    uuid: String,
    name: String,
}

#[derive(Deserialize, Default)]
struct ServerSettings {
    #[serde(default)]
    is_reachable: Option<bool>,
}

#[derive(Deserialize)]
struct ServerResponse {
    uuid: String,
    name: String,
    #[serde(default)]
    ip: String,
    #[serde(default)]
    is_reachable: Option<bool>,
    #[serde(default)]
    settings: Option<ServerSettings>,
}

impl From<ServerResponse> for Server {
    fn from(s: ServerResponse) -> Self {
        let reachable = s
            .is_reachable
            .or_else(|| s.settings.and_then(|st| st.is_reachable))
            .unwrap_or(true);
        Server {
            uuid: s.uuid,
            name: s.name,
            ip: s.ip,
            reachable,
        }
    }
}

#[derive(Deserialize)]
struct ApplicationResponse {
    uuid: String,
    name: String,
    #[serde(default)]
    project_uuid: Option<String>,
    #[serde(default)]
    fqdn: Option<String>,
}

#[derive(Deserialize)]
struct CreatedApplication {
    uuid: String,
    #[serde(default)]
    domains: Option<String>,
}

#[derive(Deserialize)]
struct DeploymentRef {
    deployment_uuid: String,
}

#[derive(Deserialize)]
struct DeployResponse {
    #[serde(default)]
    deployments: Vec<DeploymentRef>,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct DeploymentResponse {
    #[serde(default)]
    logs: Option<String>,
}

impl CoolifyClient {
    pub fn new(config: CoolifyConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(CoolifyClient {
            config,
            http_client,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.config.api_url(), path))
            .bearer_auth(&self.config.token)
            .header("Accept", "application/json")
    }

    async fn expect_success(response: Response, operation: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeployError::RemoteApi {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

/// Flatten a deployment log. Coolify stores it as a JSON-encoded array of
/// `{output, hidden}` entries; anything else is returned as is.
pub fn flatten_logs(raw: &str) -> String {
    match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(entries) => entries
            .iter()
            .filter(|e| !e.get("hidden").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|e| e.get("output").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Err(_) => raw.to_string(),
    }
}

#[async_trait]
impl DeployPlatform for CoolifyClient {
    async fn version(&self) -> Result<String> {
        let response = self.request(Method::GET, "/version").send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeployError::from_version_check(
                &self.config.base_url,
                status.as_u16(),
                body,
            ));
        }
        let version = response.text().await?;
        Ok(version.trim().trim_matches('"').to_string())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let response = self.request(Method::GET, "/projects").send().await?;
        let response = Self::expect_success(response, "list projects").await?;
        let projects: Vec<ProjectResponse> = response.json().await?;
        Ok(projects
            .into_iter()
            .map(|p| Project {
                uuid: p.uuid,
                name: p.name,
            })
            .collect())
    }

    async fn create_project(&self, name: &str, description: &str) -> Result<Project> {
        let response = self
            .request(Method::POST, "/projects")
            .json(&json!({ "name": name, "description": description }))
            .send()
            .await?;
        let response = Self::expect_success(response, "create project").await?;
        let created: UuidResponse = response.json().await?;
        debug!(project = %name, uuid = %created.uuid, "Created project");
        Ok(Project {
            uuid: created.uuid,
            name: name.to_string(),
        })
    }

    async fn delete_project(&self, uuid: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/projects/{}", uuid))
            .send()
            .await?;
        Self::expect_success(response, "delete project").await?;
        Ok(())
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        let response = self.request(Method::GET, "/servers").send().await?;
        let response = Self::expect_success(response, "list servers").await?;
        let servers: Vec<ServerResponse> = response.json().await?;
        Ok(servers.into_iter().map(Server::from).collect())
    }

    async fn create_server(&self, server: &NewServer) -> Result<Server> {
        let response = self
            .request(Method::POST, "/servers")
            .json(&json!({
                "name": server.name,
                "ip": server.ip,
                "port": 22,
                "user": "root",
                "private_key_uuid": server.private_key_uuid,
                "instant_validate": true,
            }))
            .send()
            .await?;
        let response = Self::expect_success(response, "create server").await?;
        let created: UuidResponse = response.json().await?;
        Ok(Server {
            uuid: created.uuid,
            name: server.name.clone(),
            ip: server.ip.clone(),
            reachable: true,
        })
    }

    async fn list_applications(&self) -> Result<Vec<Application>> {
        let response = self.request(Method::GET, "/applications").send().await?;
        let response = Self::expect_success(response, "list applications").await?;
        let apps: Vec<ApplicationResponse> = response.json().await?;
        Ok(apps
            .into_iter()
            .map(|a| Application {
                uuid: a.uuid,
                name: a.name,
                project_uuid: a.project_uuid,
                fqdn: a.fqdn,
            })
            .collect())
    }

    async fn create_application(&self, app: &NewApplication) -> Result<Application> {
        let mut body = json!({
            "project_uuid": app.project_uuid,
            "server_uuid": app.server_uuid,
            "environment_name": app.environment_name,
            "name": app.name,
            "ports_exposes": app.ports_exposes,
            "instant_deploy": false,
        });
        let (path, operation) = match &app.source {
            AppSource::Nixpacks {
                git_repository,
                git_branch,
            } => {
                body["git_repository"] = json!(git_repository);
                body["git_branch"] = json!(git_branch);
                body["build_pack"] = json!("nixpacks");
                ("/applications/public", "create application (nixpacks)")
            }
            AppSource::GitHubApp {
                github_app_uuid,
                git_repository,
                git_branch,
            } => {
                body["github_app_uuid"] = json!(github_app_uuid);
                body["git_repository"] = json!(git_repository);
                body["git_branch"] = json!(git_branch);
                body["build_pack"] = json!("nixpacks");
                (
                    "/applications/private-github-app",
                    "create application (github app)",
                )
            }
            AppSource::Dockerfile { dockerfile } => {
                body["dockerfile"] = json!(BASE64.encode(dockerfile.as_bytes()));
                ("/applications/dockerfile", "create application (dockerfile)")
            }
        };

        let response = self.request(Method::POST, path).json(&body).send().await?;
        let response = Self::expect_success(response, operation).await?;
        let created: CreatedApplication = response.json().await?;
        Ok(Application {
            uuid: created.uuid,
            name: app.name.clone(),
            project_uuid: Some(app.project_uuid.clone()),
            fqdn: created.domains,
        })
    }

    async fn delete_application(&self, uuid: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/applications/{}", uuid))
            .send()
            .await?;
        Self::expect_success(response, "delete application").await?;
        Ok(())
    }

    async fn list_envs(&self, app_uuid: &str) -> Result<Vec<EnvVar>> {
        let response = self
            .request(Method::GET, &format!("/applications/{}/envs", app_uuid))
            .send()
            .await?;
        let response = Self::expect_success(response, "list env vars").await?;
        Ok(response.json().await?)
    }

    async fn create_env(&self, app_uuid: &str, env: &EnvVar) -> Result<()> {
        let response = self
            .request(Method::POST, &format!("/applications/{}/envs", app_uuid))
            .json(&json!({
                "key": env.key,
                "value": env.value,
                "is_build_time": env.is_build_time,
                "is_preview": false,
            }))
            .send()
            .await?;
        Self::expect_success(response, "create env var").await?;
        Ok(())
    }

    async fn update_env(&self, app_uuid: &str, env: &EnvVar) -> Result<()> {
        let response = self
            .request(Method::PATCH, &format!("/applications/{}/envs", app_uuid))
            .json(&json!({
                "key": env.key,
                "value": env.value,
                "is_build_time": env.is_build_time,
            }))
            .send()
            .await?;
        Self::expect_success(response, "update env var").await?;
        Ok(())
    }

    async fn deploy(&self, app_uuid: &str) -> Result<String> {
        let response = self
            .request(Method::GET, "/deploy")
            .query(&[("uuid", app_uuid), ("force", "false")])
            .send()
            .await?;
        let response = Self::expect_success(response, "trigger deployment").await?;
        let deploy: DeployResponse = response.json().await?;
        deploy
            .deployments
            .into_iter()
            .next()
            .map(|d| d.deployment_uuid)
            .ok_or_else(|| DeployError::Decode("deploy response listed no deployments".to_string()))
    }

    async fn application_status(&self, app_uuid: &str) -> Result<String> {
        let response = self
            .request(Method::GET, &format!("/applications/{}", app_uuid))
            .send()
            .await?;
        let response = Self::expect_success(response, "read application status").await?;
        let status: StatusResponse = response.json().await?;
        Ok(status.status.unwrap_or_default())
    }

    async fn deployment_logs(&self, deployment_uuid: &str) -> Result<String> {
        let response = self
            .request(Method::GET, &format!("/deployments/{}", deployment_uuid))
            .send()
            .await?;
        let response = Self::expect_success(response, "read deployment logs").await?;
        let deployment: DeploymentResponse = response.json().await?;
        Ok(deployment.logs.as_deref().map(flatten_logs).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", CoolifyConfig::new("https://coolify.test", "cf-secret"));
        assert!(!rendered.contains("cf-secret"));
        assert!(rendered.contains("https://coolify.test"));
    }

    #[test]
    fn test_flatten_json_logs_skips_hidden() {
        let raw = r#"[{"output":"Cloning","hidden":false},{"output":"docker internals","hidden":true},{"output":"npm ERR! missing script: build"}]"#;
        assert_eq!(flatten_logs(raw), "Cloning\nnpm ERR! missing script: build");
    }

    #[test]
    fn test_flatten_plain_logs() {
        assert_eq!(flatten_logs("plain text"), "plain text");
    }

    #[test]
    fn test_api_url() {
        let config = CoolifyConfig::new("https://coolify.example.com/", "t");
        assert_eq!(config.api_url(), "https://coolify.example.com/api/v1");
    }
}
