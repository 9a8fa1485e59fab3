//! In-memory fake for the deployment platform port (testing only)
//!
//! `MemoryDeployPlatform` keeps projects, servers, applications and env vars
//! behind one `Mutex`, replays a scripted sequence of application statuses
//! and records every call. Like Coolify, a project that still holds
//! applications cannot be deleted.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::DeployError;
use crate::platform::{
    AppSource, Application, DeployPlatform, EnvVar, NewApplication, NewServer, Project, Server,
};
use crate::Result;

#[derive(Debug, Default)]
struct PlatformState {
    projects: BTreeMap<String, Project>,
    servers: Vec<Server>,
    applications: BTreeMap<String, Application>,
    sources: HashMap<String, AppSource>,
    envs: HashMap<String, BTreeMap<String, EnvVar>>,
    deployments: Vec<String>,
    statuses: VecDeque<String>,
    calls: Vec<String>,
    next_id: u64,
}

impl PlatformState {
    fn next_uuid(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:04}", prefix, self.next_id)
    }
}

/// Which call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateProject,
    DeleteProject,
    /// Any convention-based creation, GitHub App sources included
    NixpacksApp,
    DockerfileApp,
    Env,
    Deploy,
    Status,
    Logs,
}

/// In-memory `DeployPlatform`.
#[derive(Debug)]
pub struct MemoryDeployPlatform {
    version_status: Option<u16>,
    failures: Vec<FailPoint>,
    logs: String,
    state: Mutex<PlatformState>,
}

impl Default for MemoryDeployPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDeployPlatform {
    /// One reachable server, no projects, status reads report `running:healthy`.
    pub fn new() -> Self {
        let state = PlatformState {
            servers: vec![Server {
                uuid: "srv-main".to_string(),
                name: "localhost".to_string(),
                ip: "127.0.0.1".to_string(),
                reachable: true,
            }],
            ..Default::default()
        };
        MemoryDeployPlatform {
            version_status: None,
            failures: Vec::new(),
            logs: String::new(),
            state: Mutex::new(state),
        }
    }

    /// The version check answers `status`.
    pub fn with_version_status(mut self, status: u16) -> Self {
        self.version_status = Some(status);
        self
    }

    pub fn failing(mut self, point: FailPoint) -> Self {
        self.failures.push(point);
        self
    }

    /// Replace the server list.
    pub fn with_servers(self, servers: Vec<Server>) -> Self {
        self.state.lock().unwrap().servers = servers;
        self
    }

    /// A project that exists before the run.
    pub fn with_project(self, name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let uuid = state.next_uuid("proj");
            state.projects.insert(
                uuid.clone(),
                Project {
                    uuid,
                    name: name.to_string(),
                },
            );
        }
        self
    }

    /// An application that exists before the run. `project` names a seeded
    /// project; `None` leaves the application without a reported project.
    pub fn with_application(self, name: &str, project: Option<&str>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let project_uuid = project.map(|wanted| {
                state
                    .projects
                    .values()
                    .find(|p| p.name == wanted)
                    .map(|p| p.uuid.clone())
                    .unwrap_or_else(|| panic!("seed project '{}' first", wanted))
            });
            let uuid = state.next_uuid("app");
            state.applications.insert(
                uuid.clone(),
                Application {
                    uuid,
                    name: name.to_string(),
                    project_uuid,
                    fqdn: None,
                },
            );
        }
        self
    }

    /// Statuses returned by successive reads; the last one repeats.
    pub fn with_statuses(self, statuses: &[&str]) -> Self {
        self.state.lock().unwrap().statuses = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_logs(mut self, logs: &str) -> Self {
        self.logs = logs.to_string();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    pub fn project_exists(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .projects
            .values()
            .any(|p| p.name == name)
    }

    pub fn project_count(&self) -> usize {
        self.state.lock().unwrap().projects.len()
    }

    pub fn applications(&self) -> Vec<Application> {
        self.state
            .lock()
            .unwrap()
            .applications
            .values()
            .cloned()
            .collect()
    }

    pub fn source_of(&self, app_uuid: &str) -> Option<AppSource> {
        self.state.lock().unwrap().sources.get(app_uuid).cloned()
    }

    pub fn envs(&self, app_uuid: &str) -> Vec<EnvVar> {
        self.state
            .lock()
            .unwrap()
            .envs
            .get(app_uuid)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Store an env var directly, bypassing the call log.
    pub fn seed_env(&self, app_uuid: &str, env: EnvVar) {
        self.state
            .lock()
            .unwrap()
            .envs
            .entry(app_uuid.to_string())
            .or_default()
            .insert(env.key.clone(), env);
    }

    fn record(&self, call: &str) {
        self.state.lock().unwrap().calls.push(call.to_string());
    }

    fn check(&self, point: FailPoint, operation: &str) -> Result<()> {
        if self.failures.contains(&point) {
            return Err(DeployError::RemoteApi {
                operation: operation.to_string(),
                status: 500,
                body: format!("{{\"message\":\"{} unavailable\"}}", operation),
            });
        }
        Ok(())
    }
}

fn not_found(what: &str, uuid: &str) -> DeployError {
    DeployError::RemoteApi {
        operation: format!("read {}", what),
        status: 404,
        body: format!("{{\"message\":\"{} {} not found\"}}", what, uuid),
    }
}

#[async_trait]
impl DeployPlatform for MemoryDeployPlatform {
    async fn version(&self) -> Result<String> {
        self.record("version");
        if let Some(status) = self.version_status {
            return Err(DeployError::from_version_check(
                "http://coolify.test",
                status,
                String::new(),
            ));
        }
        Ok("4.0.0-beta.360".to_string())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.record("list_projects");
        Ok(self.state.lock().unwrap().projects.values().cloned().collect())
    }

    async fn create_project(&self, name: &str, _description: &str) -> Result<Project> {
        self.record("create_project");
        self.check(FailPoint::CreateProject, "create project")?;
        let mut state = self.state.lock().unwrap();
        let uuid = state.next_uuid("proj");
        let project = Project {
            uuid: uuid.clone(),
            name: name.to_string(),
        };
        state.projects.insert(uuid, project.clone());
        Ok(project)
    }

    async fn delete_project(&self, uuid: &str) -> Result<()> {
        self.record("delete_project");
        self.check(FailPoint::DeleteProject, "delete project")?;
        let mut state = self.state.lock().unwrap();
        let has_resources = state
            .applications
            .values()
            .any(|a| a.project_uuid.as_deref() == Some(uuid));
        if has_resources {
            return Err(DeployError::RemoteApi {
                operation: "delete project".to_string(),
                status: 400,
                body: "{\"message\":\"Project has resources, so it cannot be deleted.\"}"
                    .to_string(),
            });
        }
        state
            .projects
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| not_found("project", uuid))
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        self.record("list_servers");
        Ok(self.state.lock().unwrap().servers.clone())
    }

    async fn create_server(&self, server: &NewServer) -> Result<Server> {
        self.record("create_server");
        let mut state = self.state.lock().unwrap();
        let created = Server {
            uuid: state.next_uuid("srv"),
            name: server.name.clone(),
            ip: server.ip.clone(),
            reachable: true,
        };
        state.servers.push(created.clone());
        Ok(created)
    }

    async fn list_applications(&self) -> Result<Vec<Application>> {
        self.record("list_applications");
        Ok(self.applications())
    }

    async fn create_application(&self, app: &NewApplication) -> Result<Application> {
        match &app.source {
            AppSource::Nixpacks { .. } => {
                self.record("create_application:nixpacks");
                self.check(FailPoint::NixpacksApp, "create application (nixpacks)")?;
            }
            AppSource::GitHubApp { .. } => {
                self.record("create_application:github-app");
                self.check(FailPoint::NixpacksApp, "create application (github app)")?;
            }
            AppSource::Dockerfile { .. } => {
                self.record("create_application:dockerfile");
                self.check(FailPoint::DockerfileApp, "create application (dockerfile)")?;
            }
        }
        let mut state = self.state.lock().unwrap();
        if !state.projects.contains_key(&app.project_uuid) {
            return Err(not_found("project", &app.project_uuid));
        }
        let uuid = state.next_uuid("app");
        let created = Application {
            uuid: uuid.clone(),
            name: app.name.clone(),
            project_uuid: Some(app.project_uuid.clone()),
            fqdn: Some(format!("http://{}.coolify.test", app.name)),
        };
        state.applications.insert(uuid.clone(), created.clone());
        state.sources.insert(uuid, app.source.clone());
        Ok(created)
    }

    async fn delete_application(&self, uuid: &str) -> Result<()> {
        self.record("delete_application");
        let mut state = self.state.lock().unwrap();
        state.envs.remove(uuid);
        state
            .applications
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| not_found("application", uuid))
    }

    async fn list_envs(&self, app_uuid: &str) -> Result<Vec<EnvVar>> {
        self.record("list_envs");
        Ok(self.envs(app_uuid))
    }

    async fn create_env(&self, app_uuid: &str, env: &EnvVar) -> Result<()> {
        self.record("create_env");
        self.check(FailPoint::Env, "create env var")?;
        let mut state = self.state.lock().unwrap();
        let envs = state.envs.entry(app_uuid.to_string()).or_default();
        if envs.contains_key(&env.key) {
            return Err(DeployError::RemoteApi {
                operation: "create env var".to_string(),
                status: 409,
                body: "{\"message\":\"Environment variable already exists. Use PATCH request to update it.\"}"
                    .to_string(),
            });
        }
        envs.insert(env.key.clone(), env.clone());
        Ok(())
    }

    async fn update_env(&self, app_uuid: &str, env: &EnvVar) -> Result<()> {
        self.record("update_env");
        self.check(FailPoint::Env, "update env var")?;
        let mut state = self.state.lock().unwrap();
        let envs = state.envs.entry(app_uuid.to_string()).or_default();
        match envs.get_mut(&env.key) {
            Some(existing) => {
                *existing = env.clone();
                Ok(())
            }
            None => Err(not_found("env var", &env.key)),
        }
    }

    async fn deploy(&self, app_uuid: &str) -> Result<String> {
        self.record("deploy");
        self.check(FailPoint::Deploy, "trigger deployment")?;
        let mut state = self.state.lock().unwrap();
        if !state.applications.contains_key(app_uuid) {
            return Err(not_found("application", app_uuid));
        }
        let uuid = state.next_uuid("dep");
        state.deployments.push(uuid.clone());
        Ok(uuid)
    }

    async fn application_status(&self, _app_uuid: &str) -> Result<String> {
        self.record("application_status");
        self.check(FailPoint::Status, "read application status")?;
        let mut state = self.state.lock().unwrap();
        let status = if state.statuses.len() > 1 {
            state.statuses.pop_front()
        } else {
            state.statuses.front().cloned()
        };
        Ok(status.unwrap_or_else(|| "running:healthy".to_string()))
    }

    async fn deployment_logs(&self, _deployment_uuid: &str) -> Result<String> {
        self.record("deployment_logs");
        self.check(FailPoint::Logs, "read deployment logs")?;
        Ok(self.logs.clone())
    }
}
