//! Deployment state machine
//!
//! `ConnectivityCheck -> ResolveOrCreateProject -> ResolveOrCreateServer ->
//! CreateApplication (nixpacks, then Dockerfile) -> InjectEnvVars ->
//! TriggerDeploy -> PollBuildStatus -> ClassifyOutcome`.
//!
//! Every step reads and writes one [`DeployContext`]. When a step after
//! project creation fails and this run created the project, the project (and
//! any application created inside it) is deleted before the error is
//! returned. Pre-existing projects are never touched.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::DeployError;
use crate::platform::{
    AppSource, Application, DeployPlatform, EnvVar, NewApplication, NewServer, Project,
    DEFAULT_ENVIRONMENT,
};
use crate::status::{tail, BuildStatus, DeployOutcome, PollPolicy, LOG_TAIL_CHARS};
use crate::Result;

/// Port exposed by convention-built applications.
pub const DEFAULT_APP_PORT: &str = "3000";

/// Port exposed by the generated Dockerfile.
pub const DOCKERFILE_PORT: &str = "80";

/// Username GitHub accepts alongside a token in an HTTPS clone URL.
const TOKEN_USER: &str = "x-access-token";

/// Run-time knobs for one deployment.
#[derive(Clone, Serialize, Deserialize)]
pub struct DeployOptions {
    pub project_name: String,
    /// Application name; defaults to the project name
    pub application_name: String,
    pub git_repository: String,
    pub git_branch: String,
    /// The platform cannot clone the repository anonymously
    #[serde(default)]
    pub private_repository: bool,
    /// HTTPS clone token for a private repository
    #[serde(skip)]
    pub git_token: Option<String>,
    /// GitHub App registered on the platform with access to the repository
    #[serde(default)]
    pub github_app_uuid: Option<String>,
    pub environment_name: String,
    pub ports_exposes: String,
    /// Preferred server
    pub server_uuid: Option<String>,
    /// Registered as a new server when no reachable one exists
    pub server_ip: Option<String>,
    pub private_key_uuid: Option<String>,
    /// Injected as build-time variables
    #[serde(skip_serializing, default)]
    pub env_vars: BTreeMap<String, String>,
    pub poll: PollPolicy,
}

impl DeployOptions {
    pub fn new(project_name: &str, git_repository: &str) -> Self {
        DeployOptions {
            project_name: project_name.to_string(),
            application_name: project_name.to_string(),
            git_repository: git_repository.to_string(),
            git_branch: "main".to_string(),
            private_repository: false,
            git_token: None,
            github_app_uuid: None,
            environment_name: DEFAULT_ENVIRONMENT.to_string(),
            ports_exposes: DEFAULT_APP_PORT.to_string(),
            server_uuid: None,
            server_ip: None,
            private_key_uuid: None,
            env_vars: BTreeMap::new(),
            poll: PollPolicy::default(),
        }
    }

    pub fn with_application_name(mut self, name: &str) -> Self {
        self.application_name = name.to_string();
        self
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.git_branch = branch.to_string();
        self
    }

    /// The repository is private; `token`, when given, authenticates clones.
    pub fn with_private_repository(mut self, token: Option<&str>) -> Self {
        self.private_repository = true;
        self.git_token = token.map(str::to_string);
        self
    }

    /// Fetch a private repository through a platform GitHub App.
    pub fn with_github_app(mut self, app_uuid: &str) -> Self {
        self.github_app_uuid = Some(app_uuid.to_string());
        self
    }

    pub fn with_server(mut self, server_uuid: &str) -> Self {
        self.server_uuid = Some(server_uuid.to_string());
        self
    }

    pub fn with_new_server(mut self, ip: &str, private_key_uuid: &str) -> Self {
        self.server_ip = Some(ip.to_string());
        self.private_key_uuid = Some(private_key_uuid.to_string());
        self
    }

    pub fn with_env_var(mut self, key: &str, value: &str) -> Self {
        self.env_vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_env_vars(mut self, vars: BTreeMap<String, String>) -> Self {
        self.env_vars.extend(vars);
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.project_name.trim().is_empty() {
            return Err(DeployError::Validation("project name is empty".to_string()));
        }
        if self.application_name.trim().is_empty() {
            return Err(DeployError::Validation(
                "application name is empty".to_string(),
            ));
        }
        if self.git_repository.trim().is_empty() {
            return Err(DeployError::Validation(
                "git repository URL is empty".to_string(),
            ));
        }
        if self.private_repository && self.git_token.is_none() && self.github_app_uuid.is_none() {
            return Err(DeployError::Validation(
                "private repository needs a clone token or a GitHub App".to_string(),
            ));
        }
        if self.poll.max_attempts == 0 {
            return Err(DeployError::Validation(
                "poll budget must allow at least one attempt".to_string(),
            ));
        }
        if let Some(key) = self.env_vars.keys().find(|k| k.trim().is_empty()) {
            return Err(DeployError::Validation(format!(
                "invalid environment variable name '{}'",
                key
            )));
        }
        Ok(())
    }
}

impl DeployOptions {
    /// URL the build clones from. For a private repository with a token the
    /// token is embedded as HTTPS credentials.
    pub fn clone_url(&self) -> String {
        match (&self.git_token, self.git_repository.strip_prefix("https://")) {
            (Some(token), Some(rest)) if self.private_repository => {
                format!("https://{}:{}@{}", TOKEN_USER, token, rest)
            }
            _ => self.git_repository.clone(),
        }
    }

    /// First source tried: the GitHub App for private repositories that
    /// have one, otherwise a convention build of [`Self::clone_url`].
    pub fn primary_source(&self) -> AppSource {
        match &self.github_app_uuid {
            Some(app) if self.private_repository => AppSource::GitHubApp {
                github_app_uuid: app.clone(),
                git_repository: self.git_repository.clone(),
                git_branch: self.git_branch.clone(),
            },
            _ => AppSource::Nixpacks {
                git_repository: self.clone_url(),
                git_branch: self.git_branch.clone(),
            },
        }
    }

    /// The Dockerfile fallback clones inside the build, so a private
    /// repository needs a token for it.
    fn dockerfile_fallback_possible(&self) -> bool {
        !self.private_repository || self.git_token.is_some()
    }
}

impl fmt::Debug for DeployOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployOptions")
            .field("project_name", &self.project_name)
            .field("application_name", &self.application_name)
            .field("git_repository", &self.git_repository)
            .field("git_branch", &self.git_branch)
            .field("private_repository", &self.private_repository)
            .field("git_token", &self.git_token.as_ref().map(|_| "<redacted>"))
            .field("github_app_uuid", &self.github_app_uuid)
            .field("environment_name", &self.environment_name)
            .field("ports_exposes", &self.ports_exposes)
            .field("server_uuid", &self.server_uuid)
            .field("server_ip", &self.server_ip)
            .field("private_key_uuid", &self.private_key_uuid)
            .field("env_vars", &self.env_vars.keys().collect::<Vec<_>>())
            .field("poll", &self.poll)
            .finish()
    }
}

/// Build pack an application was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPack {
    Nixpacks,
    Dockerfile,
}

/// State threaded through the steps of one run.
#[derive(Debug, Default)]
pub struct DeployContext {
    pub project: Option<Project>,
    pub project_created: bool,
    pub server_uuid: Option<String>,
    pub application: Option<Application>,
    pub application_created: bool,
    pub build_pack: Option<BuildPack>,
    pub env_vars_injected: usize,
    pub deployment_uuid: Option<String>,
    pub raw_status: Option<String>,
    pub poll_attempts: u32,
}

/// Successful (deployed or still building) deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub status: DeployOutcome,
    pub raw_status: String,
    pub project_uuid: String,
    pub project_created: bool,
    pub server_uuid: String,
    pub application_uuid: String,
    pub application_created: bool,
    /// `None` for a reused application
    pub build_pack: Option<BuildPack>,
    pub deployment_uuid: String,
    pub app_url: Option<String>,
    pub env_vars_injected: usize,
    pub poll_attempts: u32,
}

impl DeployReport {
    pub fn http_status(&self) -> u16 {
        match self.status {
            DeployOutcome::Building => 202,
            _ if self.application_created => 201,
            _ => 200,
        }
    }
}

/// Dockerfile used when the convention-based build is rejected: clone the
/// repository, build the Node app, serve `dist/` from nginx.
pub fn node_dockerfile(git_repository: &str, git_branch: &str) -> String {
    format!(
        "FROM node:20-alpine AS build\n\
         RUN apk add --no-cache git\n\
         WORKDIR /app\n\
         RUN git clone --depth 1 --branch {branch} {repo} .\n\
         RUN npm install\n\
         RUN npm run build\n\
         \n\
         FROM nginx:alpine\n\
         COPY --from=build /app/dist /usr/share/nginx/html\n\
         EXPOSE {port}\n\
         CMD [\"nginx\", \"-g\", \"daemon off;\"]\n",
        branch = git_branch,
        repo = git_repository,
        port = DOCKERFILE_PORT,
    )
}

fn is_conflict(err: &DeployError) -> bool {
    match err {
        DeployError::RemoteApi { status, body, .. } => {
            *status == 409 || body.to_ascii_lowercase().contains("already exists")
        }
        _ => false,
    }
}

/// Drives one deployment against a [`DeployPlatform`].
pub struct Deployer {
    platform: Arc<dyn DeployPlatform>,
}

impl Deployer {
    pub fn new(platform: Arc<dyn DeployPlatform>) -> Self {
        Deployer { platform }
    }

    pub fn platform(&self) -> Arc<dyn DeployPlatform> {
        self.platform.clone()
    }

    /// Run every step. Indeterminate builds are returned as `Ok` with
    /// [`DeployOutcome::Building`]; failed builds are errors.
    pub async fn deploy(&self, options: &DeployOptions) -> Result<DeployReport> {
        options.validate()?;
        self.check_connectivity().await?;

        let mut ctx = DeployContext::default();
        match self.run_steps(options, &mut ctx).await {
            Ok(report) => Ok(report),
            Err(err) => Err(self.rollback(&ctx, err).await),
        }
    }

    async fn check_connectivity(&self) -> Result<()> {
        let version = self.platform.version().await?;
        debug!(version = %version, "Deployment platform reachable");
        Ok(())
    }

    async fn run_steps(
        &self,
        options: &DeployOptions,
        ctx: &mut DeployContext,
    ) -> Result<DeployReport> {
        self.resolve_project(options, ctx).await?;
        self.resolve_server(options, ctx).await?;
        self.resolve_application(options, ctx).await?;
        self.inject_env_vars(options, ctx).await?;
        self.trigger_deploy(ctx).await?;
        let status = self.poll_build(options.poll, ctx).await;
        self.classify(status, ctx).await
    }

    async fn resolve_project(&self, options: &DeployOptions, ctx: &mut DeployContext) -> Result<()> {
        let existing = self
            .platform
            .list_projects()
            .await?
            .into_iter()
            .find(|p| p.name == options.project_name);

        let project = match existing {
            Some(project) => {
                info!(project = %project.name, uuid = %project.uuid, "Reusing existing project");
                project
            }
            None => {
                let description = format!("Self-hosted deployment of {}", options.project_name);
                let project = self
                    .platform
                    .create_project(&options.project_name, &description)
                    .await?;
                info!(project = %project.name, uuid = %project.uuid, "Created project");
                ctx.project_created = true;
                project
            }
        };
        ctx.project = Some(project);
        Ok(())
    }

    async fn resolve_server(&self, options: &DeployOptions, ctx: &mut DeployContext) -> Result<()> {
        let servers = self.platform.list_servers().await?;

        if let Some(wanted) = &options.server_uuid {
            let server = servers
                .iter()
                .find(|s| &s.uuid == wanted)
                .ok_or_else(|| DeployError::NotFound(format!("server {}", wanted)))?;
            ctx.server_uuid = Some(server.uuid.clone());
            return Ok(());
        }

        if let Some(server) = servers.iter().find(|s| s.reachable) {
            debug!(server = %server.name, "Using first reachable server");
            ctx.server_uuid = Some(server.uuid.clone());
            return Ok(());
        }

        match (&options.server_ip, &options.private_key_uuid) {
            (Some(ip), Some(key)) => {
                let server = self
                    .platform
                    .create_server(&NewServer {
                        name: format!("{}-server", options.project_name),
                        ip: ip.clone(),
                        private_key_uuid: key.clone(),
                    })
                    .await?;
                info!(server = %server.uuid, ip = %ip, "Registered server");
                ctx.server_uuid = Some(server.uuid);
                Ok(())
            }
            _ => Err(DeployError::NotFound(
                "no reachable server; supply a server IP and private key to register one"
                    .to_string(),
            )),
        }
    }

    async fn resolve_application(
        &self,
        options: &DeployOptions,
        ctx: &mut DeployContext,
    ) -> Result<()> {
        let (project_uuid, server_uuid) = match (&ctx.project, &ctx.server_uuid) {
            (Some(project), Some(server)) => (project.uuid.clone(), server.clone()),
            _ => return Err(DeployError::NotFound("project or server".to_string())),
        };

        let existing = self
            .platform
            .list_applications()
            .await?
            .into_iter()
            .find(|a| {
                a.name == options.application_name
                    && a.project_uuid.as_deref() == Some(project_uuid.as_str())
            });
        if let Some(app) = existing {
            info!(application = %app.uuid, "Reusing existing application");
            ctx.application = Some(app);
            return Ok(());
        }

        let mut request = NewApplication {
            project_uuid,
            server_uuid,
            environment_name: options.environment_name.clone(),
            name: options.application_name.clone(),
            ports_exposes: options.ports_exposes.clone(),
            source: options.primary_source(),
        };

        let (app, pack) = match self.platform.create_application(&request).await {
            Ok(app) => (app, BuildPack::Nixpacks),
            Err(err) if !options.dockerfile_fallback_possible() => return Err(err),
            Err(err) => {
                warn!(error = %err, "Nixpacks application rejected, falling back to Dockerfile");
                request.ports_exposes = DOCKERFILE_PORT.to_string();
                request.source = AppSource::Dockerfile {
                    dockerfile: node_dockerfile(&options.clone_url(), &options.git_branch),
                };
                let app = self.platform.create_application(&request).await?;
                (app, BuildPack::Dockerfile)
            }
        };
        info!(application = %app.uuid, build_pack = ?pack, "Created application");
        ctx.application = Some(app);
        ctx.application_created = true;
        ctx.build_pack = Some(pack);
        Ok(())
    }

    async fn inject_env_vars(&self, options: &DeployOptions, ctx: &mut DeployContext) -> Result<()> {
        let app_uuid = application_uuid(ctx)?;
        for (key, value) in &options.env_vars {
            let env = EnvVar::build_time(key, value);
            match self.platform.create_env(&app_uuid, &env).await {
                Ok(()) => {}
                Err(err) if is_conflict(&err) => {
                    debug!(key = %key, "Env var exists, updating");
                    self.platform.update_env(&app_uuid, &env).await?;
                }
                Err(err) => return Err(err),
            }
            ctx.env_vars_injected += 1;
        }
        debug!(count = ctx.env_vars_injected, "Injected env vars");
        Ok(())
    }

    async fn trigger_deploy(&self, ctx: &mut DeployContext) -> Result<()> {
        let app_uuid = application_uuid(ctx)?;
        let deployment = self.platform.deploy(&app_uuid).await?;
        info!(application = %app_uuid, deployment = %deployment, "Deployment queued");
        ctx.deployment_uuid = Some(deployment);
        Ok(())
    }

    /// Read the status until it is terminal or the budget runs out. Read
    /// errors count as attempts and do not end the loop.
    async fn poll_build(&self, policy: PollPolicy, ctx: &mut DeployContext) -> BuildStatus {
        let Some(app_uuid) = ctx.application.as_ref().map(|a| a.uuid.clone()) else {
            return BuildStatus::Building;
        };

        for attempt in 1..=policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
            ctx.poll_attempts = attempt;
            match self.platform.application_status(&app_uuid).await {
                Ok(raw) => {
                    let status = BuildStatus::classify(&raw);
                    debug!(attempt, raw = %raw, ?status, "Polled build status");
                    ctx.raw_status = Some(raw);
                    if status.is_terminal() {
                        return status;
                    }
                }
                Err(err) => warn!(attempt, error = %err, "Status read failed"),
            }
        }
        info!(attempts = policy.max_attempts, "Poll budget exhausted while building");
        BuildStatus::Building
    }

    async fn classify(&self, status: BuildStatus, ctx: &mut DeployContext) -> Result<DeployReport> {
        let raw_status = ctx.raw_status.clone().unwrap_or_default();
        if status == BuildStatus::Failed {
            let logs = self.fetch_log_tail(ctx).await;
            return Err(DeployError::BuildFailed {
                status: raw_status,
                logs,
            });
        }

        let (project, app) = match (&ctx.project, &ctx.application) {
            (Some(project), Some(app)) => (project, app),
            _ => return Err(DeployError::NotFound("project or application".to_string())),
        };
        Ok(DeployReport {
            status: status.into(),
            raw_status,
            project_uuid: project.uuid.clone(),
            project_created: ctx.project_created,
            server_uuid: ctx.server_uuid.clone().unwrap_or_default(),
            application_uuid: app.uuid.clone(),
            application_created: ctx.application_created,
            build_pack: ctx.build_pack,
            deployment_uuid: ctx.deployment_uuid.clone().unwrap_or_default(),
            app_url: app.fqdn.clone(),
            env_vars_injected: ctx.env_vars_injected,
            poll_attempts: ctx.poll_attempts,
        })
    }

    async fn fetch_log_tail(&self, ctx: &DeployContext) -> Option<String> {
        let deployment = ctx.deployment_uuid.as_deref()?;
        match self.platform.deployment_logs(deployment).await {
            Ok(logs) => Some(tail(&logs, LOG_TAIL_CHARS)),
            Err(err) => {
                warn!(error = %err, "Could not fetch build logs");
                None
            }
        }
    }

    /// Delete what this run created, then return the error to report.
    async fn rollback(&self, ctx: &DeployContext, err: DeployError) -> DeployError {
        let project = match (&ctx.project, ctx.project_created) {
            (Some(project), true) => project,
            _ => return err,
        };

        warn!(project = %project.uuid, error = %err, "Rolling back project created in this run");
        if ctx.application_created {
            if let Some(app) = &ctx.application {
                if let Err(e) = self.platform.delete_application(&app.uuid).await {
                    warn!(application = %app.uuid, error = %e, "Could not delete application");
                }
            }
        }
        let cleanup_error = match self.platform.delete_project(&project.uuid).await {
            Ok(()) => None,
            Err(e) => {
                warn!(project = %project.uuid, error = %e, "Rollback left the project behind");
                Some(e.to_string())
            }
        };
        DeployError::RolledBack {
            project_uuid: project.uuid.clone(),
            cleanup_error,
            source: Box::new(err),
        }
    }
}

fn application_uuid(ctx: &DeployContext) -> Result<String> {
    ctx.application
        .as_ref()
        .map(|a| a.uuid.clone())
        .ok_or_else(|| DeployError::NotFound("application".to_string()))
}
