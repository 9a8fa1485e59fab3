//! Liberation orchestrator
//!
//! Runs the requested phases strictly in order: GitHub, then Supabase, then
//! Coolify. A failed GitHub or Supabase phase aborts the rest; a failed
//! Coolify phase leaves the earlier phases alone since each is safe to
//! re-run. Every phase ends in a [`PhaseResult`]; nothing escapes as an
//! error, so the caller always gets the partial result list.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use deploy_driver::{
    sweep_build_secrets, DeployError, DeployOptions, DeployOutcome, DeployPlatform, Deployer,
};
use futures::FutureExt;
use proprietary_scrub::{CleaningReport, ProprietaryRules, Sanitizer, SourceFile};
use repo_publisher::{PublishOptions, Publisher};
use schema_migrator::{select_migrations, MigrationExecutor};
use serde_json::{json, Value};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::backend::{BackendProvider, HttpBackendProvider};
use crate::config::LiberatorConfig;
use crate::error::LiberationError;
use crate::metrics::METRICS;
use crate::obs::{
    emit_cleanup_scheduled, emit_phase_finished, emit_phase_started, emit_pipeline_finished,
    emit_pipeline_started, emit_rollback, PipelineSpan,
};
use crate::recorder::{DeploymentRecorder, DeploymentStatus, NoopRecorder};
use crate::request::{
    LiberationRequest, LiberationResponse, Phase, PhaseResult, PhaseStatus,
};
use crate::scheduler::{TaskScheduler, TokioScheduler};
use crate::Result;

/// Env var carrying the database URL into the deployed app.
pub const SUPABASE_URL_ENV: &str = "VITE_SUPABASE_URL";

/// Data produced by one phase and consumed by a later one.
#[derive(Debug, Default)]
struct PipelineContext {
    repo_url: Option<String>,
    branch: Option<String>,
    repo_private: Option<bool>,
}

/// Runs liberation requests.
pub struct Liberator {
    config: LiberatorConfig,
    rules: Arc<ProprietaryRules>,
    backends: Arc<dyn BackendProvider>,
    scheduler: Arc<dyn TaskScheduler>,
    recorder: Arc<dyn DeploymentRecorder>,
}

impl Liberator {
    /// Default catalog, Tokio scheduler, no deployment history.
    pub fn new(config: LiberatorConfig, backends: Arc<dyn BackendProvider>) -> Result<Self> {
        Ok(Liberator {
            config,
            rules: Arc::new(ProprietaryRules::default_catalog()?),
            backends,
            scheduler: Arc::new(TokioScheduler),
            recorder: Arc::new(NoopRecorder),
        })
    }

    /// Orchestrator talking to the real APIs.
    pub fn with_http_backends(config: LiberatorConfig) -> Result<Self> {
        let backends = Arc::new(HttpBackendProvider::new(config.clone()));
        Self::new(config, backends)
    }

    pub fn with_rules(mut self, rules: Arc<ProprietaryRules>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn DeploymentRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn config(&self) -> &LiberatorConfig {
        &self.config
    }

    /// Clean a file set with this orchestrator's catalog.
    pub fn clean(&self, files: &[SourceFile]) -> CleaningReport {
        let report = Sanitizer::from_shared(self.rules.clone()).clean_files(files);
        METRICS.add_files_cleaned(report.files_changed as u64);
        METRICS.add_files_removed(report.files_removed as u64);
        report
    }

    /// Run every requested phase and report each outcome.
    pub async fn liberate(&self, request: &LiberationRequest) -> LiberationResponse {
        let pipeline_id = Uuid::new_v4().to_string();
        let span = PipelineSpan::new(&pipeline_id, &request.project_name);
        self.run(request, &pipeline_id).instrument(span.span()).await
    }

    async fn run(&self, request: &LiberationRequest, pipeline_id: &str) -> LiberationResponse {
        let started = Instant::now();
        if let Err(err) = request.validate() {
            warn!(error = %err, "Rejected liberation request");
            return LiberationResponse::rejected(pipeline_id, &err);
        }

        let phases = request.phase.phases();
        let names: Vec<&str> = phases.iter().map(|p| p.as_str()).collect();
        emit_pipeline_started(pipeline_id, &names, request.files.len());
        self.record(request, DeploymentStatus::Liberating, None).await;

        let mut ctx = PipelineContext::default();
        let mut results: Vec<PhaseResult> = Vec::with_capacity(phases.len());
        for phase in phases {
            emit_phase_started(pipeline_id, phase.as_str());
            let result = match phase {
                Phase::Github => self.github_phase(request, &mut ctx).await,
                Phase::Supabase => self.supabase_phase(request).await,
                Phase::Coolify => {
                    self.record(request, DeploymentStatus::Deploying, None).await;
                    self.coolify_phase(request, &ctx, pipeline_id).await
                }
            };
            emit_phase_finished(
                pipeline_id,
                phase.as_str(),
                result.success,
                result.http_status,
                result.duration_ms,
            );
            self.record_phase(request, &result).await;

            let abort = !result.success && phase != Phase::Coolify;
            results.push(result);
            if abort {
                warn!(phase = %phase, "Phase failed, skipping remaining phases");
                break;
            }
        }

        let success = results.iter().all(|r| r.success);
        let message = summarize(&results);
        METRICS.flush();
        emit_pipeline_finished(
            pipeline_id,
            success,
            results.len(),
            started.elapsed().as_millis() as u64,
        );
        LiberationResponse {
            success,
            message,
            results,
            pipeline_id: pipeline_id.to_string(),
        }
    }

    async fn github_phase(
        &self,
        request: &LiberationRequest,
        ctx: &mut PipelineContext,
    ) -> PhaseResult {
        let started_at = Utc::now();
        let Some(creds) = request.target_credentials.github.as_ref() else {
            return missing_credentials(Phase::Github, started_at);
        };
        let host = match self.backends.source_host(creds) {
            Ok(host) => host,
            Err(err) => {
                return PhaseResult::failed(Phase::Github, "GitHub client unavailable", &err, None, started_at)
            }
        };

        let report = self.clean(&request.files);
        let mut options = PublishOptions::new(&request.repo_name())
            .with_inline_threshold(self.config.inline_threshold_bytes);
        if let Some(owner) = &creds.owner {
            options = options.with_owner(owner);
        }
        if let Some(branch) = &creds.branch {
            options = options.with_branch(branch);
        }

        match Publisher::new(host).publish(&report, &options).await {
            Ok(outcome) => {
                ctx.repo_url = Some(outcome.repo_url.clone());
                ctx.branch = Some(outcome.branch.clone());
                ctx.repo_private = Some(outcome.private);
                let message = format!(
                    "Published {} files ({} changes) to {}",
                    outcome.files_count, outcome.total_changes, outcome.repo_url
                );
                let status = outcome.http_status();
                PhaseResult::succeeded(
                    Phase::Github,
                    PhaseStatus::Succeeded,
                    message,
                    status,
                    to_data(&outcome),
                    started_at,
                )
            }
            Err(err) => {
                let data = json!({
                    "filesChanged": report.files_changed,
                    "filesRemoved": report.files_removed,
                    "totalChanges": report.total_changes,
                });
                PhaseResult::failed(
                    Phase::Github,
                    "GitHub publish failed",
                    &LiberationError::from(err),
                    Some(data),
                    started_at,
                )
            }
        }
    }

    async fn supabase_phase(&self, request: &LiberationRequest) -> PhaseResult {
        let started_at = Utc::now();
        let Some(creds) = request.target_credentials.supabase.as_ref() else {
            return missing_credentials(Phase::Supabase, started_at);
        };
        let executor = match self
            .backends
            .database(creds)
            .and_then(|db| MigrationExecutor::postgres(db).map_err(LiberationError::from))
        {
            Ok(executor) => executor,
            Err(err) => {
                return PhaseResult::failed(Phase::Supabase, "Database client unavailable", &err, None, started_at)
            }
        };

        let migrations = select_migrations(&request.files);
        let mut report = match executor.run(&migrations).await {
            Ok(report) => report,
            Err(err) => {
                return PhaseResult::failed(
                    Phase::Supabase,
                    "Migrations aborted",
                    &LiberationError::from(err),
                    None,
                    started_at,
                )
            }
        };
        METRICS.add_statements(
            report.statements_executed as u64,
            report.statements_ignored as u64,
        );

        if let Some(secrets) = request.secrets_to_sync.as_ref().filter(|s| !s.is_empty()) {
            let sync = executor.sync_secrets(secrets).await;
            report.secrets_synced = sync.synced;
            report.secrets_failed = sync.failed;
        }

        let status = report.http_status();
        if report.is_success() {
            let phase_status = if report.failed == 0 {
                PhaseStatus::Succeeded
            } else {
                PhaseStatus::Partial
            };
            let message = format!(
                "Executed {} of {} migrations ({} failed)",
                report.executed, report.total_migrations, report.failed
            );
            PhaseResult::succeeded(
                Phase::Supabase,
                phase_status,
                message,
                status,
                to_data(&report),
                started_at,
            )
        } else {
            let message = format!(
                "{} of {} migrations failed",
                report.failed, report.total_migrations
            );
            PhaseResult::unsuccessful(Phase::Supabase, message, status, to_data(&report), started_at)
        }
    }

    async fn coolify_phase(
        &self,
        request: &LiberationRequest,
        ctx: &PipelineContext,
        pipeline_id: &str,
    ) -> PhaseResult {
        let started_at = Utc::now();
        let Some(creds) = request.target_credentials.coolify.as_ref() else {
            return missing_credentials(Phase::Coolify, started_at);
        };
        let platform = match self.backends.deploy_platform(creds) {
            Ok(platform) => platform,
            Err(err) => {
                return PhaseResult::failed(Phase::Coolify, "Coolify client unavailable", &err, None, started_at)
            }
        };

        let repo_url = ctx
            .repo_url
            .clone()
            .unwrap_or_else(|| request.fallback_repo_url());
        let branch = ctx
            .branch
            .clone()
            .or_else(|| {
                request
                    .target_credentials
                    .github
                    .as_ref()
                    .and_then(|g| g.branch.clone())
            })
            .unwrap_or_else(|| self.config.default_branch.clone());

        let mut env_vars: BTreeMap<String, String> = creds.env_vars.clone();
        if let Some(url) = request
            .target_credentials
            .supabase
            .as_ref()
            .and_then(|s| s.project_url.clone())
        {
            env_vars.entry(SUPABASE_URL_ENV.to_string()).or_insert(url);
        }

        let mut options = DeployOptions::new(&request.project_name, &repo_url)
            .with_application_name(&request.repo_name())
            .with_branch(&branch)
            .with_env_vars(env_vars)
            .with_poll_policy(self.config.poll_policy());
        if let Some(server) = &creds.server_uuid {
            options = options.with_server(server);
        }
        if let (Some(ip), Some(key)) = (&creds.server_ip, &creds.private_key_uuid) {
            options = options.with_new_server(ip, key);
        }
        if ctx.repo_private.unwrap_or(creds.private_repository) {
            let token = request
                .target_credentials
                .github
                .as_ref()
                .map(|g| g.token.as_str());
            options = options.with_private_repository(token);
            if let Some(app) = &creds.github_app_uuid {
                options = options.with_github_app(app);
            }
        }

        match Deployer::new(platform.clone()).deploy(&options).await {
            Ok(report) => {
                let status = report.http_status();
                let (phase_status, message) = match report.status {
                    DeployOutcome::Deployed => {
                        self.schedule_sweep(platform, &report.application_uuid, pipeline_id);
                        let target = report
                            .app_url
                            .clone()
                            .unwrap_or_else(|| report.application_uuid.clone());
                        (PhaseStatus::Succeeded, format!("Deployed {}", target))
                    }
                    _ => (
                        PhaseStatus::Indeterminate,
                        format!(
                            "Still building after {} status checks; follow the deployment on the platform",
                            report.poll_attempts
                        ),
                    ),
                };
                PhaseResult::succeeded(
                    Phase::Coolify,
                    phase_status,
                    message,
                    status,
                    to_data(&report),
                    started_at,
                )
            }
            Err(err) => {
                if let DeployError::RolledBack {
                    project_uuid,
                    cleanup_error,
                    ..
                } = &err
                {
                    METRICS.inc_rollbacks();
                    emit_rollback(pipeline_id, project_uuid, cleanup_error.is_none());
                }
                let data = err.build_logs().map(|logs| json!({ "logs": logs }));
                PhaseResult::failed(
                    Phase::Coolify,
                    "Deployment failed",
                    &LiberationError::from(err),
                    data,
                    started_at,
                )
            }
        }
    }

    /// Hand the secret sweep to the scheduler; it runs after the configured
    /// delay and only logs its outcome.
    fn schedule_sweep(&self, platform: Arc<dyn DeployPlatform>, app_uuid: &str, pipeline_id: &str) {
        let rules = self.rules.clone();
        let app = app_uuid.to_string();
        let task = async move {
            match sweep_build_secrets(platform.as_ref(), &app, &rules).await {
                Ok(report) => info!(
                    application = %app,
                    demoted = report.demoted.len(),
                    failed = report.failed.len(),
                    "Post-deploy secret sweep complete"
                ),
                Err(err) => warn!(application = %app, error = %err, "Post-deploy secret sweep failed"),
            }
        }
        .in_current_span()
        .boxed();

        self.scheduler
            .schedule("secret-sweep", self.config.cleanup_delay, task);
        METRICS.inc_cleanups_scheduled();
        emit_cleanup_scheduled(pipeline_id, app_uuid, self.config.cleanup_delay.as_secs());
    }

    async fn record_phase(&self, request: &LiberationRequest, result: &PhaseResult) {
        let status = match (result.phase, result.success, result.status) {
            (_, false, _) => DeploymentStatus::Failed,
            (Phase::Github, true, _) => DeploymentStatus::Published,
            (Phase::Supabase, true, _) => DeploymentStatus::Migrated,
            (Phase::Coolify, true, PhaseStatus::Indeterminate) => DeploymentStatus::Building,
            (Phase::Coolify, true, _) => DeploymentStatus::Deployed,
        };
        let detail = if result.success {
            result.message.clone()
        } else {
            result.error.clone().unwrap_or_else(|| result.message.clone())
        };
        self.record(request, status, Some(&detail)).await;
    }

    async fn record(&self, request: &LiberationRequest, status: DeploymentStatus, detail: Option<&str>) {
        let Some(id) = request.deployment_id.as_deref() else {
            return;
        };
        if let Err(err) = self.recorder.record(id, status, detail).await {
            warn!(deployment_id = %id, status = status.as_str(), error = %err, "Could not record deployment status");
        }
    }
}

fn missing_credentials(phase: Phase, started_at: chrono::DateTime<Utc>) -> PhaseResult {
    let err = LiberationError::Validation(format!("missing {} credentials", phase));
    PhaseResult::failed(phase, err.to_string(), &err, None, started_at)
}

fn to_data<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn summarize(results: &[PhaseResult]) -> String {
    let completed: Vec<&str> = results
        .iter()
        .filter(|r| r.success)
        .map(|r| r.phase.as_str())
        .collect();
    match results.iter().find(|r| !r.success) {
        None => format!("Liberation completed: {}", completed.join(", ")),
        Some(failed) if completed.is_empty() => {
            format!("Liberation failed in {} phase: {}", failed.phase, failed.message)
        }
        Some(failed) => format!(
            "Liberation partially completed ({}); {} phase failed: {}",
            completed.join(", "),
            failed.phase,
            failed.message
        ),
    }
}
