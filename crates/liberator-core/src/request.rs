//! Inbound request and outbound response
//!
//! JSON field names are camelCase to match the calling application.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use proprietary_scrub::SourceFile;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, LiberationError};

/// One sub-pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Github,
    Supabase,
    Coolify,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Github => "github",
            Phase::Supabase => "supabase",
            Phase::Coolify => "coolify",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested phase set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseSelection {
    Github,
    Supabase,
    Coolify,
    All,
}

impl PhaseSelection {
    /// Phases in execution order.
    pub fn phases(self) -> Vec<Phase> {
        match self {
            PhaseSelection::Github => vec![Phase::Github],
            PhaseSelection::Supabase => vec![Phase::Supabase],
            PhaseSelection::Coolify => vec![Phase::Coolify],
            PhaseSelection::All => vec![Phase::Github, Phase::Supabase, Phase::Coolify],
        }
    }
}

impl std::str::FromStr for PhaseSelection {
    type Err = LiberationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(PhaseSelection::Github),
            "supabase" => Ok(PhaseSelection::Supabase),
            "coolify" => Ok(PhaseSelection::Coolify),
            "all" => Ok(PhaseSelection::All),
            other => Err(LiberationError::Validation(format!(
                "unknown phase '{}'; expected github, supabase, coolify or all",
                other
            ))),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubCredentials {
    #[serde(skip_serializing)]
    pub token: String,
    /// Organization or user owning the repository; defaults to the token's login
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    /// Overrides the configured API URL
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupabaseCredentials {
    pub project_ref: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    /// `https://<ref>.supabase.co`; enables the console fallback together with the service key
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub service_role_key: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoolifyCredentials {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub token: String,
    #[serde(default)]
    pub server_uuid: Option<String>,
    #[serde(default)]
    pub server_ip: Option<String>,
    #[serde(default)]
    pub private_key_uuid: Option<String>,
    /// GitHub App registered on the platform, used for private repositories
    #[serde(default)]
    pub github_app_uuid: Option<String>,
    /// Repository visibility when the GitHub phase does not run in the same request
    #[serde(default)]
    pub private_repository: bool,
    /// Application environment variables
    #[serde(default, skip_serializing)]
    pub env_vars: BTreeMap<String, String>,
}

impl fmt::Debug for GitHubCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubCredentials")
            .field("token", &"<redacted>")
            .field("owner", &self.owner)
            .field("branch", &self.branch)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl fmt::Debug for SupabaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseCredentials")
            .field("project_ref", &self.project_ref)
            .field("access_token", &"<redacted>")
            .field("project_url", &self.project_url)
            .field("service_role_key", &self.service_role_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Debug for CoolifyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoolifyCredentials")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("server_uuid", &self.server_uuid)
            .field("server_ip", &self.server_ip)
            .field("private_key_uuid", &self.private_key_uuid)
            .field("github_app_uuid", &self.github_app_uuid)
            .field("private_repository", &self.private_repository)
            .field("env_vars", &self.env_vars.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Per-phase credentials; only the requested phases need theirs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCredentials {
    #[serde(default)]
    pub github: Option<GitHubCredentials>,
    #[serde(default)]
    pub supabase: Option<SupabaseCredentials>,
    #[serde(default)]
    pub coolify: Option<CoolifyCredentials>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiberationRequest {
    pub phase: PhaseSelection,
    #[serde(default)]
    pub files: Vec<SourceFile>,
    pub project_name: String,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub target_credentials: TargetCredentials,
    #[serde(default, skip_serializing)]
    pub secrets_to_sync: Option<BTreeMap<String, String>>,
    /// Deployment record to report status transitions to
    #[serde(default)]
    pub deployment_id: Option<String>,
}

/// Lowercase, ASCII alphanumerics separated by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

impl LiberationRequest {
    /// Target repository name: the explicit name, else a slug of the project name.
    pub fn repo_name(&self) -> String {
        self.repo_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| slugify(&self.project_name))
    }

    /// Repository URL used when the publish phase did not run in this request.
    pub fn fallback_repo_url(&self) -> String {
        let owner = self
            .target_credentials
            .github
            .as_ref()
            .and_then(|g| g.owner.clone())
            .filter(|o| !o.trim().is_empty())
            .unwrap_or_else(|| slugify(&self.project_name));
        format!("https://github.com/{}/{}.git", owner, self.repo_name())
    }

    /// Checks that need no network: names, files and the credentials of every
    /// requested phase.
    pub fn validate(&self) -> Result<(), LiberationError> {
        if slugify(&self.project_name).is_empty() {
            return Err(LiberationError::Validation(
                "projectName must contain at least one letter or digit".to_string(),
            ));
        }
        let phases = self.phase.phases();
        let needs_files = phases.contains(&Phase::Github) || phases.contains(&Phase::Supabase);
        if needs_files && self.files.is_empty() {
            return Err(LiberationError::Validation("files is empty".to_string()));
        }
        if let Some(file) = self.files.iter().find(|f| f.path.trim().is_empty()) {
            return Err(LiberationError::Validation(format!(
                "file with empty path ({} bytes)",
                file.content.len()
            )));
        }
        let creds = &self.target_credentials;
        for phase in phases {
            let present = match phase {
                Phase::Github => creds.github.as_ref().is_some_and(|g| !g.token.is_empty()),
                Phase::Supabase => creds
                    .supabase
                    .as_ref()
                    .is_some_and(|s| !s.project_ref.is_empty() && !s.access_token.is_empty()),
                Phase::Coolify => creds
                    .coolify
                    .as_ref()
                    .is_some_and(|c| !c.base_url.is_empty() && !c.token.is_empty()),
            };
            if !present {
                return Err(LiberationError::Validation(format!(
                    "missing {} credentials",
                    phase
                )));
            }
        }
        Ok(())
    }
}

/// How a phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Succeeded,
    /// Succeeded with some failures (lenient migration threshold)
    Partial,
    /// Deployment still building when polling stopped
    Indeterminate,
    Failed,
}

/// Outcome of one phase. Phase boundaries always produce one of these,
/// never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseResult {
    pub phase: Phase,
    pub success: bool,
    pub status: PhaseStatus,
    pub message: String,
    pub http_status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Raw error text for support diagnosis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PhaseResult {
    pub fn succeeded(
        phase: Phase,
        status: PhaseStatus,
        message: impl Into<String>,
        http_status: u16,
        data: Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        let error_kind = (status == PhaseStatus::Indeterminate).then_some(ErrorKind::Indeterminate);
        PhaseResult {
            phase,
            success: true,
            status,
            message: message.into(),
            http_status,
            data: Some(data),
            error: None,
            error_kind,
            started_at,
            duration_ms: elapsed_ms(started_at),
        }
    }

    pub fn failed(
        phase: Phase,
        message: impl Into<String>,
        err: &LiberationError,
        data: Option<Value>,
        started_at: DateTime<Utc>,
    ) -> Self {
        PhaseResult {
            phase,
            success: false,
            status: PhaseStatus::Failed,
            message: message.into(),
            http_status: err.http_status(),
            data,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            started_at,
            duration_ms: elapsed_ms(started_at),
        }
    }

    /// A phase that ran to completion but whose report says it failed.
    pub fn unsuccessful(
        phase: Phase,
        message: impl Into<String>,
        http_status: u16,
        data: Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        let message = message.into();
        PhaseResult {
            phase,
            success: false,
            status: PhaseStatus::Failed,
            error: Some(message.clone()),
            message,
            http_status,
            data: Some(data),
            error_kind: Some(ErrorKind::RemoteApi),
            started_at,
            duration_ms: elapsed_ms(started_at),
        }
    }
}

fn elapsed_ms(started_at: DateTime<Utc>) -> u64 {
    (Utc::now() - started_at).num_milliseconds().max(0) as u64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiberationResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<PhaseResult>,
    pub pipeline_id: String,
}

impl LiberationResponse {
    /// Response for a request rejected before any phase ran.
    pub fn rejected(pipeline_id: &str, err: &LiberationError) -> Self {
        LiberationResponse {
            success: false,
            message: err.to_string(),
            results: Vec::new(),
            pipeline_id: pipeline_id.to_string(),
        }
    }

    /// 200 when every phase succeeded, 207 when some did, else the first
    /// failed phase's status (400 for a rejected request).
    pub fn http_status(&self) -> u16 {
        let succeeded = self.results.iter().filter(|r| r.success).count();
        if self.results.is_empty() {
            return 400;
        }
        if succeeded == self.results.len() {
            return 200;
        }
        if succeeded > 0 {
            return 207;
        }
        self.results
            .iter()
            .find(|r| !r.success)
            .map(|r| r.http_status)
            .unwrap_or(500)
    }

    pub fn result(&self, phase: Phase) -> Option<&PhaseResult> {
        self.results.iter().find(|r| r.phase == phase)
    }
}
