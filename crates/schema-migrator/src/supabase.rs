//! Supabase management API client
//!
//! Statements go to the management API's SQL endpoint. Projects where that
//! endpoint is unavailable (404/405) fall back to the project's own
//! `pg/query` console endpoint, authenticated with the service role key.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::database::DatabaseApi;
use crate::error::MigrationError;
use crate::Result;

/// Supabase client configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Management API base URL
    pub api_url: String,
    /// Project reference (subdomain id)
    pub project_ref: String,
    /// Management API access token
    #[serde(skip_serializing)]
    pub access_token: String,
    /// Project URL used by the console fallback
    pub project_url: Option<String>,
    #[serde(skip_serializing)]
    pub service_role_key: Option<String>,
    pub user_agent: String,
}

impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("api_url", &self.api_url)
            .field("project_ref", &self.project_ref)
            .field("access_token", &"<redacted>")
            .field("project_url", &self.project_url)
            .field("service_role_key", &self.service_role_key.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl SupabaseConfig {
    pub fn new(project_ref: &str, access_token: &str) -> Self {
        SupabaseConfig {
            api_url: "https://api.supabase.com".to_string(),
            project_ref: project_ref.to_string(),
            access_token: access_token.to_string(),
            project_url: None,
            service_role_key: None,
            user_agent: concat!("liberator/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    /// Enable the console fallback.
    pub fn with_service_role(mut self, project_url: &str, service_role_key: &str) -> Self {
        self.project_url = Some(project_url.trim_end_matches('/').to_string());
        self.service_role_key = Some(service_role_key.to_string());
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    fn fallback(&self) -> Option<(&str, &str)> {
        match (&self.project_url, &self.service_role_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }
}

/// Supabase management API client
pub struct SupabaseClient {
    config: SupabaseConfig,
    http_client: reqwest::Client,
    use_fallback: AtomicBool,
}

impl SupabaseClient {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(SupabaseClient {
            config,
            http_client,
            use_fallback: AtomicBool::new(false),
        })
    }

    async fn execute_primary(&self, sql: &str) -> Result<Response> {
        let url = format!(
            "{}/v1/projects/{}/database/query",
            self.config.api_url, self.config.project_ref
        );
        Ok(self
            .http_client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(&json!({ "query": sql }))
            .send()
            .await?)
    }

    async fn execute_fallback(&self, project_url: &str, key: &str, sql: &str) -> Result<Response> {
        Ok(self
            .http_client
            .post(format!("{}/pg/query", project_url))
            .header("apikey", key)
            .bearer_auth(key)
            .json(&json!({ "query": sql }))
            .send()
            .await?)
    }
}

/// Map a non-2xx query response onto a `MigrationError`.
async fn query_failure(response: Response) -> MigrationError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return MigrationError::Unauthorized {
            status: status.as_u16(),
            body,
        };
    }
    let (message, code) = parse_error_body(&body);
    MigrationError::Query {
        status: status.as_u16(),
        message,
        code,
    }
}

/// Extract the message and SQLSTATE from an error body. Bodies are either
/// JSON (`{"message": "...", "code": "..."}`) or plain text.
pub fn parse_error_body(body: &str) -> (String, Option<String>) {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code").and_then(Value::as_str).map(str::to_string))
        .filter(|c| looks_like_sqlstate(c))
        .or_else(|| {
            message
                .split(':')
                .map(str::trim)
                .find(|part| looks_like_sqlstate(part))
                .map(str::to_string)
        });
    (message, code)
}

fn looks_like_sqlstate(s: &str) -> bool {
    s.len() == 5
        && s.chars().take(2).all(|c| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
}

#[async_trait]
impl DatabaseApi for SupabaseClient {
    async fn execute(&self, sql: &str) -> Result<()> {
        if self.use_fallback.load(Ordering::Relaxed) {
            if let Some((url, key)) = self.config.fallback() {
                let response = self.execute_fallback(url, key, sql).await?;
                if response.status().is_success() {
                    return Ok(());
                }
                return Err(query_failure(response).await);
            }
        }

        let response = self.execute_primary(sql).await?;
        if response.status().is_success() {
            return Ok(());
        }
        let unavailable = matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED
        );
        match (unavailable, self.config.fallback()) {
            (true, Some((url, key))) => {
                info!(status = %response.status(), "SQL endpoint unavailable, using console fallback");
                self.use_fallback.store(true, Ordering::Relaxed);
                let response = self.execute_fallback(url, key, sql).await?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(query_failure(response).await)
                }
            }
            _ => Err(query_failure(response).await),
        }
    }

    async fn upsert_secret(&self, name: &str, value: &str) -> Result<()> {
        let url = format!(
            "{}/v1/projects/{}/secrets",
            self.config.api_url, self.config.project_ref
        );
        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(&json!([{ "name": name, "value": value }]))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            debug!(secret = %name, "Secret stored");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MigrationError::Unauthorized {
                status: status.as_u16(),
                body,
            });
        }
        Err(MigrationError::RemoteApi {
            operation: "secret upsert".to_string(),
            status: status.as_u16(),
            body,
        })
    }
}
