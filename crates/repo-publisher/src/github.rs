//! GitHub REST client
//!
//! Implements [`SourceHost`] against the GitHub v3 REST API using the Git
//! Data endpoints (blobs, trees, commits, refs) so a whole source tree lands
//! as one commit.

use std::fmt;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::PublishError;
use crate::source_host::{BranchHead, Identity, NewRepo, RepoInfo, SourceHost, TreeItem};
use crate::Result;

/// GitHub client configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API base URL, without trailing slash
    pub api_url: String,
    /// Personal access token
    #[serde(skip_serializing)]
    pub token: String,
    pub user_agent: String,
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl GitHubConfig {
    pub fn new(token: &str) -> Self {
        GitHubConfig {
            api_url: "https://api.github.com".to_string(),
            token: token.to_string(),
            user_agent: concat!("liberator/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Point the client at another API host (GitHub Enterprise, mock server).
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }
}

/// GitHub REST API client
pub struct GitHubClient {
    config: GitHubConfig,
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Deserialize)]
struct OwnerResponse {
    login: String,
}

#[derive(Deserialize)]
struct RepoResponse {
    name: String,
    html_url: String,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    private: bool,
    owner: OwnerResponse,
}

impl From<RepoResponse> for RepoInfo {
    fn from(r: RepoResponse) -> Self {
        RepoInfo {
            owner: r.owner.login,
            name: r.name,
            html_url: r.html_url,
            default_branch: r.default_branch,
            private: r.private,
        }
    }
}

#[derive(Deserialize)]
struct ShaObject {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: ShaObject,
}

#[derive(Deserialize)]
struct CommitResponse {
    tree: ShaObject,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(GitHubClient {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, self.url(path))
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn expect_success(response: Response, operation: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PublishError::RemoteApi {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn sha_of(response: Response, operation: &str) -> Result<String> {
        let response = Self::expect_success(response, operation).await?;
        Ok(response.json::<ShaObject>().await?.sha)
    }
}

fn parse_scopes(response: &Response) -> Option<Vec<String>> {
    let header = response.headers().get("x-oauth-scopes")?.to_str().ok()?;
    Some(
        header
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn authenticated_user(&self) -> Result<Identity> {
        let response = self.request(reqwest::Method::GET, "/user").send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::InvalidToken {
                status: status.as_u16(),
                body,
            });
        }
        let scopes = parse_scopes(&response);
        let response = Self::expect_success(response, "identity lookup").await?;
        let user: UserResponse = response.json().await?;
        debug!(login = %user.login, scoped = scopes.is_some(), "Resolved GitHub identity");
        Ok(Identity {
            login: user.login,
            scopes,
        })
    }

    async fn get_repo(&self, owner: &str, name: &str) -> Result<Option<RepoInfo>> {
        let response = self
            .request(reqwest::Method::GET, &format!("/repos/{}/{}", owner, name))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response, "repository lookup").await?;
        let repo: RepoResponse = response.json().await?;
        Ok(Some(repo.into()))
    }

    async fn create_repo(&self, repo: &NewRepo) -> Result<RepoInfo> {
        let path = if repo.organization {
            format!("/orgs/{}/repos", repo.owner)
        } else {
            "/user/repos".to_string()
        };
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&json!({
                "name": repo.name,
                "private": repo.private,
                "auto_init": false,
                "description": "Self-hosted export",
            }))
            .send()
            .await?;
        let response = Self::expect_success(response, "repository creation").await?;
        let created: RepoResponse = response.json().await?;
        Ok(created.into())
    }

    async fn branch_head(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<BranchHead>> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/{}/git/ref/heads/{}", owner, repo, branch),
            )
            .send()
            .await?;
        // 409 is returned for a repository without any commits.
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::CONFLICT
        ) {
            return Ok(None);
        }
        let response = Self::expect_success(response, "branch lookup").await?;
        let reference: RefResponse = response.json().await?;
        let commit_sha = reference.object.sha;

        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/{}/git/commits/{}", owner, repo, commit_sha),
            )
            .send()
            .await?;
        let response = Self::expect_success(response, "commit lookup").await?;
        let commit: CommitResponse = response.json().await?;
        Ok(Some(BranchHead {
            commit_sha,
            tree_sha: commit.tree.sha,
        }))
    }

    async fn bootstrap_readme(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        content: &str,
    ) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/repos/{}/{}/contents/README.md", owner, repo),
            )
            .json(&json!({
                "message": "Initial commit",
                "content": BASE64.encode(content.as_bytes()),
                "branch": branch,
            }))
            .send()
            .await?;
        Self::expect_success(response, "repository bootstrap").await?;
        Ok(())
    }

    async fn create_blob(&self, owner: &str, repo: &str, content: &str) -> Result<String> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/git/blobs", owner, repo),
            )
            .json(&json!({
                "content": BASE64.encode(content.as_bytes()),
                "encoding": "base64",
            }))
            .send()
            .await?;
        Self::sha_of(response, "blob creation").await
    }

    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: Option<&str>,
        items: &[TreeItem],
    ) -> Result<String> {
        let mut body = json!({ "tree": items });
        if let Some(base) = base_tree {
            body["base_tree"] = json!(base);
        }
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/git/trees", owner, repo),
            )
            .json(&body)
            .send()
            .await?;
        Self::sha_of(response, "tree creation").await
    }

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/git/commits", owner, repo),
            )
            .json(&json!({
                "message": message,
                "tree": tree_sha,
                "parents": parents,
            }))
            .send()
            .await?;
        Self::sha_of(response, "commit creation").await
    }

    async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("/repos/{}/{}/git/refs/heads/{}", owner, repo, branch),
            )
            .json(&json!({ "sha": sha, "force": force }))
            .send()
            .await?;
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            // Ref missing (first publish to a new branch): create it instead.
            let response = self
                .request(
                    reqwest::Method::POST,
                    &format!("/repos/{}/{}/git/refs", owner, repo),
                )
                .json(&json!({ "ref": format!("refs/heads/{}", branch), "sha": sha }))
                .send()
                .await?;
            Self::expect_success(response, "ref creation").await?;
            return Ok(());
        }
        Self::expect_success(response, "ref update").await?;
        Ok(())
    }
}
