//! Source host port
//!
//! `SourceHost` is the subset of a Git hosting API the publisher needs:
//! identity lookup, repository lookup/creation, and the low-level
//! blob/tree/commit/ref endpoints. `GitHubClient` implements it over HTTP and
//! `fakes::MemorySourceHost` implements it in memory for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Regular (non-executable) file mode.
pub const FILE_MODE: &str = "100644";

/// The authenticated account behind a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub login: String,
    /// OAuth scopes granted to a classic token. `None` when the host does not
    /// report scopes (fine-grained tokens).
    pub scopes: Option<Vec<String>>,
}

impl Identity {
    /// Whether the token is known to allow repository writes. Unreported
    /// scopes cannot be verified and are allowed through.
    pub fn can_write_repos(&self) -> bool {
        match &self.scopes {
            None => true,
            Some(scopes) => scopes.iter().any(|s| s == "repo" || s == "public_repo"),
        }
    }
}

/// A remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub owner: String,
    pub name: String,
    pub html_url: String,
    pub default_branch: Option<String>,
    pub private: bool,
}

/// Request to create a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepo {
    pub owner: String,
    pub name: String,
    pub private: bool,
    /// Create under an organization rather than the authenticated user.
    pub organization: bool,
}

/// Tip of a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchHead {
    pub commit_sha: String,
    pub tree_sha: String,
}

/// One entry of a tree-creation call. Exactly one of `content` and `sha` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeItem {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl TreeItem {
    pub fn inline(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: FILE_MODE.to_string(),
            kind: "blob".to_string(),
            content: Some(content.into()),
            sha: None,
        }
    }

    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: FILE_MODE.to_string(),
            kind: "blob".to_string(),
            content: None,
            sha: Some(sha.into()),
        }
    }

    pub fn is_blob_reference(&self) -> bool {
        self.sha.is_some()
    }
}

/// Git hosting operations used by the publisher.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Resolve the token's identity. 401/403 map to `PublishError::InvalidToken`.
    async fn authenticated_user(&self) -> Result<Identity>;

    /// Look a repository up by owner and name. `Ok(None)` on 404.
    async fn get_repo(&self, owner: &str, name: &str) -> Result<Option<RepoInfo>>;

    async fn create_repo(&self, repo: &NewRepo) -> Result<RepoInfo>;

    /// Current tip of `branch`. `Ok(None)` when the branch does not exist or
    /// the repository has no commits yet.
    async fn branch_head(&self, owner: &str, repo: &str, branch: &str)
        -> Result<Option<BranchHead>>;

    /// Write a single README on `branch` so an empty repository gets a first
    /// commit and a ref.
    async fn bootstrap_readme(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        content: &str,
    ) -> Result<()>;

    /// Upload a blob and return its SHA.
    async fn create_blob(&self, owner: &str, repo: &str, content: &str) -> Result<String>;

    /// Create a tree on top of `base_tree` and return its SHA.
    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: Option<&str>,
        items: &[TreeItem],
    ) -> Result<String>;

    /// Create a commit object and return its SHA.
    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String>;

    /// Point `branch` at `sha`.
    async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fine_grained_token_is_allowed() {
        let identity = Identity {
            login: "octo".to_string(),
            scopes: None,
        };
        assert!(identity.can_write_repos());
    }

    #[test]
    fn test_classic_token_needs_repo_scope() {
        let read_only = Identity {
            login: "octo".to_string(),
            scopes: Some(vec!["read:user".to_string(), "gist".to_string()]),
        };
        assert!(!read_only.can_write_repos());

        let writer = Identity {
            login: "octo".to_string(),
            scopes: Some(vec!["repo".to_string()]),
        };
        assert!(writer.can_write_repos());
    }

    #[test]
    fn test_tree_item_serialization_omits_unused_field() {
        let inline = serde_json::to_value(TreeItem::inline("a.ts", "x")).unwrap();
        assert_eq!(inline["type"], "blob");
        assert!(inline.get("sha").is_none());

        let blob = serde_json::to_value(TreeItem::blob("big.bin", "abc123")).unwrap();
        assert_eq!(blob["sha"], "abc123");
        assert!(blob.get("content").is_none());
    }
}
