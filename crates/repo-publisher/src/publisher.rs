//! Publication state machine
//!
//! `ValidateToken -> ResolveOrCreateRepo -> EstablishBaseCommit -> BuildTree
//! -> CreateCommit -> UpdateRef`. The ref update runs last, so a failure at
//! any earlier step leaves the branch untouched.

use std::sync::Arc;

use proprietary_scrub::{validate_syntax, CleaningReport, CleaningResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PublishError;
use crate::source_host::{BranchHead, NewRepo, RepoInfo, SourceHost};
use crate::tree::{build_tree, publishable, DEFAULT_INLINE_THRESHOLD};
use crate::Result;

/// Run-time knobs for one publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishOptions {
    pub repo_name: String,
    /// Defaults to the token's login.
    pub owner: Option<String>,
    /// Defaults to the repository's default branch, then `main`.
    pub branch: Option<String>,
    pub commit_message: String,
    pub private: bool,
    pub inline_threshold_bytes: usize,
}

impl PublishOptions {
    pub fn new(repo_name: &str) -> Self {
        PublishOptions {
            repo_name: repo_name.to_string(),
            owner: None,
            branch: None,
            commit_message: "Liberated export: remove proprietary platform bindings".to_string(),
            private: true,
            inline_threshold_bytes: DEFAULT_INLINE_THRESHOLD,
        }
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = Some(branch.to_string());
        self
    }

    pub fn with_commit_message(mut self, message: &str) -> Self {
        self.commit_message = message.to_string();
        self
    }

    pub fn with_inline_threshold(mut self, bytes: usize) -> Self {
        self.inline_threshold_bytes = bytes;
        self
    }
}

/// Result data of a successful publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub repo_url: String,
    pub files_count: usize,
    pub total_changes: usize,
    pub was_created: bool,
    /// Visibility of the repository the tree landed in
    pub private: bool,
    pub package_manifest_valid: bool,
    pub commit_sha: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub blobs_uploaded: usize,
    pub removed_files: Vec<String>,
    pub content_digest: String,
    pub syntax_warnings: Vec<String>,
}

impl PublishOutcome {
    /// 201 when the repository was created by this run, else 200.
    pub fn http_status(&self) -> u16 {
        if self.was_created {
            201
        } else {
            200
        }
    }
}

/// Publishes a cleaned source tree as a single commit.
pub struct Publisher {
    host: Arc<dyn SourceHost>,
}

impl Publisher {
    pub fn new(host: Arc<dyn SourceHost>) -> Self {
        Publisher { host }
    }

    pub async fn publish(
        &self,
        report: &CleaningReport,
        options: &PublishOptions,
    ) -> Result<PublishOutcome> {
        let files = publishable(&report.results);
        if files.is_empty() {
            return Err(PublishError::Validation(
                "no publishable files after cleaning".to_string(),
            ));
        }
        if options.repo_name.trim().is_empty() {
            return Err(PublishError::Validation(
                "repository name is empty".to_string(),
            ));
        }

        // ValidateToken
        let identity = self.host.authenticated_user().await?;
        if !identity.can_write_repos() {
            let granted = identity.scopes.unwrap_or_default().join(", ");
            return Err(PublishError::InsufficientScope { granted });
        }
        let owner = options
            .owner
            .clone()
            .unwrap_or_else(|| identity.login.clone());

        // ResolveOrCreateRepo
        let (repo, was_created) = self.resolve_repo(&owner, &identity.login, options).await?;
        let branch = options
            .branch
            .clone()
            .or_else(|| repo.default_branch.clone())
            .unwrap_or_else(|| "main".to_string());

        // EstablishBaseCommit
        let base = self.establish_base(&repo, &branch).await?;

        // BuildTree
        let built = build_tree(
            self.host.as_ref(),
            &repo.owner,
            &repo.name,
            &files,
            options.inline_threshold_bytes,
        )
        .await;
        let tree_sha = self
            .host
            .create_tree(&repo.owner, &repo.name, Some(&base.tree_sha), &built.items)
            .await?;

        // CreateCommit
        let commit_sha = self
            .host
            .create_commit(
                &repo.owner,
                &repo.name,
                &options.commit_message,
                &tree_sha,
                &[base.commit_sha.clone()],
            )
            .await?;

        // UpdateRef
        self.host
            .update_ref(&repo.owner, &repo.name, &branch, &commit_sha, true)
            .await?;

        let removed_files: Vec<String> = report
            .results
            .iter()
            .filter(|r| r.removed)
            .map(|r| r.path.clone())
            .collect();

        info!(
            owner = %repo.owner,
            repo = %repo.name,
            branch = %branch,
            commit = %commit_sha,
            files = built.items.len(),
            blobs = built.blobs_uploaded,
            created = was_created,
            "Published cleaned tree"
        );

        Ok(PublishOutcome {
            repo_url: repo.html_url.clone(),
            files_count: built.items.len(),
            total_changes: report.total_changes,
            was_created,
            private: repo.private,
            package_manifest_valid: package_manifest_valid(&files),
            commit_sha,
            owner: repo.owner,
            repo: repo.name,
            branch,
            blobs_uploaded: built.blobs_uploaded,
            removed_files,
            content_digest: report.digest.clone(),
            syntax_warnings: syntax_warnings(&files),
        })
    }

    async fn resolve_repo(
        &self,
        owner: &str,
        login: &str,
        options: &PublishOptions,
    ) -> Result<(RepoInfo, bool)> {
        if let Some(existing) = self.host.get_repo(owner, &options.repo_name).await? {
            return Ok((existing, false));
        }
        info!(owner = %owner, repo = %options.repo_name, "Repository not found, creating it");
        let created = self
            .host
            .create_repo(&NewRepo {
                owner: owner.to_string(),
                name: options.repo_name.clone(),
                private: options.private,
                organization: !owner.eq_ignore_ascii_case(login),
            })
            .await?;
        Ok((created, true))
    }

    async fn establish_base(&self, repo: &RepoInfo, branch: &str) -> Result<BranchHead> {
        if let Some(head) = self
            .host
            .branch_head(&repo.owner, &repo.name, branch)
            .await?
        {
            return Ok(head);
        }

        info!(repo = %repo.name, branch = %branch, "Branch has no commits, bootstrapping");
        let readme = format!("# {}\n", repo.name);
        self.host
            .bootstrap_readme(&repo.owner, &repo.name, branch, &readme)
            .await?;
        self.host
            .branch_head(&repo.owner, &repo.name, branch)
            .await?
            .ok_or_else(|| {
                PublishError::NotFound(format!(
                    "branch '{}' of {}/{} after bootstrap",
                    branch, repo.owner, repo.name
                ))
            })
    }
}

/// Root `package.json` parses and declares a name and a dependency map.
pub fn package_manifest_valid(files: &[&CleaningResult]) -> bool {
    let Some(manifest) = files.iter().find(|f| f.path.trim_start_matches("./") == "package.json")
    else {
        return false;
    };
    match serde_json::from_str::<serde_json::Value>(&manifest.cleaned_content) {
        Ok(value) => {
            value.get("name").map(|n| n.is_string()).unwrap_or(false)
                && value
                    .get("dependencies")
                    .map(|d| d.is_object())
                    .unwrap_or(false)
        }
        Err(_) => false,
    }
}

fn syntax_warnings(files: &[&CleaningResult]) -> Vec<String> {
    let mut warnings = Vec::new();
    for file in files.iter().filter(|f| !f.changes.is_empty()) {
        let report = validate_syntax(&file.cleaned_content, &file.path);
        for issue in report.issues {
            warn!(path = %file.path, issue = %issue, "Cleaned file failed syntax check");
            warnings.push(format!("{}: {}", file.path, issue));
        }
    }
    warnings
}
