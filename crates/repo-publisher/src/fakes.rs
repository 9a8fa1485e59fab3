//! In-memory fake for the source host port (testing only)
//!
//! `MemorySourceHost` keeps repositories, blobs, trees, commits and refs in a
//! single `Mutex`-guarded state and records every call so tests can assert on
//! the exact sequence of remote operations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::PublishError;
use crate::source_host::{BranchHead, Identity, NewRepo, RepoInfo, SourceHost, TreeItem};
use crate::Result;

#[derive(Debug, Clone)]
pub struct StoredCommit {
    pub message: String,
    pub tree_sha: String,
    pub parents: Vec<String>,
}

#[derive(Debug, Default)]
struct RepoState {
    info: Option<RepoInfo>,
    branches: HashMap<String, String>,
    commits: HashMap<String, StoredCommit>,
    /// tree sha -> path -> (inline content | blob sha)
    trees: HashMap<String, BTreeMap<String, String>>,
    blobs: HashMap<String, String>,
    last_tree_items: Vec<TreeItem>,
}

#[derive(Debug, Default)]
struct HostState {
    repos: HashMap<(String, String), RepoState>,
    calls: Vec<String>,
    next_id: u64,
}

impl HostState {
    fn next_sha(&mut self) -> String {
        self.next_id += 1;
        format!("{:040x}", self.next_id)
    }
}

/// In-memory `SourceHost`.
#[derive(Debug)]
pub struct MemorySourceHost {
    login: String,
    scopes: Option<Vec<String>>,
    reject_token: bool,
    fail_blobs: bool,
    fail_ref_update: bool,
    state: Mutex<HostState>,
}

impl MemorySourceHost {
    /// A host whose token belongs to `login` and carries the `repo` scope.
    pub fn new(login: &str) -> Self {
        MemorySourceHost {
            login: login.to_string(),
            scopes: Some(vec!["repo".to_string()]),
            reject_token: false,
            fail_blobs: false,
            fail_ref_update: false,
            state: Mutex::new(HostState::default()),
        }
    }

    pub fn with_scopes(mut self, scopes: Option<Vec<&str>>) -> Self {
        self.scopes = scopes.map(|s| s.into_iter().map(String::from).collect());
        self
    }

    /// Every identity lookup answers 401.
    pub fn rejecting_token(mut self) -> Self {
        self.reject_token = true;
        self
    }

    /// Every blob upload answers 500.
    pub fn failing_blobs(mut self) -> Self {
        self.fail_blobs = true;
        self
    }

    /// Every ref update answers 500.
    pub fn failing_ref_update(mut self) -> Self {
        self.fail_ref_update = true;
        self
    }

    /// Seed an existing repository. A non-empty `files` list becomes one
    /// commit on `main`; an empty list leaves the repository without commits.
    pub fn with_repo(self, owner: &str, name: &str, files: &[(&str, &str)]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let mut repo = RepoState {
                info: Some(RepoInfo {
                    owner: owner.to_string(),
                    name: name.to_string(),
                    html_url: format!("https://github.com/{}/{}", owner, name),
                    default_branch: Some("main".to_string()),
                    private: true,
                }),
                ..Default::default()
            };
            if !files.is_empty() {
                let tree_sha = state.next_sha();
                let commit_sha = state.next_sha();
                let tree = files
                    .iter()
                    .map(|(p, c)| (p.to_string(), c.to_string()))
                    .collect();
                repo.trees.insert(tree_sha.clone(), tree);
                repo.commits.insert(
                    commit_sha.clone(),
                    StoredCommit {
                        message: "seed".to_string(),
                        tree_sha,
                        parents: Vec::new(),
                    },
                );
                repo.branches.insert("main".to_string(), commit_sha);
            }
            state
                .repos
                .insert((owner.to_string(), name.to_string()), repo);
        }
        self
    }

    /// Mark a seeded repository public.
    pub fn with_public_visibility(self, owner: &str, name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(info) = state
                .repos
                .get_mut(&(owner.to_string(), name.to_string()))
                .and_then(|r| r.info.as_mut())
            {
                info.private = false;
            }
        }
        self
    }

    /// Names of the port methods called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn repo_exists(&self, owner: &str, name: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .repos
            .get(&(owner.to_string(), name.to_string()))
            .map(|r| r.info.is_some())
            .unwrap_or(false)
    }

    /// Files of the tree `branch` points at.
    pub fn branch_files(&self, owner: &str, name: &str, branch: &str) -> Option<BTreeMap<String, String>> {
        let state = self.state.lock().unwrap();
        let repo = state.repos.get(&(owner.to_string(), name.to_string()))?;
        let commit = repo.commits.get(repo.branches.get(branch)?)?;
        let tree = repo.trees.get(&commit.tree_sha)?;
        Some(
            tree.iter()
                .map(|(path, entry)| {
                    let content = repo.blobs.get(entry).cloned().unwrap_or_else(|| entry.clone());
                    (path.clone(), content)
                })
                .collect(),
        )
    }

    pub fn branch_commit(&self, owner: &str, name: &str, branch: &str) -> Option<StoredCommit> {
        let state = self.state.lock().unwrap();
        let repo = state.repos.get(&(owner.to_string(), name.to_string()))?;
        repo.commits.get(repo.branches.get(branch)?).cloned()
    }

    /// Items of the most recent tree-creation call.
    pub fn last_tree_items(&self, owner: &str, name: &str) -> Vec<TreeItem> {
        let state = self.state.lock().unwrap();
        state
            .repos
            .get(&(owner.to_string(), name.to_string()))
            .map(|r| r.last_tree_items.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: &str) {
        self.state.lock().unwrap().calls.push(call.to_string());
    }
}

fn remote(operation: &str, status: u16, body: &str) -> PublishError {
    PublishError::RemoteApi {
        operation: operation.to_string(),
        status,
        body: body.to_string(),
    }
}

#[async_trait]
impl SourceHost for MemorySourceHost {
    async fn authenticated_user(&self) -> Result<Identity> {
        self.record("authenticated_user");
        if self.reject_token {
            return Err(PublishError::InvalidToken {
                status: 401,
                body: "Bad credentials".to_string(),
            });
        }
        Ok(Identity {
            login: self.login.clone(),
            scopes: self.scopes.clone(),
        })
    }

    async fn get_repo(&self, owner: &str, name: &str) -> Result<Option<RepoInfo>> {
        self.record("get_repo");
        let state = self.state.lock().unwrap();
        Ok(state
            .repos
            .get(&(owner.to_string(), name.to_string()))
            .and_then(|r| r.info.clone()))
    }

    async fn create_repo(&self, repo: &NewRepo) -> Result<RepoInfo> {
        self.record("create_repo");
        let mut state = self.state.lock().unwrap();
        let key = (repo.owner.clone(), repo.name.clone());
        if state.repos.get(&key).and_then(|r| r.info.as_ref()).is_some() {
            return Err(remote("repository creation", 422, "name already exists"));
        }
        let info = RepoInfo {
            owner: repo.owner.clone(),
            name: repo.name.clone(),
            html_url: format!("https://github.com/{}/{}", repo.owner, repo.name),
            default_branch: Some("main".to_string()),
            private: repo.private,
        };
        state.repos.insert(
            key,
            RepoState {
                info: Some(info.clone()),
                ..Default::default()
            },
        );
        Ok(info)
    }

    async fn branch_head(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<BranchHead>> {
        self.record("branch_head");
        let state = self.state.lock().unwrap();
        let Some(repo) = state.repos.get(&(owner.to_string(), repo.to_string())) else {
            return Err(remote("branch lookup", 404, "Not Found"));
        };
        Ok(repo.branches.get(branch).and_then(|commit_sha| {
            repo.commits.get(commit_sha).map(|c| BranchHead {
                commit_sha: commit_sha.clone(),
                tree_sha: c.tree_sha.clone(),
            })
        }))
    }

    async fn bootstrap_readme(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        content: &str,
    ) -> Result<()> {
        self.record("bootstrap_readme");
        let mut state = self.state.lock().unwrap();
        let tree_sha = state.next_sha();
        let commit_sha = state.next_sha();
        let repo = state
            .repos
            .get_mut(&(owner.to_string(), repo.to_string()))
            .ok_or_else(|| remote("repository bootstrap", 404, "Not Found"))?;
        let mut tree = BTreeMap::new();
        tree.insert("README.md".to_string(), content.to_string());
        repo.trees.insert(tree_sha.clone(), tree);
        repo.commits.insert(
            commit_sha.clone(),
            StoredCommit {
                message: "Initial commit".to_string(),
                tree_sha,
                parents: Vec::new(),
            },
        );
        repo.branches.insert(branch.to_string(), commit_sha);
        Ok(())
    }

    async fn create_blob(&self, owner: &str, repo: &str, content: &str) -> Result<String> {
        self.record("create_blob");
        if self.fail_blobs {
            return Err(remote("blob creation", 500, "blob store unavailable"));
        }
        let mut state = self.state.lock().unwrap();
        let sha = state.next_sha();
        let repo = state
            .repos
            .get_mut(&(owner.to_string(), repo.to_string()))
            .ok_or_else(|| remote("blob creation", 404, "Not Found"))?;
        repo.blobs.insert(sha.clone(), content.to_string());
        Ok(sha)
    }

    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: Option<&str>,
        items: &[TreeItem],
    ) -> Result<String> {
        self.record("create_tree");
        let mut state = self.state.lock().unwrap();
        let sha = state.next_sha();
        let repo = state
            .repos
            .get_mut(&(owner.to_string(), repo.to_string()))
            .ok_or_else(|| remote("tree creation", 404, "Not Found"))?;
        let mut tree = match base_tree {
            Some(base) => repo
                .trees
                .get(base)
                .cloned()
                .ok_or_else(|| remote("tree creation", 422, "base_tree not found"))?,
            None => BTreeMap::new(),
        };
        for item in items {
            let entry = match (&item.content, &item.sha) {
                (Some(content), None) => content.clone(),
                (None, Some(sha)) if repo.blobs.contains_key(sha) => sha.clone(),
                _ => return Err(remote("tree creation", 422, "invalid tree item")),
            };
            tree.insert(item.path.clone(), entry);
        }
        repo.trees.insert(sha.clone(), tree);
        repo.last_tree_items = items.to_vec();
        Ok(sha)
    }

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String> {
        self.record("create_commit");
        let mut state = self.state.lock().unwrap();
        let sha = state.next_sha();
        let repo = state
            .repos
            .get_mut(&(owner.to_string(), repo.to_string()))
            .ok_or_else(|| remote("commit creation", 404, "Not Found"))?;
        if !repo.trees.contains_key(tree_sha) {
            return Err(remote("commit creation", 422, "tree not found"));
        }
        repo.commits.insert(
            sha.clone(),
            StoredCommit {
                message: message.to_string(),
                tree_sha: tree_sha.to_string(),
                parents: parents.to_vec(),
            },
        );
        Ok(sha)
    }

    async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> Result<()> {
        self.record("update_ref");
        if self.fail_ref_update {
            return Err(remote("ref update", 500, "ref update rejected"));
        }
        let mut state = self.state.lock().unwrap();
        let repo = state
            .repos
            .get_mut(&(owner.to_string(), repo.to_string()))
            .ok_or_else(|| remote("ref update", 404, "Not Found"))?;
        if !force {
            let fast_forward = match (repo.branches.get(branch), repo.commits.get(sha)) {
                (Some(current), Some(commit)) => commit.parents.contains(current),
                (None, _) => true,
                _ => false,
            };
            if !fast_forward {
                return Err(remote("ref update", 422, "Update is not a fast forward"));
            }
        }
        repo.branches.insert(branch.to_string(), sha.to_string());
        Ok(())
    }
}
