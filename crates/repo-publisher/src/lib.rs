//! Repo-Publisher: single-commit publication to a GitHub-like host
//!
//! Takes the output of the sanitizer and lands it on a remote branch as one
//! commit, creating the repository when it does not exist yet.
//!
//! ## Key Components
//!
//! - `SourceHost`: port over the hosting API (identity, repos, Git data)
//! - `GitHubClient`: REST implementation of `SourceHost`
//! - `Publisher`: the ValidateToken -> ... -> UpdateRef state machine
//! - `fakes::MemorySourceHost`: in-memory host for tests

mod error;
pub mod fakes;
pub mod github;
pub mod publisher;
pub mod source_host;
pub mod tree;

pub use error::PublishError;
pub use github::{GitHubClient, GitHubConfig};
pub use publisher::{package_manifest_valid, PublishOptions, PublishOutcome, Publisher};
pub use source_host::{BranchHead, Identity, NewRepo, RepoInfo, SourceHost, TreeItem, FILE_MODE};
pub use tree::{requires_blob, BuiltTree, DEFAULT_INLINE_THRESHOLD};

/// Result type for repo-publisher operations
pub type Result<T> = std::result::Result<T, PublishError>;
