//! Deploy-Driver: find-or-create deployments on a Coolify-like platform
//!
//! Resolves (or creates) a project, server and application for a published
//! repository, injects environment variables, triggers a build and polls it
//! under a fixed budget.
//!
//! ## Key Components
//!
//! - `DeployPlatform`: port over the platform API
//! - `CoolifyClient`: REST implementation of `DeployPlatform`
//! - `Deployer`: the step machine, including rollback of projects it created
//! - `BuildStatus` / `PollPolicy`: status classification and poll budget
//! - `sweep_build_secrets`: post-deploy demotion of sensitive build variables
//! - `fakes::MemoryDeployPlatform`: in-memory platform for tests

pub mod coolify;
pub mod driver;
mod error;
pub mod fakes;
pub mod platform;
pub mod status;
pub mod sweep;

pub use coolify::{CoolifyClient, CoolifyConfig};
pub use driver::{node_dockerfile, BuildPack, DeployContext, DeployOptions, DeployReport, Deployer};
pub use error::DeployError;
pub use platform::{
    AppSource, Application, DeployPlatform, EnvVar, NewApplication, NewServer, Project, Server,
};
pub use status::{BuildStatus, DeployOutcome, PollPolicy, LOG_TAIL_CHARS};
pub use sweep::{sweep_build_secrets, SweepReport};

/// Result type for deploy-driver operations
pub type Result<T> = std::result::Result<T, DeployError>;
