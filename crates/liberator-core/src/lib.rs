//! Liberator Core Library
//!
//! Orchestrates the liberation pipeline: clean a vendor-generated source
//! tree, publish it to GitHub, apply its migrations to Supabase and deploy
//! it on a Coolify server.

pub mod backend;
pub mod config;
mod error;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod recorder;
pub mod request;
pub mod scheduler;
pub mod telemetry;

pub use backend::{BackendProvider, HttpBackendProvider};
pub use config::LiberatorConfig;
pub use error::{ErrorKind, LiberationError};
pub use metrics::METRICS;
pub use orchestrator::{Liberator, SUPABASE_URL_ENV};
pub use recorder::{DeploymentRecorder, DeploymentStatus, NoopRecorder};
pub use request::{
    slugify, CoolifyCredentials, GitHubCredentials, LiberationRequest, LiberationResponse, Phase,
    PhaseResult, PhaseSelection, PhaseStatus, SupabaseCredentials, TargetCredentials,
};
pub use scheduler::{ManualScheduler, Task, TaskScheduler, TokioScheduler};

/// Result type for liberator operations
pub type Result<T> = std::result::Result<T, LiberationError>;
