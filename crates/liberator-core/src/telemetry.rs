//! Tracing initialisation for liberator binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.
//!
//! The filter comes from `LIBERATOR_LOG`, then `RUST_LOG`, then a default
//! that logs the pipeline crates at the requested level and everything else
//! (HTTP client, runtime) at `warn`. Logs go to stderr so stdout stays free
//! for command output.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives read before `RUST_LOG`.
pub const LOG_ENV: &str = "LIBERATOR_LOG";

/// Crates whose events are shown at the requested level by default.
const PIPELINE_TARGETS: &[&str] = &[
    "liberator",
    "liberator_core",
    "proprietary_scrub",
    "repo_publisher",
    "schema_migrator",
    "deploy_driver",
];

/// Default directives: `warn` globally, `level` for the pipeline crates.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(PIPELINE_TARGETS.iter().map(|t| format!("{}={}", t, level)));
    directives.join(",")
}

/// Pick the filter: `explicit` directives if they parse, then `RUST_LOG`,
/// then [`default_directives`].
fn build_filter(explicit: Option<String>, level: Level) -> EnvFilter {
    explicit
        .and_then(|d| EnvFilter::try_new(d).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber.
///
/// * `json`: emit newline-delimited JSON instead of human-readable lines.
/// * `level`: verbosity of the pipeline crates when neither `LIBERATOR_LOG`
///   nor `RUST_LOG` is set.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = build_filter(std::env::var(LOG_ENV).ok(), level);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
