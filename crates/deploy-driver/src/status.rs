//! Build status classification and the bounded poll budget

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of status reads (two minutes at the default interval).
pub const DEFAULT_POLL_ATTEMPTS: u32 = 24;

/// Characters of build log kept on a failed deployment.
pub const LOG_TAIL_CHARS: usize = 4000;

/// Classification of a raw platform status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    /// Container is up
    Running,
    /// Any exited, unhealthy or errored variant
    Failed,
    /// Anything else: queued, building, starting, unknown
    Building,
}

impl BuildStatus {
    /// Classify a status such as `running:healthy` or `exited:unhealthy`.
    pub fn classify(raw: &str) -> Self {
        let status = raw.trim().to_ascii_lowercase();
        let mut parts = status.split(':');
        let state = parts.next().unwrap_or_default();
        let health = parts.next().unwrap_or_default();

        match state {
            "exited" | "failed" | "error" | "dead" | "degraded" | "cancelled" => {
                BuildStatus::Failed
            }
            _ if health == "unhealthy" => BuildStatus::Failed,
            "running" | "healthy" | "finished" => BuildStatus::Running,
            _ => BuildStatus::Building,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != BuildStatus::Building
    }
}

/// Final classification of a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployOutcome {
    Deployed,
    /// Poll budget exhausted while still building
    Building,
    Failed,
}

impl DeployOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployOutcome::Deployed => "deployed",
            DeployOutcome::Building => "building",
            DeployOutcome::Failed => "failed",
        }
    }
}

impl From<BuildStatus> for DeployOutcome {
    fn from(status: BuildStatus) -> Self {
        match status {
            BuildStatus::Running => DeployOutcome::Deployed,
            BuildStatus::Failed => DeployOutcome::Failed,
            BuildStatus::Building => DeployOutcome::Building,
        }
    }
}

/// Fixed-interval poll budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        PollPolicy {
            interval,
            max_attempts,
        }
    }

    /// Total wall-clock budget.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Last `max_chars` characters of `log`.
pub fn tail(log: &str, max_chars: usize) -> String {
    let count = log.chars().count();
    if count <= max_chars {
        return log.to_string();
    }
    log.chars().skip(count - max_chars).collect()
}
