//! Pipeline configuration
//!
//! Defaults suit the public GitHub and Supabase APIs. Every field can be
//! overridden with a `LIBERATOR_*` environment variable.

use std::str::FromStr;
use std::time::Duration;

use deploy_driver::PollPolicy;
use serde::{Deserialize, Serialize};

use crate::error::LiberationError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiberatorConfig {
    pub github_api_url: String,
    pub supabase_api_url: String,
    /// Branch deployed when the publish phase did not run
    pub default_branch: String,
    pub inline_threshold_bytes: usize,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
    /// Delay before the post-deploy secret sweep runs
    pub cleanup_delay: Duration,
    pub user_agent: String,
}

impl Default for LiberatorConfig {
    fn default() -> Self {
        LiberatorConfig {
            github_api_url: "https://api.github.com".to_string(),
            supabase_api_url: "https://api.supabase.com".to_string(),
            default_branch: "main".to_string(),
            inline_threshold_bytes: repo_publisher::DEFAULT_INLINE_THRESHOLD,
            poll_interval: Duration::from_secs(5),
            poll_max_attempts: 24,
            cleanup_delay: Duration::from_secs(60),
            user_agent: concat!("liberator/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

fn parse<T: FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>> {
    match raw {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| LiberationError::Config(format!("{} has invalid value '{}'", key, value))),
    }
}

impl LiberatorConfig {
    /// Defaults overlaid with `LIBERATOR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(url) = lookup("LIBERATOR_GITHUB_API_URL") {
            config.github_api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("LIBERATOR_SUPABASE_API_URL") {
            config.supabase_api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(branch) = lookup("LIBERATOR_DEFAULT_BRANCH") {
            config.default_branch = branch;
        }
        if let Some(bytes) = parse::<usize>(
            "LIBERATOR_INLINE_THRESHOLD_BYTES",
            lookup("LIBERATOR_INLINE_THRESHOLD_BYTES"),
        )? {
            config.inline_threshold_bytes = bytes;
        }
        if let Some(secs) = parse::<u64>(
            "LIBERATOR_POLL_INTERVAL_SECS",
            lookup("LIBERATOR_POLL_INTERVAL_SECS"),
        )? {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse::<u32>(
            "LIBERATOR_POLL_MAX_ATTEMPTS",
            lookup("LIBERATOR_POLL_MAX_ATTEMPTS"),
        )? {
            config.poll_max_attempts = attempts;
        }
        if let Some(secs) = parse::<u64>(
            "LIBERATOR_CLEANUP_DELAY_SECS",
            lookup("LIBERATOR_CLEANUP_DELAY_SECS"),
        )? {
            config.cleanup_delay = Duration::from_secs(secs);
        }
        if let Some(agent) = lookup("LIBERATOR_USER_AGENT") {
            config.user_agent = agent;
        }
        if config.poll_max_attempts == 0 {
            return Err(LiberationError::Config(
                "LIBERATOR_POLL_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn with_github_api_url(mut self, url: &str) -> Self {
        self.github_api_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_supabase_api_url(mut self, url: &str) -> Self {
        self.supabase_api_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_max_attempts = max_attempts;
        self
    }

    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(self.poll_interval, self.poll_max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LiberatorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LiberatorConfig::default());
        assert_eq!(config.poll_policy().budget(), Duration::from_secs(120));
        assert_eq!(config.inline_threshold_bytes, 102_400);
    }

    #[test]
    fn test_overrides() {
        let config = LiberatorConfig::from_lookup(lookup(&[
            ("LIBERATOR_GITHUB_API_URL", "https://ghe.example.com/api/v3/"),
            ("LIBERATOR_POLL_INTERVAL_SECS", "10"),
            ("LIBERATOR_POLL_MAX_ATTEMPTS", "30"),
            ("LIBERATOR_CLEANUP_DELAY_SECS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.github_api_url, "https://ghe.example.com/api/v3");
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.poll_max_attempts, 30);
        assert_eq!(config.cleanup_delay, Duration::ZERO);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = LiberatorConfig::from_lookup(lookup(&[("LIBERATOR_POLL_MAX_ATTEMPTS", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("LIBERATOR_POLL_MAX_ATTEMPTS"));
        assert!(LiberatorConfig::from_lookup(lookup(&[("LIBERATOR_POLL_MAX_ATTEMPTS", "0")])).is_err());
    }
}
