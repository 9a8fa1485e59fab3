//! Post-deploy secret sweep
//!
//! Variables are injected as build-time so the first build sees them. Once
//! the application is up, keys the catalog considers sensitive are demoted to
//! runtime-only so they are not baked into later build layers.

use proprietary_scrub::ProprietaryRules;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::platform::{DeployPlatform, EnvVar};
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub inspected: usize,
    /// Keys moved to runtime-only
    pub demoted: Vec<String>,
    /// Keys whose update failed
    pub failed: Vec<String>,
}

/// Demote sensitive build-time variables of `app_uuid`. Only a failure to
/// list the variables is an error; individual updates are counted.
pub async fn sweep_build_secrets(
    platform: &dyn DeployPlatform,
    app_uuid: &str,
    rules: &ProprietaryRules,
) -> Result<SweepReport> {
    let envs = platform.list_envs(app_uuid).await?;
    let mut report = SweepReport {
        inspected: envs.len(),
        ..Default::default()
    };

    for env in envs
        .iter()
        .filter(|e| e.is_build_time && rules.is_sensitive_env_key(&e.key))
    {
        let runtime = EnvVar::runtime(&env.key, &env.value);
        match platform.update_env(app_uuid, &runtime).await {
            Ok(()) => report.demoted.push(env.key.clone()),
            Err(err) => {
                warn!(key = %env.key, error = %err, "Could not demote secret");
                report.failed.push(env.key.clone());
            }
        }
    }

    info!(
        application = %app_uuid,
        inspected = report.inspected,
        demoted = report.demoted.len(),
        failed = report.failed.len(),
        "Secret sweep finished"
    );
    Ok(report)
}
