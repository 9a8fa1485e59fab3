//! Database management port.

use async_trait::async_trait;

use crate::Result;

/// Remote SQL execution and secret storage for one target project.
#[async_trait]
pub trait DatabaseApi: Send + Sync {
    /// Execute one statement. Statement failures surface as
    /// `MigrationError::Query`; rejected credentials as
    /// `MigrationError::Unauthorized`.
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Create or overwrite a named secret in the project's secret store.
    async fn upsert_secret(&self, name: &str, value: &str) -> Result<()>;
}
