//! Migration execution.
//!
//! Files run strictly in filename order. Inside a file, statements run in
//! order; an ignorable failure is logged and skipped, a fatal one marks the
//! file failed and skips its remaining statements. Execution then moves on to
//! the next file so one broken migration does not block the rest.

use std::collections::BTreeMap;
use std::sync::Arc;

use proprietary_scrub::SourceFile;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::{ErrorClass, ErrorClassifier};
use crate::database::DatabaseApi;
use crate::error::MigrationError;
use crate::sql::split_statements;
use crate::Result;

/// Conventional migrations directory.
pub const MIGRATIONS_DIR: &str = "supabase/migrations/";

/// One migration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFile {
    pub path: String,
    pub content: String,
}

impl MigrationFile {
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Pick the `.sql` files under the migrations directory, ordered by file name.
pub fn select_migrations(files: &[SourceFile]) -> Vec<MigrationFile> {
    let mut selected: Vec<MigrationFile> = files
        .iter()
        .filter(|f| {
            let path = f.path.trim_start_matches("./").trim_start_matches('/');
            path.starts_with(MIGRATIONS_DIR) && path.ends_with(".sql")
        })
        .map(|f| MigrationFile {
            path: f.path.clone(),
            content: f.content.clone(),
        })
        .collect();
    selected.sort_by(|a, b| {
        a.file_name()
            .cmp(b.file_name())
            .then_with(|| a.path.cmp(&b.path))
    });
    selected
}

/// A file that hit a fatal error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedMigration {
    pub file: String,
    /// Zero-based index of the failing statement.
    pub statement_index: usize,
    pub error: String,
}

/// Phase-level migration outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub total_migrations: usize,
    pub executed: usize,
    /// Files with no executable statements.
    pub skipped: usize,
    pub failed: usize,
    pub failed_details: Vec<FailedMigration>,
    /// Percentage of files that did not fail.
    pub success_rate: f64,
    pub statements_executed: usize,
    pub statements_ignored: usize,
    pub secrets_synced: usize,
    pub secrets_failed: usize,
}

impl MigrationReport {
    /// No failures, or fewer than half of the files failed and at least one
    /// ran.
    pub fn is_success(&self) -> bool {
        self.failed == 0 || (self.failed * 2 < self.total_migrations && self.executed >= 1)
    }

    pub fn http_status(&self) -> u16 {
        if self.failed == 0 {
            200
        } else if self.is_success() {
            207
        } else {
            500
        }
    }

    fn finish(&mut self) {
        self.success_rate = if self.total_migrations == 0 {
            100.0
        } else {
            let ok = (self.total_migrations - self.failed) as f64;
            (ok / self.total_migrations as f64 * 1000.0).round() / 10.0
        };
    }
}

/// Outcome of pushing secrets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSyncReport {
    pub synced: usize,
    pub failed: usize,
    pub failed_names: Vec<String>,
}

enum FileOutcome {
    Executed,
    Skipped,
    Failed(FailedMigration),
}

/// Runs migrations against a [`DatabaseApi`].
pub struct MigrationExecutor {
    db: Arc<dyn DatabaseApi>,
    classifier: ErrorClassifier,
}

impl MigrationExecutor {
    pub fn new(db: Arc<dyn DatabaseApi>, classifier: ErrorClassifier) -> Self {
        MigrationExecutor { db, classifier }
    }

    /// Executor with the PostgreSQL vocabulary.
    pub fn postgres(db: Arc<dyn DatabaseApi>) -> Result<Self> {
        Ok(Self::new(db, ErrorClassifier::postgres()?))
    }

    /// Run `files` in order. Only rejected credentials abort the run; every
    /// other failure is recorded per file.
    pub async fn run(&self, files: &[MigrationFile]) -> Result<MigrationReport> {
        let mut report = MigrationReport {
            total_migrations: files.len(),
            ..Default::default()
        };

        for file in files {
            match self.run_file(file, &mut report).await? {
                FileOutcome::Executed => report.executed += 1,
                FileOutcome::Skipped => report.skipped += 1,
                FileOutcome::Failed(detail) => {
                    report.failed += 1;
                    report.failed_details.push(detail);
                }
            }
        }

        report.finish();
        info!(
            total = report.total_migrations,
            executed = report.executed,
            skipped = report.skipped,
            failed = report.failed,
            statements = report.statements_executed,
            ignored = report.statements_ignored,
            "Migrations finished"
        );
        Ok(report)
    }

    async fn run_file(
        &self,
        file: &MigrationFile,
        report: &mut MigrationReport,
    ) -> Result<FileOutcome> {
        let statements = split_statements(&file.content);
        if statements.is_empty() {
            debug!(file = %file.path, "Migration has no statements");
            return Ok(FileOutcome::Skipped);
        }

        for (index, statement) in statements.iter().enumerate() {
            match self.db.execute(statement).await {
                Ok(()) => report.statements_executed += 1,
                Err(err @ MigrationError::Unauthorized { .. }) => return Err(err),
                Err(err) => match self.classifier.classify_error(&err) {
                    ErrorClass::Ignorable => {
                        debug!(file = %file.path, statement = index, error = %err.message(), "Ignoring already-applied statement");
                        report.statements_ignored += 1;
                    }
                    ErrorClass::Fatal => {
                        warn!(file = %file.path, statement = index, error = %err, "Migration failed, skipping rest of file");
                        return Ok(FileOutcome::Failed(FailedMigration {
                            file: file.path.clone(),
                            statement_index: index,
                            error: err.to_string(),
                        }));
                    }
                },
            }
        }
        Ok(FileOutcome::Executed)
    }

    /// Push secrets one at a time. Individual failures are counted, not
    /// raised. Values are never logged.
    pub async fn sync_secrets(&self, secrets: &BTreeMap<String, String>) -> SecretSyncReport {
        let mut sync = SecretSyncReport::default();
        for (name, value) in secrets {
            match self.db.upsert_secret(name, value).await {
                Ok(()) => sync.synced += 1,
                Err(e) => {
                    warn!(secret = %name, error = %e, "Secret sync failed");
                    sync.failed += 1;
                    sync.failed_names.push(name.clone());
                }
            }
        }
        sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_filters_and_orders_by_file_name() {
        let files = vec![
            SourceFile::new("supabase/migrations/20240102_b.sql", "b"),
            SourceFile::new("supabase/migrations/20240101_a.sql", "a"),
            SourceFile::new("supabase/seed.sql", "seed"),
            SourceFile::new("supabase/migrations/README.md", "doc"),
            SourceFile::new("./supabase/migrations/20231231_z.sql", "z"),
        ];
        let names: Vec<String> = select_migrations(&files)
            .iter()
            .map(|m| m.file_name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["20231231_z.sql", "20240101_a.sql", "20240102_b.sql"]
        );
    }

    #[test]
    fn test_success_thresholds() {
        let mut report = MigrationReport {
            total_migrations: 4,
            executed: 3,
            failed: 1,
            ..Default::default()
        };
        assert!(report.is_success());
        assert_eq!(report.http_status(), 207);

        report.executed = 2;
        report.failed = 2;
        assert!(!report.is_success());
        assert_eq!(report.http_status(), 500);

        report.executed = 0;
        report.failed = 0;
        report.total_migrations = 0;
        assert!(report.is_success());
        assert_eq!(report.http_status(), 200);
    }

    #[test]
    fn test_success_rate() {
        let mut report = MigrationReport {
            total_migrations: 3,
            executed: 2,
            failed: 1,
            ..Default::default()
        };
        report.finish();
        assert_eq!(report.success_rate, 66.7);
    }
}
