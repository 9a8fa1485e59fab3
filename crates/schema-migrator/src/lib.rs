//! Schema-Migrator: re-run-safe SQL migrations for Supabase-like databases
//!
//! Migration files are split into statements, executed in filename order
//! against a remote SQL endpoint, and every failure is classified as either
//! already-applied (ignorable) or fatal for its file.
//!
//! ## Key Components
//!
//! - `split_statements`: quote, dollar-quote and comment aware splitter
//! - `ErrorClassifier`: pluggable ignorable-error vocabulary
//! - `DatabaseApi`: port over the management API (`SupabaseClient`)
//! - `MigrationExecutor`: per-file execution, reporting and secret sync

pub mod classifier;
pub mod database;
mod error;
pub mod executor;
pub mod fakes;
pub mod sql;
pub mod supabase;

pub use classifier::{ClassificationRule, ErrorClass, ErrorClassifier, POSTGRES_DUPLICATE_STATES};
pub use database::DatabaseApi;
pub use error::MigrationError;
pub use executor::{
    select_migrations, FailedMigration, MigrationExecutor, MigrationFile, MigrationReport,
    SecretSyncReport, MIGRATIONS_DIR,
};
pub use sql::{is_comment_only, split_statements};
pub use supabase::{parse_error_body, SupabaseClient, SupabaseConfig};

/// Result type for schema-migrator operations
pub type Result<T> = std::result::Result<T, MigrationError>;
