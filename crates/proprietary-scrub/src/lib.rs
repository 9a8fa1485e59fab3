//! Proprietary-Scrub: vendor lock-in removal for generated source trees
//!
//! This crate holds the declarative catalog of proprietary markers left behind
//! by hosted app builders and the sanitizer that strips them from a source
//! tree before it is published anywhere else.
//!
//! ## Key Components
//!
//! - `ProprietaryRules`: compiled pattern catalog (imports, files, telemetry,
//!   dependencies, hidden build plugins)
//! - `Sanitizer`: applies the catalog to single files or whole batches
//! - `validate_syntax`: advisory check that cleaning did not break a file

pub mod catalog;
mod error;
pub mod sanitizer;
mod structured;
pub mod syntax;

pub use catalog::{is_lockfile, ProprietaryRule, ProprietaryRules, ProprietaryRulesBuilder, LOCKFILES};
pub use error::ScrubError;
pub use sanitizer::{CleaningReport, CleaningResult, Sanitizer, SourceFile};
pub use structured::FileShape;
pub use syntax::{validate_syntax, SyntaxReport};

/// Result type for proprietary-scrub operations
pub type Result<T> = std::result::Result<T, ScrubError>;
