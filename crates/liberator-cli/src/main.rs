//! Liberator CLI
//!
//! The `liberator` command runs the liberation pipeline from a request file
//! and offers offline previews of its cleaning and SQL splitting steps.
//!
//! ## Commands
//!
//! - `run`: execute a liberation request against the real APIs
//! - `scan`: preview what the cleaner would change in a source directory
//! - `split`: show how a migration file is split into statements

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use liberator_core::telemetry::init_tracing;
use liberator_core::{LiberationRequest, Liberator, LiberatorConfig, PhaseSelection};
use proprietary_scrub::{CleaningReport, Sanitizer, SourceFile};
use schema_migrator::split_statements;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, Level};
use walkdir::WalkDir;

/// Directories never read by `scan`.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "dist", "build", ".next"];

#[derive(Parser)]
#[command(name = "liberator")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Move a vendor-generated app to GitHub, Supabase and Coolify", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a liberation request (JSON file, `-` for stdin)
    Run {
        /// Path to the request file
        #[arg(short, long)]
        request: PathBuf,

        /// Override the request's phase (github, supabase, coolify, all)
        #[arg(short, long)]
        phase: Option<PhaseSelection>,
    },

    /// Preview the cleaning of a source directory
    Scan {
        /// Directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Write the cleaned tree to this directory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Split a SQL migration into statements
    Split {
        /// Path to the `.sql` file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Run { request, phase } => cmd_run(&request, phase).await,
        Commands::Scan { path, out } => cmd_scan(&path, out.as_deref()),
        Commands::Split { file } => cmd_split(&file),
    }
}

fn read_request(path: &Path) -> Result<LiberationRequest> {
    let raw = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("Failed to read request from stdin")?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file {}", path.display()))?
    };
    serde_json::from_str(&raw).context("Request is not a valid liberation request")
}

async fn cmd_run(path: &Path, phase: Option<PhaseSelection>) -> Result<()> {
    let mut request = read_request(path)?;
    if let Some(phase) = phase {
        request.phase = phase;
    }

    let config = LiberatorConfig::from_env().context("Invalid LIBERATOR_* configuration")?;
    let liberator = Liberator::with_http_backends(config).context("Failed to build pipeline")?;

    info!(project = %request.project_name, files = request.files.len(), "Starting liberation");
    let response = liberator.liberate(&request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.success {
        bail!(
            "Liberation failed (HTTP {}): {}",
            response.http_status(),
            response.message
        );
    }
    Ok(())
}

/// Read every UTF-8 file under `root`, paths relative and `/`-separated.
fn collect_files(root: &Path) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && SKIPPED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        match std::fs::read_to_string(entry.path()) {
            Ok(content) => files.push(SourceFile::new(path, content)),
            Err(err) => debug!(path = %path, error = %err, "Skipping unreadable or binary file"),
        }
    }
    Ok(files)
}

fn write_tree(report: &CleaningReport, out: &Path) -> Result<usize> {
    let mut written = 0;
    for result in report.published() {
        let target = out.join(&result.path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&target, &result.cleaned_content)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        written += 1;
    }
    Ok(written)
}

fn cmd_scan(root: &Path, out: Option<&Path>) -> Result<()> {
    let files = collect_files(root)?;
    let sanitizer = Sanitizer::with_default_catalog().context("Invalid pattern catalog")?;
    let report = sanitizer.clean_files(&files);

    for result in report.results.iter().filter(|r| r.is_modified()) {
        let marker = if result.removed { "-" } else { "~" };
        println!("{} {}", marker, result.path);
        for change in &result.changes {
            println!("    {}", change);
        }
    }
    println!(
        "\n{} files scanned, {} changed, {} removed, {} changes",
        report.results.len(),
        report.files_changed,
        report.files_removed,
        report.total_changes
    );
    println!("digest: {}", report.digest);

    if let Some(out) = out {
        let written = write_tree(&report, out)?;
        println!("wrote {} files to {}", written, out.display());
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SplitStatement {
    index: usize,
    /// 1-based line of the statement's first character in the file
    line: usize,
    sql: String,
}

fn split_file(path: &Path) -> Result<Vec<SplitStatement>> {
    let sql = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut cursor = 0;
    Ok(split_statements(&sql)
        .into_iter()
        .enumerate()
        .map(|(index, statement)| {
            let start = sql[cursor..]
                .find(statement.as_str())
                .map_or(cursor, |offset| cursor + offset);
            cursor = start + statement.len();
            SplitStatement {
                index,
                line: sql[..start].matches('\n').count() + 1,
                sql: statement,
            }
        })
        .collect())
}

fn cmd_split(path: &Path) -> Result<()> {
    let statements = split_file(path)?;
    println!("{}", serde_json::to_string_pretty(&statements)?);
    info!(statements = statements.len(), "Split migration");
    Ok(())
}
