//! migrate - Command-line interface for the bulk object migration engine.
//!
//! Wires the local filesystem adapters into the engine, renders progress and
//! the end-of-run summary to stderr, and maps results to exit codes. A run
//! that finishes with item errors still exits cleanly: the errors are
//! reported and a re-run picks up exactly the remaining items.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use engine::{
    EngineConfig, FsDestination, FsSource, HaltReason, MigrationState, ProgressCallback,
    RunSummary, Scheduler, ShutdownCoordinator, TransferOutcome,
};

/// migrate - Resumable bulk object migration between storage backends
#[derive(Parser, Debug)]
#[command(name = "migrate")]
#[command(version = "0.1.0")]
#[command(about = "Migrate an object collection to another store, resumably")]
struct Args {
    /// Source directory
    #[arg(long, value_name = "PATH")]
    src: PathBuf,

    /// Destination directory
    #[arg(long, value_name = "PATH")]
    dst: PathBuf,

    /// Checkpoint file for resume
    #[arg(long, value_name = "PATH", default_value = ".migrate-checkpoint.json")]
    checkpoint: PathBuf,

    /// Only migrate these extensions (comma-separated, e.g. "epub,pdf,cbz")
    #[arg(long, value_name = "EXTS", value_delimiter = ',')]
    include: Vec<String>,

    /// Number of concurrent transfer workers
    #[arg(long, value_name = "N", default_value_t = 10)]
    concurrency: usize,

    /// Listing page size
    #[arg(long, value_name = "N", default_value_t = 500)]
    page_size: usize,

    /// Hard ceiling on pages pulled in one run
    #[arg(long, value_name = "N", default_value_t = 10_000)]
    max_pages: u64,

    /// Delay between batches, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 500)]
    batch_delay_ms: u64,

    /// How long in-flight transfers may finish after an interrupt, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    shutdown_grace_secs: u64,

    /// Total runs to attempt while items keep failing
    #[arg(long, value_name = "N", default_value_t = 1)]
    max_attempts: u32,

    /// Delay between retry runs, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    retry_delay_secs: u64,

    /// Skip the destination existence probe for items missing from the
    /// checkpoint (faster, but a lost checkpoint then causes re-uploads)
    #[arg(long)]
    no_probe: bool,

    /// Plan and probe but transfer nothing
    #[arg(long)]
    dry_run: bool,

    /// Print every item as it completes
    #[arg(long)]
    verbose: bool,
}

/// CLI implementation of ProgressCallback for displaying migration progress
struct CliProgress {
    verbose: bool,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress { verbose }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_run_started(&self, state: &MigrationState) {
        if state.completed.is_empty() {
            eprintln!("Starting migration {}", state.migration_id);
        } else {
            eprintln!(
                "Resuming migration {} ({} items already completed)",
                state.migration_id,
                state.completed.len()
            );
        }
        eprintln!();
    }

    fn on_item_completed(&self, key: &str, outcome: &TransferOutcome) {
        if !self.verbose {
            return;
        }
        match outcome {
            TransferOutcome::Uploaded(bytes) => {
                eprintln!("  Uploaded: {} ({})", key, Self::format_bytes(*bytes));
            }
            TransferOutcome::Skipped(reason) => {
                eprintln!("  Skipped: {} ({})", key, reason);
            }
            TransferOutcome::Failed(e) => {
                eprintln!("  Failed: {} ({})", key, e);
            }
        }
    }

    fn on_batch_committed(&self, state: &MigrationState, _batch_size: usize) {
        eprintln!(
            "Progress: {}/{} processed ({} uploaded, {} skipped, {} errors)",
            state.processed_count,
            state.total_items,
            state.uploaded_count,
            state.skipped_count,
            state.error_count
        );
    }

    fn on_run_completed(&self, summary: &RunSummary) {
        eprintln!();
        if summary.dry_run {
            eprintln!("Dry run complete (nothing was transferred)");
        } else {
            eprintln!("Migration run complete!");
        }
        eprintln!(
            "Summary: {} uploaded, {} skipped, {} errors",
            summary.uploaded, summary.skipped, summary.errors
        );
        eprintln!(
            "Enumerated {} pages: {} already done, {} duplicates, {} filtered out",
            summary.pages, summary.already_complete, summary.duplicates, summary.dropped
        );
        eprintln!(
            "Bytes uploaded: {}",
            Self::format_bytes(summary.bytes_uploaded)
        );
        eprintln!("Elapsed: {}", Self::format_duration(summary.elapsed));

        match summary.halt {
            HaltReason::Exhausted => {}
            HaltReason::Interrupted => {
                eprintln!();
                eprintln!("Interrupted; progress was checkpointed. Re-run to continue.");
            }
            HaltReason::PageCeiling => {
                eprintln!();
                eprintln!("Stopped at the page ceiling; raise --max-pages if the source is this large.");
            }
            HaltReason::SourceError => {
                eprintln!();
                eprintln!("The source listing failed mid-run; re-run to continue.");
            }
        }

        if summary.errors > 0 {
            eprintln!();
            eprintln!(
                "{} items failed and were not checkpointed; re-run to retry them.",
                summary.errors
            );
        }
    }
}

/// Parse and validate command-line arguments, then run the migration
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let exit_code = match run_cli(&args).await {
        Ok(_) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
async fn run_cli(args: &Args) -> Result<RunSummary, String> {
    let config = EngineConfig {
        checkpoint_path: args.checkpoint.clone(),
        concurrency: args.concurrency,
        page_ceiling: args.max_pages,
        batch_delay: Duration::from_millis(args.batch_delay_ms),
        shutdown_grace: Duration::from_secs(args.shutdown_grace_secs),
        include_extensions: args.include.clone(),
        probe_destination: !args.no_probe,
        dry_run: args.dry_run,
    };

    let scheduler =
        Scheduler::new(config).map_err(|e| format!("Configuration invalid: {}", e))?;

    let source = FsSource::open(&args.src, args.page_size)
        .map_err(|e| format!("Cannot open source: {}", e))?;
    let destination = FsDestination::open(&args.dst)
        .map_err(|e| format!("Cannot open destination: {}", e))?;

    let shutdown = ShutdownCoordinator::new();
    shutdown.listen_for_signals();

    let progress = CliProgress::new(args.verbose);

    scheduler
        .run_with_retries(
            Arc::new(source),
            Arc::new(destination),
            &shutdown.token(),
            Some(&progress),
            args.max_attempts,
            Duration::from_secs(args.retry_delay_secs),
        )
        .await
        .map_err(|e| format!("Migration failed: {}", e))
}
