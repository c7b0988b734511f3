//! Engine configuration.
//!
//! All knobs are fixed for the lifetime of a run; nothing auto-scales. The
//! concurrency cap and inter-batch delay exist to stay inside the rate-limit
//! budgets of the source and destination backends.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::EngineError;

/// Configuration for a migration run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Where the checkpoint file lives
    pub checkpoint_path: PathBuf,

    /// Maximum number of concurrent transfer workers
    pub concurrency: usize,

    /// Hard ceiling on pages pulled from the source in one run. Protects
    /// against backends stuck in a pagination loop.
    pub page_ceiling: u64,

    /// Fixed delay between batches (backpressure against rate limits)
    pub batch_delay: Duration,

    /// How long in-flight workers may keep running after a shutdown request
    pub shutdown_grace: Duration,

    /// File extensions to migrate (without leading dot). Empty means all.
    pub include_extensions: Vec<String>,

    /// Probe the destination for items missing from the checkpoint. On by
    /// default: it makes re-runs idempotent even when the checkpoint was lost.
    pub probe_destination: bool,

    /// Plan and probe but transfer nothing, and never touch the checkpoint
    pub dry_run: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            checkpoint_path: PathBuf::from(".migrate-checkpoint.json"),
            concurrency: 10,
            page_ceiling: 10_000,
            batch_delay: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(30),
            include_extensions: Vec::new(),
            probe_destination: true,
            dry_run: false,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration. Violations are configuration-class errors
    /// and abort before any work starts.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.concurrency == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "concurrency must be at least 1".to_string(),
            });
        }
        if self.page_ceiling == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "page ceiling must be at least 1".to_string(),
            });
        }
        if self.checkpoint_path.as_os_str().is_empty() {
            return Err(EngineError::InvalidConfig {
                reason: "checkpoint path is empty".to_string(),
            });
        }
        Ok(())
    }

    /// Whether an identifier passes the inclusion filter.
    ///
    /// With a non-empty extension list, identifiers without an extension are
    /// dropped; matching is case-insensitive and tolerates entries written
    /// with a leading dot.
    pub fn matches_include(&self, key: &str) -> bool {
        if self.include_extensions.is_empty() {
            return true;
        }
        let ext = Path::new(key).extension().and_then(|e| e.to_str());
        match ext {
            Some(ext) => self
                .include_extensions
                .iter()
                .any(|inc| inc.trim_start_matches('.').eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}
