//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which decouples the
//! migration engine from any specific reporting surface (CLI, automation).
//! All rendering lives behind it; the engine itself never prints.

use crate::model::{MigrationState, RunSummary, TransferOutcome};

/// Trait for receiving progress updates from a migration run.
///
/// Implement this trait to observe a run. The CLI provides a stderr
/// implementation. All methods are called from the scheduler, after the
/// batch barrier, so implementations see consistent state.
pub trait ProgressCallback: Send + Sync {
    /// Called once, after the checkpoint has been restored.
    fn on_run_started(&self, state: &MigrationState);

    /// Called for each item folded into the state, in fold order.
    fn on_item_completed(&self, key: &str, outcome: &TransferOutcome);

    /// Called after a batch's outcomes were folded in and the checkpoint
    /// save was attempted.
    fn on_batch_committed(&self, state: &MigrationState, batch_size: usize);

    /// Called when the run is over, with the per-run summary.
    fn on_run_completed(&self, summary: &RunSummary);
}
