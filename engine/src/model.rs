//! Core data model for migration runs.
//!
//! This module defines the main data structures for representing a migration:
//! - MigrationState: persisted progress of the whole migration
//! - CandidateItem / Page: what the source enumerator produces
//! - TransferOutcome / SkipReason: the result of processing one item
//! - RunSummary / HaltReason: per-run reporting

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Persisted progress of a migration, owned and mutated exclusively by the
/// scheduler. The checkpoint store only serializes and deserializes it.
///
/// Counter semantics across runs:
/// - `uploaded_count` and `skipped_count` are cumulative: each distinct
///   identifier is charged exactly once, when it first reaches a non-failed
///   outcome. That is also the moment it enters `completed`, so
///   `uploaded_count + skipped_count == completed.len()` on every persisted
///   boundary.
/// - `error_count` belongs to the run that observed the failures; it resets
///   at run start because failed items stay eligible for retry.
/// - `processed_count` is re-derived at run start so the invariant
///   `processed_count == uploaded_count + skipped_count + error_count` holds
///   at every persisted boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationState {
    /// Stable id for this migration, minted when the state is first created
    #[serde(default = "Uuid::new_v4")]
    pub migration_id: Uuid,

    /// Largest count of distinct eligible candidates any enumeration has seen
    #[serde(default)]
    pub total_items: u64,

    /// Items that reached a terminal outcome (see counter semantics above)
    #[serde(default)]
    pub processed_count: u64,

    /// Items transferred to the destination by this migration
    #[serde(default)]
    pub uploaded_count: u64,

    /// Items that failed during the current run
    #[serde(default)]
    pub error_count: u64,

    /// Items confirmed already present at the destination
    #[serde(default)]
    pub skipped_count: u64,

    /// When the migration first started
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// Identifier of the last item folded into this state
    #[serde(default)]
    pub last_item: Option<String>,

    /// Identifiers that were transferred or confirmed present at the
    /// destination. Only ever grows. Ordered so the serialized form is a
    /// stable sequence.
    #[serde(default)]
    pub completed: BTreeSet<String>,
}

impl MigrationState {
    /// A zero-valued state for a fresh migration.
    pub fn new() -> Self {
        MigrationState {
            migration_id: Uuid::new_v4(),
            total_items: 0,
            processed_count: 0,
            uploaded_count: 0,
            error_count: 0,
            skipped_count: 0,
            started_at: None,
            last_item: None,
            completed: BTreeSet::new(),
        }
    }

    /// Prepare a restored (or fresh) state for a new run: stamp the start
    /// time on first use, clear the previous run's error count and re-derive
    /// `processed_count` so the counter invariant holds.
    pub fn begin_run(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.error_count = 0;
        self.processed_count = self.uploaded_count + self.skipped_count;
    }

    /// Fold one item outcome into the counters. Non-failed items enter
    /// `completed`; failed items stay out and remain eligible for retry.
    /// Dry-run skips are counted but never admitted to `completed`.
    pub fn apply_outcome(&mut self, key: &str, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Uploaded(_) => {
                self.uploaded_count += 1;
                self.completed.insert(key.to_string());
            }
            TransferOutcome::Skipped(SkipReason::AlreadyExists) => {
                self.skipped_count += 1;
                self.completed.insert(key.to_string());
            }
            TransferOutcome::Skipped(SkipReason::DryRun) => {
                self.skipped_count += 1;
            }
            TransferOutcome::Failed(_) => {
                self.error_count += 1;
            }
        }
        self.processed_count += 1;
        self.last_item = Some(key.to_string());
        debug_assert_eq!(
            self.processed_count,
            self.uploaded_count + self.skipped_count + self.error_count
        );
    }
}

impl Default for MigrationState {
    fn default() -> Self {
        MigrationState::new()
    }
}

/// One candidate produced by the source enumerator.
///
/// Identifiers are not guaranteed unique across pages; the enumerator
/// deduplicates before the scheduler ever sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    /// Source identifier (path or key)
    pub key: String,

    /// Size in bytes when the backend reports one
    pub size_hint: Option<u64>,
}

impl CandidateItem {
    pub fn new(key: impl Into<String>) -> Self {
        CandidateItem {
            key: key.into(),
            size_hint: None,
        }
    }

    pub fn with_size(key: impl Into<String>, size: u64) -> Self {
        CandidateItem {
            key: key.into(),
            size_hint: Some(size),
        }
    }
}

/// One page of a source listing.
///
/// Termination is signaled by `next_cursor` being `None`, never by an empty
/// `items` list: some backends legitimately return empty pages mid-sequence.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<CandidateItem>,
    pub next_cursor: Option<String>,
}

/// Why an item was skipped without a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Already present at the destination
    AlreadyExists,
    /// Dry-run mode: the transfer was planned but not performed
    DryRun,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyExists => write!(f, "already exists at destination"),
            SkipReason::DryRun => write!(f, "dry run"),
        }
    }
}

/// Result of processing a single item.
#[derive(Debug)]
pub enum TransferOutcome {
    /// Transferred; payload size in bytes
    Uploaded(u64),
    /// Not transferred, for a benign reason
    Skipped(SkipReason),
    /// Fetch or write failed; the item stays eligible for retry
    Failed(EngineError),
}

/// Why a run stopped pulling pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The source signaled the terminal cursor
    Exhausted,
    /// The hard page ceiling was reached
    PageCeiling,
    /// A shutdown signal was observed
    Interrupted,
    /// A page listing failed; the run ended early so it can be retried
    SourceError,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::Exhausted => write!(f, "source exhausted"),
            HaltReason::PageCeiling => write!(f, "page ceiling reached"),
            HaltReason::Interrupted => write!(f, "interrupted"),
            HaltReason::SourceError => write!(f, "source listing failed"),
        }
    }
}

/// Per-run report, computed as a delta over the persisted counters.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub migration_id: Uuid,
    pub dry_run: bool,

    /// Distinct eligible candidates known after this run
    pub total_items: u64,
    /// Items uploaded by this run
    pub uploaded: u64,
    /// Items skipped by this run
    pub skipped: u64,
    /// Items that failed during this run
    pub errors: u64,
    /// Items this run processed to a terminal outcome
    pub processed: u64,
    /// Bytes uploaded by this run
    pub bytes_uploaded: u64,

    /// Identifiers the enumerator saw more than once
    pub duplicates: u64,
    /// Identifiers dropped by the inclusion filter
    pub dropped: u64,
    /// Identifiers already in the checkpoint when enumerated
    pub already_complete: u64,
    /// Pages pulled from the source
    pub pages: u64,

    pub elapsed: Duration,
    pub halt: HaltReason,
}

impl RunSummary {
    /// Whether an outer retry loop should re-run the engine: some items
    /// failed, or enumeration ended early on a listing error. Dry runs are
    /// never retried.
    pub fn needs_retry(&self) -> bool {
        !self.dry_run && (self.errors > 0 || self.halt == HaltReason::SourceError)
    }
}
