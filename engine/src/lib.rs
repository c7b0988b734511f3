//! # Migration Engine - Resumable Bulk Object Transfer Library
//!
//! A headless engine for migrating large object collections between storage
//! backends, built to survive crashes, interruption and partial failure
//! without redoing finished work or writing duplicates.
//!
//! ## Overview
//!
//! The engine enumerates a paginated source listing, transfers each object to
//! a destination store through a bounded pool of concurrent workers, and
//! persists a checkpoint after every batch. It features:
//! - Paginated enumeration that tolerates duplicate and stale listings
//! - Idempotent re-runs via checkpoint and destination existence probes
//! - Per-item error isolation (a failed item never aborts the run)
//! - Bounded concurrency with a batch barrier before every commit
//! - Graceful shutdown with a guaranteed final checkpoint save
//! - Progress reporting via callbacks (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use engine::{EngineConfig, FsDestination, FsSource, Scheduler, ShutdownCoordinator};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(FsSource::open("/library", 500)?);
//! let destination = Arc::new(FsDestination::open("/mnt/archive")?);
//!
//! let scheduler = Scheduler::new(EngineConfig::default())?;
//! let shutdown = ShutdownCoordinator::new();
//! shutdown.listen_for_signals();
//!
//! let summary = scheduler
//!     .run(source, destination, &shutdown.token(), None)
//!     .await?;
//! println!("uploaded {} objects", summary.uploaded);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (MigrationState, CandidateItem, outcomes)
//! - **error**: Error types and handling
//! - **config**: Engine configuration
//! - **store**: Source/destination adapter traits
//! - **checkpoint**: Checkpoint persistence
//! - **enumerate**: Paginated source enumeration with dedup and safety ceiling
//! - **naming**: Destination naming policy and content types
//! - **transfer**: Per-object transfer worker
//! - **scheduler**: Batch scheduling, bounded concurrency, retries
//! - **shutdown**: Signal handling and cancellation
//! - **progress**: Progress callback trait
//! - **fs_store**: Local filesystem adapters

pub mod checkpoint;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod fs_store;
pub mod model;
pub mod naming;
pub mod progress;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod transfer;

// Re-export main types and functions
pub use checkpoint::CheckpointStore;
pub use config::EngineConfig;
pub use error::EngineError;
pub use fs_store::{FsDestination, FsSource};
pub use model::{
    CandidateItem, HaltReason, MigrationState, Page, RunSummary, SkipReason, TransferOutcome,
};
pub use progress::ProgressCallback;
pub use scheduler::Scheduler;
pub use shutdown::ShutdownCoordinator;
pub use store::{ObjectDestination, ObjectMeta, ObjectSource};
