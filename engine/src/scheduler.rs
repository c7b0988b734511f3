//! Batch scheduling.
//!
//! The scheduler owns the `MigrationState` for the lifetime of a run. It
//! pulls pages from the enumerator, filters out work that is already done,
//! fans the remainder out to a bounded pool of transfer workers, folds the
//! outcomes back in after the batch barrier and persists the checkpoint on
//! every batch boundary. Workers never mutate shared state; they return
//! outcomes for the scheduler to fold in, so the state needs no locking.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::config::EngineConfig;
use crate::enumerate::Enumeration;
use crate::error::EngineError;
use crate::model::{
    CandidateItem, HaltReason, MigrationState, RunSummary, SkipReason, TransferOutcome,
};
use crate::progress::ProgressCallback;
use crate::store::{ObjectDestination, ObjectSource};
use crate::transfer;

/// Counter values at run start, for per-run delta reporting.
struct CounterSnapshot {
    uploaded: u64,
    skipped: u64,
    processed: u64,
}

impl CounterSnapshot {
    fn of(state: &MigrationState) -> Self {
        CounterSnapshot {
            uploaded: state.uploaded_count,
            skipped: state.skipped_count,
            processed: state.processed_count,
        }
    }
}

/// Drives a migration: enumeration, filtering, bounded-concurrency transfer,
/// checkpoint commits and shutdown handling.
pub struct Scheduler {
    config: EngineConfig,
    checkpoint: CheckpointStore,
}

impl Scheduler {
    /// Create a scheduler. Fails fast on configuration-class errors; no work
    /// has started at that point.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let checkpoint = CheckpointStore::new(&config.checkpoint_path);
        Ok(Scheduler { config, checkpoint })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    /// Execute one migration run to completion (or interruption).
    ///
    /// Per-item failures are folded into the counters and never abort the
    /// run; a failed page listing halts enumeration early but still ends the
    /// run cleanly with a summary, so the operator can re-run.
    pub async fn run(
        &self,
        source: Arc<dyn ObjectSource>,
        destination: Arc<dyn ObjectDestination>,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<RunSummary, EngineError> {
        let run_id = Uuid::new_v4();
        let run_started = Instant::now();

        let mut state = self.checkpoint.load();
        state.begin_run();
        let baseline = CounterSnapshot::of(&state);

        info!(
            run_id = %run_id,
            migration_id = %state.migration_id,
            completed = state.completed.len(),
            dry_run = self.config.dry_run,
            "migration run starting"
        );
        if let Some(progress) = progress {
            progress.on_run_started(&state);
        }

        let mut enumeration = Enumeration::new(Arc::clone(&source), &self.config);
        let mut halt = HaltReason::Exhausted;
        let mut already_complete: u64 = 0;
        let mut bytes_uploaded: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                halt = HaltReason::Interrupted;
                break;
            }

            let batch = match enumeration.next_batch().await {
                Ok(Some(items)) => items,
                Ok(None) => {
                    if enumeration.hit_ceiling() {
                        halt = HaltReason::PageCeiling;
                    }
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "source listing failed; halting enumeration");
                    halt = HaltReason::SourceError;
                    break;
                }
            };

            state.total_items = state.total_items.max(enumeration.distinct_seen());

            // Filter and probe before dispatching. Probing is what keeps
            // re-runs idempotent even when the checkpoint was lost: items
            // already at the destination are skipped without a transfer.
            let mut folded: Vec<(String, TransferOutcome)> = Vec::new();
            let mut to_transfer: Vec<CandidateItem> = Vec::new();
            for item in batch {
                if state.completed.contains(&item.key) {
                    already_complete += 1;
                    continue;
                }
                if self.config.probe_destination {
                    match destination.exists(&transfer::destination_key(&item)).await {
                        Ok(true) => {
                            folded.push((
                                item.key,
                                TransferOutcome::Skipped(SkipReason::AlreadyExists),
                            ));
                            continue;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            folded.push((item.key, TransferOutcome::Failed(e)));
                            continue;
                        }
                    }
                }
                if self.config.dry_run {
                    folded.push((item.key, TransferOutcome::Skipped(SkipReason::DryRun)));
                    continue;
                }
                to_transfer.push(item);
            }

            folded.extend(
                self.run_batch(&source, &destination, cancel, to_transfer)
                    .await,
            );

            if folded.is_empty() {
                continue;
            }

            // Batch barrier has passed: fold every outcome into the state the
            // scheduler owns, then commit.
            let batch_size = folded.len();
            for (key, outcome) in &folded {
                match outcome {
                    TransferOutcome::Uploaded(bytes) => {
                        bytes_uploaded += *bytes;
                        debug!(key = key.as_str(), bytes, "uploaded");
                    }
                    TransferOutcome::Skipped(reason) => {
                        debug!(key = key.as_str(), reason = %reason, "skipped");
                    }
                    TransferOutcome::Failed(e) => {
                        warn!(key = key.as_str(), error = %e, "item transfer failed");
                    }
                }
                if let Some(progress) = progress {
                    progress.on_item_completed(key, outcome);
                }
                state.apply_outcome(key, outcome);
            }

            if !self.config.dry_run {
                if let Err(e) = self.checkpoint.save(&state) {
                    warn!(error = %e, "checkpoint save failed; will retry on the next batch");
                }
            }
            if let Some(progress) = progress {
                progress.on_batch_committed(&state, batch_size);
            }
            info!(
                processed = state.processed_count,
                total = state.total_items,
                errors = state.error_count,
                "batch committed"
            );

            if !enumeration.is_exhausted() && !cancel.is_cancelled() {
                tokio::select! {
                    _ = sleep(self.config.batch_delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        // Final save: guarantees the state as of the last completed batch is
        // on disk, including when a shutdown arrived before any batch ran.
        if !self.config.dry_run {
            if let Err(e) = self.checkpoint.save(&state) {
                warn!(error = %e, "final checkpoint save failed");
            }
        }

        let summary = RunSummary {
            run_id,
            migration_id: state.migration_id,
            dry_run: self.config.dry_run,
            total_items: state.total_items,
            uploaded: state.uploaded_count - baseline.uploaded,
            skipped: state.skipped_count - baseline.skipped,
            errors: state.error_count,
            processed: state.processed_count - baseline.processed,
            bytes_uploaded,
            duplicates: enumeration.duplicates(),
            dropped: enumeration.dropped(),
            already_complete,
            pages: enumeration.pages_fetched(),
            elapsed: run_started.elapsed(),
            halt,
        };

        info!(
            run_id = %run_id,
            uploaded = summary.uploaded,
            skipped = summary.skipped,
            errors = summary.errors,
            halt = %summary.halt,
            "migration run finished"
        );
        if let Some(progress) = progress {
            progress.on_run_completed(&summary);
        }

        Ok(summary)
    }

    /// Re-run the engine until it comes back clean, up to `max_attempts`
    /// total runs with a fixed delay between them. Failed items were never
    /// added to `completed`, so each re-run picks up exactly the remainder.
    pub async fn run_with_retries(
        &self,
        source: Arc<dyn ObjectSource>,
        destination: Arc<dyn ObjectDestination>,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressCallback>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<RunSummary, EngineError> {
        let max_attempts = max_attempts.max(1);
        let mut summary = self
            .run(
                Arc::clone(&source),
                Arc::clone(&destination),
                cancel,
                progress,
            )
            .await?;

        let mut attempt = 1;
        while attempt < max_attempts
            && summary.needs_retry()
            && summary.halt != HaltReason::Interrupted
            && !cancel.is_cancelled()
        {
            info!(
                attempt = attempt + 1,
                errors = summary.errors,
                "re-running to pick up failed items"
            );
            tokio::select! {
                _ = sleep(retry_delay) => {}
                _ = cancel.cancelled() => break,
            }
            summary = self
                .run(
                    Arc::clone(&source),
                    Arc::clone(&destination),
                    cancel,
                    progress,
                )
                .await?;
            attempt += 1;
        }

        Ok(summary)
    }

    /// Dispatch a batch to at most `concurrency` concurrent workers and wait
    /// for all of them (the batch barrier). Once a shutdown is requested no
    /// further workers are spawned and the drain is bounded by the shutdown
    /// grace; workers still running after that are aborted, and their items
    /// simply stay out of `completed` for the next run to retry.
    async fn run_batch(
        &self,
        source: &Arc<dyn ObjectSource>,
        destination: &Arc<dyn ObjectDestination>,
        cancel: &CancellationToken,
        to_transfer: Vec<CandidateItem>,
    ) -> Vec<(String, TransferOutcome)> {
        let mut outcomes = Vec::with_capacity(to_transfer.len());
        let mut workers: JoinSet<(String, TransferOutcome)> = JoinSet::new();

        for item in to_transfer {
            if cancel.is_cancelled() {
                break;
            }
            while workers.len() >= self.config.concurrency {
                match workers.join_next().await {
                    Some(Ok(pair)) => outcomes.push(pair),
                    Some(Err(e)) => warn!(error = %e, "transfer worker aborted unexpectedly"),
                    None => break,
                }
            }
            let source = Arc::clone(source);
            let destination = Arc::clone(destination);
            workers.spawn(async move {
                let outcome =
                    transfer::transfer_one(source.as_ref(), destination.as_ref(), &item).await;
                (item.key, outcome)
            });
        }

        let mut deadline: Option<Instant> = None;
        loop {
            if cancel.is_cancelled() && deadline.is_none() {
                deadline = Some(Instant::now() + self.config.shutdown_grace);
            }
            let joined = match deadline {
                Some(deadline) => match timeout_at(deadline, workers.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!("shutdown grace elapsed; aborting in-flight transfers");
                        workers.abort_all();
                        while let Some(res) = workers.join_next().await {
                            if let Ok(pair) = res {
                                outcomes.push(pair);
                            }
                        }
                        break;
                    }
                },
                None => workers.join_next().await,
            };
            match joined {
                Some(Ok(pair)) => outcomes.push(pair),
                Some(Err(e)) => {
                    if !e.is_cancelled() {
                        warn!(error = %e, "transfer worker aborted unexpectedly");
                    }
                }
                None => break,
            }
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Page;
    use crate::store::ObjectMeta;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::io;
    use std::sync::Mutex;

    /// Pages are served by index; the cursor is the next index as a string.
    struct MockSource {
        pages: Vec<Page>,
        objects: HashMap<String, Vec<u8>>,
        fail_fetch: Mutex<HashSet<String>>,
        fail_fetch_once: bool,
    }

    impl MockSource {
        fn new(script: Vec<Vec<&str>>) -> Self {
            let total = script.len();
            let pages = script
                .into_iter()
                .enumerate()
                .map(|(i, keys)| Page {
                    items: keys.iter().map(|k| CandidateItem::new(*k)).collect(),
                    next_cursor: if i + 1 < total {
                        Some((i + 1).to_string())
                    } else {
                        None
                    },
                })
                .collect();
            let mut source = MockSource {
                pages,
                objects: HashMap::new(),
                fail_fetch: Mutex::new(HashSet::new()),
                fail_fetch_once: false,
            };
            for page in &source.pages {
                for item in &page.items {
                    source
                        .objects
                        .insert(item.key.clone(), item.key.as_bytes().to_vec());
                }
            }
            source
        }

        fn failing(mut self, keys: &[&str]) -> Self {
            *self.fail_fetch.get_mut().unwrap() = keys.iter().map(|k| k.to_string()).collect();
            self
        }

        fn failing_once(mut self, keys: &[&str]) -> Self {
            self = self.failing(keys);
            self.fail_fetch_once = true;
            self
        }
    }

    #[async_trait]
    impl ObjectSource for MockSource {
        async fn next_page(&self, cursor: Option<&str>) -> Result<Page, EngineError> {
            let idx: usize = match cursor {
                None => 0,
                Some(c) => c.parse().expect("mock cursor is an index"),
            };
            match self.pages.get(idx) {
                Some(page) => Ok(page.clone()),
                None => Ok(Page {
                    items: Vec::new(),
                    next_cursor: None,
                }),
            }
        }

        async fn fetch(&self, key: &str) -> Result<Vec<u8>, EngineError> {
            let mut failing = self.fail_fetch.lock().unwrap();
            if failing.contains(key) {
                if self.fail_fetch_once {
                    failing.remove(key);
                }
                return Err(EngineError::FetchFailed {
                    key: key.to_string(),
                    source: io::Error::new(io::ErrorKind::TimedOut, "simulated timeout"),
                });
            }
            drop(failing);
            self.objects
                .get(key)
                .cloned()
                .ok_or_else(|| EngineError::FetchFailed {
                    key: key.to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no such object"),
                })
        }
    }

    #[derive(Default)]
    struct MockDestination {
        stored: Mutex<HashMap<String, ObjectMeta>>,
        put_counts: Mutex<HashMap<String, usize>>,
        probe_fails: bool,
    }

    impl MockDestination {
        fn with_existing(keys: &[&str]) -> Self {
            let dest = MockDestination::default();
            let mut stored = dest.stored.lock().unwrap();
            for key in keys {
                stored.insert(
                    key.to_string(),
                    ObjectMeta {
                        original_key: key.to_string(),
                        migrated_at: chrono::Utc::now(),
                    },
                );
            }
            drop(stored);
            dest
        }

        fn put_count(&self, key: &str) -> usize {
            *self.put_counts.lock().unwrap().get(key).unwrap_or(&0)
        }
    }

    #[async_trait]
    impl ObjectDestination for MockDestination {
        async fn exists(&self, key: &str) -> Result<bool, EngineError> {
            if self.probe_fails {
                return Err(EngineError::ProbeFailed {
                    key: key.to_string(),
                    source: io::Error::new(io::ErrorKind::ConnectionRefused, "probe refused"),
                });
            }
            Ok(self.stored.lock().unwrap().contains_key(key))
        }

        async fn put(
            &self,
            key: &str,
            _bytes: Vec<u8>,
            _content_type: &str,
            meta: &ObjectMeta,
        ) -> Result<(), EngineError> {
            *self
                .put_counts
                .lock()
                .unwrap()
                .entry(key.to_string())
                .or_insert(0) += 1;
            self.stored
                .lock()
                .unwrap()
                .insert(key.to_string(), meta.clone());
            Ok(())
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> EngineConfig {
        EngineConfig {
            checkpoint_path: dir.path().join("checkpoint.json"),
            concurrency: 4,
            batch_delay: Duration::from_millis(0),
            shutdown_grace: Duration::from_secs(5),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_duplicate_page_counts_distinct_items_once() {
        // Source lists 3 rows across two pages, repeating "a.epub".
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockSource::new(vec![
            vec!["a.epub", "b.epub"],
            vec!["a.epub"],
        ]));
        let dest = Arc::new(MockDestination::default());
        let scheduler = Scheduler::new(test_config(&dir)).unwrap();

        let summary = scheduler
            .run(source, Arc::clone(&dest) as Arc<dyn ObjectDestination>, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.uploaded, 2);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.total_items, 2);
        assert_eq!(summary.halt, HaltReason::Exhausted);

        let state = scheduler.checkpoint().load();
        assert!(state.completed.contains("a.epub"));
        assert!(state.completed.contains("b.epub"));
        assert_eq!(dest.put_count("a.epub"), 1);
    }

    #[tokio::test]
    async fn test_existing_destination_object_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockSource::new(vec![vec!["a.epub", "b.epub"]]));
        let dest = Arc::new(MockDestination::with_existing(&["b.epub"]));
        let scheduler = Scheduler::new(test_config(&dir)).unwrap();

        let summary = scheduler
            .run(source, Arc::clone(&dest) as Arc<dyn ObjectDestination>, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(summary.uploaded, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(dest.put_count("b.epub"), 0);

        // The skipped item still counts as completed
        let state = scheduler.checkpoint().load();
        assert!(state.completed.contains("b.epub"));
    }

    #[tokio::test]
    async fn test_failed_item_stays_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let dest = Arc::new(MockDestination::default());
        let scheduler = Scheduler::new(test_config(&dir)).unwrap();

        // First run: fetching c.epub times out.
        let source = Arc::new(MockSource::new(vec![vec!["c.epub"]]).failing(&["c.epub"]));
        let summary = scheduler
            .run(source, Arc::clone(&dest) as Arc<dyn ObjectDestination>, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.uploaded, 0);

        let state = scheduler.checkpoint().load();
        assert!(!state.completed.contains("c.epub"));

        // Second run against a healthy source retries and succeeds.
        let source = Arc::new(MockSource::new(vec![vec!["c.epub"]]));
        let summary = scheduler
            .run(source, Arc::clone(&dest) as Arc<dyn ObjectDestination>, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(summary.uploaded, 1);
        assert_eq!(summary.errors, 0);
        assert!(scheduler.checkpoint().load().completed.contains("c.epub"));
    }

    #[tokio::test]
    async fn test_checkpoint_never_contains_failed_items() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(
            MockSource::new(vec![vec!["a.epub", "bad.epub", "b.epub"]]).failing(&["bad.epub"]),
        );
        let dest = Arc::new(MockDestination::default());
        let scheduler = Scheduler::new(test_config(&dir)).unwrap();

        let summary = scheduler
            .run(source, dest, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(summary.uploaded, 2);
        assert_eq!(summary.errors, 1);

        let state = scheduler.checkpoint().load();
        assert!(!state.completed.contains("bad.epub"));
        assert_eq!(state.completed.len(), 2);
        assert_eq!(
            state.processed_count,
            state.uploaded_count + state.skipped_count + state.error_count
        );
    }

    #[tokio::test]
    async fn test_second_run_with_lost_checkpoint_is_idempotent() {
        let keys = vec!["a.epub", "b.epub", "c.epub"];
        let dest = Arc::new(MockDestination::default());

        // First run uploads everything.
        let dir1 = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(test_config(&dir1)).unwrap();
        let summary = scheduler
            .run(
                Arc::new(MockSource::new(vec![keys.clone()])),
                Arc::clone(&dest) as Arc<dyn ObjectDestination>,
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(summary.uploaded, 3);

        // Second run with a fresh checkpoint: the prober short-circuits every
        // item, nothing is written twice.
        let dir2 = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(test_config(&dir2)).unwrap();
        let summary = scheduler
            .run(
                Arc::new(MockSource::new(vec![keys.clone()])),
                Arc::clone(&dest) as Arc<dyn ObjectDestination>,
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(summary.uploaded, 0);
        assert_eq!(summary.skipped, 3);
        for key in keys {
            assert_eq!(dest.put_count(key), 1);
        }
    }

    /// Cancels the run after the first committed batch.
    struct CancelAfterFirstBatch {
        cancel: CancellationToken,
    }

    impl ProgressCallback for CancelAfterFirstBatch {
        fn on_run_started(&self, _state: &MigrationState) {}
        fn on_item_completed(&self, _key: &str, _outcome: &TransferOutcome) {}
        fn on_batch_committed(&self, _state: &MigrationState, _batch_size: usize) {
            self.cancel.cancel();
        }
        fn on_run_completed(&self, _summary: &RunSummary) {}
    }

    #[tokio::test]
    async fn test_interrupted_run_resumes_without_duplicate_writes() {
        let dir = tempfile::tempdir().unwrap();
        let dest = Arc::new(MockDestination::default());
        let scheduler = Scheduler::new(test_config(&dir)).unwrap();
        let pages = vec![vec!["a.epub", "b.epub"], vec!["c.epub", "d.epub"]];

        // Run 1 is interrupted after the first batch commits.
        let cancel = CancellationToken::new();
        let watcher = CancelAfterFirstBatch {
            cancel: cancel.clone(),
        };
        let summary = scheduler
            .run(
                Arc::new(MockSource::new(pages.clone())),
                Arc::clone(&dest) as Arc<dyn ObjectDestination>,
                &cancel,
                Some(&watcher),
            )
            .await
            .unwrap();
        assert_eq!(summary.halt, HaltReason::Interrupted);
        assert_eq!(summary.uploaded, 2);

        let after_interrupt = scheduler.checkpoint().load().completed;
        assert_eq!(after_interrupt.len(), 2);

        // Run 2 picks up exactly the remainder.
        let summary = scheduler
            .run(
                Arc::new(MockSource::new(pages)),
                Arc::clone(&dest) as Arc<dyn ObjectDestination>,
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(summary.uploaded, 2);
        assert_eq!(summary.already_complete, 2);

        let state = scheduler.checkpoint().load();
        for key in ["a.epub", "b.epub", "c.epub", "d.epub"] {
            assert!(state.completed.contains(key));
            assert_eq!(dest.put_count(key), 1);
        }
        assert!(after_interrupt.is_subset(&state.completed));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_saves_checkpoint_and_exits() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockSource::new(vec![vec!["a.epub"]]));
        let dest = Arc::new(MockDestination::default());
        let scheduler = Scheduler::new(test_config(&dir)).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = scheduler.run(source, dest, &cancel, None).await.unwrap();

        assert_eq!(summary.halt, HaltReason::Interrupted);
        assert_eq!(summary.processed, 0);
        assert!(scheduler.checkpoint().path().exists());
    }

    #[tokio::test]
    async fn test_probe_failure_counts_as_item_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockSource::new(vec![vec!["a.epub"]]));
        let dest = Arc::new(MockDestination {
            probe_fails: true,
            ..MockDestination::default()
        });
        let scheduler = Scheduler::new(test_config(&dir)).unwrap();

        let summary = scheduler
            .run(source, dest, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(summary.errors, 1);
        assert_eq!(summary.uploaded, 0);
        assert!(!scheduler.checkpoint().load().completed.contains("a.epub"));
    }

    #[tokio::test]
    async fn test_probe_disabled_reuploads_existing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockSource::new(vec![vec!["a.epub"]]));
        let dest = Arc::new(MockDestination::with_existing(&["a.epub"]));
        let config = EngineConfig {
            probe_destination: false,
            ..test_config(&dir)
        };
        let scheduler = Scheduler::new(config).unwrap();

        let summary = scheduler
            .run(source, Arc::clone(&dest) as Arc<dyn ObjectDestination>, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(summary.uploaded, 1);
        assert_eq!(dest.put_count("a.epub"), 1);
    }

    #[tokio::test]
    async fn test_dry_run_transfers_nothing_and_keeps_no_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockSource::new(vec![vec!["a.epub", "b.epub"]]));
        let dest = Arc::new(MockDestination::default());
        let config = EngineConfig {
            dry_run: true,
            ..test_config(&dir)
        };
        let scheduler = Scheduler::new(config).unwrap();

        let summary = scheduler
            .run(source, Arc::clone(&dest) as Arc<dyn ObjectDestination>, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.uploaded, 0);
        assert_eq!(dest.put_count("a.epub"), 0);
        assert!(!scheduler.checkpoint().path().exists());
    }

    #[tokio::test]
    async fn test_run_with_retries_picks_up_transient_failures() {
        let dir = tempfile::tempdir().unwrap();
        // a.epub fails once, then recovers.
        let source = Arc::new(
            MockSource::new(vec![vec!["a.epub", "b.epub"]]).failing_once(&["a.epub"]),
        );
        let dest = Arc::new(MockDestination::default());
        let scheduler = Scheduler::new(test_config(&dir)).unwrap();

        let summary = scheduler
            .run_with_retries(
                source,
                Arc::clone(&dest) as Arc<dyn ObjectDestination>,
                &CancellationToken::new(),
                None,
                3,
                Duration::from_millis(0),
            )
            .await
            .unwrap();

        assert_eq!(summary.errors, 0);
        // The retry run only had a.epub left to upload
        assert_eq!(summary.uploaded, 1);
        assert_eq!(dest.put_count("a.epub"), 1);
        assert_eq!(dest.put_count("b.epub"), 1);

        let state = scheduler.checkpoint().load();
        assert_eq!(state.completed.len(), 2);
        assert_eq!(state.uploaded_count, 2);
    }

    #[tokio::test]
    async fn test_run_with_retries_gives_up_after_max_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockSource::new(vec![vec!["a.epub"]]).failing(&["a.epub"]));
        let dest = Arc::new(MockDestination::default());
        let scheduler = Scheduler::new(test_config(&dir)).unwrap();

        let summary = scheduler
            .run_with_retries(
                source,
                dest,
                &CancellationToken::new(),
                None,
                2,
                Duration::from_millis(0),
            )
            .await
            .unwrap();

        assert_eq!(summary.errors, 1);
        assert!(!scheduler.checkpoint().load().completed.contains("a.epub"));
    }
}
