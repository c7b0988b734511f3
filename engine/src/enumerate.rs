//! Source enumeration.
//!
//! `Enumeration` drives sequential pagination over an `ObjectSource` and
//! shields the scheduler from backend listing quirks: repeated identifiers
//! across pages, cursors that stop advancing, and pagination that never
//! terminates. Termination is signaled by the terminal cursor, never by an
//! empty page.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::CandidateItem;
use crate::store::ObjectSource;

/// Stateful pagination over one source listing. One page is in flight at a
/// time; cursors are backend-stateful and inherently ordered.
pub struct Enumeration<'a> {
    source: Arc<dyn ObjectSource>,
    config: &'a EngineConfig,

    cursor: Option<String>,
    finished: bool,
    hit_ceiling: bool,

    pages_fetched: u64,
    seen: HashSet<String>,
    duplicate_count: u64,
    stalled_cursor_count: u64,
    dropped_count: u64,
}

impl<'a> Enumeration<'a> {
    pub fn new(source: Arc<dyn ObjectSource>, config: &'a EngineConfig) -> Self {
        Enumeration {
            source,
            config,
            cursor: None,
            finished: false,
            hit_ceiling: false,
            pages_fetched: 0,
            seen: HashSet::new(),
            duplicate_count: 0,
            stalled_cursor_count: 0,
            dropped_count: 0,
        }
    }

    /// Pull the next page and return its fresh candidates: deduplicated
    /// against everything seen this run and filtered by the inclusion
    /// predicate. `None` means enumeration is over (terminal cursor or page
    /// ceiling). An all-duplicate or legitimately empty page returns
    /// `Some(vec![])` and enumeration continues.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<CandidateItem>>, EngineError> {
        if self.finished {
            return Ok(None);
        }
        if self.pages_fetched >= self.config.page_ceiling {
            warn!(
                pages = self.pages_fetched,
                "page ceiling reached; halting enumeration as a safety measure"
            );
            self.hit_ceiling = true;
            self.finished = true;
            return Ok(None);
        }

        let page = self.source.next_page(self.cursor.as_deref()).await?;
        self.pages_fetched += 1;

        if page.next_cursor.is_some() && page.next_cursor == self.cursor {
            // Non-fatal anomaly: the backend handed back the cursor we just
            // used. The page ceiling bounds how long this can go on.
            self.stalled_cursor_count += 1;
            warn!(
                cursor = page.next_cursor.as_deref().unwrap_or(""),
                "source cursor did not advance"
            );
        }

        let mut fresh = Vec::with_capacity(page.items.len());
        for item in page.items {
            if !self.config.matches_include(&item.key) {
                self.dropped_count += 1;
                continue;
            }
            if !self.seen.insert(item.key.clone()) {
                self.duplicate_count += 1;
                continue;
            }
            fresh.push(item);
        }

        if self.duplicate_count > 0 && fresh.is_empty() && page.next_cursor.is_some() {
            warn!(
                duplicates = self.duplicate_count,
                "source page contained only already-seen identifiers"
            );
        }

        if page.next_cursor.is_none() {
            self.finished = true;
        }
        self.cursor = page.next_cursor;

        Ok(Some(fresh))
    }

    /// Distinct identifiers that passed the inclusion filter so far.
    pub fn distinct_seen(&self) -> u64 {
        self.seen.len() as u64
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicate_count
    }

    pub fn dropped(&self) -> u64 {
        self.dropped_count
    }

    pub fn stalled_cursors(&self) -> u64 {
        self.stalled_cursor_count
    }

    /// Whether enumeration was halted by the page ceiling rather than the
    /// terminal cursor.
    pub fn hit_ceiling(&self) -> bool {
        self.hit_ceiling
    }

    /// Whether the listing has ended (terminal cursor or page ceiling).
    pub fn is_exhausted(&self) -> bool {
        self.finished
    }
}
