//! Storage adapter boundary.
//!
//! The engine is backend-agnostic: it talks to the origin store through
//! `ObjectSource` and to the destination through `ObjectDestination`. The
//! filesystem adapters in `fs_store` implement both; remote backends plug in
//! the same way.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::Page;

/// Metadata attached to every destination write.
///
/// The original (pre-sanitization) identifier travels with the object so it
/// is always recoverable, no matter how aggressively the destination naming
/// policy rewrote the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Identifier the object had at the source
    pub original_key: String,

    /// When the transfer landed
    pub migrated_at: DateTime<Utc>,
}

/// Paginated listing and payload access against the origin store.
///
/// The listing is treated as untrusted: pages may repeat identifiers and the
/// cursor may fail to advance. The enumerator compensates; implementations
/// just report what the backend returns.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Fetch one page of candidate identifiers. A `cursor` of `None` starts
    /// the listing; a returned `next_cursor` of `None` is the terminal
    /// marker. An empty `items` list with a non-terminal cursor is valid.
    async fn next_page(&self, cursor: Option<&str>) -> Result<Page, EngineError>;

    /// Fetch the full payload for one identifier.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, EngineError>;
}

/// Existence probe and write access against the destination store.
#[async_trait]
pub trait ObjectDestination: Send + Sync {
    /// Cheap metadata-only existence check. Not-found is `Ok(false)`; only
    /// genuine transport or auth failures are errors.
    async fn exists(&self, key: &str) -> Result<bool, EngineError>;

    /// Write one object. Must return `Ok` only after the destination has
    /// confirmed the write; a partial write is never success.
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        meta: &ObjectMeta,
    ) -> Result<(), EngineError>;
}
