//! Local filesystem adapters.
//!
//! `FsSource` serves a directory tree as a paginated object listing;
//! `FsDestination` implements the probe-and-put side against a local root.
//! They make the binary usable end-to-end and double as the reference
//! implementations of the adapter traits. Remote backends implement the same
//! traits against their own APIs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{CandidateItem, Page};
use crate::store::{ObjectDestination, ObjectMeta, ObjectSource};

const CURSOR_PREFIX: &str = "after:";

/// Serves a local directory tree as a paginated source listing.
///
/// The tree is walked once at open time and pages are served from the sorted
/// listing; the cursor names the last key of the previous page, so pagination
/// is deterministic and terminates.
#[derive(Debug)]
pub struct FsSource {
    root: PathBuf,
    page_size: usize,
    entries: Vec<(String, u64)>,
}

impl FsSource {
    /// Open a source rooted at `root`. Fails with a configuration-class
    /// error when the root is missing or not a directory.
    pub fn open(root: impl Into<PathBuf>, page_size: usize) -> Result<Self, EngineError> {
        let root = root.into();
        if page_size == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "page size must be at least 1".to_string(),
            });
        }
        match fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(EngineError::SourceUnavailable {
                    path: root,
                    reason: "not a directory".to_string(),
                });
            }
            Err(e) => {
                return Err(EngineError::SourceUnavailable {
                    path: root,
                    reason: e.to_string(),
                });
            }
        }

        let mut entries = Vec::new();
        walk(&root, "", &mut entries).map_err(|e| EngineError::ListFailed {
            cursor: None,
            source: e,
        })?;
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(FsSource {
            root,
            page_size,
            entries,
        })
    }

    /// Number of files the listing knows about.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collect relative key and size for every file under `dir`.
fn walk(dir: &Path, rel: &str, entries: &mut Vec<(String, u64)>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel_path = if rel.is_empty() {
            name
        } else {
            format!("{}/{}", rel, name)
        };
        if meta.is_dir() {
            walk(&entry.path(), &rel_path, entries)?;
        } else {
            entries.push((rel_path, meta.len()));
        }
    }
    Ok(())
}

#[async_trait]
impl ObjectSource for FsSource {
    async fn next_page(&self, cursor: Option<&str>) -> Result<Page, EngineError> {
        let start = match cursor {
            None => 0,
            Some(cursor) => {
                let after = cursor
                    .strip_prefix(CURSOR_PREFIX)
                    .ok_or_else(|| EngineError::ListFailed {
                        cursor: Some(cursor.to_string()),
                        source: io::Error::new(io::ErrorKind::InvalidInput, "malformed cursor"),
                    })?;
                self.entries.partition_point(|(key, _)| key.as_str() <= after)
            }
        };

        let end = (start + self.page_size).min(self.entries.len());
        let items = self.entries[start..end]
            .iter()
            .map(|(key, size)| CandidateItem::with_size(key.clone(), *size))
            .collect();
        let next_cursor = if end < self.entries.len() {
            Some(format!("{}{}", CURSOR_PREFIX, self.entries[end - 1].0))
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, EngineError> {
        tokio::fs::read(self.root.join(key))
            .await
            .map_err(|e| EngineError::FetchFailed {
                key: key.to_string(),
                source: e,
            })
    }
}

/// What `FsDestination` persists next to each object.
#[derive(Debug, Serialize, Deserialize)]
struct SidecarRecord {
    content_type: String,
    #[serde(flatten)]
    meta: ObjectMeta,
}

/// Writes objects under a local root.
///
/// Payloads land via a temp-file-then-rename so a partially written object is
/// never visible under its final name. Object metadata (including the
/// original identifier) is kept in a JSON sidecar next to the object.
pub struct FsDestination {
    root: PathBuf,
}

impl FsDestination {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| EngineError::DestinationUnavailable {
            path: root.clone(),
            source: e,
        })?;
        Ok(FsDestination { root })
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        let path = self.object_path(key);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!("{}.meta.json", file_name))
    }

    /// Read back the metadata recorded for a stored object.
    pub async fn recorded_meta(
        &self,
        key: &str,
    ) -> Result<Option<(String, ObjectMeta)>, EngineError> {
        let bytes = match tokio::fs::read(self.sidecar_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EngineError::ProbeFailed {
                    key: key.to_string(),
                    source: e,
                });
            }
        };
        let record: SidecarRecord =
            serde_json::from_slice(&bytes).map_err(|e| EngineError::ProbeFailed {
                key: key.to_string(),
                source: io::Error::new(io::ErrorKind::InvalidData, e),
            })?;
        Ok(Some((record.content_type, record.meta)))
    }
}

#[async_trait]
impl ObjectDestination for FsDestination {
    async fn exists(&self, key: &str) -> Result<bool, EngineError> {
        match tokio::fs::metadata(self.object_path(key)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(EngineError::ProbeFailed {
                key: key.to_string(),
                source: e,
            }),
        }
    }

    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        meta: &ObjectMeta,
    ) -> Result<(), EngineError> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| EngineError::PutFailed {
                        key: key.to_string(),
                        source: e,
                    })?;
            }
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!("{}.part", file_name));

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| EngineError::PutFailed {
                key: key.to_string(),
                source: e,
            })?;

        let record = SidecarRecord {
            content_type: content_type.to_string(),
            meta: meta.clone(),
        };
        let sidecar = serde_json::to_vec_pretty(&record).map_err(|e| EngineError::PutFailed {
            key: key.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        tokio::fs::write(self.sidecar_path(key), sidecar)
            .await
            .map_err(|e| EngineError::PutFailed {
                key: key.to_string(),
                source: e,
            })?;

        // The object only becomes visible under its final name once the
        // payload is fully on disk.
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| EngineError::PutFailed {
                key: key.to_string(),
                source: e,
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::scheduler::Scheduler;
    use crate::transfer;
    use chrono::Utc;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn write_tree(root: &Path, files: &[(&str, &str)]) {
        for (rel, contents) in files {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
    }

    #[test]
    fn test_open_missing_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsSource::open(dir.path().join("nope"), 10).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_open_rejects_zero_page_size() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FsSource::open(dir.path(), 0).is_err());
    }

    #[tokio::test]
    async fn test_pagination_covers_tree_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(
            dir.path(),
            &[
                ("b.epub", "b"),
                ("a.epub", "a"),
                ("sub/c.epub", "c"),
                ("sub/d.epub", "d"),
                ("e.epub", "e"),
            ],
        );
        let source = FsSource::open(dir.path(), 2).unwrap();
        assert_eq!(source.len(), 5);

        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = source.next_page(cursor.as_deref()).await.unwrap();
            pages += 1;
            keys.extend(page.items.iter().map(|i| i.key.clone()));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(
            keys,
            vec!["a.epub", "b.epub", "e.epub", "sub/c.epub", "sub/d.epub"]
        );
    }

    #[tokio::test]
    async fn test_empty_source_terminates_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsSource::open(dir.path(), 10).unwrap();
        assert!(source.is_empty());

        let page = source.next_page(None).await.unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_malformed_cursor_is_a_listing_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsSource::open(dir.path(), 10).unwrap();
        let err = source.next_page(Some("bogus")).await.unwrap_err();
        assert!(matches!(err, EngineError::ListFailed { .. }));
    }

    #[tokio::test]
    async fn test_fetch_reads_payload() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), &[("sub/a.epub", "payload")]);
        let source = FsSource::open(dir.path(), 10).unwrap();

        let bytes = source.fetch("sub/a.epub").await.unwrap();
        assert_eq!(bytes, b"payload");

        let err = source.fetch("missing.epub").await.unwrap_err();
        assert!(matches!(err, EngineError::FetchFailed { .. }));
    }

    #[tokio::test]
    async fn test_put_then_exists_and_meta_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let dest = FsDestination::open(dir.path().join("out")).unwrap();

        assert!(!dest.exists("books/a.epub").await.unwrap());

        let meta = ObjectMeta {
            original_key: "books/Café a?.epub".to_string(),
            migrated_at: Utc::now(),
        };
        dest.put(
            "books/a.epub",
            b"contents".to_vec(),
            "application/epub+zip",
            &meta,
        )
        .await
        .unwrap();

        assert!(dest.exists("books/a.epub").await.unwrap());
        let object = dir.path().join("out").join("books/a.epub");
        assert_eq!(fs::read(&object).unwrap(), b"contents");
        // No partially-written file left behind
        assert!(!object.with_file_name("a.epub.part").exists());

        let (content_type, recorded) = dest
            .recorded_meta("books/a.epub")
            .await
            .unwrap()
            .expect("sidecar present");
        assert_eq!(content_type, "application/epub+zip");
        assert_eq!(recorded.original_key, "books/Café a?.epub");
    }

    #[tokio::test]
    async fn test_engine_migrates_a_tree_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let src_root = dir.path().join("src");
        write_tree(
            &src_root,
            &[
                ("María's novel.epub", "novel"),
                ("plain.epub", "plain"),
                ("notes.txt", "notes"),
            ],
        );

        let source = Arc::new(FsSource::open(&src_root, 2).unwrap());
        let dest = Arc::new(FsDestination::open(dir.path().join("dst")).unwrap());
        let config = EngineConfig {
            checkpoint_path: dir.path().join("checkpoint.json"),
            include_extensions: vec!["epub".to_string()],
            batch_delay: std::time::Duration::from_millis(0),
            ..EngineConfig::default()
        };
        let scheduler = Scheduler::new(config).unwrap();

        let summary = scheduler
            .run(
                Arc::clone(&source) as Arc<dyn ObjectSource>,
                Arc::clone(&dest) as Arc<dyn ObjectDestination>,
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(summary.uploaded, 2);
        assert_eq!(summary.dropped, 1);

        // The accented name was sanitized on the way in, and the original
        // identifier survives in the sidecar.
        let item = CandidateItem::new("María's novel.epub");
        let dest_key = transfer::destination_key(&item);
        assert!(dest.exists(&dest_key).await.unwrap());
        let (_, meta) = dest.recorded_meta(&dest_key).await.unwrap().unwrap();
        assert_eq!(meta.original_key, "María's novel.epub");

        // A second run over the same tree uploads nothing new.
        let summary = scheduler
            .run(
                Arc::clone(&source) as Arc<dyn ObjectSource>,
                Arc::clone(&dest) as Arc<dyn ObjectDestination>,
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(summary.uploaded, 0);
        assert_eq!(summary.already_complete, 2);
    }
}
