//! Transfer worker.
//!
//! One worker moves one object: resolve the content type from the original
//! identifier, derive the sanitized destination key, fetch the payload and
//! write it with metadata that records the original identifier. Workers never
//! touch shared state; they hand their outcome back to the scheduler.

use chrono::Utc;

use crate::model::{CandidateItem, TransferOutcome};
use crate::naming;
use crate::store::{ObjectDestination, ObjectMeta, ObjectSource};

/// The destination key an item will be written under.
pub fn destination_key(item: &CandidateItem) -> String {
    naming::sanitize_key(&item.key)
}

/// Transfer a single item from source to destination.
///
/// Any fetch or write error yields `Failed` and leaves the identifier out of
/// `completed`, so the item remains eligible for retry on the next run.
/// `Uploaded` is returned only after the destination confirmed the write.
pub async fn transfer_one(
    source: &dyn ObjectSource,
    destination: &dyn ObjectDestination,
    item: &CandidateItem,
) -> TransferOutcome {
    let dest_key = destination_key(item);
    let content_type = naming::content_type_for(&item.key);

    let bytes = match source.fetch(&item.key).await {
        Ok(bytes) => bytes,
        Err(e) => return TransferOutcome::Failed(e),
    };
    let size = bytes.len() as u64;

    let meta = ObjectMeta {
        original_key: item.key.clone(),
        migrated_at: Utc::now(),
    };

    match destination.put(&dest_key, bytes, content_type, &meta).await {
        Ok(()) => TransferOutcome::Uploaded(size),
        Err(e) => TransferOutcome::Failed(e),
    }
}
