//! In-memory store of digests awaiting review.
//!
//! Shared between the scheduler worker (inserts) and the event handlers
//! (reads, edits, removals) behind a non-poisoning mutex. Records that sit
//! unreviewed for a week are swept lazily on the next insert.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::Mutex;

use crate::digest::{DigestRecord, MessageRef};

/// Unreviewed digests older than this are dropped on the next insert.
const EXPIRY_DAYS: i64 = 7;

#[derive(Clone, Default)]
pub struct DigestStore {
    inner: Arc<Mutex<HashMap<String, DigestRecord>>>,
}

impl DigestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly generated record, sweeping expired ones first.
    pub fn insert(&self, record: DigestRecord) {
        let mut map = self.inner.lock();
        let cutoff = Utc::now() - Duration::days(EXPIRY_DAYS);
        map.retain(|id, rec| {
            let keep = rec.created_at > cutoff;
            if !keep {
                log::info!("Expiring stale pending digest {}", id);
            }
            keep
        });
        map.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<DigestRecord> {
        self.inner.lock().get(id).cloned()
    }

    /// Atomically claim a record for a terminal action. The caller owns the
    /// record afterwards; a concurrent claim for the same id gets None.
    pub fn remove(&self, id: &str) -> Option<DigestRecord> {
        self.inner.lock().remove(id)
    }

    /// Attach the posted review message to a pending record.
    pub fn set_review_message(&self, id: &str, message: MessageRef) {
        if let Some(rec) = self.inner.lock().get_mut(id) {
            rec.review_message = Some(message);
        }
    }

    /// Apply a reviewer's edit. Returns false when the record is gone
    /// (already resolved or expired).
    pub fn store_edit(&self, id: &str, text: String) -> bool {
        match self.inner.lock().get_mut(id) {
            Some(rec) => {
                rec.store_edit(text);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
