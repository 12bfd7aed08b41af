//! Per-tree record of what replication already wrote.
//!
//! Each source key owns one once-cell. Claiming the cell happens under a
//! mutex, so concurrent writers for the same key agree on a single cell;
//! the first caller runs the self-write and every other caller waits for
//! and shares its outcome. A failed outcome is shared too: there are no
//! retries within a run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use subsample_state::{Identifier, Record, RecordKey};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Option<Record>>>;

/// Source key to target-side record, scoped to one association tree.
#[derive(Debug, Default)]
pub struct InsertedMap {
    slots: Mutex<HashMap<RecordKey, Slot>>,
}

impl InsertedMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RecordKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert-or-fetch the slot for `key`. Atomic under the map lock.
    fn slot(&self, key: &RecordKey) -> Slot {
        Arc::clone(self.lock().entry(key.clone()).or_default())
    }

    /// Return the outcome recorded for `key`, running `write` first if no
    /// caller has claimed the key yet.
    pub async fn get_or_write<F, Fut>(&self, key: &RecordKey, write: F) -> Option<Record>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Record>>,
    {
        let slot = self.slot(key);
        slot.get_or_init(write).await.clone()
    }

    /// Target record written for `key`, if the write finished and succeeded.
    pub fn get(&self, key: &RecordKey) -> Option<Record> {
        self.lock()
            .get(key)
            .and_then(|slot| slot.get().cloned().flatten())
    }

    /// Target-side identifier for a source key.
    pub fn target_id(&self, key: &RecordKey) -> Option<Identifier> {
        self.get(key).map(|record| record.id)
    }

    /// Keys whose write finished successfully.
    pub fn written(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| matches!(slot.get(), Some(Some(_))))
            .count()
    }

    /// Keys claimed so far, failed writes included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
