//! The key → current-batch map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::batch::Batch;
use super::capacity::CapacityPolicy;
use super::dispatch::RetryPolicy;
use crate::model::{Config, Model};

/// Tracks, per configuration key, the batch currently accepting input.
///
/// The map sits behind a single registry-wide mutex. That lock guards only
/// the O(1) lookup/insert; all heavier coordination (slot assignment, the
/// fill check, waiting) happens under each batch's own lock, so callers for
/// different keys never serialize on one another beyond this lookup.
pub(crate) struct Registry<M> {
    batches: Mutex<HashMap<String, Arc<Batch<M>>>>,
    model: Arc<M>,
    capacity: Box<dyn CapacityPolicy>,
    idle_timeout: Duration,
    retry: RetryPolicy,
}

impl<M> Registry<M>
where
    M: Model + 'static,
{
    pub(crate) fn new(
        model: Arc<M>,
        capacity: Box<dyn CapacityPolicy>,
        idle_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            batches: Mutex::new(HashMap::new()),
            model,
            capacity,
            idle_timeout,
            retry,
        }
    }

    /// Returns the batch currently accepting input for `key`, creating one
    /// if the key has none or its current batch has been sealed.
    ///
    /// The check-and-create is atomic under the registry lock, so two
    /// callers racing on a fresh key end up in the same batch rather than
    /// each minting a sibling. Replaced batches are not torn down — their
    /// waiters hold them alive until every slice has been read.
    pub(crate) async fn get_or_create(&self, key: &str, config: &Config) -> Arc<Batch<M>> {
        let mut batches = self.batches.lock().await;
        if let Some(batch) = batches.get(key) {
            if batch.is_accepting().await {
                return batch.clone();
            }
        }

        let batch = Arc::new(Batch::new(
            key,
            config.clone(),
            self.capacity.capacity_for(key),
            self.idle_timeout,
            self.retry,
            self.model.clone(),
        ));
        batches.insert(key.to_string(), batch.clone());
        batch
    }

    /// Seals every batch whose idle window has elapsed.
    ///
    /// Entries are snapshotted under the map lock and flushed without it, so
    /// a slow dispatch on one key cannot block lookups for another.
    pub(crate) async fn flush_idle(&self) {
        let snapshot: Vec<Arc<Batch<M>>> = self.batches.lock().await.values().cloned().collect();
        for batch in snapshot {
            batch.flush_if_idle().await;
        }
    }
}
