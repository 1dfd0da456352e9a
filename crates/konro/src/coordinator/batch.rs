//! One batch: the ordered parameter vectors accumulated under a single
//! configuration key, and the single downstream computation they share.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use super::dispatch::{self, RetryPolicy};
use crate::error::Result;
use crate::model::{Config, Model, Vector};

/// What each waiter eventually receives: its own result vector, or the
/// batch-wide failure.
pub(crate) type SlotResult = Result<Vector>;

/// Lifecycle of a batch.
///
/// `Accepting` is the only phase in which vectors may be appended. The
/// transition out of `Accepting` happens exactly once, under the batch
/// mutex, and freezes the parameter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Accepting,
    Dispatched,
    Completed,
    Failed,
}

/// A caller's place in the batch: the vector it submitted and the channel
/// its slice of the result is delivered on.
struct Slot {
    vector: Vector,
    sender: oneshot::Sender<SlotResult>,
}

struct BatchState {
    slots: Vec<Slot>,
    phase: Phase,
    last_input_at: Instant,
}

/// A group of parameter vectors dispatched downstream as one call.
///
/// All mutable state sits behind one `tokio::sync::Mutex`, scoped to this
/// batch alone; the registry's lock is never held while a batch lock is
/// waited on by callers, and two batches never contend on the same lock.
/// Critical sections are short and never span an `.await` of model work.
pub(crate) struct Batch<M> {
    pub(crate) id: Uuid,
    pub(crate) key: String,
    pub(crate) capacity: usize,
    pub(crate) config: Config,
    pub(crate) created_at: Instant,
    pub(crate) retry: RetryPolicy,
    pub(crate) model: Arc<M>,
    idle_timeout: Duration,
    state: Mutex<BatchState>,
}

impl<M> Batch<M>
where
    M: Model + 'static,
{
    pub(crate) fn new(
        key: &str,
        config: Config,
        capacity: usize,
        idle_timeout: Duration,
        retry: RetryPolicy,
        model: Arc<M>,
    ) -> Self {
        assert!(capacity >= 1, "batch capacity must be at least 1");
        let id = Uuid::new_v4();
        tracing::debug!(batch = %id, key, capacity, "batch created");
        Self {
            id,
            key: key.to_string(),
            capacity,
            config,
            created_at: Instant::now(),
            retry,
            model,
            idle_timeout,
            state: Mutex::new(BatchState {
                slots: Vec::with_capacity(capacity),
                phase: Phase::Accepting,
                last_input_at: Instant::now(),
            }),
        }
    }

    /// Appends `vector` and returns its 0-based slot together with the
    /// receiver the caller awaits its result on.
    ///
    /// The append, the fill check, and a possible dispatch all run inside
    /// the same critical section, so the enqueue that brings the batch to
    /// capacity is the one that seals it — a concurrent enqueue either gets
    /// an earlier slot or is rejected. On rejection the vector is handed
    /// back so the caller can re-route through the registry.
    pub(crate) async fn enqueue(
        self: &Arc<Self>,
        vector: Vector,
    ) -> std::result::Result<(usize, oneshot::Receiver<SlotResult>), Vector> {
        let mut state = self.state.lock().await;
        if state.phase != Phase::Accepting {
            return Err(vector);
        }

        let slot = state.slots.len();
        let (tx, rx) = oneshot::channel();
        state.slots.push(Slot { vector, sender: tx });
        state.last_input_at = Instant::now();
        tracing::debug!(
            batch = %self.id,
            key = %self.key,
            filled = slot + 1,
            capacity = self.capacity,
            "vector enqueued"
        );

        if state.slots.len() == self.capacity {
            self.seal(&mut state);
        }
        Ok((slot, rx))
    }

    /// Whether this batch still takes new vectors. Used by the registry to
    /// decide when a key needs a fresh batch.
    pub(crate) async fn is_accepting(&self) -> bool {
        self.state.lock().await.phase == Phase::Accepting
    }

    /// Seals and dispatches an under-capacity batch whose idle window has
    /// elapsed. Called from the flush worker on its poll cadence.
    ///
    /// The deadline is anchored to the last arrival, not batch creation: an
    /// actively-filling batch is never cut off, while one the callers have
    /// abandoned goes out after one idle window.
    pub(crate) async fn flush_if_idle(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.phase != Phase::Accepting || state.slots.is_empty() {
            return;
        }
        if state.last_input_at.elapsed() > self.idle_timeout {
            self.seal(&mut state);
        }
    }

    /// Freezes the parameter list, pads it to capacity, and launches the
    /// one dispatch this batch will ever get.
    ///
    /// Padding replicates the first submitted vector; padding entries come
    /// after every real entry, so no caller's slot moves.
    fn seal(self: &Arc<Self>, state: &mut BatchState) {
        assert_eq!(
            state.phase,
            Phase::Accepting,
            "dispatch attempted twice on batch {}",
            self.id
        );
        state.phase = Phase::Dispatched;

        let (mut vectors, senders): (Vec<_>, Vec<_>) = state
            .slots
            .drain(..)
            .map(|slot| (slot.vector, slot.sender))
            .unzip();
        let padded = self.capacity - vectors.len();
        if padded > 0 {
            let filler = vectors[0].clone();
            vectors.resize(self.capacity, filler);
        }

        tracing::info!(
            batch = %self.id,
            key = %self.key,
            real = senders.len(),
            padded,
            age_ms = self.created_at.elapsed().as_millis() as u64,
            "dispatching batch"
        );
        dispatch::spawn(self.clone(), vectors, senders);
    }

    /// Records the terminal phase once the dispatch task is done.
    pub(crate) async fn finish(&self, phase: Phase) {
        let mut state = self.state.lock().await;
        debug_assert_eq!(state.phase, Phase::Dispatched);
        state.phase = phase;
    }
}
