//! The retry-wrapped downstream call.
//!
//! Each sealed batch gets exactly one dispatch task, spawned off the caller
//! path so that every waiter is satisfied from the same computation. The
//! task owns the frozen parameter snapshot and the waiters' result channels;
//! nothing here touches the batch's slot list again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::batch::{Batch, Phase, SlotResult};
use crate::error::Error;
use crate::model::{Model, Vector};

/// Bounded retry for a flaky downstream model.
///
/// Transient failures are retried with a fixed delay and never surfaced per
/// attempt; only exhaustion reaches the callers. The defaults mirror what
/// shared compute clusters need in practice: a submission that fails is
/// usually schedulable again a few seconds later.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. At least 1.
    pub attempts: u32,
    /// Delay between consecutive attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(10),
        }
    }
}

/// Launches the dispatch task for a sealed batch.
///
/// `vectors` is the padded parameter snapshot; `senders` holds one channel
/// per real caller, index-aligned with the leading entries of `vectors`.
pub(crate) fn spawn<M>(
    batch: Arc<Batch<M>>,
    vectors: Vec<Vector>,
    senders: Vec<oneshot::Sender<SlotResult>>,
) -> JoinHandle<()>
where
    M: Model + 'static,
{
    tokio::spawn(async move {
        let retry = batch.retry;
        let mut last_error = None;

        for attempt in 1..=retry.attempts.max(1) {
            match batch
                .model
                .evaluate(vectors.clone(), batch.config.clone())
                .await
            {
                Ok(output) => {
                    if output.len() != vectors.len() {
                        let err = Error::Protocol(format!(
                            "downstream returned {} outputs for {} inputs",
                            output.len(),
                            vectors.len()
                        ));
                        tracing::error!(batch = %batch.id, %err, "batch failed");
                        deliver_failure(senders, err);
                        batch.finish(Phase::Failed).await;
                        return;
                    }

                    // Result i belongs to slot i; padding outputs past the
                    // real entries are dropped on the floor.
                    for (sender, slice) in senders.into_iter().zip(output) {
                        let _ = sender.send(Ok(slice));
                    }
                    batch.finish(Phase::Completed).await;
                    return;
                }
                Err(err) => {
                    tracing::warn!(
                        batch = %batch.id,
                        attempt,
                        attempts = retry.attempts,
                        %err,
                        "batch submission failed"
                    );
                    last_error = Some(err);
                    if attempt < retry.attempts {
                        tokio::time::sleep(retry.backoff).await;
                    }
                }
            }
        }

        let err = Error::Upstream {
            attempts: retry.attempts,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts were made".into()),
        };
        tracing::error!(batch = %batch.id, %err, "batch failed");
        deliver_failure(senders, err);
        batch.finish(Phase::Failed).await;
    })
}

fn deliver_failure(senders: Vec<oneshot::Sender<SlotResult>>, err: Error) {
    for sender in senders {
        let _ = sender.send(Err(err.clone()));
    }
}
