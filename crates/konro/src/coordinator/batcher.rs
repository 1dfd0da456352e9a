//! The service-facing entry point: a model that batches other models.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::capacity::{CapacityPolicy, NominalCapacity};
use super::dispatch::RetryPolicy;
use super::flush::{FlushWorkerHandle, flush_loop};
use super::registry::Registry;
use crate::error::{Error, Result};
use crate::model::{Config, Model, Vector};

/// A [`Model`] implementation that accumulates single-vector requests into
/// per-key batches and evaluates each batch downstream as one call.
///
/// Because `Batcher` implements the same contract it consumes, a batcher
/// wrapping an HTTP client is itself servable over HTTP — and batchers can
/// be stacked in front of one another like any other model.
///
/// # Request flow
///
/// Each call to [`Model::evaluate`] must carry exactly one parameter vector.
/// The batch key is read from a configured field of the request config;
/// requests with equal keys share a batch, and the first request for a key
/// fixes the config the downstream call will carry. The caller then blocks —
/// without holding any lock — until its batch completes, and receives the
/// one result vector matching its slot.
///
/// # Shutdown
///
/// The idle-flush worker is owned by the batcher and shuts down when the
/// batcher is dropped. Batches already dispatched complete independently.
pub struct Batcher<M> {
    model: Arc<M>,
    registry: Arc<Registry<M>>,
    key_field: String,
    _flush_worker: FlushWorkerHandle,
}

impl<M> Batcher<M>
where
    M: Model + 'static,
{
    /// A batcher with the same capacity for every key and the default retry
    /// policy.
    ///
    /// `key_field` names the config entry whose value routes a request to
    /// its batch; `idle_timeout` is how long a batch may sit without new
    /// input before it is dispatched under capacity.
    pub fn new(
        model: M,
        key_field: impl Into<String>,
        capacity: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self::with_policies(
            model,
            key_field,
            NominalCapacity::new(capacity),
            idle_timeout,
            RetryPolicy::default(),
        )
    }

    /// Full-control constructor: pluggable capacity-by-key resolution and an
    /// explicit retry policy.
    pub fn with_policies(
        model: M,
        key_field: impl Into<String>,
        capacity: impl CapacityPolicy + 'static,
        idle_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let model = Arc::new(model);
        let registry = Arc::new(Registry::new(
            model.clone(),
            Box::new(capacity),
            idle_timeout,
            retry,
        ));

        let flush_worker = FlushWorkerHandle::new({
            let registry = registry.clone();
            move |running, notifier| tokio::spawn(flush_loop(registry, running, notifier))
        });

        Self {
            model,
            registry,
            key_field: key_field.into(),
            _flush_worker: flush_worker,
        }
    }

    /// Extracts the batch key from a request config.
    ///
    /// Strings are used verbatim; other scalars are keyed on their JSON
    /// text, which matches the string-equality semantics keys are grouped
    /// under everywhere else.
    fn batch_key(&self, config: &Config) -> Result<String> {
        match config.get(&self.key_field) {
            None => Err(Error::MissingKey(self.key_field.clone())),
            Some(serde_json::Value::String(s)) => Ok(s.clone()),
            Some(value @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => {
                Ok(value.to_string())
            }
            Some(other) => Err(Error::InvalidKey {
                field: self.key_field.clone(),
                reason: format!("expected a scalar, got {other}"),
            }),
        }
    }
}

#[async_trait]
impl<M> Model for Batcher<M>
where
    M: Model + 'static,
{
    async fn evaluate(&self, input: Vec<Vector>, config: Config) -> Result<Vec<Vector>> {
        let [mut vector] =
            <[Vector; 1]>::try_from(input).map_err(|input| Error::InvalidInput(input.len()))?;
        let key = self.batch_key(&config)?;

        let receiver = loop {
            let batch = self.registry.get_or_create(&key, &config).await;
            match batch.enqueue(vector).await {
                Ok((slot, rx)) => {
                    tracing::debug!(batch = %batch.id, key = %key, slot, "request enqueued");
                    break rx;
                }
                // The batch sealed between lookup and enqueue; the registry
                // hands out a fresh one on the next pass.
                Err(returned) => vector = returned,
            }
        };

        let result = receiver
            .await
            .map_err(|_| Error::Internal("batch dispatch dropped its result channel".into()))??;
        Ok(vec![result])
    }

    async fn input_sizes(&self, config: &Config) -> Result<Vec<u64>> {
        self.model.input_sizes(config).await
    }

    async fn output_sizes(&self, config: &Config) -> Result<Vec<u64>> {
        self.model.output_sizes(config).await
    }

    async fn supports_evaluate(&self) -> bool {
        self.model.supports_evaluate().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    use crate::coordinator::capacity::KeyOverrides;
    use crate::model::mock::MockModel;

    fn keyed_config(key: &str) -> Config {
        let mut config = Config::new();
        config.insert("order".into(), serde_json::Value::String(key.into()));
        config
    }

    fn shared_mock() -> Arc<MockModel> {
        Arc::new(MockModel::new())
    }

    /// `Arc<M>` forwarding so tests can keep a handle on the mock while the
    /// batcher owns "the model".
    struct Shared(Arc<MockModel>);

    #[async_trait]
    impl Model for Shared {
        async fn evaluate(&self, input: Vec<Vector>, config: Config) -> Result<Vec<Vector>> {
            self.0.evaluate(input, config).await
        }
        async fn input_sizes(&self, config: &Config) -> Result<Vec<u64>> {
            self.0.input_sizes(config).await
        }
        async fn output_sizes(&self, config: &Config) -> Result<Vec<u64>> {
            self.0.output_sizes(config).await
        }
        async fn supports_evaluate(&self) -> bool {
            self.0.supports_evaluate().await
        }
    }

    fn batcher(model: Arc<MockModel>, capacity: usize, idle_timeout: Duration) -> Batcher<Shared> {
        Batcher::new(Shared(model), "order", capacity, idle_timeout)
    }

    #[tokio::test]
    async fn full_batch_returns_each_caller_its_own_slice() {
        let model = shared_mock();
        let batcher = Arc::new(batcher(model.clone(), 4, Duration::from_secs(5)));

        let callers = (0..4).map(|i| {
            let batcher = batcher.clone();
            tokio::spawn(async move {
                let out = batcher
                    .evaluate(vec![vec![i as f64]], keyed_config("A"))
                    .await
                    .unwrap();
                (i, out)
            })
        });

        for joined in join_all(callers).await {
            let (i, out) = joined.unwrap();
            assert_eq!(out, vec![MockModel::transform(&[i as f64])]);
        }

        // One downstream call carrying all four vectors.
        assert_eq!(model.evaluations(), 1);
        let calls = model.calls().await;
        assert_eq!(calls.len(), 1);
        let mut batched = calls[0].input.clone();
        batched.sort_by(|a, b| a[0].total_cmp(&b[0]));
        assert_eq!(batched, vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]]);
    }

    #[tokio::test]
    async fn overfull_traffic_rolls_into_fresh_batches() {
        let model = shared_mock();
        let batcher = Arc::new(batcher(model.clone(), 2, Duration::from_secs(5)));

        let callers = (0..6).map(|i| {
            let batcher = batcher.clone();
            tokio::spawn(async move {
                batcher
                    .evaluate(vec![vec![i as f64]], keyed_config("A"))
                    .await
                    .unwrap()
            })
        });
        join_all(callers).await;

        // Six callers, capacity two: exactly three dispatches, no request
        // routed into an already-sealed batch.
        assert_eq!(model.evaluations(), 3);
        let calls = model.calls().await;
        assert_eq!(calls.iter().map(|c| c.input.len()).sum::<usize>(), 6);
    }

    #[tokio::test]
    async fn keys_batch_independently() {
        let model = shared_mock();
        let batcher = Arc::new(batcher(model.clone(), 2, Duration::from_secs(5)));

        let callers = ["A", "A", "B", "B"].into_iter().enumerate().map(|(i, key)| {
            let batcher = batcher.clone();
            let config = keyed_config(key);
            tokio::spawn(async move {
                batcher.evaluate(vec![vec![i as f64]], config).await.unwrap()
            })
        });
        join_all(callers).await;

        assert_eq!(model.evaluations(), 2);
        for call in model.calls().await {
            assert_eq!(call.input.len(), 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_flushes_a_padded_batch() {
        let model = shared_mock();
        let batcher = Arc::new(batcher(model.clone(), 4, Duration::from_millis(500)));

        let callers = (0..2).map(|i| {
            let batcher = batcher.clone();
            tokio::spawn(async move {
                let out = batcher
                    .evaluate(vec![vec![i as f64]], keyed_config("B"))
                    .await
                    .unwrap();
                (i, out)
            })
        });

        for joined in join_all(callers).await {
            let (i, out) = joined.unwrap();
            assert_eq!(out, vec![MockModel::transform(&[i as f64])]);
        }

        assert_eq!(model.evaluations(), 1);
        let calls = model.calls().await;
        assert_eq!(calls[0].input.len(), 4);
        // Two real vectors up front, first-vector padding behind them.
        let first = calls[0].input[0].clone();
        assert_eq!(calls[0].input[2], first);
        assert_eq!(calls[0].input[3], first);
    }

    #[tokio::test]
    async fn capacity_override_dispatches_singletons_immediately() {
        let model = shared_mock();
        let batcher = Batcher::with_policies(
            Shared(model.clone()),
            "order",
            KeyOverrides::new(4).with("special", 1),
            Duration::from_secs(5),
            RetryPolicy::default(),
        );

        let out = batcher
            .evaluate(vec![vec![7.0]], keyed_config("special"))
            .await
            .unwrap();

        assert_eq!(out, vec![vec![14.0]]);
        assert_eq!(model.evaluations(), 1);
        assert_eq!(model.calls().await[0].input, vec![vec![7.0]]);
    }

    #[tokio::test]
    async fn wrong_arity_fails_fast() {
        let model = shared_mock();
        let batcher = batcher(model.clone(), 4, Duration::from_secs(5));

        let err = batcher
            .evaluate(vec![vec![1.0], vec![2.0]], keyed_config("A"))
            .await
            .unwrap_err();
        assert_eq!(err, Error::InvalidInput(2));

        let err = batcher.evaluate(vec![], keyed_config("A")).await.unwrap_err();
        assert_eq!(err, Error::InvalidInput(0));

        // Nothing reached a batch, so nothing was dispatched.
        assert_eq!(model.evaluations(), 0);
    }

    #[tokio::test]
    async fn missing_or_malformed_key_fails_fast() {
        let model = shared_mock();
        let batcher = batcher(model.clone(), 4, Duration::from_secs(5));

        let err = batcher
            .evaluate(vec![vec![1.0]], Config::new())
            .await
            .unwrap_err();
        assert_eq!(err, Error::MissingKey("order".into()));

        let mut config = Config::new();
        config.insert("order".into(), serde_json::json!({"nested": true}));
        let err = batcher.evaluate(vec![vec![1.0]], config).await.unwrap_err();
        assert!(matches!(err, Error::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn numeric_keys_group_like_their_json_text() {
        let model = shared_mock();
        let batcher = Arc::new(batcher(model.clone(), 2, Duration::from_secs(5)));

        let callers = (0..2).map(|i| {
            let batcher = batcher.clone();
            tokio::spawn(async move {
                let mut config = Config::new();
                config.insert("order".into(), serde_json::json!(7));
                batcher.evaluate(vec![vec![i as f64]], config).await.unwrap()
            })
        });
        join_all(callers).await;

        assert_eq!(model.evaluations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_downstream_fails_every_caller() {
        let model = shared_mock();
        model.fail_next(3);
        let batcher = Arc::new(Batcher::with_policies(
            Shared(model.clone()),
            "order",
            NominalCapacity::new(2),
            Duration::from_secs(5),
            RetryPolicy {
                attempts: 3,
                backoff: Duration::from_millis(10),
            },
        ));

        let callers = (0..2).map(|i| {
            let batcher = batcher.clone();
            tokio::spawn(async move {
                batcher
                    .evaluate(vec![vec![i as f64]], keyed_config("A"))
                    .await
            })
        });

        for joined in join_all(callers).await {
            match joined.unwrap() {
                Err(Error::Upstream { attempts, .. }) => assert_eq!(attempts, 3),
                other => panic!("expected an upstream failure, got {other:?}"),
            }
        }
        assert_eq!(model.evaluations(), 3);
    }

    #[tokio::test]
    async fn size_introspection_passes_through() {
        let model = shared_mock();
        let batcher = batcher(model, 4, Duration::from_secs(5));

        assert_eq!(batcher.input_sizes(&Config::new()).await.unwrap(), vec![1]);
        assert_eq!(batcher.output_sizes(&Config::new()).await.unwrap(), vec![1]);
        assert!(batcher.supports_evaluate().await);
    }
}
