//! A scriptable [`Model`] double used by the tests in this crate.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::{Config, Model, Vector};

/// One recorded `evaluate` invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub input: Vec<Vector>,
    pub config: Config,
}

/// A deterministic in-process model: each output vector is its input vector
/// with every element doubled.
///
/// The double records every batch it receives and can be scripted to fail a
/// fixed number of times before succeeding, which is how the retry paths are
/// exercised without a network in sight.
pub struct MockModel {
    calls: Mutex<Vec<RecordedCall>>,
    evaluations: AtomicUsize,
    failures_remaining: AtomicU32,
    input_width: u64,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            evaluations: AtomicUsize::new(0),
            failures_remaining: AtomicU32::new(0),
            input_width: 1,
        }
    }

    /// Fail the next `n` `evaluate` calls before succeeding again.
    pub fn fail_next(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Number of `evaluate` calls that reached the model, including failed
    /// attempts.
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    /// Snapshot of the successfully evaluated batches, in arrival order.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// The transformation applied per vector, exposed so tests can state
    /// expectations without duplicating the arithmetic.
    pub fn transform(vector: &[f64]) -> Vector {
        vector.iter().map(|x| x * 2.0).collect()
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Model for MockModel {
    async fn evaluate(&self, input: Vec<Vector>, config: Config) -> Result<Vec<Vector>> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Transport("scripted failure".into()));
        }

        let output = input.iter().map(|v| Self::transform(v)).collect();
        self.calls.lock().await.push(RecordedCall { input, config });
        Ok(output)
    }

    async fn input_sizes(&self, _config: &Config) -> Result<Vec<u64>> {
        Ok(vec![self.input_width])
    }

    async fn output_sizes(&self, _config: &Config) -> Result<Vec<u64>> {
        Ok(vec![self.input_width])
    }

    async fn supports_evaluate(&self) -> bool {
        true
    }
}
