//! The four-operation model contract.
//!
//! Everything in this crate is written against [`Model`]: the HTTP client
//! implements it against a remote server, the batching coordinator wraps any
//! implementation of it, and the HTTP server exposes any implementation of
//! it. That symmetry is what lets a batcher be served, and served batchers
//! be stacked, like any other model.

use async_trait::async_trait;

use crate::error::Result;

pub mod mock;

/// A single parameter or result vector.
pub type Vector = Vec<f64>;

/// A request's configuration object: a free-form JSON map carried unchanged
/// from caller to downstream model.
pub type Config = serde_json::Map<String, serde_json::Value>;

/// A callable model endpoint.
///
/// `evaluate` maps a list of parameter vectors to a list of result vectors,
/// one per input, synchronously from the caller's point of view. The size
/// introspection methods describe the per-call vector widths the model
/// expects and produces for a given config.
///
/// Implementations must be safe to share across tasks; the coordinator
/// invokes a single instance from many concurrent callers.
#[async_trait]
pub trait Model: Send + Sync {
    /// Evaluate the model on `input`, returning one output vector per input
    /// vector, in the same order.
    async fn evaluate(&self, input: Vec<Vector>, config: Config) -> Result<Vec<Vector>>;

    /// Widths of the input vectors expected for this config.
    async fn input_sizes(&self, config: &Config) -> Result<Vec<u64>>;

    /// Widths of the output vectors produced for this config.
    async fn output_sizes(&self, config: &Config) -> Result<Vec<u64>>;

    /// Whether this model supports `evaluate` at all.
    async fn supports_evaluate(&self) -> bool;
}
