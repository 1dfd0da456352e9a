//! # Konro
//!
//! A batching proxy for model-serving protocols: it accepts many concurrent
//! single-vector evaluation requests, accumulates them into batches keyed by
//! a caller-supplied configuration field, and submits each batch to a slower
//! downstream model as one call, handing every caller back exactly the slice
//! of the batch result that belongs to its own input.
//!
//! ## Overview
//!
//! Downstream compute services (simulators, surrogate models, GPU-backed
//! inference servers) are often far more efficient when evaluated over
//! several parameter vectors at once. Konro sits in front of such a service
//! and speaks the same four-operation model contract on both sides, so a
//! batching proxy is itself servable — and stackable — like any other model.
//!
//! Key components:
//!
//! - A [`model::Model`] trait capturing the evaluate / input-sizes /
//!   output-sizes / supports-evaluate contract
//! - A [`coordinator::Batcher`] that implements [`model::Model`] by batching
//!   requests per configuration key
//! - An HTTP binding of the contract ([`http::serve`], [`http::HttpModel`])
//!
//! ## Architecture
//!
//! Each configuration key owns an independent queue of batches. The batch
//! currently accepting input for a key is tracked by a registry; the enqueue
//! that fills a batch seals and dispatches it, and a background flush worker
//! seals batches that have sat idle past the configured timeout, padding
//! them up to capacity. Callers wait on per-slot result channels and are
//! woken exactly once, when their batch completes or fails.
//!
//! ## Guarantees
//!
//! - A batch is dispatched downstream at most once.
//! - Slot indices are assigned in enqueue order and results are returned by
//!   slot, so no caller can observe another caller's output.
//! - A downstream failure that survives the retry policy is delivered to
//!   every waiter of the affected batch; no caller blocks forever.

pub mod coordinator;
pub mod http;
pub mod model;

mod error;

pub use error::{Error, Result};
