//! The batch-accumulation-and-dispatch core.
//!
//! ## Module Structure
//!
//! * `batcher` - The service-facing entry point: a [`Batcher`] implements
//!   the model contract by routing each request into a per-key batch and
//!   handing the caller its own slice of the batch result.
//!
//! * `batch` - One batch's data and lifecycle: slot assignment, the
//!   fill/timeout race, padding, and the at-most-once dispatch guarantee.
//!
//! * `registry` - The key → current-batch map and its atomic
//!   check-and-create.
//!
//! * `capacity` - Pluggable capacity-by-key resolution.
//!
//! * `dispatch` - The retry-wrapped downstream call, one task per sealed
//!   batch.
//!
//! * `flush` - The background worker that seals batches left under capacity
//!   once their idle window elapses.

mod batch;
mod batcher;
mod capacity;
mod dispatch;
mod flush;
mod registry;

pub use batcher::Batcher;
pub use capacity::{CapacityPolicy, KeyOverrides, NominalCapacity};
pub use dispatch::RetryPolicy;
