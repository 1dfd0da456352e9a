//! HTTP binding of the model contract.
//!
//! Both halves of the proxy live here: [`HttpModel`] consumes a remote
//! model-serving endpoint as a [`crate::model::Model`], and [`serve`] /
//! [`router`] expose any set of named models over the same wire protocol.
//! A batcher wrapping an `HttpModel` and served through `serve` is wire-
//! compatible with the endpoint it fronts.

mod client;
mod server;
pub mod wire;

pub use client::HttpModel;
pub use server::{router, serve};
