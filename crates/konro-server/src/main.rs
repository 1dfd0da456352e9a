//! Batching proxy executable.
//!
//! Connects to a downstream model endpoint, wraps it in a batching
//! coordinator, and serves the coordinator on a local port under the same
//! model name — so existing clients point here instead of at the downstream
//! service and gain batching transparently.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use konro::coordinator::Batcher;
use konro::http::{HttpModel, serve};
use konro::model::Model;

#[derive(Parser, Debug)]
#[command(name = "konro-server", version, about = "Batching proxy for a model-serving endpoint")]
struct Args {
    /// URL at which the downstream model is running, for example http://localhost:4242
    url: String,

    /// Model name to connect to, for example "forward"
    model: String,

    /// Number of requests accumulated per batch, for example 4
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    batchsize: u32,

    /// Port this proxy listens on, for example 4243
    port: u16,

    /// Seconds an idle batch waits before dispatching under capacity, for example 5
    timeout: u64,

    /// Config field whose value routes requests into separate batches
    #[arg(long, default_value = "order")]
    key_field: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(url = %args.url, model = %args.model, "connecting to downstream model");

    let downstream = HttpModel::new(&args.url, &args.model);
    let batcher = Batcher::new(
        downstream,
        &args.key_field,
        args.batchsize as usize,
        Duration::from_secs(args.timeout),
    );

    let models: Vec<(String, Arc<dyn Model>)> = vec![(args.model.clone(), Arc::new(batcher))];
    serve(models, args.port)
        .await
        .context("model server exited")?;
    Ok(())
}
