//! Serving models over the wire protocol.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::future::join_all;

use super::wire::{
    ErrorResponse, EvaluateRequest, EvaluateResponse, InfoResponse, InputSizesResponse, ModelInfo,
    OutputSizesResponse, PROTOCOL_VERSION, SizesRequest, WireError,
};
use crate::error::{Error, Result};
use crate::model::Model;

/// The set of models hosted by one server, looked up by name per request.
#[derive(Clone)]
struct AppState {
    models: Arc<HashMap<String, Arc<dyn Model>>>,
}

impl AppState {
    fn model(&self, name: &str) -> Result<Arc<dyn Model>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }
}

/// Builds the protocol router over a set of named models.
///
/// Exposed separately from [`serve`] so tests and embedders can mount the
/// routes on a listener of their own.
pub fn router(models: Vec<(String, Arc<dyn Model>)>) -> Router {
    let state = AppState {
        models: Arc::new(models.into_iter().collect()),
    };
    Router::new()
        .route("/info", get(info))
        .route("/evaluate", post(evaluate))
        .route("/input_sizes", post(input_sizes))
        .route("/output_sizes", post(output_sizes))
        .with_state(state)
}

/// Binds `port` on all interfaces and serves `models` until the task is
/// cancelled.
pub async fn serve(models: Vec<(String, Arc<dyn Model>)>, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| Error::Transport(format!("failed to bind port {port}: {e}")))?;
    tracing::info!(port, "model server listening");
    axum::serve(listener, router(models))
        .await
        .map_err(|e| Error::Transport(e.to_string()))
}

async fn info(State(state): State<AppState>) -> Response {
    let entries = state.models.iter().map(|(name, model)| async move {
        ModelInfo {
            name: name.clone(),
            supports_evaluate: model.supports_evaluate().await,
        }
    });
    let mut models = join_all(entries).await;
    models.sort_by(|a, b| a.name.cmp(&b.name));

    Json(InfoResponse {
        protocol_version: PROTOCOL_VERSION,
        models,
    })
    .into_response()
}

async fn evaluate(State(state): State<AppState>, Json(req): Json<EvaluateRequest>) -> Response {
    let result = match state.model(&req.name) {
        Ok(model) => model.evaluate(req.input, req.config).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(output) => Json(EvaluateResponse { output }).into_response(),
        Err(err) => error_response(err),
    }
}

async fn input_sizes(State(state): State<AppState>, Json(req): Json<SizesRequest>) -> Response {
    let result = match state.model(&req.name) {
        Ok(model) => model.input_sizes(&req.config).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(sizes) => Json(InputSizesResponse { input_sizes: sizes }).into_response(),
        Err(err) => error_response(err),
    }
}

async fn output_sizes(State(state): State<AppState>, Json(req): Json<SizesRequest>) -> Response {
    let result = match state.model(&req.name) {
        Ok(model) => model.output_sizes(&req.config).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(sizes) => Json(OutputSizesResponse {
            output_sizes: sizes,
        })
        .into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::InvalidInput(_) | Error::MissingKey(_) | Error::InvalidKey { .. } => {
            StatusCode::BAD_REQUEST
        }
        Error::UnknownModel(_) => StatusCode::NOT_FOUND,
        Error::Upstream { .. } | Error::Transport(_) => StatusCode::BAD_GATEWAY,
        Error::Protocol(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::debug!(%err, status = status.as_u16(), "request failed");
    (
        status,
        Json(ErrorResponse {
            error: WireError {
                kind: err.kind().into(),
                message: err.to_string(),
            },
        }),
    )
        .into_response()
}
