//! Request and response bodies of the model-serving wire protocol.
//!
//! The protocol is four JSON-over-HTTP exchanges:
//!
//! - `POST /evaluate` with [`EvaluateRequest`] → [`EvaluateResponse`]
//! - `POST /input_sizes` with [`SizesRequest`] → [`InputSizesResponse`]
//! - `POST /output_sizes` with [`SizesRequest`] → [`OutputSizesResponse`]
//! - `GET /info` → [`InfoResponse`]
//!
//! Failures carry an [`ErrorResponse`] envelope with a machine-readable
//! `kind` alongside the human-readable message.

use serde::{Deserialize, Serialize};

use crate::model::{Config, Vector};

/// Version stamped into `GET /info` responses.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    /// Which hosted model to evaluate.
    pub name: String,
    /// Parameter vectors, one output vector returned per entry.
    pub input: Vec<Vector>,
    /// Carried unchanged to the model; may be omitted on the wire.
    #[serde(default, skip_serializing_if = "Config::is_empty")]
    pub config: Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateResponse {
    pub output: Vec<Vector>,
}

/// Shared body of the two size-introspection calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizesRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Config::is_empty")]
    pub config: Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSizesResponse {
    pub input_sizes: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSizesResponse {
    pub output_sizes: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub protocol_version: u32,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub supports_evaluate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: WireError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    /// Stable tag, see [`crate::Error::kind`].
    pub kind: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_request_config_is_optional() {
        let req: EvaluateRequest =
            serde_json::from_str(r#"{"name": "forward", "input": [[1.0, 2.0]]}"#).unwrap();
        assert_eq!(req.name, "forward");
        assert_eq!(req.input, vec![vec![1.0, 2.0]]);
        assert!(req.config.is_empty());
    }

    #[test]
    fn empty_config_is_omitted_on_the_wire() {
        let req = EvaluateRequest {
            name: "forward".into(),
            input: vec![vec![0.5]],
            config: Config::new(),
        };
        let text = serde_json::to_string(&req).unwrap();
        assert!(!text.contains("config"));
    }

    #[test]
    fn error_envelope_round_trips() {
        let body = ErrorResponse {
            error: WireError {
                kind: "invalid_input".into(),
                message: "batching requires exactly one input vector, got 2".into(),
            },
        };
        let parsed: ErrorResponse =
            serde_json::from_str(&serde_json::to_string(&body).unwrap()).unwrap();
        assert_eq!(parsed.error.kind, "invalid_input");
    }
}
