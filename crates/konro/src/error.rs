use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the model contract, the batching coordinator, and the
/// HTTP binding.
///
/// The enum is `Clone` because a single terminal batch failure must fan out
/// to every caller waiting on that batch; payloads are therefore plain data
/// rather than source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The caller supplied other than exactly one parameter vector.
    #[error("batching requires exactly one input vector, got {0}")]
    InvalidInput(usize),

    /// The request config is missing the field used to derive the batch key.
    #[error("config is missing batch key field `{0}`")]
    MissingKey(String),

    /// The batch key field is present but not usable as a key.
    #[error("config field `{field}` cannot be used as a batch key: {reason}")]
    InvalidKey { field: String, reason: String },

    /// A protocol request named a model this server does not host.
    #[error("unknown model `{0}`")]
    UnknownModel(String),

    /// The downstream model kept failing until the retry policy gave up.
    /// Delivered to every waiter of the affected batch.
    #[error("downstream evaluation failed after {attempts} attempts: {message}")]
    Upstream { attempts: u32, message: String },

    /// A well-formed HTTP exchange carried a payload the protocol does not
    /// allow, e.g. a result list whose length disagrees with the batch.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The HTTP request itself failed (connect, timeout, non-protocol body).
    #[error("transport error: {0}")]
    Transport(String),

    /// A result channel was dropped before delivering, meaning the dispatch
    /// task died. Callers get this instead of hanging.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable tag, used as `error.kind` on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::MissingKey(_) => "missing_key",
            Error::InvalidKey { .. } => "invalid_key",
            Error::UnknownModel(_) => "unknown_model",
            Error::Upstream { .. } => "upstream",
            Error::Protocol(_) => "protocol",
            Error::Transport(_) => "transport",
            Error::Internal(_) => "internal",
        }
    }

    /// Rebuild an error from its wire representation.
    pub(crate) fn from_wire(kind: &str, message: String) -> Self {
        match kind {
            "invalid_input" | "missing_key" | "invalid_key" => {
                // Arity and key problems are validated before a request ever
                // leaves the client, so a remote report keeps only the text.
                Error::Protocol(message)
            }
            "unknown_model" => Error::UnknownModel(message),
            "upstream" => Error::Upstream {
                attempts: 0,
                message,
            },
            "protocol" => Error::Protocol(message),
            "internal" => Error::Internal(message),
            other => Error::Protocol(format!("unrecognized error kind `{other}`: {message}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(Error::InvalidInput(3).kind(), "invalid_input");
        assert_eq!(
            Error::Upstream {
                attempts: 3,
                message: "boom".into()
            }
            .kind(),
            "upstream"
        );
        assert_eq!(Error::UnknownModel("fwd".into()).kind(), "unknown_model");
    }

    #[test]
    fn display_carries_context() {
        let err = Error::Upstream {
            attempts: 3,
            message: "connection reset".into(),
        };
        let text = err.to_string();
        assert!(text.contains("3 attempts"));
        assert!(text.contains("connection reset"));
    }
}
