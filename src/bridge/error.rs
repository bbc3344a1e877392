//! Bridge error types

use std::path::PathBuf;

use thiserror::Error;

use super::embedding::EmbeddingError;

/// Failure of a bridge operation.
///
/// Everything except [`BridgeError::Usage`] is reported through the guest
/// failure path; any guest exception left pending by the failing step is
/// picked up by the exception translator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// Malformed request, detected before the guest is touched
    #[error("{0}")]
    Usage(String),

    /// The guest raised; the exception is pending in the guest
    #[error("guest raised an exception")]
    Guest,

    /// A dotted path segment did not resolve
    #[error("cannot resolve \"{path}\": no attribute \"{segment}\" (segment {position})")]
    UnresolvedSegment {
        path: String,
        segment: String,
        position: usize,
    },

    /// The resolved object cannot be invoked
    #[error("\"{path}\" is not callable: object of type '{type_name}'")]
    NotCallable { path: String, type_name: String },

    /// The result could not be converted
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Guest shared library could not be made available
    #[error("guest library {path} is not available: {reason}")]
    GuestLibrary { path: PathBuf, reason: String },

    /// Configured guest start-up script raised
    #[error("guest start-up script failed\n{0}")]
    Startup(String),

    #[error("no object runtime is attached to this bridge")]
    NoLiveGuest,

    #[error("no command runtime is attached to this bridge")]
    NoLiveHost,
}

impl BridgeError {
    /// Context line shown above the guest traceback, if the variant has one
    pub fn context(&self) -> Option<String> {
        match self {
            BridgeError::Guest | BridgeError::Marshal(MarshalError::Guest) => None,
            other => Some(other.to_string()),
        }
    }
}

/// Failure converting a guest value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MarshalError {
    /// Containers nest deeper than the configured bound
    #[error("value nesting exceeds {limit} levels")]
    DepthExceeded { limit: usize },

    /// A capability probe raised inside the guest
    #[error("guest raised while converting a value")]
    Guest,
}
