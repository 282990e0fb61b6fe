//! Unified error types for the Bottle core.
//!
//! Framework-level errors (like `DispatchError`) are defined in
//! `bottle-framework`; upload errors live in `bottle-upload`.

use thiserror::Error;

// =============================================================================
// API Errors
// =============================================================================

/// Error type for platform API calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The platform answered with an error envelope.
    #[error("upstream error ({code}): {message}")]
    Upstream {
        /// Platform error code.
        code: i64,
        /// Human-readable description reported by the platform.
        message: String,
    },

    /// The request never reached the platform, or its answer was lost.
    #[error("transport error: {0}")]
    Transport(String),

    /// Failed to serialize/deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Creates an upstream error.
    pub fn upstream(code: i64, message: impl Into<String>) -> Self {
        Self::Upstream {
            code,
            message: message.into(),
        }
    }

    /// Returns the platform error code if this is an upstream error.
    pub fn upstream_code(&self) -> Option<i64> {
        match self {
            Self::Upstream { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// State Errors
// =============================================================================

/// Errors reported by a [`StateDispenser`](crate::state::StateDispenser).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The peer has no state entry.
    #[error("no state stored for peer {peer_id}")]
    KeyNotFound {
        /// The peer that was looked up.
        peer_id: i64,
    },
}

// =============================================================================
// Event Errors
// =============================================================================

/// Errors raised while turning a raw transport payload into an event.
#[derive(Debug, Clone, Error)]
pub enum EventError {
    /// A required field is absent.
    #[error("event is missing field '{0}'")]
    MissingField(&'static str),

    /// The payload does not have the expected shape.
    #[error("malformed event: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for state dispenser operations.
pub type StateResult<T> = Result<T, StateError>;

/// Result type for event parsing.
pub type EventResult<T> = Result<T, EventError>;
