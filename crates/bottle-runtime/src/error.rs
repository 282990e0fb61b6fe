//! Runtime error types.

use thiserror::Error;

use bottle_core::EventError;
use bottle_framework::DispatchError;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A transport payload was not a valid event.
    #[error("Malformed event: {0}")]
    Event(#[from] EventError),

    /// A view failed while dispatching an event.
    #[error("View '{view}' failed: {source}")]
    Dispatch {
        view: String,
        #[source]
        source: DispatchError,
    },
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
