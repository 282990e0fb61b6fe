//! Error types for the Bottle framework.

use thiserror::Error;
use tower::BoxError;

use bottle_core::EventError;

use crate::returns::ResponseKind;

/// Errors that abort the dispatch of a single event.
///
/// Failures raised by user code (filters, handlers, middleware and return
/// handlers) are carried unchanged in `source`; the framework never retries
/// or suppresses them.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The view was set up inconsistently.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The raw event could not be turned into a context.
    #[error(transparent)]
    Event(#[from] EventError),

    /// A filter returned an error.
    #[error("filter of handler '{handler}' failed: {source}")]
    Filter {
        /// The handler whose filter failed.
        handler: String,
        #[source]
        source: BoxError,
    },

    /// A handler returned an error.
    #[error("handler '{handler}' failed: {source}")]
    Handler {
        /// The failing handler.
        handler: String,
        #[source]
        source: BoxError,
    },

    /// A middleware hook returned an error.
    #[error("middleware '{middleware}' failed: {source}")]
    Middleware {
        /// The failing middleware.
        middleware: String,
        #[source]
        source: BoxError,
    },

    /// A return handler failed while post-processing a response.
    #[error("return handler for {kind:?} responses failed: {source}")]
    ReturnHandler {
        /// The response kind being processed.
        kind: ResponseKind,
        #[source]
        source: BoxError,
    },
}

impl DispatchError {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
