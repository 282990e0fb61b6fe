//! Handler return values and their post-processing.
//!
//! Handlers return plain values instead of calling the API by hand. Every
//! return value becomes a [`HandlerResponse`]; the view then asks its
//! [`ReturnManager`] for the [`ReturnHandler`] registered for the response's
//! [`ResponseKind`] and runs it. Responses without a registered handler are
//! dropped.
//!
//! ```rust,ignore
//! // `Text` responses are answered to the peer by the default manager.
//! let echo = handler().handle(|ctx: Arc<MessageContext>, _| async move {
//!     ctx.text.clone()
//! });
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tower::BoxError;
use tracing::debug;

use crate::context::{ContextVariables, MessageContext};

// ============================================================================
// HandlerResponse
// ============================================================================

/// The value a handler produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HandlerResponse {
    /// No value.
    #[default]
    None,
    /// A plain string.
    Text(String),
    /// A structured payload.
    Json(Value),
}

/// The shape of a [`HandlerResponse`], used as the return manager's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    None,
    Text,
    Json,
}

impl HandlerResponse {
    /// Returns the kind of this response.
    pub fn kind(&self) -> ResponseKind {
        match self {
            Self::None => ResponseKind::None,
            Self::Text(_) => ResponseKind::Text,
            Self::Json(_) => ResponseKind::Json,
        }
    }

    /// Returns the text, if this is a text response.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

// ============================================================================
// IntoResponse
// ============================================================================

/// Conversion of handler return values into a [`HandlerResponse`].
///
/// `Result` values propagate their error; the view aborts the dispatch with it.
pub trait IntoResponse: Send + 'static {
    fn into_response(self) -> Result<HandlerResponse, BoxError>;
}

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> Result<HandlerResponse, BoxError> {
        Ok(self)
    }
}

impl IntoResponse for () {
    fn into_response(self) -> Result<HandlerResponse, BoxError> {
        Ok(HandlerResponse::None)
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Result<HandlerResponse, BoxError> {
        Ok(HandlerResponse::Text(self))
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Result<HandlerResponse, BoxError> {
        Ok(HandlerResponse::Text(self.to_string()))
    }
}

impl IntoResponse for Value {
    fn into_response(self) -> Result<HandlerResponse, BoxError> {
        Ok(match self {
            Value::Null => HandlerResponse::None,
            Value::String(text) => HandlerResponse::Text(text),
            other => HandlerResponse::Json(other),
        })
    }
}

impl<T: IntoResponse> IntoResponse for Option<T> {
    fn into_response(self) -> Result<HandlerResponse, BoxError> {
        match self {
            Some(t) => t.into_response(),
            None => Ok(HandlerResponse::None),
        }
    }
}

impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: Into<BoxError> + Send + 'static,
{
    fn into_response(self) -> Result<HandlerResponse, BoxError> {
        self.map_err(Into::into)?.into_response()
    }
}

// ============================================================================
// ReturnManager
// ============================================================================

/// Post-processes one kind of handler response.
#[async_trait]
pub trait ReturnHandler<C>: Send + Sync {
    async fn process(
        &self,
        manager: &ReturnManager<C>,
        response: &HandlerResponse,
        ctx: &C,
        variables: &ContextVariables,
    ) -> Result<(), BoxError>;
}

/// A type-erased return handler.
pub type BoxedReturnHandler<C> = Arc<dyn ReturnHandler<C>>;

/// Lookup table from [`ResponseKind`] to [`ReturnHandler`].
pub struct ReturnManager<C> {
    handlers: HashMap<ResponseKind, BoxedReturnHandler<C>>,
}

impl<C: Send + Sync + 'static> ReturnManager<C> {
    /// Creates a manager with no registered handlers.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `kind`, replacing any previous one.
    pub fn register<H>(&mut self, kind: ResponseKind, handler: H)
    where
        H: ReturnHandler<C> + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
    }

    /// Registers `handler` for `kind` (builder pattern).
    pub fn with<H>(mut self, kind: ResponseKind, handler: H) -> Self
    where
        H: ReturnHandler<C> + 'static,
    {
        self.register(kind, handler);
        self
    }

    /// Returns the handler for the response's kind.
    pub fn get_handler(&self, response: &HandlerResponse) -> Option<&BoxedReturnHandler<C>> {
        self.handlers.get(&response.kind())
    }

    /// Runs the matching handler for `response`, if one is registered.
    ///
    /// Returns `Ok(false)` when no handler matched.
    pub async fn dispatch(
        &self,
        response: &HandlerResponse,
        ctx: &C,
        variables: &ContextVariables,
    ) -> Result<bool, BoxError> {
        match self.get_handler(response) {
            Some(handler) => {
                handler.process(self, response, ctx, variables).await?;
                Ok(true)
            }
            None => {
                debug!(kind = ?response.kind(), "No return handler registered, dropping response");
                Ok(false)
            }
        }
    }
}

impl<C: Send + Sync + 'static> Default for ReturnManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for ReturnManager<C> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<C> std::fmt::Debug for ReturnManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReturnManager")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Message defaults
// ============================================================================

/// Answers `Text` responses to the peer the message came from.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnswerText;

#[async_trait]
impl ReturnHandler<MessageContext> for AnswerText {
    async fn process(
        &self,
        _manager: &ReturnManager<MessageContext>,
        response: &HandlerResponse,
        ctx: &MessageContext,
        _variables: &ContextVariables,
    ) -> Result<(), BoxError> {
        if let Some(text) = response.as_text() {
            ctx.answer(text).await?;
        }
        Ok(())
    }
}

/// The default manager for message views: `Text` responses are answered.
pub fn message_return_manager() -> ReturnManager<MessageContext> {
    ReturnManager::new().with(ResponseKind::Text, AnswerText)
}
