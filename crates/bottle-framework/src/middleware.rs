//! Middleware hooks around a view's handler loop.
//!
//! Middleware is passed into a view explicitly and runs in registration
//! order for both phases:
//!
//! ```text
//! pre(m1) → pre(m2) → handlers → post(m1) → post(m2)
//! ```
//!
//! A pre hook returning [`MiddlewareFlow::Stop`] aborts the dispatch: no
//! handler runs and no post hook runs.

use std::sync::Arc;

use async_trait::async_trait;
use tower::BoxError;

use crate::context::ContextVariables;
use crate::returns::HandlerResponse;

/// Whether the dispatch continues after a pre hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MiddlewareFlow {
    #[default]
    Continue,
    Stop,
}

/// Everything a post hook gets to see about the finished handler loop.
#[derive(Debug)]
pub struct PostContext<'a, C> {
    /// Name of the view that dispatched the event.
    pub view: &'a str,
    pub ctx: &'a C,
    pub variables: &'a ContextVariables,
    /// Responses of the handlers that ran, in order.
    pub responses: &'a [HandlerResponse],
    /// Names of the handlers that ran. Empty if none accepted.
    pub handlers: &'a [String],
}

/// A pair of hooks around the handler loop. Both default to no-ops.
#[async_trait]
pub trait Middleware<C: Send + Sync + 'static>: Send + Sync {
    /// Runs before any handler. May add context variables.
    async fn pre(
        &self,
        _ctx: &C,
        _variables: &mut ContextVariables,
    ) -> Result<MiddlewareFlow, BoxError> {
        Ok(MiddlewareFlow::Continue)
    }

    /// Runs after the handler loop unless a pre hook stopped the dispatch.
    async fn post(&self, _post: PostContext<'_, C>) -> Result<(), BoxError> {
        Ok(())
    }

    /// A name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A type-erased middleware.
pub type BoxedMiddleware<C> = Arc<dyn Middleware<C>>;
