//! Views: per-category dispatch pipelines.
//!
//! A view owns the handlers for one category of events and runs each
//! admitted event through the same sequence:
//!
//! ```text
//! admit → build context → attach state → pre middleware
//!       → handler loop → post middleware
//! ```
//!
//! [`MessageView`] handles `message_new` events with an ordered handler
//! list; [`RawEventView`] binds exactly one handler per event type.

mod message;
mod raw;

pub use message::{MessageView, TextApproximator};
pub use raw::{HandlerBasement, RawEventView};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use bottle_core::{BoxedApi, BoxedStateDispenser, RawEvent};

use crate::context::ContextVariables;
use crate::error::{DispatchError, DispatchResult};
use crate::handler::{FilterResult, Handler};
use crate::middleware::{BoxedMiddleware, MiddlewareFlow, PostContext};
use crate::returns::{HandlerResponse, ReturnManager};

/// A dispatch pipeline for one category of events.
#[async_trait]
pub trait View: Send + Sync {
    /// A name used in logs and passed to post middleware.
    fn name(&self) -> &str;

    /// Returns `true` if this view handles `event`.
    fn process_event(&self, event: &RawEvent) -> bool;

    /// Dispatches an admitted event.
    async fn handle_event(
        &self,
        event: &RawEvent,
        api: &BoxedApi,
        states: &BoxedStateDispenser,
    ) -> DispatchResult<DispatchReport>;
}

/// A type-erased view.
pub type BoxedView = Arc<dyn View>;

/// What happened during one dispatch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// The view that dispatched the event.
    pub view: String,
    /// `true` if a pre hook stopped the dispatch.
    pub aborted: bool,
    /// Names of the handlers that ran, in order.
    pub handlers: Vec<String>,
    /// Their responses, in the same order.
    pub responses: Vec<HandlerResponse>,
}

impl DispatchReport {
    fn new(view: &str) -> Self {
        Self {
            view: view.to_string(),
            ..Default::default()
        }
    }

    fn aborted(view: &str) -> Self {
        Self {
            aborted: true,
            ..Self::new(view)
        }
    }

    /// Returns `true` if at least one handler ran.
    pub fn is_handled(&self) -> bool {
        !self.handlers.is_empty()
    }
}

/// Runs all pre hooks in order, stopping at the first `Stop`.
async fn run_pre<C: Send + Sync + 'static>(
    view: &str,
    middlewares: &[BoxedMiddleware<C>],
    ctx: &C,
    variables: &mut ContextVariables,
) -> DispatchResult<MiddlewareFlow> {
    for middleware in middlewares {
        let flow = middleware
            .pre(ctx, variables)
            .await
            .map_err(|source| DispatchError::Middleware {
                middleware: middleware.name().to_string(),
                source,
            })?;
        if flow == MiddlewareFlow::Stop {
            info!(view, middleware = middleware.name(), "Dispatch stopped by pre-middleware");
            return Ok(MiddlewareFlow::Stop);
        }
    }
    Ok(MiddlewareFlow::Continue)
}

/// Runs all post hooks in registration order.
async fn run_post<C: Send + Sync + 'static>(
    middlewares: &[BoxedMiddleware<C>],
    ctx: &C,
    variables: &ContextVariables,
    report: &DispatchReport,
) -> DispatchResult<()> {
    for middleware in middlewares {
        let post = PostContext {
            view: &report.view,
            ctx,
            variables,
            responses: &report.responses,
            handlers: &report.handlers,
        };
        middleware
            .post(post)
            .await
            .map_err(|source| DispatchError::Middleware {
                middleware: middleware.name().to_string(),
                source,
            })?;
    }
    Ok(())
}

/// Filters and, on acceptance, runs one handler.
///
/// Accepted variables are merged before `handle` runs, the response is
/// recorded and then passed to the return manager. Returns whether the
/// handler accepted.
async fn run_handler<C: Send + Sync + 'static>(
    handler: &dyn Handler<C>,
    ctx: &Arc<C>,
    variables: &mut ContextVariables,
    return_manager: &ReturnManager<C>,
    report: &mut DispatchReport,
) -> DispatchResult<bool> {
    let name = handler.name().to_string();
    let result = handler
        .filter(ctx)
        .await
        .map_err(|source| DispatchError::Filter {
            handler: name.clone(),
            source,
        })?;
    debug!(handler = %name, accepted = result.is_accepted(), "Filter evaluated");

    match result {
        FilterResult::Reject => return Ok(false),
        FilterResult::Accept => {}
        FilterResult::AcceptWith(entries) => variables.extend(entries),
    }

    let response = handler
        .handle(Arc::clone(ctx), variables.clone())
        .await
        .map_err(|source| DispatchError::Handler {
            handler: name.clone(),
            source,
        })?;
    report.handlers.push(name);
    report.responses.push(response.clone());

    return_manager
        .dispatch(&response, ctx, variables)
        .await
        .map_err(|source| DispatchError::ReturnHandler {
            kind: response.kind(),
            source,
        })?;
    Ok(true)
}
