//! Handler system for the Bottle framework.
//!
//! A handler is a filter plus an action:
//!
//! - [`filter`](Handler::filter) decides whether the handler accepts the
//!   event and may contribute [`ContextVariables`]
//! - [`handle`](Handler::handle) runs the action and returns a
//!   [`HandlerResponse`] for the return manager
//! - [`is_blocking`](Handler::is_blocking) stops later handlers of the same
//!   view once this one accepted
//!
//! Implement [`Handler`] directly, or build one from closures:
//!
//! ```rust,ignore
//! use bottle_framework::{handler, rules};
//!
//! let start = handler()
//!     .name("start")
//!     .filter(rules::command("/start"))
//!     .handle(|ctx: Arc<MessageContext>, vars| async move {
//!         format!("welcome, {}! args: {:?}", ctx.from_id, vars.get("args"))
//!     });
//!
//! view.add_handler(start);
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tower::BoxError;

use crate::context::ContextVariables;
use crate::returns::{HandlerResponse, IntoResponse};

// ============================================================================
// FilterResult
// ============================================================================

/// The outcome of a handler's filter.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FilterResult {
    /// Skip this handler and try the next one.
    #[default]
    Reject,
    /// Accept the event.
    Accept,
    /// Accept the event and merge the entries into the context variables.
    AcceptWith(Map<String, Value>),
}

impl FilterResult {
    /// Returns `true` unless this is [`FilterResult::Reject`].
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Reject)
    }

    /// Combines two accepting results, merging their variables in order.
    ///
    /// Rejects if either side rejects.
    pub fn and(self, other: FilterResult) -> FilterResult {
        match (self, other) {
            (Self::Reject, _) | (_, Self::Reject) => Self::Reject,
            (Self::Accept, Self::Accept) => Self::Accept,
            (Self::AcceptWith(vars), Self::Accept) | (Self::Accept, Self::AcceptWith(vars)) => {
                Self::AcceptWith(vars)
            }
            (Self::AcceptWith(mut left), Self::AcceptWith(right)) => {
                left.extend(right);
                Self::AcceptWith(left)
            }
        }
    }
}

impl From<bool> for FilterResult {
    fn from(accepted: bool) -> Self {
        if accepted { Self::Accept } else { Self::Reject }
    }
}

impl From<Map<String, Value>> for FilterResult {
    fn from(vars: Map<String, Value>) -> Self {
        Self::AcceptWith(vars)
    }
}

impl From<Option<Map<String, Value>>> for FilterResult {
    fn from(vars: Option<Map<String, Value>>) -> Self {
        vars.map_or(Self::Reject, Self::AcceptWith)
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// The core trait for event handlers.
///
/// `C` is the context type of the view the handler is registered with.
/// Filters only see `&C`, so they cannot change the context variables except
/// through their return value.
#[async_trait]
pub trait Handler<C>: Send + Sync {
    /// Decides whether this handler accepts the event.
    async fn filter(&self, ctx: &C) -> Result<FilterResult, BoxError>;

    /// Runs the handler with a snapshot of the context variables.
    async fn handle(
        &self,
        ctx: Arc<C>,
        variables: ContextVariables,
    ) -> Result<HandlerResponse, BoxError>;

    /// Whether acceptance stops later handlers. Defaults to `true`.
    fn is_blocking(&self) -> bool {
        true
    }

    /// A name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler<C> = Arc<dyn Handler<C>>;

// ============================================================================
// FnHandler
// ============================================================================

type FilterFn<C> = Arc<dyn Fn(&C) -> FilterResult + Send + Sync>;
type HandleFn<C> =
    Arc<dyn Fn(Arc<C>, ContextVariables) -> BoxFuture<'static, Result<HandlerResponse, BoxError>> + Send + Sync>;

/// Starts building a handler from closures.
pub fn handler<C>() -> HandlerBuilder<C> {
    HandlerBuilder::new()
}

/// Builder for [`FnHandler`].
///
/// Filters added with [`filter`](Self::filter) are combined with
/// [`FilterResult::and`]; a builder without filters accepts every event.
pub struct HandlerBuilder<C> {
    name: Option<String>,
    filters: Vec<FilterFn<C>>,
    blocking: bool,
}

impl<C> HandlerBuilder<C> {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            name: None,
            filters: Vec::new(),
            blocking: true,
        }
    }

    /// Sets a name for this handler (useful for debugging).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a filter.
    pub fn filter<F, R>(mut self, f: F) -> Self
    where
        F: Fn(&C) -> R + Send + Sync + 'static,
        R: Into<FilterResult>,
    {
        self.filters.push(Arc::new(move |ctx| f(ctx).into()));
        self
    }

    /// Sets whether this handler blocks later handlers.
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Finishes the handler with its action.
    pub fn handle<F, Fut, R>(self, f: F) -> FnHandler<C>
    where
        F: Fn(Arc<C>, ContextVariables) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        FnHandler {
            name: self.name.unwrap_or_else(|| "handler".to_string()),
            filters: self.filters,
            handle: Arc::new(move |ctx, vars| f(ctx, vars).map(IntoResponse::into_response).boxed()),
            blocking: self.blocking,
            _marker: PhantomData,
        }
    }
}

impl<C> Default for HandlerBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// A handler built from closures by [`HandlerBuilder`].
pub struct FnHandler<C> {
    name: String,
    filters: Vec<FilterFn<C>>,
    handle: HandleFn<C>,
    blocking: bool,
    _marker: PhantomData<fn() -> C>,
}

impl<C> Clone for FnHandler<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            filters: self.filters.clone(),
            handle: Arc::clone(&self.handle),
            blocking: self.blocking,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Handler<C> for FnHandler<C> {
    async fn filter(&self, ctx: &C) -> Result<FilterResult, BoxError> {
        Ok(self
            .filters
            .iter()
            .fold(FilterResult::Accept, |acc, f| match acc {
                FilterResult::Reject => FilterResult::Reject,
                acc => acc.and(f(ctx)),
            }))
    }

    async fn handle(
        &self,
        ctx: Arc<C>,
        variables: ContextVariables,
    ) -> Result<HandlerResponse, BoxError> {
        (self.handle)(ctx, variables).await
    }

    fn is_blocking(&self) -> bool {
        self.blocking
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<C> std::fmt::Debug for FnHandler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler")
            .field("name", &self.name)
            .field("filter_count", &self.filters.len())
            .field("blocking", &self.blocking)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_filter_result_and() {
        let merged = FilterResult::AcceptWith(vars(json!({"a": 1})))
            .and(FilterResult::AcceptWith(vars(json!({"b": 2, "a": 3}))));
        assert_eq!(merged, FilterResult::AcceptWith(vars(json!({"a": 3, "b": 2}))));

        assert_eq!(
            FilterResult::Accept.and(FilterResult::Reject),
            FilterResult::Reject
        );
        assert!(FilterResult::from(true).is_accepted());
        assert!(!FilterResult::from(None::<Map<String, Value>>).is_accepted());
    }

    #[tokio::test]
    async fn test_fn_handler_filters_combine() {
        let h = handler::<i64>()
            .name("positive-even")
            .blocking(false)
            .filter(|n: &i64| *n > 0)
            .filter(|n: &i64| {
                (n % 2 == 0).then(|| vars(json!({"half": n / 2})))
            })
            .handle(|n: Arc<i64>, vars| async move {
                format!("{} {}", n, vars.get("half").cloned().unwrap_or_default())
            });

        assert_eq!(h.name(), "positive-even");
        assert!(!h.is_blocking());
        assert_eq!(h.filter(&-2).await.unwrap(), FilterResult::Reject);
        assert_eq!(h.filter(&3).await.unwrap(), FilterResult::Reject);
        assert_eq!(
            h.filter(&4).await.unwrap(),
            FilterResult::AcceptWith(vars(json!({"half": 2})))
        );

        let mut variables = ContextVariables::new();
        variables.insert("half", 2);
        let response = h.handle(Arc::new(4), variables).await.unwrap();
        assert_eq!(response, HandlerResponse::Text("4 2".into()));
    }

    #[test]
    fn test_fn_handler_defaults() {
        let h = handler::<()>().handle(|_, _| async {});
        assert!(h.is_blocking());
        assert_eq!(h.name(), "handler");

        tokio_test::block_on(async {
            assert_eq!(h.filter(&()).await.unwrap(), FilterResult::Accept);
            assert_eq!(
                h.handle(Arc::new(()), ContextVariables::new()).await.unwrap(),
                HandlerResponse::None
            );
        });
    }
}
