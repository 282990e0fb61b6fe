use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use bottle_core::{BoxedApi, BoxedStateDispenser, EventResult, GroupEventType, RawEvent};

use super::{DispatchReport, View, run_handler, run_post, run_pre};
use crate::context::{ContextVariables, RawEventContext};
use crate::error::{DispatchError, DispatchResult};
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{BoxedMiddleware, Middleware, MiddlewareFlow};
use crate::returns::ReturnManager;

type ModelConstructor =
    Arc<dyn Fn(&Value) -> EventResult<Arc<dyn Any + Send + Sync>> + Send + Sync>;

const DEFAULT_STATE_SOURCE_KEY: &str = "user_id";

/// The binding of one event type to its model constructor and handler.
#[derive(Clone)]
pub struct HandlerBasement {
    constructor: ModelConstructor,
    handler: BoxedHandler<RawEventContext>,
}

impl HandlerBasement {
    /// Binds `handler` to events whose `object` deserializes into `M`.
    pub fn new<M, H>(handler: H) -> Self
    where
        M: DeserializeOwned + Send + Sync + 'static,
        H: Handler<RawEventContext> + 'static,
    {
        Self {
            constructor: Arc::new(
                |object: &Value| -> EventResult<Arc<dyn Any + Send + Sync>> {
                    Ok(Arc::new(M::deserialize(object)?))
                },
            ),
            handler: Arc::new(handler),
        }
    }

    /// Builds the typed model from an event object.
    pub fn construct(&self, object: &Value) -> EventResult<Arc<dyn Any + Send + Sync>> {
        (self.constructor)(object)
    }

    pub fn handler(&self) -> &BoxedHandler<RawEventContext> {
        &self.handler
    }
}

impl std::fmt::Debug for HandlerBasement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerBasement")
            .field("handler", &self.handler.name())
            .finish_non_exhaustive()
    }
}

/// The view for non-message events.
///
/// Each event type is bound to exactly one handler; there is no handler
/// loop and no blocking.
///
/// ```rust,ignore
/// #[derive(Deserialize)]
/// struct GroupJoin { user_id: i64, join_type: String }
///
/// let mut view = RawEventView::new();
/// view.register::<GroupJoin, _>(GroupEventType::GroupJoin, handler().handle(
///     |ctx: Arc<RawEventContext>, _| async move {
///         let join = ctx.model::<GroupJoin>();
///         // ...
///     },
/// ))?;
/// ```
pub struct RawEventView {
    basements: HashMap<GroupEventType, HandlerBasement>,
    middlewares: Vec<BoxedMiddleware<RawEventContext>>,
    return_manager: ReturnManager<RawEventContext>,
    state_source_key: String,
}

impl RawEventView {
    /// Creates a view without middleware.
    pub fn new() -> Self {
        Self::with_middlewares(Vec::new())
    }

    /// Creates a view with the given middleware, in execution order.
    pub fn with_middlewares(middlewares: Vec<BoxedMiddleware<RawEventContext>>) -> Self {
        Self {
            basements: HashMap::new(),
            middlewares,
            return_manager: ReturnManager::new(),
            state_source_key: DEFAULT_STATE_SOURCE_KEY.to_string(),
        }
    }

    /// Binds `handler` to `event_type` with model type `M`.
    ///
    /// Fails with [`DispatchError::Configuration`] if the event type is
    /// already bound.
    pub fn register<M, H>(
        &mut self,
        event_type: impl Into<GroupEventType>,
        handler: H,
    ) -> DispatchResult<&mut Self>
    where
        M: DeserializeOwned + Send + Sync + 'static,
        H: Handler<RawEventContext> + 'static,
    {
        self.register_basement(event_type, HandlerBasement::new::<M, H>(handler))
    }

    /// Binds a prepared basement to `event_type`.
    pub fn register_basement(
        &mut self,
        event_type: impl Into<GroupEventType>,
        basement: HandlerBasement,
    ) -> DispatchResult<&mut Self> {
        let event_type = event_type.into();
        if self.basements.contains_key(&event_type) {
            return Err(DispatchError::configuration(format!(
                "a handler for '{event_type}' is already registered"
            )));
        }
        debug!(event_type = %event_type, handler = basement.handler.name(), "Registered raw event handler");
        self.basements.insert(event_type, basement);
        Ok(self)
    }

    /// Appends a middleware.
    pub fn add_middleware<M>(&mut self, middleware: M) -> &mut Self
    where
        M: Middleware<RawEventContext> + 'static,
    {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Replaces the return manager. The default one has no handlers.
    pub fn set_return_manager(&mut self, manager: ReturnManager<RawEventContext>) -> &mut Self {
        self.return_manager = manager;
        self
    }

    /// Sets the `object` field the state key is read from.
    pub fn set_state_source_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.state_source_key = key.into();
        self
    }

    /// Returns the bound event types.
    pub fn event_types(&self) -> impl Iterator<Item = &GroupEventType> {
        self.basements.keys()
    }
}

impl Default for RawEventView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl View for RawEventView {
    fn name(&self) -> &str {
        "raw"
    }

    fn process_event(&self, event: &RawEvent) -> bool {
        self.basements.contains_key(event.event_type())
    }

    async fn handle_event(
        &self,
        event: &RawEvent,
        api: &BoxedApi,
        states: &BoxedStateDispenser,
    ) -> DispatchResult<DispatchReport> {
        let Some(basement) = self.basements.get(event.event_type()) else {
            trace!(event_type = %event.event_type(), "No raw handler bound");
            return Ok(DispatchReport::new(self.name()));
        };

        let model = basement.construct(event.object())?;
        let state_key = event
            .object()
            .get(&self.state_source_key)
            .and_then(Value::as_i64);
        let state_peer = states.cast(state_key).await;
        let ctx = Arc::new(
            RawEventContext::new(event.clone(), model, Arc::clone(api)).with_state(state_peer),
        );

        let mut variables = ContextVariables::new();
        if run_pre(self.name(), &self.middlewares, &*ctx, &mut variables).await?
            == MiddlewareFlow::Stop
        {
            return Ok(DispatchReport::aborted(self.name()));
        }

        let mut report = DispatchReport::new(self.name());
        run_handler(
            basement.handler.as_ref(),
            &ctx,
            &mut variables,
            &self.return_manager,
            &mut report,
        )
        .await?;

        run_post(&self.middlewares, &*ctx, &variables, &report).await?;
        Ok(report)
    }
}
