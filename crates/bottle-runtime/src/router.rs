//! Event routing across views.
//!
//! The router offers every incoming event to each registered view in
//! registration order; every view that admits the event dispatches it.
//! It is also a [`tower::Service`], so it can sit behind tower middleware:
//!
//! ```rust,ignore
//! use tower::ServiceExt;
//!
//! let reports = router.clone().oneshot(event).await?;
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tower::Service;
use tracing::{Instrument, Level, debug, span};

use bottle_core::{BoxedApi, BoxedStateDispenser, BuiltinStateDispenser, RawEvent};
use bottle_framework::{BoxedView, DispatchReport, View};

use crate::error::{RuntimeError, RuntimeResult};

/// Routes events to views. Cloning is cheap.
#[derive(Clone)]
pub struct Router {
    views: Arc<Vec<BoxedView>>,
    api: BoxedApi,
    states: BoxedStateDispenser,
}

impl Router {
    /// Creates a router with an in-memory state dispenser.
    pub fn new(api: BoxedApi) -> Self {
        Self {
            views: Arc::new(Vec::new()),
            api,
            states: Arc::new(BuiltinStateDispenser::new()),
        }
    }

    /// Replaces the state dispenser.
    pub fn with_states(mut self, states: BoxedStateDispenser) -> Self {
        self.states = states;
        self
    }

    /// Appends a view.
    pub fn add_view<V: View + 'static>(&mut self, view: V) -> &mut Self {
        Arc::make_mut(&mut self.views).push(Arc::new(view));
        self
    }

    /// Appends a view (builder pattern).
    pub fn with_view<V: View + 'static>(mut self, view: V) -> Self {
        self.add_view(view);
        self
    }

    pub fn api(&self) -> &BoxedApi {
        &self.api
    }

    pub fn states(&self) -> &BoxedStateDispenser {
        &self.states
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Dispatches `event` through every view that admits it.
    ///
    /// Stops at the first failing view.
    pub async fn route(&self, event: RawEvent) -> RuntimeResult<Vec<DispatchReport>> {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            event_type = %event.event_type(),
            event_id = event.event_id().unwrap_or_default(),
        );
        async {
            let mut reports = Vec::new();
            for view in self.views.iter().filter(|view| view.process_event(&event)) {
                let report = view
                    .handle_event(&event, &self.api, &self.states)
                    .await
                    .map_err(|source| RuntimeError::Dispatch {
                        view: view.name().to_string(),
                        source,
                    })?;
                debug!(
                    view = view.name(),
                    handlers = report.handlers.len(),
                    aborted = report.aborted,
                    "View finished"
                );
                reports.push(report);
            }
            if reports.is_empty() {
                debug!("No view admitted the event");
            }
            Ok(reports)
        }
        .instrument(span)
        .await
    }

    /// Parses a transport payload and routes it.
    pub async fn route_value(&self, value: Value) -> RuntimeResult<Vec<DispatchReport>> {
        self.route(RawEvent::from_value(value)?).await
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field(
                "views",
                &self.views.iter().map(|v| v.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Service<RawEvent> for Router {
    type Response = Vec<DispatchReport>;
    type Error = RuntimeError;
    type Future = BoxFuture<'static, RuntimeResult<Vec<DispatchReport>>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: RawEvent) -> Self::Future {
        let router = self.clone();
        async move { router.route(event).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tower::ServiceExt;

    use bottle_core::{Api, ApiResult, GroupEventType};
    use bottle_framework::{
        DispatchError, HandlerResponse, MessageContext, MessageView, RawEventContext, RawEventView,
        handler,
    };

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Api for RecordingApi {
        async fn request(&self, method: &str, _params: Value) -> ApiResult<Value> {
            self.calls.lock().push(method.to_string());
            Ok(json!(1))
        }
    }

    fn router() -> (Arc<RecordingApi>, Router) {
        let api = Arc::new(RecordingApi::default());
        let mut message = MessageView::new();
        message.add_handler(handler().name("echo").handle(
            |ctx: Arc<MessageContext>, _| async move { ctx.text.clone() },
        ));
        let mut raw = RawEventView::new();
        raw.register::<Value, _>(
            GroupEventType::GroupJoin,
            handler()
                .name("join")
                .handle(|_: Arc<RawEventContext>, _| async {}),
        )
        .unwrap();

        let router = Router::new(api.clone()).with_view(message).with_view(raw);
        (api, router)
    }

    fn message(text: &str) -> Value {
        json!({
            "type": "message_new",
            "object": {"message": {"peer_id": 1, "from_id": 1, "text": text}},
        })
    }

    #[tokio::test]
    async fn test_routes_to_admitting_views() {
        let (api, router) = router();

        let reports = router.route_value(message("hi")).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].view, "message");
        assert_eq!(reports[0].handlers, vec!["echo".to_string()]);
        assert_eq!(*api.calls.lock(), vec!["messages.send".to_string()]);

        let reports = router
            .route_value(json!({"type": "group_join", "object": {"user_id": 2}}))
            .await
            .unwrap();
        assert_eq!(reports[0].view, "raw");

        let reports = router
            .route_value(json!({"type": "wall_post_new", "object": {}}))
            .await
            .unwrap();
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let (_, router) = router();
        let err = router.route_value(json!({"object": {}})).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Event(_)));
    }

    #[tokio::test]
    async fn test_view_failure_names_view() {
        let (_, router) = router();
        let err = router
            .route_value(json!({"type": "message_new", "object": {}}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Dispatch { ref view, source: DispatchError::Event(_) } if view == "message"
        ));
    }

    #[tokio::test]
    async fn test_tower_service() {
        let (_, router) = router();
        let event = RawEvent::from_value(message("ping")).unwrap();
        let reports = router.clone().oneshot(event).await.unwrap();
        assert_eq!(
            reports[0].responses,
            vec![HandlerResponse::Text("ping".into())]
        );
    }
}
