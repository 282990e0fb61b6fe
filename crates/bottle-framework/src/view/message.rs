use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use bottle_core::{BoxedApi, BoxedStateDispenser, GroupEventType, MessageMin, RawEvent};

use super::{DispatchReport, View, run_handler, run_post, run_pre};
use crate::context::{ContextVariables, MessageContext};
use crate::error::DispatchResult;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{BoxedMiddleware, Middleware, MiddlewareFlow};
use crate::returns::{ReturnManager, message_return_manager};

/// Rewrites message text before middleware and handlers see it.
pub type TextApproximator = Arc<dyn Fn(&str) -> String + Send + Sync>;

const DEFAULT_STATE_SOURCE_KEY: &str = "peer_id";

/// The view for `message_new` events.
///
/// Handlers are evaluated in registration order. A blocking handler that
/// accepts stops the loop; non-blocking handlers let later ones run too.
///
/// ```rust,ignore
/// let mut view = MessageView::with_middlewares(vec![Arc::new(Logger)]);
/// view.add_text_approximator(|text| text.trim().to_lowercase());
/// view.add_handler(handler().filter(rules::text(["hi"])).handle(|_, _| async { "hello" }));
/// ```
pub struct MessageView {
    handlers: Vec<BoxedHandler<MessageContext>>,
    middlewares: Vec<BoxedMiddleware<MessageContext>>,
    approximators: Vec<TextApproximator>,
    return_manager: ReturnManager<MessageContext>,
    state_source_key: String,
}

impl MessageView {
    /// Creates a view without middleware.
    pub fn new() -> Self {
        Self::with_middlewares(Vec::new())
    }

    /// Creates a view with the given middleware, in execution order.
    pub fn with_middlewares(middlewares: Vec<BoxedMiddleware<MessageContext>>) -> Self {
        Self {
            handlers: Vec::new(),
            middlewares,
            approximators: Vec::new(),
            return_manager: message_return_manager(),
            state_source_key: DEFAULT_STATE_SOURCE_KEY.to_string(),
        }
    }

    /// Appends a handler.
    pub fn add_handler<H>(&mut self, handler: H) -> &mut Self
    where
        H: Handler<MessageContext> + 'static,
    {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Appends a middleware.
    pub fn add_middleware<M>(&mut self, middleware: M) -> &mut Self
    where
        M: Middleware<MessageContext> + 'static,
    {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Appends a text approximator.
    pub fn add_text_approximator<F>(&mut self, approximator: F) -> &mut Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.approximators.push(Arc::new(approximator));
        self
    }

    /// Replaces the return manager.
    pub fn set_return_manager(&mut self, manager: ReturnManager<MessageContext>) -> &mut Self {
        self.return_manager = manager;
        self
    }

    /// Sets the `object.message` field the state key is read from.
    pub fn set_state_source_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.state_source_key = key.into();
        self
    }

    pub fn handlers(&self) -> &[BoxedHandler<MessageContext>] {
        &self.handlers
    }

    pub fn state_source_key(&self) -> &str {
        &self.state_source_key
    }

    fn build_context(&self, event: &RawEvent, api: &BoxedApi) -> DispatchResult<MessageContext> {
        let message = MessageMin::from_event(event)?;
        let mut ctx = MessageContext::new(message, event.clone(), Arc::clone(api));
        for approximator in &self.approximators {
            let text = approximator(&ctx.text);
            ctx.set_text(text);
        }
        Ok(ctx)
    }

    fn state_key(&self, event: &RawEvent) -> Option<i64> {
        event
            .object()
            .get("message")
            .and_then(|message| message.get(&self.state_source_key))
            .and_then(Value::as_i64)
    }
}

impl Default for MessageView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl View for MessageView {
    fn name(&self) -> &str {
        "message"
    }

    fn process_event(&self, event: &RawEvent) -> bool {
        *event.event_type() == GroupEventType::MessageNew
    }

    async fn handle_event(
        &self,
        event: &RawEvent,
        api: &BoxedApi,
        states: &BoxedStateDispenser,
    ) -> DispatchResult<DispatchReport> {
        let ctx = self.build_context(event, api)?;
        let state_peer = states.cast(self.state_key(event)).await;
        let ctx = Arc::new(ctx.with_state(state_peer));

        let mut variables = ContextVariables::new();
        if run_pre(self.name(), &self.middlewares, &*ctx, &mut variables).await?
            == MiddlewareFlow::Stop
        {
            return Ok(DispatchReport::aborted(self.name()));
        }

        let mut report = DispatchReport::new(self.name());
        for handler in &self.handlers {
            let accepted = run_handler(
                handler.as_ref(),
                &ctx,
                &mut variables,
                &self.return_manager,
                &mut report,
            )
            .await?;
            if accepted && handler.is_blocking() {
                debug!(handler = handler.name(), "Blocking handler accepted, stopping");
                break;
            }
        }

        run_post(&self.middlewares, &*ctx, &variables, &report).await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::{Map, json};
    use tower::BoxError;

    use bottle_core::{Api, ApiResult, BuiltinStateDispenser, StateTag};

    use crate::handler::handler;
    use crate::middleware::PostContext;
    use crate::returns::{HandlerResponse, ResponseKind};
    use crate::rules;

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl Api for RecordingApi {
        async fn request(&self, method: &str, params: Value) -> ApiResult<Value> {
            self.calls.lock().push((method.to_string(), params));
            Ok(json!(1))
        }
    }

    fn message_event(peer_id: i64, text: &str) -> RawEvent {
        RawEvent::from_value(json!({
            "type": "message_new",
            "object": {
                "message": {
                    "id": 10, "date": 0, "peer_id": peer_id, "from_id": 3,
                    "text": text, "ref_peer": 99,
                },
            },
            "group_id": 1,
        }))
        .unwrap()
    }

    fn deps() -> (Arc<RecordingApi>, BoxedApi, BoxedStateDispenser) {
        let recording = Arc::new(RecordingApi::default());
        let api: BoxedApi = recording.clone();
        (recording, api, Arc::new(BuiltinStateDispenser::new()))
    }

    /// Records the variables and handlers seen by `post`.
    #[derive(Default)]
    struct Recorder {
        stop: bool,
        pre_vars: Option<Map<String, Value>>,
        seen: Arc<Mutex<Vec<(Vec<String>, ContextVariables)>>>,
    }

    #[async_trait]
    impl Middleware<MessageContext> for Recorder {
        async fn pre(
            &self,
            _ctx: &MessageContext,
            variables: &mut ContextVariables,
        ) -> Result<MiddlewareFlow, BoxError> {
            if let Some(vars) = &self.pre_vars {
                variables.extend(vars.clone());
            }
            Ok(if self.stop {
                MiddlewareFlow::Stop
            } else {
                MiddlewareFlow::Continue
            })
        }

        async fn post(&self, post: PostContext<'_, MessageContext>) -> Result<(), BoxError> {
            assert_eq!(post.view, "message");
            self.seen
                .lock()
                .push((post.handlers.to_vec(), post.variables.clone()));
            Ok(())
        }

        fn name(&self) -> &str {
            "recorder"
        }
    }

    #[test]
    fn test_admits_only_message_new() {
        let view = MessageView::new();
        assert!(view.process_event(&message_event(1, "x")));
        let other = RawEvent::from_value(json!({"type": "group_join", "object": {}})).unwrap();
        assert!(!view.process_event(&other));
    }

    #[tokio::test]
    async fn test_blocking_handler_stops_loop() {
        let (recording, api, states) = deps();
        let second_ran = Arc::new(Mutex::new(false));
        let flag = second_ran.clone();

        let mut view = MessageView::new();
        view.add_handler(handler().name("h1").handle(|_, _| async { "first" }))
            .add_handler(handler().name("h2").handle(move |_, _| {
                let flag = flag.clone();
                async move {
                    *flag.lock() = true;
                }
            }));

        let report = view
            .handle_event(&message_event(5, "hi"), &api, &states)
            .await
            .unwrap();

        assert_eq!(report.handlers, vec!["h1".to_string()]);
        assert!(!*second_ran.lock());

        let calls = recording.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "messages.send");
        assert_eq!(calls[0].1, json!({"peer_id": 5, "message": "first", "random_id": 0}));
    }

    #[tokio::test]
    async fn test_non_blocking_handlers_continue() {
        let (_, api, states) = deps();
        let mut view = MessageView::new();
        view.add_handler(handler().name("a").blocking(false).handle(|_, _| async {}))
            .add_handler(handler().name("skip").filter(|_: &MessageContext| false).handle(|_, _| async {}))
            .add_handler(handler().name("b").handle(|_, _| async { json!({"ok": true}) }));

        let report = view
            .handle_event(&message_event(5, "hi"), &api, &states)
            .await
            .unwrap();

        assert_eq!(report.handlers, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            report.responses,
            vec![HandlerResponse::None, HandlerResponse::Json(json!({"ok": true}))]
        );
    }

    #[tokio::test]
    async fn test_filter_variables_reach_handler_and_post() {
        let (_, api, states) = deps();
        let recorder = Recorder::default();
        let seen = recorder.seen.clone();
        let handled_args = Arc::new(Mutex::new(None));
        let slot = handled_args.clone();

        let mut view = MessageView::with_middlewares(vec![Arc::new(recorder)]);
        view.add_handler(handler().name("ban").filter(rules::command("/ban")).handle(
            move |_, vars: ContextVariables| {
                let slot = slot.clone();
                async move {
                    *slot.lock() = vars.get_as::<Vec<String>>("args");
                }
            },
        ));

        view.handle_event(&message_event(5, "/ban alice"), &api, &states)
            .await
            .unwrap();

        assert_eq!(*handled_args.lock(), Some(vec!["alice".to_string()]));
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, vec!["ban".to_string()]);
        assert_eq!(seen[0].1.get("args"), Some(&json!(["alice"])));
    }

    #[tokio::test]
    async fn test_post_runs_when_nothing_accepts() {
        let (_, api, states) = deps();
        let recorder = Recorder::default();
        let seen = recorder.seen.clone();

        let mut view = MessageView::new();
        view.add_middleware(recorder);
        view.add_handler(handler().filter(rules::text(["never"])).handle(|_, _| async {}));

        let report = view
            .handle_event(&message_event(5, "hi"), &api, &states)
            .await
            .unwrap();

        assert!(!report.is_handled());
        assert_eq!(seen.lock().len(), 1);
        assert!(seen.lock()[0].0.is_empty());
    }

    #[tokio::test]
    async fn test_pre_stop_skips_handlers_and_post() {
        let (recording, api, states) = deps();
        let stopper = Recorder {
            stop: true,
            ..Default::default()
        };
        let seen = stopper.seen.clone();

        let mut view = MessageView::with_middlewares(vec![Arc::new(stopper)]);
        view.add_handler(handler().handle(|_, _| async { "never sent" }));

        let report = view
            .handle_event(&message_event(5, "hi"), &api, &states)
            .await
            .unwrap();

        assert!(report.aborted);
        assert!(report.handlers.is_empty());
        assert!(seen.lock().is_empty());
        assert!(recording.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_pre_variables_reach_handler() {
        let (_, api, states) = deps();
        let recorder = Recorder {
            pre_vars: json!({"lang": "en"}).as_object().cloned(),
            ..Default::default()
        };

        let mut view = MessageView::with_middlewares(vec![Arc::new(recorder)]);
        view.add_handler(handler().handle(|_, vars: ContextVariables| async move {
            vars.get_as::<String>("lang")
        }));

        let report = view
            .handle_event(&message_event(5, "hi"), &api, &states)
            .await
            .unwrap();
        assert_eq!(report.responses, vec![HandlerResponse::Text("en".into())]);
    }

    #[tokio::test]
    async fn test_text_approximators_apply_in_order() {
        let (_, api, states) = deps();
        let mut view = MessageView::new();
        view.add_text_approximator(|text| text.trim().to_string())
            .add_text_approximator(|text| text.trim_start_matches("[club1|bot] ").to_string());
        view.add_handler(handler().filter(rules::text(["ping"])).handle(
            |ctx: Arc<MessageContext>, _| async move { ctx.text.clone() },
        ));

        let report = view
            .handle_event(&message_event(5, "  [club1|bot] PING "), &api, &states)
            .await
            .unwrap();
        assert_eq!(report.responses, vec![HandlerResponse::Text("PING".into())]);
    }

    #[tokio::test]
    async fn test_state_attached_by_custom_key() {
        let (_, api, states) = deps();
        states.set(99, StateTag::new("Order", "address"), Map::new()).await;

        let mut view = MessageView::new();
        view.set_state_source_key("ref_peer");
        view.add_handler(
            handler()
                .filter(rules::state(StateTag::new("Order", "address")))
                .handle(|ctx: Arc<MessageContext>, _| async move {
                    json!(ctx.state_peer().map(|p| p.peer_id))
                }),
        );

        let report = view
            .handle_event(&message_event(5, "street"), &api, &states)
            .await
            .unwrap();
        assert_eq!(report.responses, vec![HandlerResponse::Json(json!(99))]);

        view.set_state_source_key("peer_id");
        let report = view
            .handle_event(&message_event(5, "street"), &api, &states)
            .await
            .unwrap();
        assert!(!report.is_handled());
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let (_, api, states) = deps();
        let mut view = MessageView::new();
        view.add_handler(handler().name("broken").handle(|_, _| async {
            Err::<(), _>(std::io::Error::other("boom"))
        }));

        let err = view
            .handle_event(&message_event(5, "hi"), &api, &states)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::DispatchError::Handler { ref handler, .. } if handler == "broken"));
    }

    #[tokio::test]
    async fn test_missing_message_is_event_error() {
        let (_, api, states) = deps();
        let view = MessageView::new();
        let event = RawEvent::from_value(json!({"type": "message_new", "object": {}})).unwrap();
        let err = view.handle_event(&event, &api, &states).await.unwrap_err();
        assert!(matches!(err, crate::DispatchError::Event(_)));
    }

    struct RejectingApi;

    #[async_trait]
    impl Api for RejectingApi {
        async fn request(&self, _method: &str, _params: Value) -> ApiResult<Value> {
            Err(bottle_core::ApiError::upstream(901, "cannot send to this peer"))
        }
    }

    #[tokio::test]
    async fn test_failed_answer_is_return_handler_error() {
        let api: BoxedApi = Arc::new(RejectingApi);
        let states: BoxedStateDispenser = Arc::new(BuiltinStateDispenser::new());
        let mut view = MessageView::new();
        view.add_handler(handler().handle(|_, _| async { "hello" }));

        let err = view
            .handle_event(&message_event(5, "hi"), &api, &states)
            .await
            .unwrap_err();
        match err {
            crate::DispatchError::ReturnHandler { kind, source } => {
                assert_eq!(kind, ResponseKind::Text);
                assert!(source.to_string().contains("cannot send to this peer"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_peers_keep_their_state() {
        let (_, api, states) = deps();
        let mut view = MessageView::new();
        let dispenser = states.clone();
        view.add_handler(handler().handle(move |ctx: Arc<MessageContext>, _| {
            let dispenser = dispenser.clone();
            async move {
                tokio::task::yield_now().await;
                dispenser
                    .set(ctx.peer_id, StateTag::new("Chat", &ctx.text), Map::new())
                    .await;
            }
        }));
        let view = Arc::new(view);

        let tasks: Vec<_> = [(1, "one"), (2, "two")]
            .into_iter()
            .map(|(peer, text)| {
                let view = view.clone();
                let api = api.clone();
                let states = states.clone();
                tokio::spawn(async move {
                    view.handle_event(&message_event(peer, text), &api, &states)
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(states.get(1).await.unwrap().state, StateTag::new("Chat", "one"));
        assert_eq!(states.get(2).await.unwrap().state, StateTag::new("Chat", "two"));
    }
}
