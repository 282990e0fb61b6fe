//! The polling runner.
//!
//! A [`Bot`] pulls raw events from any [`Stream`] of JSON values and
//! dispatches each on its own task through the [`Router`]:
//!
//! ```rust,ignore
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//! let bot = Bot::new(router);
//! bot.cancel_on_signal();
//! bot.run_polling(tokio_stream::wrappers::ReceiverStream::new(rx)).await?;
//! ```

use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::signal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bottle_core::RawEvent;

use crate::config::{BottleConfig, DispatchConfig};
use crate::error::RuntimeResult;
use crate::logging;
use crate::router::Router;

/// Runs a [`Router`] over an event stream.
pub struct Bot {
    router: Router,
    config: DispatchConfig,
    shutdown: CancellationToken,
}

impl Bot {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            config: DispatchConfig::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Creates a bot and initializes logging from `config`.
    pub fn from_config(router: Router, config: &BottleConfig) -> Self {
        logging::init_from_config(&config.logging);
        Self {
            router,
            config: config.dispatch.clone(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// A token that stops the runner when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops accepting new events.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Cancels the runner on Ctrl+C or SIGTERM.
    pub fn cancel_on_signal(&self) {
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            token.cancel();
        });
    }

    /// Dispatches events from `events` until the stream ends or the bot is
    /// shut down.
    ///
    /// At most `max_concurrent_events` dispatches run at once. Malformed
    /// payloads and failing dispatches are logged and skipped. Dispatches
    /// already started run to completion before this returns.
    pub async fn run_polling<S>(&self, events: S) -> RuntimeResult<()>
    where
        S: Stream<Item = Value> + Send,
    {
        let mut events = std::pin::pin!(events);
        let limit = concurrency_limit(self.config.max_concurrent_events);
        let permits = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        info!(
            views = self.router.view_count(),
            max_concurrent_events = limit,
            "Polling started"
        );

        loop {
            let value = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested, no longer accepting events");
                    break;
                }
                next = events.next() => match next {
                    Some(value) => value,
                    None => {
                        info!("Event stream ended");
                        break;
                    }
                },
            };

            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested, no longer accepting events");
                    break;
                }
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let router = self.router.clone();
            tasks.spawn(async move {
                dispatch(&router, value).await;
                drop(permit);
            });

            while let Some(joined) = tasks.try_join_next() {
                log_join(joined);
            }
        }

        if !tasks.is_empty() {
            debug!(in_flight = tasks.len(), "Waiting for in-flight dispatches");
        }
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        info!("Polling stopped");
        Ok(())
    }
}

/// Clamps the configured limit to what a semaphore can hold.
fn concurrency_limit(configured: usize) -> usize {
    configured.clamp(1, Semaphore::MAX_PERMITS)
}

async fn dispatch(router: &Router, value: Value) {
    let event = match RawEvent::from_value(value) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Dropping malformed event");
            return;
        }
    };
    let event_type = event.event_type().to_string();
    if let Err(e) = router.route(event).await {
        error!(event_type = %event_type, error = %e, "Event dispatch failed");
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Dispatch task panicked");
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, listening for Ctrl+C only");
                ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c() => {}
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use bottle_core::{Api, ApiResult, StateTag};
    use bottle_framework::{MessageContext, MessageView, handler};

    #[derive(Default)]
    struct RecordingApi {
        sent: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl Api for RecordingApi {
        async fn request(&self, _method: &str, params: Value) -> ApiResult<Value> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.sent.lock().push(params);
            Ok(json!(1))
        }
    }

    fn bot(max_concurrent_events: usize) -> (Arc<RecordingApi>, Bot) {
        let api = Arc::new(RecordingApi::default());
        let mut view = MessageView::new();
        view.add_handler(
            handler()
                .filter(|ctx: &MessageContext| ctx.text != "boom")
                .handle(|ctx: Arc<MessageContext>, _| async move { format!("echo {}", ctx.text) }),
        );
        view.add_handler(handler().handle(|_: Arc<MessageContext>, _| async {
            Err::<(), _>(tower::BoxError::from("handler failed"))
        }));

        let mut bot = Bot::new(Router::new(api.clone()).with_view(view));
        bot.config.max_concurrent_events = max_concurrent_events;
        (api, bot)
    }

    fn message(peer_id: i64, text: &str) -> Value {
        json!({
            "type": "message_new",
            "object": {"message": {"peer_id": peer_id, "from_id": peer_id, "text": text}},
        })
    }

    fn sent_texts(api: &RecordingApi) -> Vec<String> {
        let mut texts: Vec<String> = api
            .sent
            .lock()
            .iter()
            .map(|params| params["message"].as_str().unwrap_or_default().to_string())
            .collect();
        texts.sort();
        texts
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dispatches_until_stream_ends() {
        let (api, bot) = bot(4);
        let events = (0..10).map(|i| message(i, &format!("m{i}")));

        bot.run_polling(futures::stream::iter(events)).await.unwrap();

        assert_eq!(api.sent.lock().len(), 10);
        assert!(sent_texts(&api).contains(&"echo m7".to_string()));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let (api, bot) = bot(1);
        let events = vec![
            json!({"object": {}}),
            message(1, "boom"),
            json!({"type": "message_new", "object": {}}),
            message(2, "after"),
        ];

        bot.run_polling(futures::stream::iter(events)).await.unwrap();

        assert_eq!(sent_texts(&api), vec!["echo after".to_string()]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting_events() {
        let (api, bot) = bot(4);
        let token = bot.shutdown_token();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let events = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|value| (value, rx))
        });

        tx.send(message(1, "first")).unwrap();
        let runner = async {
            bot.run_polling(events).await.unwrap();
        };
        let stopper = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
            tx.send(message(2, "late")).unwrap();
        };
        tokio::join!(runner, stopper);

        assert_eq!(sent_texts(&api), vec!["echo first".to_string()]);
    }

    #[test]
    fn test_concurrency_limit_is_clamped() {
        assert_eq!(concurrency_limit(0), 1);
        assert_eq!(concurrency_limit(8), 8);
        assert_eq!(concurrency_limit(usize::MAX), Semaphore::MAX_PERMITS);
    }

    #[tokio::test]
    async fn test_oversized_limit_still_runs() {
        let (api, bot) = bot(usize::MAX);
        bot.run_polling(futures::stream::iter(vec![message(1, "big")]))
            .await
            .unwrap();
        assert_eq!(sent_texts(&api), vec!["echo big".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (api, bot) = bot(4);
        bot.shutdown();
        bot.run_polling(futures::stream::iter(vec![message(1, "hi")]))
            .await
            .unwrap();
        assert!(api.sent.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_states_survive_concurrent_events() {
        let (_, bot) = bot(8);
        let states = bot.router().states().clone();
        let events = (1..=4).map(|i| message(i, "hi"));

        for peer in 1..=4 {
            states
                .set(peer, StateTag::new("Flow", "start"), Default::default())
                .await;
        }
        bot.run_polling(futures::stream::iter(events)).await.unwrap();

        for peer in 1..=4 {
            let state = states.get(peer).await.unwrap();
            assert_eq!(state.peer_id, peer);
            assert_eq!(state.state.as_str(), "Flow:start");
        }
    }
}
