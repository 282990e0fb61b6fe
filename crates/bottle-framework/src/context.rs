//! Event contexts and context variables.
//!
//! Views never hand the transport payload to handlers directly. Each view
//! builds its own context once per dispatch:
//!
//! - [`MessageContext`] - for `message_new` events, carrying the parsed
//!   [`MessageMin`], the attached [`StatePeer`] and the API handle
//! - [`RawEventContext`] - for any other event, carrying a typed model of the
//!   event `object`
//!
//! [`ContextVariables`] accumulates what filters produce during one dispatch.

use std::any::Any;
use std::ops::Deref;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use bottle_core::{ApiResult, BoxedApi, GroupEventType, MessageMin, RawEvent, StatePeer};

// =============================================================================
// ContextVariables
// =============================================================================

/// Key/value results accumulated by filters during a single dispatch.
///
/// Entries produced by an accepting filter are merged in registration order
/// and stay visible to every later handler and to post-middleware.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextVariables(Map<String, Value>);

impl ContextVariables {
    /// Creates an empty set of variables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserializes the value stored under `key`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| T::deserialize(v).ok())
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Stores a value, overwriting any previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merges `entries`; later keys overwrite earlier ones.
    pub fn extend(&mut self, entries: Map<String, Value>) {
        self.0.extend(entries);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the variables, returning the underlying map.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ContextVariables {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// =============================================================================
// MessageContext
// =============================================================================

/// The context handed to message view handlers.
///
/// Derefs to the parsed [`MessageMin`], so message fields are available
/// directly:
///
/// ```rust,ignore
/// async fn greet(ctx: Arc<MessageContext>) -> ApiResult<()> {
///     if ctx.text == "hi" {
///         ctx.answer(format!("hello, {}", ctx.from_id)).await?;
///     }
///     Ok(())
/// }
/// ```
pub struct MessageContext {
    message: MessageMin,
    event: RawEvent,
    api: BoxedApi,
    state_peer: Option<StatePeer>,
}

impl MessageContext {
    /// Creates a context for `message`, parsed from `event`.
    pub fn new(message: MessageMin, event: RawEvent, api: BoxedApi) -> Self {
        Self {
            message,
            event,
            api,
            state_peer: None,
        }
    }

    /// Attaches the peer's state.
    pub fn with_state(mut self, state_peer: Option<StatePeer>) -> Self {
        self.state_peer = state_peer;
        self
    }

    pub(crate) fn set_text(&mut self, text: String) {
        self.message.text = text;
    }

    /// Returns the parsed message.
    pub fn message(&self) -> &MessageMin {
        &self.message
    }

    /// Returns the raw event the message was parsed from.
    pub fn event(&self) -> &RawEvent {
        &self.event
    }

    /// Returns the API client for follow-up calls.
    pub fn api(&self) -> &BoxedApi {
        &self.api
    }

    /// Returns the peer's state at the time the event was admitted.
    pub fn state_peer(&self) -> Option<&StatePeer> {
        self.state_peer.as_ref()
    }

    /// Sends `text` back to the peer the message came from.
    pub async fn answer(&self, text: impl Into<String>) -> ApiResult<Value> {
        self.answer_with(text, Map::new()).await
    }

    /// Sends `text` back to the peer with extra `messages.send` parameters.
    ///
    /// Extra parameters take precedence over the defaults.
    pub async fn answer_with(
        &self,
        text: impl Into<String>,
        params: Map<String, Value>,
    ) -> ApiResult<Value> {
        let mut request = match json!({
            "peer_id": self.message.peer_id,
            "message": text.into(),
            "random_id": 0,
        }) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        request.extend(params);
        self.api
            .request("messages.send", Value::Object(request))
            .await
    }
}

impl Deref for MessageContext {
    type Target = MessageMin;

    fn deref(&self) -> &Self::Target {
        &self.message
    }
}

impl std::fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContext")
            .field("message", &self.message)
            .field("state_peer", &self.state_peer)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RawEventContext
// =============================================================================

/// The context handed to raw event view handlers.
///
/// The event `object` has already been deserialized into the model type the
/// handler was registered with; retrieve it with [`model`](Self::model).
pub struct RawEventContext {
    event: RawEvent,
    model: Arc<dyn Any + Send + Sync>,
    api: BoxedApi,
    state_peer: Option<StatePeer>,
}

impl RawEventContext {
    /// Creates a context around an already constructed model.
    pub fn new(event: RawEvent, model: Arc<dyn Any + Send + Sync>, api: BoxedApi) -> Self {
        Self {
            event,
            model,
            api,
            state_peer: None,
        }
    }

    /// Attaches the peer's state.
    pub fn with_state(mut self, state_peer: Option<StatePeer>) -> Self {
        self.state_peer = state_peer;
        self
    }

    /// Returns the typed model, if it is a `T`.
    pub fn model<T: Any>(&self) -> Option<&T> {
        self.model.downcast_ref()
    }

    /// Returns the event-type discriminant.
    pub fn event_type(&self) -> &GroupEventType {
        self.event.event_type()
    }

    /// Returns the raw event.
    pub fn event(&self) -> &RawEvent {
        &self.event
    }

    /// Returns the API client for follow-up calls.
    pub fn api(&self) -> &BoxedApi {
        &self.api
    }

    /// Returns the state attached from the event object, if any.
    pub fn state_peer(&self) -> Option<&StatePeer> {
        self.state_peer.as_ref()
    }
}

impl std::fmt::Debug for RawEventContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawEventContext")
            .field("event", &self.event)
            .field("state_peer", &self.state_peer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variables_merge_overwrites() {
        let mut vars = ContextVariables::new();
        vars.insert("a", 1);
        vars.insert("b", "x");

        let mut more = Map::new();
        more.insert("a".into(), json!(2));
        vars.extend(more);

        assert_eq!(vars.get("a"), Some(&json!(2)));
        assert_eq!(vars.get_as::<String>("b").as_deref(), Some("x"));
        assert_eq!(vars.get_as::<u32>("b"), None);
        assert_eq!(vars.len(), 2);
    }
}
