//! Event model for the Bottle core.
//!
//! This module provides the structured records built at the admission
//! boundary:
//!
//! - [`GroupEventType`] - the event-type discriminant
//! - [`RawEvent`] - a parsed transport envelope (`type`, `object`, ...)
//! - [`MessageMin`] - the message record carried by `message_new` events
//!
//! A `RawEvent` keeps the original JSON untouched; views build their own
//! context wrappers on top of it instead of mutating it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EventError, EventResult};

/// Peer ids at or above this offset address group chats.
pub const CHAT_PEER_OFFSET: i64 = 2_000_000_000;

// ============================================================================
// Event Type Discriminant
// ============================================================================

macro_rules! group_event_types {
    ($($variant:ident => $name:literal,)*) => {
        /// The `type` discriminant of a group event.
        ///
        /// Types this crate does not know are preserved in [`GroupEventType::Other`].
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum GroupEventType {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )*
            /// Any other event type.
            Other(String),
        }

        impl GroupEventType {
            /// Returns the wire name of this event type.
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $name,)*
                    Self::Other(name) => name,
                }
            }
        }

        impl FromStr for GroupEventType {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(match s {
                    $($name => Self::$variant,)*
                    other => Self::Other(other.to_string()),
                })
            }
        }
    };
}

group_event_types! {
    MessageNew => "message_new",
    MessageReply => "message_reply",
    MessageEdit => "message_edit",
    MessageAllow => "message_allow",
    MessageDeny => "message_deny",
    MessageTypingState => "message_typing_state",
    MessageEvent => "message_event",
    PhotoNew => "photo_new",
    PhotoCommentNew => "photo_comment_new",
    AudioNew => "audio_new",
    VideoNew => "video_new",
    WallPostNew => "wall_post_new",
    WallRepost => "wall_repost",
    WallReplyNew => "wall_reply_new",
    WallReplyEdit => "wall_reply_edit",
    WallReplyDelete => "wall_reply_delete",
    LikeAdd => "like_add",
    LikeRemove => "like_remove",
    BoardPostNew => "board_post_new",
    MarketCommentNew => "market_comment_new",
    GroupJoin => "group_join",
    GroupLeave => "group_leave",
    UserBlock => "user_block",
    UserUnblock => "user_unblock",
    PollVoteNew => "poll_vote_new",
    GroupOfficersEdit => "group_officers_edit",
    GroupChangeSettings => "group_change_settings",
    GroupChangePhoto => "group_change_photo",
    VkpayTransaction => "vkpay_transaction",
    AppPayload => "app_payload",
}

impl fmt::Display for GroupEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for GroupEventType {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }
}

// ============================================================================
// Raw Event
// ============================================================================

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    object: Value,
    #[serde(default)]
    group_id: Option<i64>,
    #[serde(default)]
    event_id: Option<String>,
}

/// A group event as delivered by the transport.
///
/// Cloning is cheap: the original JSON is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RawEvent {
    event_type: GroupEventType,
    object: Value,
    group_id: Option<i64>,
    event_id: Option<String>,
    raw: Arc<Value>,
}

impl RawEvent {
    /// Parses a transport payload.
    ///
    /// The payload must be an object with a string `type`; `object`,
    /// `group_id` and `event_id` are optional.
    pub fn from_value(value: Value) -> EventResult<Self> {
        if value.get("type").is_none() {
            return Err(EventError::MissingField("type"));
        }
        let envelope = Envelope::deserialize(&value)?;
        Ok(Self {
            event_type: envelope.event_type.as_str().into(),
            object: envelope.object,
            group_id: envelope.group_id,
            event_id: envelope.event_id,
            raw: Arc::new(value),
        })
    }

    /// Returns the event-type discriminant.
    pub fn event_type(&self) -> &GroupEventType {
        &self.event_type
    }

    /// Returns the `object` payload.
    pub fn object(&self) -> &Value {
        &self.object
    }

    /// Returns the group the event was delivered for, if present.
    pub fn group_id(&self) -> Option<i64> {
        self.group_id
    }

    /// Returns the platform event id, if present.
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    /// Returns the payload exactly as received.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Deserializes the `object` payload into a typed model.
    pub fn object_as<T: DeserializeOwned>(&self) -> EventResult<T> {
        Ok(T::deserialize(&self.object)?)
    }
}

impl TryFrom<Value> for RawEvent {
    type Error = EventError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

// ============================================================================
// Message
// ============================================================================

/// The message record of a `message_new` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMin {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub date: i64,
    pub peer_id: i64,
    pub from_id: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub conversation_message_id: Option<i64>,
    /// Keyboard payload, a JSON document encoded as a string.
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Value>,
    /// The sender's client capabilities (`object.client_info`).
    #[serde(skip)]
    pub client_info: Option<Value>,
}

impl MessageMin {
    /// Builds the message record from a `message_new` event.
    pub fn from_event(event: &RawEvent) -> EventResult<Self> {
        let object = event.object();
        let message = object
            .get("message")
            .ok_or(EventError::MissingField("object.message"))?;
        let mut parsed = Self::deserialize(message)?;
        parsed.client_info = object.get("client_info").cloned();
        Ok(parsed)
    }

    /// Returns `true` if the message was sent in a group chat.
    pub fn is_chat(&self) -> bool {
        self.peer_id >= CHAT_PEER_OFFSET
    }

    /// Returns the local chat id for group chat messages.
    pub fn chat_id(&self) -> Option<i64> {
        self.is_chat().then(|| self.peer_id - CHAT_PEER_OFFSET)
    }

    /// Parses the keyboard payload as JSON.
    pub fn payload_json(&self) -> Option<Value> {
        self.payload
            .as_deref()
            .and_then(|p| serde_json::from_str(p).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_new() -> Value {
        json!({
            "type": "message_new",
            "event_id": "abc",
            "group_id": 1,
            "object": {
                "message": {
                    "id": 10,
                    "date": 1700000000,
                    "peer_id": 2000000004,
                    "from_id": 42,
                    "text": "Hello",
                    "payload": "{\"cmd\":\"start\"}"
                },
                "client_info": {"keyboard": true}
            }
        })
    }

    #[test]
    fn test_event_type_round_trip_names() {
        assert_eq!(GroupEventType::from("message_new"), GroupEventType::MessageNew);
        assert_eq!(GroupEventType::LikeAdd.as_str(), "like_add");
        assert_eq!(
            GroupEventType::from("something_new"),
            GroupEventType::Other("something_new".into())
        );
    }

    #[test]
    fn test_raw_event_parse() {
        let event = RawEvent::from_value(message_new()).unwrap();
        assert_eq!(event.event_type(), &GroupEventType::MessageNew);
        assert_eq!(event.group_id(), Some(1));
        assert_eq!(event.event_id(), Some("abc"));
        assert_eq!(event.raw()["object"]["message"]["id"], 10);
    }

    #[test]
    fn test_raw_event_requires_type() {
        let err = RawEvent::from_value(json!({"object": {}})).unwrap_err();
        assert!(matches!(err, EventError::MissingField("type")));
    }

    #[test]
    fn test_message_from_event() {
        let event = RawEvent::from_value(message_new()).unwrap();
        let message = MessageMin::from_event(&event).unwrap();

        assert_eq!(message.from_id, 42);
        assert_eq!(message.text, "Hello");
        assert!(message.is_chat());
        assert_eq!(message.chat_id(), Some(4));
        assert_eq!(message.payload_json(), Some(json!({"cmd": "start"})));
        assert_eq!(message.client_info, Some(json!({"keyboard": true})));
    }

    #[test]
    fn test_message_missing() {
        let event = RawEvent::from_value(json!({"type": "message_new", "object": {}})).unwrap();
        assert!(matches!(
            MessageMin::from_event(&event),
            Err(EventError::MissingField("object.message"))
        ));
    }
}
