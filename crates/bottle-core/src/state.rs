//! Per-peer conversational state.
//!
//! A [`StateDispenser`] maps a peer id to its current [`StatePeer`]. Views
//! call [`cast`](StateDispenser::cast) once per event and attach the result
//! to the event context; handlers move peers between states with
//! [`set`](StateDispenser::set) and [`delete`](StateDispenser::delete).
//!
//! # Declaring states
//!
//! ```rust,ignore
//! use bottle_core::state::StateGroup;
//!
//! enum Registration {
//!     AskName,
//!     AskAge,
//! }
//!
//! impl StateGroup for Registration {
//!     const GROUP: &'static str = "Registration";
//!
//!     fn name(&self) -> &'static str {
//!         match self {
//!             Self::AskName => "ask_name",
//!             Self::AskAge => "ask_age",
//!         }
//!     }
//! }
//!
//! dispenser.set(peer_id, Registration::AskName.into(), Map::new()).await;
//! ```
//!
//! # Concurrency
//!
//! Two events for the same peer dispatched concurrently race on `set`; the
//! last write wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{StateError, StateResult};

// ============================================================================
// State Tags
// ============================================================================

/// A group of related states, usually an enum.
pub trait StateGroup: Send + Sync {
    /// The group name, shared by every state of the group.
    const GROUP: &'static str;

    /// The name of this state within the group.
    fn name(&self) -> &'static str;
}

/// A state position, rendered as `Group:state`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateTag(String);

impl StateTag {
    /// Creates a tag from a group and state name.
    pub fn new(group: &str, name: &str) -> Self {
        Self(format!("{group}:{name}"))
    }

    /// Returns the full `Group:state` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the group part.
    pub fn group(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(g, _)| g)
    }

    /// Returns the state part.
    pub fn name(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, n)| n)
    }
}

impl<S: StateGroup> From<S> for StateTag {
    fn from(state: S) -> Self {
        Self::new(S::GROUP, state.name())
    }
}

impl fmt::Display for StateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The state of one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePeer {
    pub peer_id: i64,
    pub state: StateTag,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl StatePeer {
    /// Returns `true` if the peer is in `state`.
    pub fn is(&self, state: impl Into<StateTag>) -> bool {
        self.state == state.into()
    }
}

// ============================================================================
// StateDispenser
// ============================================================================

/// A concurrent-safe store of peer states.
///
/// Lookups are quiet (`None` for unknown peers) while [`delete`](Self::delete)
/// is strict and fails with [`StateError::KeyNotFound`].
#[async_trait]
pub trait StateDispenser: Send + Sync {
    /// Returns the state of `peer_id`, if any.
    async fn get(&self, peer_id: i64) -> Option<StatePeer>;

    /// Inserts or overwrites the state of `peer_id`.
    async fn set(&self, peer_id: i64, state: StateTag, payload: Map<String, Value>);

    /// Removes the state of `peer_id`, returning it.
    async fn delete(&self, peer_id: i64) -> StateResult<StatePeer>;

    /// Looks up the state for a key extracted from an event.
    ///
    /// A missing key yields `None`. Never creates an entry.
    async fn cast(&self, peer_id: Option<i64>) -> Option<StatePeer> {
        match peer_id {
            Some(peer_id) => self.get(peer_id).await,
            None => None,
        }
    }
}

/// A type-erased, shareable state dispenser.
pub type BoxedStateDispenser = Arc<dyn StateDispenser>;

/// In-memory [`StateDispenser`].
///
/// The lock is only held for the map operation itself, never across an
/// `.await`.
#[derive(Debug, Default)]
pub struct BuiltinStateDispenser {
    states: RwLock<HashMap<i64, StatePeer>>,
}

impl BuiltinStateDispenser {
    /// Creates an empty dispenser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of peers with a state.
    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    /// Returns `true` if no peer has a state.
    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}

#[async_trait]
impl StateDispenser for BuiltinStateDispenser {
    async fn get(&self, peer_id: i64) -> Option<StatePeer> {
        self.states.read().get(&peer_id).cloned()
    }

    async fn set(&self, peer_id: i64, state: StateTag, payload: Map<String, Value>) {
        trace!(peer_id, state = %state, "Setting peer state");
        self.states.write().insert(
            peer_id,
            StatePeer {
                peer_id,
                state,
                payload,
            },
        );
    }

    async fn delete(&self, peer_id: i64) -> StateResult<StatePeer> {
        trace!(peer_id, "Deleting peer state");
        self.states
            .write()
            .remove(&peer_id)
            .ok_or(StateError::KeyNotFound { peer_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    enum Order {
        Choosing,
        Paying,
    }

    impl StateGroup for Order {
        const GROUP: &'static str = "Order";

        fn name(&self) -> &'static str {
            match self {
                Self::Choosing => "choosing",
                Self::Paying => "paying",
            }
        }
    }

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_state_tag_parts() {
        let tag = StateTag::from(Order::Paying);
        assert_eq!(tag.as_str(), "Order:paying");
        assert_eq!(tag.group(), "Order");
        assert_eq!(tag.name(), "paying");
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let dispenser = BuiltinStateDispenser::new();
        dispenser
            .set(1, Order::Choosing.into(), payload(json!({"item": "tea"})))
            .await;

        let peer = dispenser.get(1).await.unwrap();
        assert_eq!(
            peer,
            StatePeer {
                peer_id: 1,
                state: Order::Choosing.into(),
                payload: payload(json!({"item": "tea"})),
            }
        );
        assert!(peer.is(Order::Choosing));
        assert!(!peer.is(Order::Paying));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let dispenser = BuiltinStateDispenser::new();
        dispenser.set(1, Order::Choosing.into(), Map::new()).await;
        dispenser.set(1, Order::Paying.into(), Map::new()).await;

        assert!(dispenser.get(1).await.unwrap().is(Order::Paying));
        assert_eq!(dispenser.len(), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_is_absent() {
        let dispenser = BuiltinStateDispenser::new();
        assert!(dispenser.get(99).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_absent_fails() {
        let dispenser = BuiltinStateDispenser::new();
        assert_eq!(
            dispenser.delete(5).await,
            Err(StateError::KeyNotFound { peer_id: 5 })
        );
    }

    #[tokio::test]
    async fn test_delete_after_set() {
        let dispenser = BuiltinStateDispenser::new();
        dispenser.set(5, Order::Choosing.into(), Map::new()).await;

        let removed = dispenser.delete(5).await.unwrap();
        assert_eq!(removed.peer_id, 5);
        assert!(dispenser.get(5).await.is_none());
        assert!(dispenser.is_empty());
    }

    #[tokio::test]
    async fn test_cast_does_not_create() {
        let dispenser = BuiltinStateDispenser::new();
        assert!(dispenser.cast(Some(3)).await.is_none());
        assert!(dispenser.cast(None).await.is_none());
        assert!(dispenser.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_peers_are_independent() {
        let dispenser = Arc::new(BuiltinStateDispenser::new());

        let tasks: Vec<_> = (0..64)
            .map(|peer_id| {
                let dispenser = Arc::clone(&dispenser);
                tokio::spawn(async move {
                    let state = if peer_id % 2 == 0 {
                        Order::Choosing
                    } else {
                        Order::Paying
                    };
                    dispenser
                        .set(peer_id, state.into(), payload(json!({"n": peer_id})))
                        .await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        for peer_id in 0..64 {
            let peer = dispenser.get(peer_id).await.unwrap();
            assert_eq!(peer.payload["n"], peer_id);
            assert_eq!(peer.is(Order::Choosing), peer_id % 2 == 0);
        }
    }
}
