//! # Bottle Core
//!
//! The core building blocks of the Bottle bot framework.
//!
//! This crate provides:
//! - **Event model**: parsed transport envelopes ([`RawEvent`]), the event-type
//!   discriminant ([`GroupEventType`]) and the message record ([`MessageMin`])
//! - **API seam**: the [`Api`] trait every platform call goes through
//! - **State dispenser**: per-peer conversational state ([`StateDispenser`],
//!   [`BuiltinStateDispenser`])
//! - **Errors**: the shared error taxonomy
//!
//! ```text
//! ┌───────────┐     ┌──────────┐     ┌─────────┐
//! │ Transport │────▶│  Router  │────▶│  View   │──▶ handlers
//! └───────────┘     └──────────┘     └─────────┘
//!                                      │    │
//!                          StateDispenser  Api
//! ```

pub mod api;
pub mod error;
pub mod event;
pub mod state;

pub use api::{Api, ApiExt, BoxedApi, unwrap_response};
pub use error::{ApiError, ApiResult, EventError, EventResult, StateError, StateResult};
pub use event::{CHAT_PEER_OFFSET, GroupEventType, MessageMin, RawEvent};
pub use state::{
    BoxedStateDispenser, BuiltinStateDispenser, StateDispenser, StateGroup, StatePeer, StateTag,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::api::{Api, ApiExt, BoxedApi};
    pub use super::event::{GroupEventType, MessageMin, RawEvent};
    pub use super::state::{StateDispenser, StateGroup, StatePeer, StateTag};
}
