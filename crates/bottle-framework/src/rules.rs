//! Composable filter rules for message handlers.
//!
//! Every rule is a plain closure over `&MessageContext`, so rules plug
//! straight into [`HandlerBuilder::filter`](crate::handler::HandlerBuilder::filter)
//! and can be combined with [`and`], [`or`] and [`not`]:
//!
//! ```rust,ignore
//! use bottle_framework::rules::{self, command, from_chat, not};
//!
//! handler()
//!     .filter(rules::and(command("/ban"), from_chat()))
//!     .filter(not(rules::peer(ADMIN_PEER)))
//!     .handle(ban);
//! ```

use serde_json::{Map, Value};

use bottle_core::StateTag;

use crate::context::MessageContext;
use crate::handler::FilterResult;

/// Matches messages whose text equals one of `texts`, ignoring case.
pub fn text<I, S>(texts: I) -> impl Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let texts: Vec<String> = texts.into_iter().map(|t| t.into().to_lowercase()).collect();
    move |ctx: &MessageContext| {
        let lowered = ctx.text.to_lowercase();
        texts.iter().any(|t| *t == lowered).into()
    }
}

/// Matches messages starting with `prefix` followed by whitespace or nothing.
///
/// The remaining words are stored as a string array under `"args"`.
pub fn command(prefix: impl Into<String>) -> impl Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static {
    let prefix = prefix.into();
    move |ctx: &MessageContext| {
        let Some(rest) = ctx.text.strip_prefix(prefix.as_str()) else {
            return FilterResult::Reject;
        };
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return FilterResult::Reject;
        }
        let args = rest
            .split_whitespace()
            .map(|arg| Value::String(arg.to_string()))
            .collect();
        let mut vars = Map::new();
        vars.insert("args".to_string(), Value::Array(args));
        FilterResult::AcceptWith(vars)
    }
}

/// Matches messages sent to the given peer.
pub fn peer(peer_id: i64) -> impl Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static {
    move |ctx: &MessageContext| (ctx.peer_id == peer_id).into()
}

/// Matches messages sent in a group chat.
pub fn from_chat() -> impl Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static {
    |ctx: &MessageContext| ctx.is_chat().into()
}

/// Matches messages whose peer is currently in `state`.
pub fn state(state: impl Into<StateTag>) -> impl Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static {
    let state = state.into();
    move |ctx: &MessageContext| {
        ctx.state_peer()
            .is_some_and(|peer| peer.state == state)
            .into()
    }
}

/// Matches messages whose JSON payload contains `key`.
///
/// The value under `key` is stored as `"payload"`.
pub fn payload_contains(key: impl Into<String>) -> impl Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static {
    let key = key.into();
    move |ctx: &MessageContext| {
        let value = ctx
            .payload_json()
            .and_then(|payload| payload.get(&key).cloned());
        match value {
            Some(value) => {
                let mut vars = Map::new();
                vars.insert("payload".to_string(), value);
                FilterResult::AcceptWith(vars)
            }
            None => FilterResult::Reject,
        }
    }
}

/// Accepts when both rules accept, merging their variables.
pub fn and<A, B>(a: A, b: B) -> impl Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static
where
    A: Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static,
    B: Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static,
{
    move |ctx: &MessageContext| match a(ctx) {
        FilterResult::Reject => FilterResult::Reject,
        left => left.and(b(ctx)),
    }
}

/// Accepts with the first accepting rule's result.
pub fn or<A, B>(a: A, b: B) -> impl Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static
where
    A: Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static,
    B: Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static,
{
    move |ctx: &MessageContext| match a(ctx) {
        FilterResult::Reject => b(ctx),
        accepted => accepted,
    }
}

/// Inverts a rule. Variables of the inner rule are discarded.
pub fn not<A>(a: A) -> impl Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static
where
    A: Fn(&MessageContext) -> FilterResult + Clone + Send + Sync + 'static,
{
    move |ctx: &MessageContext| (!a(ctx).is_accepted()).into()
}
