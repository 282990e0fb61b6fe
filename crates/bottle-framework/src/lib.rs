//! # Bottle Framework
//!
//! The event dispatch pipeline built on top of the core types.
//!
//! This layer provides:
//! - Handler trait and closure builder with composable filter rules
//! - Middleware with pre and post hooks around the handler loop
//! - Return manager turning handler return values into side effects
//! - Views: the message view and the raw event view
//!
//! Views are independent of any transport; the runtime decides which view
//! gets an event.

pub mod context;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod returns;
pub mod rules;
pub mod view;

pub use context::{ContextVariables, MessageContext, RawEventContext};
pub use error::{DispatchError, DispatchResult};
pub use handler::{BoxedHandler, FilterResult, FnHandler, Handler, HandlerBuilder, handler};
pub use middleware::{BoxedMiddleware, Middleware, MiddlewareFlow, PostContext};
pub use returns::{
    AnswerText, BoxedReturnHandler, HandlerResponse, IntoResponse, ResponseKind, ReturnHandler,
    ReturnManager, message_return_manager,
};
pub use view::{
    BoxedView, DispatchReport, HandlerBasement, MessageView, RawEventView, TextApproximator, View,
};

// Re-export for implementors of the handler traits.
pub use tower::BoxError;
