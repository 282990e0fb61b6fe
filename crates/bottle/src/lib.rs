//! # Bottle
//!
//! An event-dispatch framework for social-platform bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌────────┐     ┌──────────────────────────────────┐
//! │ Transport │────▶│ Router │────▶│ MessageView  (handler loop)      │──▶ return manager ──▶ Api
//! │ (Stream)  │     │        │────▶│ RawEventView (one handler/type)  │──▶ return manager ──▶ Api
//! └───────────┘     └────────┘     └──────────────────────────────────┘
//!                                        │ state attached per peer
//!                                  StateDispenser
//! ```
//!
//! - **Router**: offers each event to every view that admits it
//! - **Views**: build a typed context, run middleware and handlers
//! - **Handlers**: a filter plus an async action; blocking handlers stop the loop
//! - **Return manager**: turns handler return values into platform calls
//! - **Uploads**: server, transfer, save ([`upload`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bottle::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!
//!     let mut view = config.dispatch.message_view();
//!     view.add_handler(
//!         handler()
//!             .filter(rules::command("/echo"))
//!             .handle(|ctx: Arc<MessageContext>, vars| async move {
//!                 vars.get_as::<Vec<String>>("args").unwrap_or_default().join(" ")
//!             }),
//!     );
//!
//!     let bot = Bot::from_config(Router::new(api).with_view(view), &config);
//!     bot.cancel_on_signal();
//!     bot.run_polling(events).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output
//! - `http-transfer`: reqwest-backed upload transfer

use std::sync::Arc;

pub use bottle_core as core;
pub use bottle_framework as framework;
pub use bottle_runtime as runtime;
pub use bottle_upload as upload;

use bottle_core::BoxedApi;
use bottle_runtime::DispatchConfig;
use bottle_upload::{Transfer, Uploader};

/// An [`Uploader`] following the configured attachment-string mode.
pub fn uploader(api: BoxedApi, transfer: Arc<dyn Transfer>, config: &DispatchConfig) -> Uploader {
    Uploader::new(api, transfer).generate_attachment_strings(config.generate_attachment_strings)
}

/// Prelude module for convenient imports.
///
/// This module provides all commonly used types for building bot applications:
///
/// ```rust,ignore
/// use bottle::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use bottle_runtime::config::{ConfigLoader, load_config};
    pub use bottle_runtime::{Bot, BottleConfig, Router};

    // Views and handlers
    pub use bottle_framework::rules;
    pub use bottle_framework::{
        ContextVariables, FilterResult, Handler, HandlerResponse, MessageContext, MessageView,
        Middleware, MiddlewareFlow, PostContext, RawEventContext, RawEventView, handler,
    };

    // Core types
    pub use bottle_core::{
        Api, ApiExt, BoxedApi, GroupEventType, RawEvent, StateDispenser, StateGroup, StateTag,
    };

    // Uploads
    pub use bottle_upload::{ByteSource, DocUploader, Uploaded, Uploader};

    pub use bottle_runtime::prelude::*;
}
