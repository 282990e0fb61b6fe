//! # Bottle Runtime
//!
//! Orchestration layer for the Bottle bot framework.
//!
//! This crate provides:
//! - Event routing across views ([`Router`], also a `tower::Service`)
//! - The polling runner ([`Bot`]) with bounded concurrency and graceful shutdown
//! - Layered configuration ([`ConfigLoader`])
//! - Logging setup ([`LoggingBuilder`])
//!
//! ```rust,ignore
//! use bottle_runtime::{Bot, Router, config::load_config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let router = Router::new(api).with_view(config.dispatch.message_view());
//!
//!     let bot = Bot::from_config(router, &config);
//!     bot.cancel_on_signal();
//!     bot.run_polling(events).await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod error;
pub mod logging;
pub mod router;

// Re-exports
pub use bot::Bot;
pub use config::{
    BottleConfig, ConfigError, ConfigLoader, ConfigResult, DispatchConfig, LoggingConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use router::Router;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
