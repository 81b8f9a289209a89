//! # QQBot
//!
//! A webhook-driven QQ chat bot. The gateway posts every inbound event to
//! the bot's webhook; each message is archived by id and dispatched to the
//! registered handlers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐  POST /message  ┌────────────────┐     ┌────────────┐
//! │ Gateway │────────────────▶│ EventProcessor │────▶│ Dispatcher │──▶ handler
//! │         │◀────────────────│ (archive)      │     │            │──▶ prompt
//! └─────────┘   send_*_msg    └────────────────┘     └────────────┘──▶ continuation
//! ```
//!
//! - **Interactive handlers** see direct messages and group messages that
//!   mention the bot. Several matches produce a numbered prompt; replying
//!   to it with a number runs the chosen handler.
//! - **Silent handlers** see the rest of the group traffic; every match runs.
//! - **Continuations** let a handler wait for a reply to one of its own
//!   messages.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use qqbot::prelude::*;
//!
//! fn ping_handlers() -> Vec<HandlerDescriptor> {
//!     vec![HandlerDescriptor::interactive(
//!         "ping",
//!         |env| MatchLabel::when(env.plain_text().trim() == "ping", "ping"),
//!         |ctx| async move {
//!             ctx.reply("pong").await?;
//!             Ok(())
//!         },
//!     )]
//! }
//!
//! static PING: PluginDescriptor = PluginDescriptor {
//!     name: "ping",
//!     description: "Answers ping",
//!     handlers: ping_handlers,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = QQBotRuntime::new();
//!     runtime.register_plugins(&qqbot::apps::builtin())?;
//!     runtime.register_plugin(&PING)?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default): `qqbot.toml` configuration files
//! - `yaml-config` (default): `qqbot.yaml` configuration files
//! - `json-log`: JSON log output

pub mod apps;

#[cfg(test)]
mod testing;

pub use qqbot_core as core;
pub use qqbot_framework as framework;
pub use qqbot_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use qqbot::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use qqbot_runtime::{QQBotConfig, QQBotRuntime};

    // Handler system
    pub use qqbot_framework::{
        DispatchContext, Handler, HandlerDescriptor, HandlerFuture, HandlerKind, MatchLabel,
        PluginDescriptor,
    };

    // Message model
    pub use qqbot_core::{Bot, BoxedBot, ChatScope, Envelope, Message, Segment};
}
