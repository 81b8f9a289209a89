//! # QQBot Transport
//!
//! HTTP plumbing between the bot and its chat gateway.
//!
//! ## Features
//!
//! - `http-server`: [`WebhookServer`], which receives event POSTs and hands
//!   each body to an [`EventSink`](qqbot_core::EventSink)
//! - `http-client`: [`GatewayClient`], a [`GatewayApi`](qqbot_core::GatewayApi)
//!   implementation with bearer auth and retries
//! - `full`: both
//!
//! ## Architecture
//!
//! ```text
//!            POST /message                 POST /{action}
//! gateway ─────────────────▶ WebhookServer    GatewayClient ─────────────────▶ gateway
//!                               │                  ▲
//!                               ▼                  │
//!                           EventSink ──▶ runtime ─┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use qqbot_transport::http::{GatewayClient, WebhookServer};
//!
//! let gateway = GatewayClient::new("http://127.0.0.1:3000")?;
//! let handle = WebhookServer::listen("0.0.0.0:8080", "/message", sink).await?;
//! // ...
//! handle.shutdown().await;
//! ```

#[cfg(any(feature = "http-client", feature = "http-server"))]
pub mod http;

#[cfg(feature = "http-server")]
pub use http::{ServerHandle, WebhookServer};

#[cfg(feature = "http-client")]
pub use http::{GatewayClient, RetryPolicy};
