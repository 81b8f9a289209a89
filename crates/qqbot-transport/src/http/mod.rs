//! HTTP transports.
//!
//! This module provides the webhook server and the gateway client.

#[cfg(feature = "http-client")]
mod client;
#[cfg(feature = "http-client")]
pub use client::{DEFAULT_TIMEOUT, GatewayClient, RetryPolicy};

#[cfg(feature = "http-server")]
mod server;
#[cfg(feature = "http-server")]
pub use server::{ServerHandle, WebhookServer, router};
