//! # QQBot Framework
//!
//! Handler registration and message dispatch.
//!
//! This layer provides:
//! - [`HandlerDescriptor`]: a named predicate plus async body, tagged with a
//!   [`HandlerKind`]
//! - [`HandlerRegistry`] and [`PluginDescriptor`] for assembling handlers
//! - [`PendingStore`]: continuations parked until someone replies to a
//!   given message
//! - [`Dispatcher`]: routes each envelope to a continuation, a single
//!   handler, a disambiguation prompt, or every matching silent handler
//!
//! It depends only on `qqbot-core`; the transport and the concrete bot are
//! supplied by the runtime.

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod pending;
pub mod plugin;
pub mod registry;

#[cfg(test)]
mod testing;

pub use context::DispatchContext;
pub use dispatcher::{DispatchOutcome, Dispatcher, PreparedDispatch, parse_selection};
pub use error::{RegistryError, RegistryResult, SelectionError};
pub use handler::{FnHandler, Handler, HandlerDescriptor, HandlerFuture, HandlerKind, MatchLabel};
pub use pending::{
    CandidateData, Continuation, ContinuationFuture, DEFAULT_PENDING_TTL, PendingStore,
};
pub use plugin::PluginDescriptor;
pub use registry::HandlerRegistry;
