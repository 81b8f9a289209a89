//! Handler descriptors.
//!
//! A [`HandlerDescriptor`] pairs static metadata (name and [`HandlerKind`])
//! with a [`Handler`]: a match predicate returning an optional
//! [`MatchLabel`] and an async execution body.
//!
//! Handlers are written either as a type implementing [`Handler`] or as a
//! pair of closures:
//!
//! ```rust,ignore
//! use qqbot_framework::{HandlerDescriptor, MatchLabel};
//!
//! let ping = HandlerDescriptor::interactive(
//!     "ping",
//!     |env| MatchLabel::when(env.plain_text().trim() == "ping", "ping"),
//!     |ctx| async move {
//!         ctx.reply("pong").await?;
//!         Ok(())
//!     },
//! );
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use qqbot_core::Envelope;

use crate::context::DispatchContext;

/// The future returned by a handler body.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

// =============================================================================
// HandlerKind
// =============================================================================

/// When a handler is considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Direct messages and group messages that @-mention the bot. May reply;
    /// several matches produce a disambiguation prompt.
    Interactive,
    /// All other group traffic. Every match runs; never prompts.
    Silent,
    /// Invoked on a timer. Registered but never dispatched to.
    Scheduled,
    /// Invoked from an external endpoint. Registered but never dispatched to.
    External,
}

impl HandlerKind {
    /// Returns the kind as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Silent => "silent",
            Self::Scheduled => "scheduled",
            Self::External => "external",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// MatchLabel
// =============================================================================

/// A non-empty tag describing which rule of a predicate matched.
///
/// An empty label means "no match", so it cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchLabel(String);

impl MatchLabel {
    /// Creates a label, or `None` if `label` is empty.
    pub fn new(label: impl Into<String>) -> Option<Self> {
        let label = label.into();
        (!label.is_empty()).then_some(Self(label))
    }

    /// Returns a label when `matched` holds.
    pub fn when(matched: bool, label: impl Into<String>) -> Option<Self> {
        if matched { Self::new(label) } else { None }
    }

    /// The label text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Handler trait
// =============================================================================

/// A match predicate plus execution body.
pub trait Handler: Send + Sync + 'static {
    /// Returns a label if this handler wants `envelope`.
    fn check(&self, envelope: &Envelope) -> Option<MatchLabel>;

    /// Runs the handler. The context carries the envelope, the bot and the
    /// label returned by [`Handler::check`].
    fn run(&self, ctx: Arc<DispatchContext>) -> HandlerFuture;
}

/// A [`Handler`] built from two closures.
pub struct FnHandler<C, R> {
    check: C,
    run: R,
}

impl<C, R, Fut> Handler for FnHandler<C, R>
where
    C: Fn(&Envelope) -> Option<MatchLabel> + Send + Sync + 'static,
    R: Fn(Arc<DispatchContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn check(&self, envelope: &Envelope) -> Option<MatchLabel> {
        (self.check)(envelope)
    }

    fn run(&self, ctx: Arc<DispatchContext>) -> HandlerFuture {
        (self.run)(ctx).boxed()
    }
}

// =============================================================================
// HandlerDescriptor
// =============================================================================

struct DescriptorInner {
    name: String,
    kind: HandlerKind,
    handler: Box<dyn Handler>,
}

/// A registered handler: name, kind, predicate and body.
///
/// Cloning is cheap; clones share the same handler.
#[derive(Clone)]
pub struct HandlerDescriptor {
    inner: Arc<DescriptorInner>,
}

impl HandlerDescriptor {
    /// Wraps a [`Handler`] implementation.
    pub fn new(name: impl Into<String>, kind: HandlerKind, handler: impl Handler) -> Self {
        Self {
            inner: Arc::new(DescriptorInner {
                name: name.into(),
                kind,
                handler: Box::new(handler),
            }),
        }
    }

    /// Builds a descriptor from a predicate closure and an async body.
    pub fn from_fn<C, R, Fut>(name: impl Into<String>, kind: HandlerKind, check: C, run: R) -> Self
    where
        C: Fn(&Envelope) -> Option<MatchLabel> + Send + Sync + 'static,
        R: Fn(Arc<DispatchContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(name, kind, FnHandler { check, run })
    }

    /// Shorthand for an [`HandlerKind::Interactive`] closure handler.
    pub fn interactive<C, R, Fut>(name: impl Into<String>, check: C, run: R) -> Self
    where
        C: Fn(&Envelope) -> Option<MatchLabel> + Send + Sync + 'static,
        R: Fn(Arc<DispatchContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::from_fn(name, HandlerKind::Interactive, check, run)
    }

    /// Shorthand for a [`HandlerKind::Silent`] closure handler.
    pub fn silent<C, R, Fut>(name: impl Into<String>, check: C, run: R) -> Self
    where
        C: Fn(&Envelope) -> Option<MatchLabel> + Send + Sync + 'static,
        R: Fn(Arc<DispatchContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::from_fn(name, HandlerKind::Silent, check, run)
    }

    /// The handler name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The handler kind.
    pub fn kind(&self) -> HandlerKind {
        self.inner.kind
    }

    /// Evaluates the match predicate.
    pub fn check(&self, envelope: &Envelope) -> Option<MatchLabel> {
        self.inner.handler.check(envelope)
    }

    /// Runs the execution body.
    pub fn run(&self, ctx: Arc<DispatchContext>) -> HandlerFuture {
        self.inner.handler.run(ctx)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .finish()
    }
}
