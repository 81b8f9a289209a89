//! Message dispatcher.
//!
//! The [`Dispatcher`] decides, for each inbound envelope, which handler(s)
//! run:
//!
//! 1. **Correlation**: if the envelope replies to a message that has a live
//!    pending interaction, that continuation runs and nothing else does.
//! 2. **Matching**: otherwise every handler of the envelope's kind is
//!    checked. Direct messages and group messages that @-mention the bot are
//!    [`HandlerKind::Interactive`]; other group traffic is
//!    [`HandlerKind::Silent`].
//! 3. **Resolution**:
//!    - no interactive match: reply that nothing matched
//!    - no silent match: do nothing
//!    - one match: run it
//!    - several interactive matches: send a numbered prompt and park a
//!      selection under the prompt's message id
//!    - several silent matches: run them all, one after another
//!
//! Handler failures are logged and, for interactive dispatch, reported in
//! the conversation. A [`TransportError`] is never swallowed: it means the
//! gateway is unreachable and is returned to the caller.
//!
//! ```rust,ignore
//! use qqbot_framework::{Dispatcher, HandlerRegistry, PendingStore};
//!
//! let registry = Arc::new(registry);
//! let dispatcher = Dispatcher::new(registry, Arc::new(PendingStore::new()));
//! let outcome = dispatcher.dispatch(envelope, bot).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, Level, Span, debug, error, info, span};
use uuid::Uuid;

use qqbot_core::{BoxedBot, Envelope, TransportError, TransportResult};

use crate::context::DispatchContext;
use crate::error::SelectionError;
use crate::handler::{HandlerDescriptor, HandlerKind, MatchLabel};
use crate::pending::{CandidateData, Continuation, PendingStore};
use crate::registry::HandlerRegistry;

const RESPONSE_ID_PREFIX: &str = "响应ID: ";
const NO_MATCH_TEXT: &str = "未找到符合条件的功能";
const AMBIGUOUS_TEXT: &str = "发现多个符合条件的功能：";
const ERROR_PREFIX: &str = "发生错误: ";
const INVALID_SELECTION_PREFIX: &str = "选择无效: ";

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A pending interaction was resumed.
    Resumed,
    /// No handler matched.
    NoMatch {
        /// The kind that was searched.
        kind: HandlerKind,
    },
    /// Exactly one handler matched and ran.
    Handled {
        /// Its name.
        handler: String,
        /// `false` if it returned an error.
        succeeded: bool,
    },
    /// Several interactive handlers matched; the sender was asked to pick.
    Prompted {
        /// Message id of the prompt.
        prompt_id: i64,
        /// Candidate names, in prompt order.
        candidates: Vec<String>,
    },
    /// Several silent handlers matched and all ran.
    Broadcast {
        /// Handlers that finished cleanly.
        succeeded: Vec<String>,
        /// Handlers that returned an error.
        failed: Vec<String>,
    },
}

/// Candidates parked by a disambiguation prompt.
struct Selection {
    original: Arc<Envelope>,
    candidates: Vec<(HandlerDescriptor, MatchLabel)>,
}

/// Where a prepared envelope goes.
enum Route {
    Resume(Continuation, CandidateData),
    Matched {
        kind: HandlerKind,
        matched: Vec<(HandlerDescriptor, MatchLabel)>,
    },
}

/// An envelope whose route has been decided by [`Dispatcher::prepare`].
#[must_use = "a prepared dispatch does nothing until run"]
pub struct PreparedDispatch<'a> {
    dispatcher: &'a Dispatcher,
    ctx: Arc<DispatchContext>,
    route: Route,
    span: Span,
}

impl PreparedDispatch<'_> {
    /// Returns `true` if a pending interaction was taken for this envelope.
    pub fn resumes(&self) -> bool {
        matches!(self.route, Route::Resume(..))
    }

    /// Runs the chosen handler(s).
    pub async fn run(self) -> TransportResult<DispatchOutcome> {
        let Self {
            dispatcher,
            ctx,
            route,
            span,
        } = self;
        dispatcher.resolve(ctx, route).instrument(span).await
    }
}

impl std::fmt::Debug for PreparedDispatch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedDispatch")
            .field("message_id", &self.ctx.envelope().message_id)
            .field("resumes", &self.resumes())
            .finish()
    }
}

/// The central message dispatcher.
///
/// `Dispatcher` is cheap to clone and can be shared across request tasks;
/// the registry is read-only and the pending store synchronizes itself.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    pending: Arc<PendingStore>,
    selection_ttl: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher. Selection prompts use the store's default TTL.
    pub fn new(registry: Arc<HandlerRegistry>, pending: Arc<PendingStore>) -> Self {
        let selection_ttl = pending.default_ttl();
        Self {
            registry,
            pending,
            selection_ttl,
        }
    }

    /// Overrides how long a selection prompt stays answerable.
    pub fn with_selection_ttl(mut self, ttl: Duration) -> Self {
        self.selection_ttl = ttl;
        self
    }

    /// The handler registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The pending-interaction store.
    pub fn pending(&self) -> &Arc<PendingStore> {
        &self.pending
    }

    /// Dispatches one envelope.
    ///
    /// Only transport failures are returned as errors; every other outcome,
    /// including handler failures, is an `Ok`.
    pub async fn dispatch(
        &self,
        envelope: Envelope,
        bot: BoxedBot,
    ) -> TransportResult<DispatchOutcome> {
        self.prepare(envelope, bot).run().await
    }

    /// Decides the route for `envelope` without running anything.
    ///
    /// Correlation happens here: a live pending interaction for the replied
    /// message is taken out of the store before this returns. Callers that
    /// serialize envelopes of one conversation can prepare under their lock
    /// and run after releasing it.
    pub fn prepare(&self, envelope: Envelope, bot: BoxedBot) -> PreparedDispatch<'_> {
        let response_id = Uuid::new_v4();
        let span = span!(
            Level::DEBUG,
            "dispatch",
            message_id = envelope.message_id,
            response_id = %response_id
        );

        let ctx = Arc::new(DispatchContext::new(
            Arc::new(envelope),
            bot,
            Arc::clone(&self.pending),
            response_id,
        ));
        let route = span.in_scope(|| self.route(&ctx));
        PreparedDispatch {
            dispatcher: self,
            ctx,
            route,
            span,
        }
    }

    fn route(&self, ctx: &DispatchContext) -> Route {
        if let Some(target) = ctx.envelope().reply_target()
            && let Some((continuation, data)) = self.pending.take(target)
        {
            debug!(target, "Resuming pending interaction");
            return Route::Resume(continuation, data);
        }

        let kind = kind_for(ctx);
        let matched: Vec<(HandlerDescriptor, MatchLabel)> = self
            .registry
            .handlers_of(kind)
            .filter_map(|d| d.check(ctx.envelope()).map(|label| (d.clone(), label)))
            .collect();
        debug!(kind = %kind, matched = matched.len(), "Evaluated handlers");
        Route::Matched { kind, matched }
    }

    async fn resolve(
        &self,
        ctx: Arc<DispatchContext>,
        route: Route,
    ) -> TransportResult<DispatchOutcome> {
        let (kind, mut matched) = match route {
            Route::Resume(continuation, data) => {
                let result = continuation(Arc::clone(&ctx), data).await;
                settle(&ctx, "continuation", result, true).await?;
                return Ok(DispatchOutcome::Resumed);
            }
            Route::Matched { kind, matched } => (kind, matched),
        };

        match (kind, matched.len()) {
            (HandlerKind::Interactive, 0) => self.reply_no_match(&ctx).await,
            (_, 0) => Ok(DispatchOutcome::NoMatch { kind }),
            (_, 1) => {
                let (descriptor, label) = matched.remove(0);
                let report = kind == HandlerKind::Interactive;
                let succeeded = run_handler(&ctx, &descriptor, label, report).await?;
                Ok(DispatchOutcome::Handled {
                    handler: descriptor.name().to_string(),
                    succeeded,
                })
            }
            (HandlerKind::Interactive, _) => self.prompt(&ctx, matched).await,
            _ => run_all(&ctx, matched).await,
        }
    }

    async fn reply_no_match(&self, ctx: &DispatchContext) -> TransportResult<DispatchOutcome> {
        let text = format!("{RESPONSE_ID_PREFIX}{}\n{NO_MATCH_TEXT}", ctx.response_id());
        ctx.quote_reply(text).await?;
        info!("No interactive handler matched");
        Ok(DispatchOutcome::NoMatch {
            kind: HandlerKind::Interactive,
        })
    }

    async fn prompt(
        &self,
        ctx: &DispatchContext,
        candidates: Vec<(HandlerDescriptor, MatchLabel)>,
    ) -> TransportResult<DispatchOutcome> {
        let names: Vec<String> = candidates
            .iter()
            .map(|(d, _)| d.name().to_string())
            .collect();

        let mut lines = vec![
            format!("{RESPONSE_ID_PREFIX}{}", ctx.response_id()),
            AMBIGUOUS_TEXT.to_string(),
        ];
        for (index, (descriptor, label)) in candidates.iter().enumerate() {
            lines.push(format!("{}. {} ({})", index + 1, descriptor.name(), label));
        }
        lines.push(format!(
            "请在 {} 秒内回复本消息并发送序号",
            self.selection_ttl.as_secs()
        ));

        let prompt_id = ctx.quote_reply(lines.join("\n")).await?;
        let selection = Selection {
            original: Arc::clone(ctx.envelope_arc()),
            candidates,
        };
        self.pending.register(
            prompt_id,
            selection,
            Some(self.selection_ttl),
            resume_selection,
        );

        info!(prompt_id, candidates = ?names, "Asked sender to choose a handler");
        Ok(DispatchOutcome::Prompted {
            prompt_id,
            candidates: names,
        })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handler_count", &self.registry.len())
            .field("pending", &self.pending.len())
            .field("selection_ttl", &self.selection_ttl)
            .finish()
    }
}

/// Parses a 1-based selection out of `input`, returning the 0-based index.
pub fn parse_selection(input: &str, count: usize) -> Result<usize, SelectionError> {
    let trimmed = input.trim();
    let index: usize = trimmed.parse().map_err(|_| SelectionError::NotANumber {
        input: trimmed.to_string(),
    })?;
    if index == 0 || index > count {
        return Err(SelectionError::OutOfRange { index, max: count });
    }
    Ok(index - 1)
}

fn kind_for(ctx: &DispatchContext) -> HandlerKind {
    let envelope = ctx.envelope();
    if envelope.is_direct() || envelope.message.mentions(ctx.bot().self_id()) {
        HandlerKind::Interactive
    } else {
        HandlerKind::Silent
    }
}

async fn run_handler(
    ctx: &DispatchContext,
    descriptor: &HandlerDescriptor,
    label: MatchLabel,
    report: bool,
) -> TransportResult<bool> {
    debug!(handler = %descriptor.name(), label = %label, "Running handler");
    let result = descriptor.run(ctx.with_label(label)).await;
    settle(ctx, descriptor.name(), result, report).await
}

async fn run_all(
    ctx: &DispatchContext,
    candidates: Vec<(HandlerDescriptor, MatchLabel)>,
) -> TransportResult<DispatchOutcome> {
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    let mut transport_error = None;

    for (descriptor, label) in candidates {
        let name = descriptor.name().to_string();
        match run_handler(ctx, &descriptor, label, false).await {
            Ok(true) => succeeded.push(name),
            Ok(false) => failed.push(name),
            Err(e) => {
                failed.push(name);
                transport_error.get_or_insert(e);
            }
        }
    }

    match transport_error {
        Some(e) => Err(e),
        None => Ok(DispatchOutcome::Broadcast { succeeded, failed }),
    }
}

/// Applies the failure policy to a handler result.
///
/// Returns `Ok(true)` on success, `Ok(false)` for a handled failure and
/// `Err` for a transport failure.
async fn settle(
    ctx: &DispatchContext,
    name: &str,
    result: anyhow::Result<()>,
    report: bool,
) -> TransportResult<bool> {
    let Err(err) = result else {
        return Ok(true);
    };

    let err = match err.downcast::<TransportError>() {
        Ok(transport) => {
            error!(handler = %name, error = %transport, "Gateway failure while handling message");
            return Err(transport);
        }
        Err(err) => err,
    };

    let summary = format!("{err:#}");
    error!(handler = %name, error = %summary, "Handler failed");
    if report {
        ctx.quote_reply(format!("{ERROR_PREFIX}{summary}")).await?;
    }
    Ok(false)
}

/// Continuation parked by a disambiguation prompt.
async fn resume_selection(ctx: Arc<DispatchContext>, data: CandidateData) -> anyhow::Result<()> {
    let Ok(selection) = data.downcast::<Selection>() else {
        anyhow::bail!("pending selection carried unexpected data");
    };
    let Selection {
        original,
        mut candidates,
    } = *selection;

    let index = match parse_selection(&ctx.envelope().plain_text(), candidates.len()) {
        Ok(index) => index,
        Err(e) => {
            info!(error = %e, "Rejected selection reply");
            ctx.quote_reply(format!("{INVALID_SELECTION_PREFIX}{e}")).await?;
            return Ok(());
        }
    };

    let (descriptor, label) = candidates.swap_remove(index);
    info!(handler = %descriptor.name(), "Running selected handler");
    descriptor
        .run(ctx.for_envelope(original).with_label(label))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio_test::{assert_err, assert_ok};

    use crate::testing::{
        RecordingBot, Target, USER_ID, direct_envelope, direct_reply, group_envelope,
    };

    type Counter = Arc<AtomicUsize>;

    fn counter() -> Counter {
        Arc::new(AtomicUsize::new(0))
    }

    /// An interactive handler matching texts that contain `needle`.
    fn counting(
        name: &str,
        kind: HandlerKind,
        needle: &'static str,
        hits: &Counter,
    ) -> HandlerDescriptor {
        let hits = Arc::clone(hits);
        HandlerDescriptor::from_fn(
            name,
            kind,
            move |env| MatchLabel::when(env.plain_text().contains(needle), needle),
            move |_ctx| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            },
        )
    }

    fn dispatcher_with(handlers: Vec<HandlerDescriptor>) -> Dispatcher {
        let mut registry = HandlerRegistry::new();
        for handler in handlers {
            registry.register(handler).unwrap();
        }
        Dispatcher::new(Arc::new(registry), Arc::new(PendingStore::new()))
    }

    #[tokio::test]
    async fn test_no_interactive_match_replies_once() {
        let bot = RecordingBot::new();
        let dispatcher = dispatcher_with(vec![counting(
            "a",
            HandlerKind::Interactive,
            "hello",
            &counter(),
        )]);

        let outcome = dispatcher
            .dispatch(direct_envelope(1, "nothing here"), bot.clone())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::NoMatch {
                kind: HandlerKind::Interactive
            }
        );
        let sent = bot.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target, Target::Direct(USER_ID));
        let text = sent[0].message.plain_text();
        assert!(text.starts_with(RESPONSE_ID_PREFIX));
        assert!(text.contains(NO_MATCH_TEXT));
        assert!(dispatcher.pending().is_empty());
    }

    #[tokio::test]
    async fn test_no_silent_match_is_quiet() {
        let bot = RecordingBot::new();
        let dispatcher =
            dispatcher_with(vec![counting("a", HandlerKind::Silent, "hello", &counter())]);

        let outcome = dispatcher
            .dispatch(group_envelope(1, 555, "chatter", false), bot.clone())
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::NoMatch { kind: HandlerKind::Silent });
        assert!(bot.sent().is_empty());
    }

    #[tokio::test]
    async fn test_single_match_runs_once_with_envelope() {
        let bot = RecordingBot::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let handler = HandlerDescriptor::interactive(
            "only",
            |env| MatchLabel::when(env.plain_text() == "go", "go"),
            move |ctx| {
                let seen = Arc::clone(&seen_clone);
                async move {
                    seen.lock().push((ctx.envelope().message_id, ctx.label().cloned()));
                    anyhow::Ok(())
                }
            },
        );
        let dispatcher = dispatcher_with(vec![handler]);

        let outcome = dispatcher
            .dispatch(direct_envelope(42, "go"), bot.clone())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Handled {
                handler: "only".into(),
                succeeded: true
            }
        );
        assert_eq!(*seen.lock(), vec![(42, MatchLabel::new("go"))]);
        assert!(bot.sent().is_empty());
    }

    #[tokio::test]
    async fn test_mention_selects_interactive_kind() {
        let interactive = counter();
        let silent = counter();
        let dispatcher = dispatcher_with(vec![
            counting("i", HandlerKind::Interactive, "ping", &interactive),
            counting("s", HandlerKind::Silent, "ping", &silent),
        ]);

        let bot = RecordingBot::new();
        dispatcher
            .dispatch(group_envelope(1, 555, "ping", true), bot.clone())
            .await
            .unwrap();
        dispatcher
            .dispatch(group_envelope(2, 555, "ping", false), bot.clone())
            .await
            .unwrap();

        assert_eq!(interactive.load(Ordering::SeqCst), 1);
        assert_eq!(silent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_error_is_reported_not_propagated() {
        let bot = RecordingBot::new();
        let handler = HandlerDescriptor::interactive(
            "broken",
            |_| MatchLabel::new("always"),
            |_ctx| async { Err::<(), _>(anyhow::anyhow!("database is on fire")) },
        );
        let dispatcher = dispatcher_with(vec![handler]);

        let outcome = assert_ok!(
            dispatcher
                .dispatch(direct_envelope(3, "x"), bot.clone())
                .await
        );
        assert_eq!(
            outcome,
            DispatchOutcome::Handled {
                handler: "broken".into(),
                succeeded: false
            }
        );
        let sent = bot.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].message.plain_text(),
            format!("{ERROR_PREFIX}database is on fire")
        );
        assert_eq!(sent[0].message.reply_target(), Some(3));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let bot = RecordingBot::new();
        let handler = HandlerDescriptor::interactive(
            "replier",
            |_| MatchLabel::new("always"),
            |ctx| async move {
                ctx.reply("hello").await?;
                anyhow::Ok(())
            },
        );
        let dispatcher = dispatcher_with(vec![handler]);
        bot.go_offline();

        let err = assert_err!(
            dispatcher
                .dispatch(direct_envelope(4, "x"), bot.clone())
                .await
        );
        assert!(matches!(err, TransportError::ConnectionFailed { .. }));
    }

    #[tokio::test]
    async fn test_silent_matches_all_run_despite_failure() {
        let bot = RecordingBot::new();
        let hits = counter();
        let failing = HandlerDescriptor::silent(
            "failing",
            |_| MatchLabel::new("always"),
            |_ctx| async { Err::<(), _>(anyhow::anyhow!("boom")) },
        );
        let dispatcher = dispatcher_with(vec![
            counting("first", HandlerKind::Silent, "news", &hits),
            failing,
            counting("last", HandlerKind::Silent, "news", &hits),
        ]);

        let outcome = dispatcher
            .dispatch(group_envelope(5, 555, "news today", false), bot.clone())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Broadcast {
                succeeded: vec!["first".into(), "last".into()],
                failed: vec!["failing".into()],
            }
        );
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(bot.sent().is_empty());
        assert!(dispatcher.pending().is_empty());
    }

    #[tokio::test]
    async fn test_silent_transport_error_waits_for_remaining_handlers() {
        let bot = RecordingBot::new();
        let hits = counter();
        let sender = HandlerDescriptor::silent(
            "sender",
            |_| MatchLabel::new("always"),
            |ctx| async move {
                ctx.reply("x").await?;
                anyhow::Ok(())
            },
        );
        let after = counting("after", HandlerKind::Silent, "any", &hits);
        let dispatcher = dispatcher_with(vec![sender, after]);
        bot.go_offline();

        let result = dispatcher
            .dispatch(group_envelope(6, 555, "anything", false), bot.clone())
            .await;

        assert!(result.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    async fn prompt_for_two(dispatcher: &Dispatcher, bot: &Arc<RecordingBot>) -> i64 {
        let outcome = dispatcher
            .dispatch(direct_envelope(100, "hello there"), bot.clone())
            .await
            .unwrap();
        match outcome {
            DispatchOutcome::Prompted {
                prompt_id,
                candidates,
            } => {
                assert_eq!(candidates, ["A", "B"]);
                prompt_id
            }
            other => panic!("expected a prompt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ambiguity_prompt_lists_candidates() {
        let bot = RecordingBot::new();
        let (a, b) = (counter(), counter());
        let dispatcher = dispatcher_with(vec![
            counting("A", HandlerKind::Interactive, "hello", &a),
            counting("B", HandlerKind::Interactive, "hello", &b),
        ]);

        let prompt_id = prompt_for_two(&dispatcher, &bot).await;

        let sent = bot.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_id, prompt_id);
        let text = sent[0].message.plain_text();
        assert!(text.starts_with(RESPONSE_ID_PREFIX));
        assert!(text.contains(AMBIGUOUS_TEXT));
        assert!(text.contains("1. A (hello)"));
        assert!(text.contains("2. B (hello)"));
        assert!(dispatcher.pending().contains(prompt_id));
        assert_eq!(a.load(Ordering::SeqCst) + b.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ambiguity_selection_runs_chosen_handler() {
        for (choice, expected_a, expected_b) in [("1", 1, 0), (" 2 ", 0, 1)] {
            let bot = RecordingBot::new();
            let (a, b) = (counter(), counter());
            let dispatcher = dispatcher_with(vec![
                counting("A", HandlerKind::Interactive, "hello", &a),
                counting("B", HandlerKind::Interactive, "hello", &b),
            ]);
            let prompt_id = prompt_for_two(&dispatcher, &bot).await;

            let outcome = dispatcher
                .dispatch(direct_reply(101, prompt_id, choice), bot.clone())
                .await
                .unwrap();

            assert_eq!(outcome, DispatchOutcome::Resumed);
            assert_eq!(a.load(Ordering::SeqCst), expected_a);
            assert_eq!(b.load(Ordering::SeqCst), expected_b);
            assert!(!dispatcher.pending().contains(prompt_id));
            assert_eq!(bot.sent().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_selected_handler_sees_original_envelope() {
        let bot = RecordingBot::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let recorder = HandlerDescriptor::interactive(
            "recorder",
            |env| MatchLabel::when(env.plain_text().contains("hello"), "hello"),
            move |ctx| {
                let seen = Arc::clone(&seen_clone);
                async move {
                    seen.store(ctx.envelope().message_id as usize, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            },
        );
        let dispatcher = dispatcher_with(vec![
            counting("A", HandlerKind::Interactive, "hello", &counter()),
            recorder,
        ]);
        let outcome = dispatcher
            .dispatch(direct_envelope(100, "hello"), bot.clone())
            .await
            .unwrap();
        let DispatchOutcome::Prompted { prompt_id, .. } = outcome else {
            panic!("expected a prompt");
        };

        dispatcher
            .dispatch(direct_reply(101, prompt_id, "2"), bot.clone())
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn test_out_of_range_selection_replies_and_removes_entry() {
        for choice in ["3", "0", "abc"] {
            let bot = RecordingBot::new();
            let (a, b) = (counter(), counter());
            let dispatcher = dispatcher_with(vec![
                counting("A", HandlerKind::Interactive, "hello", &a),
                counting("B", HandlerKind::Interactive, "hello", &b),
            ]);
            let prompt_id = prompt_for_two(&dispatcher, &bot).await;

            let outcome = dispatcher
                .dispatch(direct_reply(101, prompt_id, choice), bot.clone())
                .await
                .unwrap();

            assert_eq!(outcome, DispatchOutcome::Resumed);
            assert_eq!(a.load(Ordering::SeqCst) + b.load(Ordering::SeqCst), 0);
            assert!(dispatcher.pending().is_empty());
            let sent = bot.sent();
            assert_eq!(sent.len(), 2);
            assert!(sent[1].message.plain_text().starts_with(INVALID_SELECTION_PREFIX));
            assert_eq!(sent[1].message.reply_target(), Some(101));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_selection_falls_back_to_matching() {
        let bot = RecordingBot::new();
        let (a, b) = (counter(), counter());
        let dispatcher = dispatcher_with(vec![
            counting("A", HandlerKind::Interactive, "hello", &a),
            counting("B", HandlerKind::Interactive, "hello", &b),
        ])
        .with_selection_ttl(Duration::from_secs(60));
        let prompt_id = prompt_for_two(&dispatcher, &bot).await;

        tokio::time::advance(Duration::from_secs(61)).await;

        let outcome = dispatcher
            .dispatch(direct_reply(101, prompt_id, "1"), bot.clone())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::NoMatch {
                kind: HandlerKind::Interactive
            }
        );
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert!(dispatcher.pending().is_empty());
    }

    #[tokio::test]
    async fn test_correlated_reply_skips_predicates() {
        let bot = RecordingBot::new();
        let checks = counter();
        let checks_clone = Arc::clone(&checks);
        let greedy = HandlerDescriptor::interactive(
            "greedy",
            move |_| {
                checks_clone.fetch_add(1, Ordering::SeqCst);
                MatchLabel::new("always")
            },
            |_ctx| async { anyhow::Ok(()) },
        );
        let dispatcher = dispatcher_with(vec![greedy]);

        let resumed = counter();
        let resumed_clone = Arc::clone(&resumed);
        dispatcher
            .pending()
            .register(555, (), None, move |ctx, _data| async move {
                assert_eq!(ctx.envelope().message_id, 7);
                resumed_clone.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            });

        let outcome = dispatcher
            .dispatch(direct_reply(7, 555, "anything"), bot.clone())
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Resumed);
        assert_eq!(resumed.load(Ordering::SeqCst), 1);
        assert_eq!(checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prepare_claims_pending_entry_before_running() {
        let bot = RecordingBot::new();
        let hits = counter();
        let dispatcher =
            dispatcher_with(vec![counting("echo", HandlerKind::Interactive, "echo", &hits)]);
        let resumed = counter();
        let resumed_clone = Arc::clone(&resumed);
        dispatcher
            .pending()
            .register(555, (), None, move |_ctx, _data| async move {
                resumed_clone.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            });

        let first = dispatcher.prepare(direct_reply(7, 555, "echo"), bot.clone());
        assert!(first.resumes());
        assert!(dispatcher.pending().is_empty());

        // a second reply to the same prompt no longer correlates
        let second = dispatcher.prepare(direct_reply(8, 555, "echo"), bot.clone());
        assert!(!second.resumes());
        assert_eq!(resumed.load(Ordering::SeqCst), 0);

        let outcome = second.run().await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Handled {
                handler: "echo".into(),
                succeeded: true,
            }
        );
        assert_eq!(first.run().await.unwrap(), DispatchOutcome::Resumed);
        assert_eq!(resumed.load(Ordering::SeqCst), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reply_without_pending_entry_is_matched_normally() {
        let bot = RecordingBot::new();
        let hits = counter();
        let dispatcher =
            dispatcher_with(vec![counting("echo", HandlerKind::Interactive, "echo", &hits)]);

        let outcome = dispatcher
            .dispatch(direct_reply(8, 12345, "echo"), bot.clone())
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Handled { succeeded: true, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("1", 2), Ok(0));
        assert_eq!(parse_selection(" 2\n", 2), Ok(1));
        assert_eq!(
            parse_selection("3", 2),
            Err(SelectionError::OutOfRange { index: 3, max: 2 })
        );
        assert!(matches!(
            parse_selection("-1", 2),
            Err(SelectionError::NotANumber { .. })
        ));
    }
}
