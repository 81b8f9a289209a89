//! Inbound event processing.
//!
//! [`EventProcessor`] is the [`EventSink`] the webhook server feeds. For a
//! message event it parses the envelope, archives it and hands it to the
//! [`Dispatcher`]. Each chat scope is serialized up to the point where the
//! dispatcher has decided the route (including the pending-interaction
//! lookup), so one conversation's messages are archived and correlated in
//! delivery order. Handlers run after the scope is released; different
//! scopes proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use qqbot_core::{
    Bot, BoxedBot, ChatScope, Envelope, EventSink, PostType, TransportError, TransportResult,
};
use qqbot_framework::{DispatchOutcome, Dispatcher};

/// One conversation: a group, or a direct chat with one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ScopeKey {
    Direct(i64),
    Group(i64),
}

impl ScopeKey {
    fn of(envelope: &Envelope) -> Self {
        match envelope.scope {
            ChatScope::Direct => Self::Direct(envelope.sender_id()),
            ChatScope::Group { group_id } => Self::Group(group_id),
        }
    }
}

type ScopeLock = Arc<tokio::sync::Mutex<()>>;

/// Turns raw gateway events into dispatches.
pub struct EventProcessor {
    bot: BoxedBot,
    dispatcher: Dispatcher,
    scopes: Mutex<HashMap<ScopeKey, ScopeLock>>,
}

impl EventProcessor {
    /// Creates a processor dispatching on behalf of `bot`.
    pub fn new(bot: BoxedBot, dispatcher: Dispatcher) -> Self {
        Self {
            bot,
            dispatcher,
            scopes: Mutex::new(HashMap::new()),
        }
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Archives `envelope`, then dispatches it.
    ///
    /// An archive failure is logged and does not stop the dispatch.
    pub async fn process(&self, envelope: Envelope) -> TransportResult<DispatchOutcome> {
        let key = ScopeKey::of(&envelope);
        let lock = self.scope_lock(key);
        let prepared = {
            let _turn = lock.lock().await;
            if let Err(e) = self.bot.archive_message(&envelope).await {
                warn!(
                    message_id = envelope.message_id,
                    error = %e,
                    "Failed to archive message"
                );
            }
            self.dispatcher.prepare(envelope, Arc::clone(&self.bot))
        };
        drop(lock);
        self.release_scope(key);

        prepared.run().await
    }

    fn scope_lock(&self, key: ScopeKey) -> ScopeLock {
        Arc::clone(self.scopes.lock().entry(key).or_default())
    }

    /// Forgets the lock for `key` once no delivery holds or waits on it.
    fn release_scope(&self, key: ScopeKey) {
        let mut scopes = self.scopes.lock();
        if let Some(lock) = scopes.get(&key)
            && Arc::strong_count(lock) == 1
        {
            scopes.remove(&key);
        }
    }

    #[cfg(test)]
    fn tracked_scopes(&self) -> usize {
        self.scopes.lock().len()
    }
}

#[async_trait]
impl EventSink for EventProcessor {
    async fn on_event(&self, body: &[u8]) -> TransportResult<()> {
        let raw: Value = match serde_json::from_slice(body) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Discarding event that is not JSON");
                return Ok(());
            }
        };

        match PostType::of(&raw) {
            Ok(PostType::Message) => {}
            Ok(post_type) if post_type.is_heartbeat() => {
                debug!("Heartbeat received");
                return Ok(());
            }
            Ok(post_type) => {
                trace!(?post_type, "Ignoring event");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "Discarding event without post_type");
                return Ok(());
            }
        }

        let envelope = match Envelope::parse(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Discarding malformed message event");
                return Ok(());
            }
        };

        match self.process(envelope).await {
            Ok(outcome) => {
                trace!(?outcome, "Dispatch finished");
                Ok(())
            }
            Err(e) => Err(log_transport_failure(e)),
        }
    }
}

fn log_transport_failure(err: TransportError) -> TransportError {
    warn!(error = %err, "Dispatch aborted by a gateway failure");
    err
}

impl std::fmt::Debug for EventProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProcessor")
            .field("self_id", &self.bot.self_id())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
