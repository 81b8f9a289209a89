//! Echo: repeats the message being replied to.
//!
//! Reply to any message with the text `echo` (mentioning the bot in a
//! group) and the bot sends that message's content again.

use std::sync::Arc;

use futures::FutureExt;
use tracing::debug;

use qqbot_core::Envelope;
use qqbot_framework::{
    DispatchContext, Handler, HandlerDescriptor, HandlerFuture, HandlerKind, MatchLabel,
    PluginDescriptor,
};

const TRIGGER: &str = "echo";
const NOT_FOUND_TEXT: &str = "未找到被回复的消息";

/// The echo plugin.
pub static ECHO: PluginDescriptor = PluginDescriptor {
    name: "echo",
    description: "Repeats the message being replied to",
    handlers: echo_handlers,
};

fn echo_handlers() -> Vec<HandlerDescriptor> {
    vec![HandlerDescriptor::new(
        "echo_message",
        HandlerKind::Interactive,
        EchoHandler,
    )]
}

/// Matches a bare `echo` carrying a reply marker.
pub struct EchoHandler;

impl Handler for EchoHandler {
    fn check(&self, envelope: &Envelope) -> Option<MatchLabel> {
        let target = envelope.reply_target()?;
        MatchLabel::when(
            envelope.plain_text().trim() == TRIGGER,
            format!("复读消息 {target}"),
        )
    }

    fn run(&self, ctx: Arc<DispatchContext>) -> HandlerFuture {
        echo(ctx).boxed()
    }
}

async fn echo(ctx: Arc<DispatchContext>) -> anyhow::Result<()> {
    let envelope = ctx.envelope();
    let Some(target) = envelope.reply_target() else {
        return Ok(());
    };

    match ctx.lookup(target, envelope.group_id(), None).await {
        Ok(original) => {
            debug!(target, content = %original.message, "Echoing archived message");
            ctx.reply(original.message.without_reply()).await?;
        }
        Err(e) if e.is_not_found() => {
            ctx.quote_reply(NOT_FOUND_TEXT).await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qqbot_core::{Bot, ChatScope, Message, Segment};
    use qqbot_framework::{DispatchOutcome, Dispatcher, HandlerRegistry, PendingStore};

    use crate::testing::{MockBot, SELF_ID, envelope};

    fn dispatcher() -> Dispatcher {
        let mut registry = HandlerRegistry::new();
        registry.register_plugin(&ECHO).unwrap();
        Dispatcher::new(Arc::new(registry), Arc::new(PendingStore::new()))
    }

    /// Archives `envelope`, then dispatches it.
    async fn arrive(
        dispatcher: &Dispatcher,
        bot: &Arc<MockBot>,
        envelope: Envelope,
    ) -> DispatchOutcome {
        bot.archive_message(&envelope).await.unwrap();
        dispatcher.dispatch(envelope, bot.clone()).await.unwrap()
    }

    #[tokio::test]
    async fn test_echoes_replied_message_in_direct_chat() {
        let bot = MockBot::new();
        let dispatcher = dispatcher();

        let original = envelope(100, ChatScope::Direct, Message::from_text("Original message"));
        bot.archive_message(&original).await.unwrap();

        let request = envelope(200, ChatScope::Direct, Message::new().reply(100).text("echo"));
        let outcome = arrive(&dispatcher, &bot, request).await;

        assert_eq!(
            outcome,
            DispatchOutcome::Handled {
                handler: "echo_message".into(),
                succeeded: true
            }
        );
        let sent = bot.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ChatScope::Direct);
        assert_eq!(sent[0].1.plain_text(), "Original message");
        assert_eq!(sent[0].1.reply_target(), None);
    }

    #[tokio::test]
    async fn test_group_echo_requires_mention_and_same_group() {
        let bot = MockBot::new();
        let dispatcher = dispatcher();
        let group = ChatScope::Group { group_id: 555 };

        arrive(&dispatcher, &bot, envelope(100, group, Message::from_text("hello"))).await;

        // without a mention the message is silent traffic
        let silent = envelope(200, group, Message::new().reply(100).text("echo"));
        assert!(matches!(
            arrive(&dispatcher, &bot, silent).await,
            DispatchOutcome::NoMatch { .. }
        ));

        let mentioned = envelope(
            201,
            group,
            Message::new().reply(100).at(SELF_ID).text(" echo "),
        );
        arrive(&dispatcher, &bot, mentioned).await;

        let from_elsewhere = envelope(
            202,
            ChatScope::Group { group_id: 556 },
            Message::new().reply(100).at(SELF_ID).text("echo"),
        );
        arrive(&dispatcher, &bot, from_elsewhere).await;

        let sent = bot.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, group);
        assert_eq!(sent[0].1.plain_text(), "hello");
        assert_eq!(sent[1].0, ChatScope::Group { group_id: 556 });
        assert_eq!(sent[1].1.plain_text(), NOT_FOUND_TEXT);
        assert_eq!(sent[1].1.reply_target(), Some(202));
    }

    #[tokio::test]
    async fn test_echo_keeps_rich_segments() {
        let bot = MockBot::new();
        let dispatcher = dispatcher();

        let original = Message::new()
            .text("look ")
            .segment(Segment::image("cat.png"))
            .face(14);
        bot.archive_message(&envelope(100, ChatScope::Direct, original.clone()))
            .await
            .unwrap();
        arrive(
            &dispatcher,
            &bot,
            envelope(200, ChatScope::Direct, Message::new().reply(100).text("echo")),
        )
        .await;

        let sent = bot.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, original);
    }

    #[test]
    fn test_check_needs_reply_marker_and_exact_text() {
        let handler = EchoHandler;
        let bare = envelope(1, ChatScope::Direct, Message::from_text("echo"));
        let other = envelope(2, ChatScope::Direct, Message::new().reply(9).text("echo this"));
        let good = envelope(3, ChatScope::Direct, Message::new().reply(9).text(" echo\n"));

        assert!(handler.check(&bare).is_none());
        assert!(handler.check(&other).is_none());
        assert_eq!(handler.check(&good).unwrap().as_str(), "复读消息 9");
    }
}
