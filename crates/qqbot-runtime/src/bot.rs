//! The concrete bot.
//!
//! [`QQBot`] is the [`Bot`] the runtime hands to the dispatcher. It owns the
//! gateway connection and the message archive, and caches the account's
//! identity and friend list fetched at startup.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use qqbot_core::{
    ArchiveResult, Bot, BoxedArchive, BoxedGateway, Envelope, LoginInfo, Message, Person,
    TransportResult,
};

/// The logged-in QQ account.
pub struct QQBot {
    identity: LoginInfo,
    gateway: BoxedGateway,
    archive: BoxedArchive,
    friends: RwLock<HashMap<i64, Person>>,
}

impl QQBot {
    /// Creates a bot with a known identity and an empty friend cache.
    pub fn new(identity: LoginInfo, gateway: BoxedGateway, archive: BoxedArchive) -> Self {
        Self {
            identity,
            gateway,
            archive,
            friends: RwLock::new(HashMap::new()),
        }
    }

    /// Logs in through the gateway: fetches the account identity, then the
    /// friend list.
    ///
    /// Only a failed identity lookup is fatal; a failed friend list is
    /// logged and leaves the cache empty.
    pub async fn connect(gateway: BoxedGateway, archive: BoxedArchive) -> TransportResult<Self> {
        let identity = Self::login(&gateway).await?;
        Ok(Self::logged_in(identity, gateway, archive).await)
    }

    /// Fetches the account identity.
    pub async fn login(gateway: &BoxedGateway) -> TransportResult<LoginInfo> {
        let identity = gateway.get_login_info().await?;
        info!(
            self_id = identity.user_id,
            nickname = %identity.nickname,
            "Bot logged in"
        );
        Ok(identity)
    }

    /// Creates the bot for an identity obtained with [`QQBot::login`] and
    /// fills the friend cache.
    pub async fn logged_in(
        identity: LoginInfo,
        gateway: BoxedGateway,
        archive: BoxedArchive,
    ) -> Self {
        let bot = Self::new(identity, gateway, archive);
        if let Err(e) = bot.refresh_friends().await {
            warn!(error = %e, "Failed to fetch friend list");
        }
        bot
    }

    /// Re-fetches the friend list, returning the number of friends.
    pub async fn refresh_friends(&self) -> TransportResult<usize> {
        let friends = self.gateway.get_friend_list().await?;
        let count = friends.len();
        *self.friends.write() = friends.into_iter().map(|p| (p.user_id, p)).collect();
        debug!(count, "Friend list refreshed");
        Ok(count)
    }

    /// A cached friend.
    pub fn friend(&self, user_id: i64) -> Option<Person> {
        self.friends.read().get(&user_id).cloned()
    }

    /// Every cached friend, sorted by QQ number.
    pub fn friends(&self) -> Vec<Person> {
        let mut friends: Vec<_> = self.friends.read().values().cloned().collect();
        friends.sort_by_key(|p| p.user_id);
        friends
    }

    /// Profile of any user: the friend cache first, then the gateway.
    pub async fn user_info(&self, user_id: i64) -> TransportResult<Person> {
        if let Some(friend) = self.friend(user_id) {
            return Ok(friend);
        }
        self.gateway.get_stranger_info(user_id).await
    }

    /// The account identity.
    pub fn identity(&self) -> &LoginInfo {
        &self.identity
    }

    /// The gateway connection.
    pub fn gateway(&self) -> &BoxedGateway {
        &self.gateway
    }

    /// The message archive.
    pub fn archive(&self) -> &BoxedArchive {
        &self.archive
    }
}

#[async_trait]
impl Bot for QQBot {
    fn self_id(&self) -> i64 {
        self.identity.user_id
    }

    fn nickname(&self) -> &str {
        &self.identity.nickname
    }

    async fn send_direct(&self, user_id: i64, message: Message) -> TransportResult<i64> {
        let message_id = self.gateway.send_private_msg(user_id, &message).await?;
        debug!(user_id, message_id, content = %message, "Sent direct message");
        Ok(message_id)
    }

    async fn send_group(&self, group_id: i64, message: Message) -> TransportResult<i64> {
        let message_id = self.gateway.send_group_msg(group_id, &message).await?;
        debug!(group_id, message_id, content = %message, "Sent group message");
        Ok(message_id)
    }

    async fn archive_message(&self, envelope: &Envelope) -> ArchiveResult<()> {
        self.archive.archive(envelope).await
    }

    async fn lookup_archived_message(
        &self,
        message_id: i64,
        group: Option<i64>,
        sender: Option<i64>,
    ) -> ArchiveResult<Envelope> {
        self.archive.fetch(message_id, group, sender).await
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl std::fmt::Debug for QQBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QQBot")
            .field("self_id", &self.identity.user_id)
            .field("nickname", &self.identity.nickname)
            .field("friends", &self.friends.read().len())
            .finish()
    }
}
