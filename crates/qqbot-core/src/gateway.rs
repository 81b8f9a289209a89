//! The chat gateway API.
//!
//! [`GatewayApi::call`] is the only required method; the typed helpers are
//! thin wrappers that build the parameters and decode `data`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{TransportError, TransportResult};
use crate::message::Message;

// ============================================================================
// Response types
// ============================================================================

/// Result of `get_login_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginInfo {
    /// The bot's QQ number.
    pub user_id: i64,
    /// The bot's nickname.
    #[serde(default)]
    pub nickname: String,
}

/// A QQ user as known to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// QQ number.
    pub user_id: i64,
    /// Nickname.
    #[serde(default)]
    pub nickname: String,
    /// Friend remark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    /// Group card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<String>,
}

impl std::fmt::Display for Person {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let extra = self
            .card
            .as_deref()
            .filter(|c| !c.is_empty())
            .or_else(|| self.remark.as_deref().filter(|r| !r.is_empty()));
        match extra {
            Some(extra) => write!(f, "{}({})", self.nickname, extra),
            None => write!(f, "{}", self.nickname),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

// ============================================================================
// GatewayApi
// ============================================================================

/// A connection to the chat gateway's HTTP API.
#[async_trait]
pub trait GatewayApi: Send + Sync + 'static {
    /// Calls `action` with `params` and returns the response's `data` field.
    ///
    /// Implementations retry transient failures themselves and only return
    /// an error once they give up.
    async fn call(&self, action: &str, params: Value) -> TransportResult<Value>;

    /// Sends a private message and returns its message id.
    async fn send_private_msg(&self, user_id: i64, message: &Message) -> TransportResult<i64> {
        let data = self
            .call(
                "send_private_msg",
                json!({"user_id": user_id, "message": message}),
            )
            .await?;
        Ok(decode::<SentMessage>(data)?.message_id)
    }

    /// Sends a group message and returns its message id.
    async fn send_group_msg(&self, group_id: i64, message: &Message) -> TransportResult<i64> {
        let data = self
            .call(
                "send_group_msg",
                json!({"group_id": group_id, "message": message}),
            )
            .await?;
        Ok(decode::<SentMessage>(data)?.message_id)
    }

    /// Fetches the bot's own identity.
    async fn get_login_info(&self) -> TransportResult<LoginInfo> {
        decode(self.call("get_login_info", json!({})).await?)
    }

    /// Fetches the bot's friend list.
    async fn get_friend_list(&self) -> TransportResult<Vec<Person>> {
        decode(self.call("get_friend_list", json!({})).await?)
    }

    /// Fetches a message from the gateway's own history (raw event shape).
    async fn get_msg(&self, message_id: i64) -> TransportResult<Value> {
        self.call("get_msg", json!({"message_id": message_id})).await
    }

    /// Fetches public profile information for any user.
    async fn get_stranger_info(&self, user_id: i64) -> TransportResult<Person> {
        decode(
            self.call("get_stranger_info", json!({"user_id": user_id}))
                .await?,
        )
    }
}

/// Shared gateway connection.
pub type BoxedGateway = Arc<dyn GatewayApi>;

fn decode<T: DeserializeOwned>(data: Value) -> TransportResult<T> {
    serde_json::from_value(data).map_err(|e| TransportError::Decode(e.to_string()))
}
