//! Test doubles shared by the runtime's unit tests.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use qqbot_core::{Envelope, GatewayApi, TransportError, TransportResult};

pub(crate) const SELF_ID: i64 = 10000;

/// A gateway that answers from canned data and records every call.
pub(crate) struct FakeGateway {
    calls: Mutex<Vec<(String, Value)>>,
    next_id: AtomicI64,
    offline: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(5000),
            offline: AtomicBool::new(false),
        }
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    /// Parameters of every send, in order.
    pub fn sends(&self) -> Vec<(String, Value)> {
        self.calls()
            .into_iter()
            .filter(|(action, _)| action.starts_with("send_"))
            .collect()
    }
}

#[async_trait]
impl GatewayApi for FakeGateway {
    async fn call(&self, action: &str, params: Value) -> TransportResult<Value> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed {
                url: format!("http://gateway.test/{action}"),
                reason: "connection refused".into(),
            });
        }
        self.calls.lock().push((action.to_string(), params.clone()));

        match action {
            "send_private_msg" | "send_group_msg" => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"message_id": id}))
            }
            "get_login_info" => Ok(json!({"user_id": SELF_ID, "nickname": "小助手"})),
            "get_friend_list" => Ok(json!([
                {"user_id": 20000, "nickname": "alice", "remark": "A"},
                {"user_id": 20001, "nickname": "bob", "remark": ""}
            ])),
            "get_stranger_info" => Ok(json!({
                "user_id": params["user_id"],
                "nickname": "stranger"
            })),
            _ => Err(TransportError::Api {
                action: action.to_string(),
                status: "failed".into(),
                retcode: 1404,
                message: "unsupported".into(),
            }),
        }
    }
}

/// A raw private message event as the gateway posts it.
pub(crate) fn private_event(message_id: i64, user_id: i64, message: Value) -> Value {
    json!({
        "post_type": "message",
        "message_type": "private",
        "self_id": SELF_ID,
        "time": 1700000000,
        "message_id": message_id,
        "message_seq": message_id,
        "user_id": user_id,
        "sender": {"user_id": user_id, "nickname": "alice"},
        "message": message
    })
}

/// A raw group message event.
pub(crate) fn group_event(message_id: i64, group_id: i64, user_id: i64, message: Value) -> Value {
    json!({
        "post_type": "message",
        "message_type": "group",
        "self_id": SELF_ID,
        "time": 1700000000,
        "message_id": message_id,
        "message_seq": message_id,
        "group_id": group_id,
        "user_id": user_id,
        "sender": {"user_id": user_id, "nickname": "alice", "card": ""},
        "message": message
    })
}

/// A parsed direct text message from `user_id`.
pub(crate) fn direct(message_id: i64, user_id: i64, text: &str) -> Envelope {
    Envelope::parse(&private_event(message_id, user_id, json!(text))).unwrap()
}
