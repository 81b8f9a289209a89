//! Gateway HTTP client.
//!
//! Every gateway action is a `POST {base_url}/{action}` with a JSON body.
//! The gateway answers with an envelope of the form
//! `{"status": "ok", "retcode": 0, "data": ...}`; anything but `ok` is an
//! [`TransportError::Api`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::Value;
use tracing::{trace, warn};

use qqbot_core::{GatewayApi, TransportError, TransportResult};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How failed gateway calls are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. `0` is treated as `1`.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Response envelope returned by every gateway action.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    retcode: i64,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: String,
    #[serde(default)]
    wording: String,
}

impl ApiResponse {
    fn into_result(self, action: &str) -> TransportResult<Value> {
        if self.status == "ok" {
            return Ok(self.data);
        }
        let message = if self.message.is_empty() {
            self.wording
        } else {
            self.message
        };
        Err(TransportError::Api {
            action: action.to_string(),
            status: self.status,
            retcode: self.retcode,
            message,
        })
    }
}

/// [`GatewayApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
    retry: RetryPolicy,
}

impl GatewayClient {
    /// Creates a client for `base_url` with [`DEFAULT_TIMEOUT`].
    pub fn new(base_url: impl Into<String>) -> TransportResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Creates a client with a custom per-request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> TransportResult<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Io(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: None,
            retry: RetryPolicy::default(),
        })
    }

    /// Sends `token` as a bearer token on every request.
    pub fn access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Replaces the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The gateway base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}", self.base_url, action.trim_start_matches('/'))
    }

    async fn post_once(&self, action: &str, params: &Value) -> TransportResult<Value> {
        let url = self.endpoint(action);
        trace!(action, url = %url, "Calling gateway");

        let mut request = self.client.post(&url).json(params);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Io(format!(
                "HTTP {} error: {}",
                status.as_u16(),
                text
            )));
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        body.into_result(action)
    }
}

fn is_retryable(err: &TransportError) -> bool {
    !matches!(
        err,
        TransportError::Decode(_) | TransportError::NotAvailable { .. }
    )
}

#[async_trait]
impl GatewayApi for GatewayClient {
    async fn call(&self, action: &str, params: Value) -> TransportResult<Value> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.post_once(action, &params).await {
                Err(e) if attempt < attempts && is_retryable(&e) => {
                    warn!(action, attempt, error = %e, "Gateway request failed, retrying");
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
