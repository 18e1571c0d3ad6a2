// Chat delivery: the chat API seam, the HTTP client behind it, and the
// per-channel fan-out.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat delivery is disabled (no API key configured)")]
    Disabled,

    #[error("request for channel {channel_id} failed: {source}")]
    Http {
        channel_id: String,
        source: reqwest::Error,
    },

    #[error("chat API returned status {status} for channel {channel_id}")]
    Status { channel_id: String, status: u16 },

    #[error("chat API response for channel {channel_id} had no message id")]
    MissingMessageId { channel_id: String },

    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

/// Identifier the chat API assigns to a posted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(pub String);

// ---------------------------------------------------------------------------
// Chat API seam
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<MessageId, ChatError>;
}

/// HTTP client for the community chat API.
pub struct WhopChatClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl WhopChatClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ChatError::Client)?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChatApi for WhopChatClient {
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<MessageId, ChatError> {
        let body = serde_json::json!({
            "channel_id": channel_id,
            "content": text,
        });

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| ChatError::Http {
                channel_id: channel_id.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Status {
                channel_id: channel_id.to_string(),
                status: status.as_u16(),
            });
        }

        let payload: Value = response.json().await.map_err(|source| ChatError::Http {
            channel_id: channel_id.to_string(),
            source,
        })?;
        parse_message_id(&payload).ok_or_else(|| ChatError::MissingMessageId {
            channel_id: channel_id.to_string(),
        })
    }
}

/// Either a configured chat client or a disabled stand-in.
pub enum ChatClient {
    Active(WhopChatClient),
    /// No API key configured; every post fails with [`ChatError::Disabled`].
    Disabled,
}

impl ChatClient {
    /// Returns `Active` when an API key is present in credentials.
    pub fn from_config(config: &Config) -> Result<Self, ChatError> {
        match &config.credentials.chat_api_key {
            Some(key) if !key.is_empty() => Ok(ChatClient::Active(WhopChatClient::new(
                key.clone(),
                config.chat.api_base_url.clone(),
                Duration::from_secs(config.chat.request_timeout_secs),
            )?)),
            _ => Ok(ChatClient::Disabled),
        }
    }
}

#[async_trait]
impl ChatApi for ChatClient {
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<MessageId, ChatError> {
        match self {
            ChatClient::Active(client) => client.post_message(channel_id, text).await,
            ChatClient::Disabled => Err(ChatError::Disabled),
        }
    }
}

/// Accepts `{ "id": "..." }` or `{ "data": { "id": "..." } }`.
pub(crate) fn parse_message_id(payload: &Value) -> Option<MessageId> {
    payload
        .get("id")
        .or_else(|| payload.get("data")?.get("id"))
        .and_then(Value::as_str)
        .map(|id| MessageId(id.to_string()))
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Per-channel outcome of one dispatch.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: Vec<(String, MessageId)>,
    pub failed: Vec<(String, ChatError)>,
}

impl DispatchReport {
    pub fn all_failed(&self) -> bool {
        self.delivered.is_empty() && !self.failed.is_empty()
    }
}

/// Post `text` to every channel. Channels are attempted independently; a
/// failure on one is logged and recorded without affecting the others.
pub async fn dispatch(chat: &dyn ChatApi, channel_ids: &[String], text: &str) -> DispatchReport {
    let attempts = channel_ids.iter().map(|channel_id| async move {
        (channel_id.clone(), chat.post_message(channel_id, text).await)
    });

    let mut report = DispatchReport::default();
    for (channel_id, result) in join_all(attempts).await {
        match result {
            Ok(message_id) => {
                debug!(channel_id = %channel_id, message_id = %message_id.0, "message delivered");
                report.delivered.push((channel_id, message_id));
            }
            Err(e) => {
                warn!(channel_id = %channel_id, "chat delivery failed: {e}");
                report.failed.push((channel_id, e));
            }
        }
    }
    report
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
