use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::TelegramConfig;
use crate::error::{Result, SyncError};
use crate::routing::Kind;

/// One item from `getUpdates`. Fields other than the four recognized
/// message kinds are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub channel_post: Option<Post>,
    #[serde(default)]
    pub edited_channel_post: Option<Post>,
    #[serde(default)]
    pub message: Option<Post>,
    #[serde(default)]
    pub edited_message: Option<Post>,
}

impl Update {
    pub fn post(&self, kind: Kind) -> Option<&Post> {
        match kind {
            Kind::ChannelPost => self.channel_post.as_ref(),
            Kind::EditedChannelPost => self.edited_channel_post.as_ref(),
            Kind::Message => self.message.as_ref(),
            Kind::EditedMessage => self.edited_message.as_ref(),
        }
    }
}

/// A message payload kept as raw JSON, with its destination id pulled out
/// once at deserialization time.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub chat_id: Option<i64>,
    body: Value,
}

impl Post {
    /// Compact JSON with sorted object keys, so identical payloads always
    /// produce identical bytes.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.body)
            .map_err(|e| SyncError::Protocol(format!("Failed to re-serialize message: {}", e)))
    }
}

impl<'de> Deserialize<'de> for Post {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let body = Value::deserialize(deserializer)?;
        let chat_id = body
            .get("chat")
            .and_then(|chat| chat.get("id"))
            .and_then(parse_chat_id);
        Ok(Post { chat_id, body })
    }
}

fn parse_chat_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(num) => num.as_i64(),
        Value::String(text) => text.parse::<i64>().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Option<Vec<Update>>,
    #[serde(default)]
    description: Option<String>,
}

/// Source of updates strictly after a given offset.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>>;
}

/// Long-polling `getUpdates` client
pub struct TelegramPoller {
    client: reqwest::Client,
    api_url: String,
    bot_token: String,
    poll_timeout_secs: u64,
}

impl TelegramPoller {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }
}

#[async_trait]
impl UpdateSource for TelegramPoller {
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        // The token is part of the path; never let it reach a log line.
        let url = format!("{}/bot{}/getUpdates", self.api_url, self.bot_token);

        debug!("Polling getUpdates with offset {}", offset);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("timeout", self.poll_timeout_secs.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("getUpdates request failed: {}", e.without_url())))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Transport(format!("Failed to read getUpdates body: {}", e.without_url())))?;

        decode_updates(status, &body)
    }
}

/// Turn one `getUpdates` HTTP response into its ordered updates.
pub fn decode_updates(status: StatusCode, body: &str) -> Result<Vec<Update>> {
    if !status.is_success() {
        return Err(SyncError::Transport(format!(
            "getUpdates failed with HTTP {}",
            status.as_u16()
        )));
    }

    let payload: UpdatesResponse = serde_json::from_str(body)
        .map_err(|e| SyncError::Protocol(format!("Malformed getUpdates response: {}", e)))?;

    if !payload.ok {
        return Err(SyncError::Transport(format!(
            "Telegram getUpdates returned failure: {}",
            payload.description.as_deref().unwrap_or("no description")
        )));
    }

    payload
        .result
        .ok_or_else(|| SyncError::Protocol("getUpdates response has no result".to_string()))
}
