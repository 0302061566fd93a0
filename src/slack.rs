//! Chat platform boundary.
//!
//! Outbound: the `ChatPlatform` trait, implemented for the Slack Web API
//! with bearer auth and `ok`/`error` envelope decoding. Inbound: the
//! transport delivers `ChatEvent` values over an mpsc channel; a JSON-lines
//! stdin bridge is the built-in transport so the event loop stays decoupled
//! from any particular Slack SDK.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::digest::MessageRef;
use crate::error::BotError;
use crate::render::Block;
use crate::retry::{retry_with_backoff, RetryPolicy};

const SLACK_API_BASE: &str = "https://slack.com/api";

// ============================================================================
// Inbound events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestAction {
    Approve,
    Edit,
    Dismiss,
}

/// One inbound event from the chat transport, already reduced to the fields
/// the handlers need.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A reviewer pressed one of the digest action buttons.
    Action {
        action: DigestAction,
        digest_id: String,
        channel: String,
        message_ts: String,
        /// Present on button presses; required only to open the edit modal.
        #[serde(default)]
        trigger_id: Option<String>,
        user: String,
    },
    /// A reviewer submitted the edit modal.
    EditSubmitted {
        digest_id: String,
        text: String,
        user: String,
    },
    /// Someone asked for an on-demand digest generation.
    ManualTrigger { user: String, channel: String },
}

/// Bridge JSON-lines on stdin into the event channel. Malformed lines are
/// logged and skipped; EOF ends the task.
pub fn spawn_stdin_events(tx: mpsc::Sender<ChatEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ChatEvent>(line) {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                log::warn!("Event channel closed, stopping stdin bridge");
                                return;
                            }
                        }
                        Err(e) => log::warn!("Ignoring malformed event line: {}", e),
                    }
                }
                Ok(None) => {
                    log::info!("Stdin closed, stopping event bridge");
                    return;
                }
                Err(e) => {
                    log::error!("Failed to read stdin: {}", e);
                    return;
                }
            }
        }
    })
}

// ============================================================================
// Outbound platform
// ============================================================================

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        blocks: &[Block],
    ) -> Result<MessageRef, BotError>;

    async fn update_message(
        &self,
        message: &MessageRef,
        text: &str,
        blocks: &[Block],
    ) -> Result<(), BotError>;

    async fn post_ephemeral(&self, channel: &str, user: &str, text: &str)
        -> Result<(), BotError>;

    async fn open_modal(&self, trigger_id: &str, view: Value) -> Result<(), BotError>;
}

pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    retry: RetryPolicy,
}

impl SlackClient {
    pub fn new(token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            retry: RetryPolicy::default(),
        }
    }

    async fn call(&self, method: &str, payload: Value) -> Result<Value, BotError> {
        let url = format!("{}/{}", SLACK_API_BASE, method);

        let response = retry_with_backoff(&self.retry, BotError::is_rate_limit, || {
            let request = self
                .http
                .post(&url)
                .bearer_auth(&self.token)
                .json(&payload);
            async move {
                let response = request.send().await?;
                if response.status().as_u16() == 429 {
                    return Err(BotError::RateLimited);
                }
                let body: Value = response.json().await?;
                Ok(body)
            }
        })
        .await?;

        decode_envelope(method, response)
    }
}

/// Slack wraps every response in `{ "ok": bool, ... }`; a transport-level
/// 200 can still carry an API error.
fn decode_envelope(method: &str, body: Value) -> Result<Value, BotError> {
    if body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        Ok(body)
    } else {
        let error = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        Err(BotError::ChatPlatform(format!("{} failed: {}", method, error)))
    }
}

fn message_ref_from(channel: &str, body: &Value) -> Result<MessageRef, BotError> {
    let ts = body
        .get("ts")
        .and_then(Value::as_str)
        .ok_or_else(|| BotError::ChatPlatform("response missing message ts".to_string()))?;
    Ok(MessageRef {
        channel: body
            .get("channel")
            .and_then(Value::as_str)
            .unwrap_or(channel)
            .to_string(),
        ts: ts.to_string(),
    })
}

#[async_trait]
impl ChatPlatform for SlackClient {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        blocks: &[Block],
    ) -> Result<MessageRef, BotError> {
        let body = self
            .call(
                "chat.postMessage",
                json!({
                    "channel": channel,
                    "text": text,
                    "blocks": blocks,
                }),
            )
            .await?;
        message_ref_from(channel, &body)
    }

    async fn update_message(
        &self,
        message: &MessageRef,
        text: &str,
        blocks: &[Block],
    ) -> Result<(), BotError> {
        self.call(
            "chat.update",
            json!({
                "channel": message.channel,
                "ts": message.ts,
                "text": text,
                "blocks": blocks,
            }),
        )
        .await?;
        Ok(())
    }

    async fn post_ephemeral(
        &self,
        channel: &str,
        user: &str,
        text: &str,
    ) -> Result<(), BotError> {
        self.call(
            "chat.postEphemeral",
            json!({ "channel": channel, "user": user, "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn open_modal(&self, trigger_id: &str, view: Value) -> Result<(), BotError> {
        self.call(
            "views.open",
            json!({ "trigger_id": trigger_id, "view": view }),
        )
        .await?;
        Ok(())
    }
}
