//! Chat transport seam.
//!
//! The rest of the bridge talks to chat through [`ChatSender`], so the
//! notification and observability services can be exercised without a real
//! chat backend. [`BotApiSender`] is the production implementation speaking
//! the Bot API over HTTPS; [`RecordingSender`] captures messages for tests.

use async_trait::async_trait;
use serde::Deserialize;

use crate::routing::Destination;

/// Default total timeout for a chat send.
pub const DEFAULT_SEND_TIMEOUT_S: f64 = 5.0;

/// Chat send errors.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The chat refused us: bot removed from the chat, thread deleted, etc.
    /// Not retryable; surfaces as an admin alert.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Transport-level failure; retried implicitly on the next pass.
    #[error("HTTP error: {0}")]
    Http(String),
    /// Chat API rejected the request with a non-forbidden status.
    #[error("chat API status {status}: {description}")]
    Api { status: u16, description: String },
}

/// A destination-addressed message sink.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_message(&self, dest: Destination, text: &str) -> Result<(), SendError>;
}

#[derive(Debug, Deserialize)]
struct BotApiError {
    #[serde(default)]
    description: Option<String>,
}

/// Bot API transport over HTTPS.
pub struct BotApiSender {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl BotApiSender {
    pub fn new(api_base: &str, token: &str, timeout_s: f64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs_f64(timeout_s))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl ChatSender for BotApiSender {
    async fn send_message(&self, dest: Destination, text: &str) -> Result<(), SendError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);

        let mut body = serde_json::json!({
            "chat_id": dest.chat_id,
            "text": text,
        });
        if let Some(thread_id) = dest.thread_id {
            body["message_thread_id"] = serde_json::json!(thread_id);
        }

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SendError::Http(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let description = resp
            .json::<BotApiError>()
            .await
            .ok()
            .and_then(|e| e.description)
            .unwrap_or_else(|| status.to_string());

        if status.as_u16() == 403 {
            return Err(SendError::Forbidden(description));
        }
        Err(SendError::Api {
            status: status.as_u16(),
            description,
        })
    }
}

/// Test double: records every send, optionally failing specific chats.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: std::sync::Mutex<Vec<(Destination, String)>>,
    pub forbidden_chats: Vec<i64>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forbidden(chat_ids: Vec<i64>) -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            forbidden_chats: chat_ids,
        }
    }

    pub fn messages(&self) -> Vec<(Destination, String)> {
        self.sent.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatSender for RecordingSender {
    async fn send_message(&self, dest: Destination, text: &str) -> Result<(), SendError> {
        if self.forbidden_chats.contains(&dest.chat_id) {
            return Err(SendError::Forbidden("bot was kicked".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((dest, text.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_sender_captures_messages() {
        let sender = RecordingSender::new();
        sender
            .send_message(Destination::new(10, Some(2)), "hello")
            .await
            .unwrap();

        let sent = sender.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Destination::new(10, Some(2)));
        assert_eq!(sent[0].1, "hello");
    }

    #[tokio::test]
    async fn recording_sender_simulates_forbidden() {
        let sender = RecordingSender::with_forbidden(vec![10]);
        let err = sender
            .send_message(Destination::new(10, None), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Forbidden(_)));
        assert!(sender.messages().is_empty());
    }
}
