// chat-service-rs/src/message_log.rs
//
// Outward-facing chat messages and the append-only message-log seam.
// The durable, ordered per-user log lives in an external collaborator; this
// core only authors entries and appends them through the trait below. Entries
// are never mutated or deleted here - retention is the log's concern.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Who authored a logged message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    /// Tolerant mapping from wire strings. Clients that already hold history
    /// in backend form send `model` for bot turns; treat it as an alias.
    pub fn from_wire(raw: &str) -> Sender {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bot" | "model" => Sender::Bot,
            _ => Sender::User,
        }
    }
}

/// One persisted chat entry, as the external log stores it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
            timestamp: Utc::now(),
            author_name: None,
            author_photo: None,
            attachment_url: None,
        }
    }

    pub fn bot_text(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            ..Self::user_text(text)
        }
    }

    pub fn with_attachment(mut self, url: impl Into<String>) -> Self {
        self.attachment_url = Some(url.into());
        self
    }
}

/// Append-only message log collaborator.
///
/// The conversation endpoint appends exactly one user entry per turn and,
/// on success only, exactly one bot entry.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn append(&self, message: ChatMessage);
}

/// In-process log used as the default seam implementation and by the tests.
#[derive(Default)]
pub struct InMemoryMessageLog {
    entries: RwLock<Vec<ChatMessage>>,
}

impl InMemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<ChatMessage> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn append(&self, message: ChatMessage) {
        self.entries.write().await.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_from_wire() {
        assert_eq!(Sender::from_wire("user"), Sender::User);
        assert_eq!(Sender::from_wire("bot"), Sender::Bot);
        assert_eq!(Sender::from_wire("model"), Sender::Bot);
        assert_eq!(Sender::from_wire(" USER "), Sender::User);
        // Unknown senders are treated as the user side
        assert_eq!(Sender::from_wire("system"), Sender::User);
    }

    #[tokio::test]
    async fn test_in_memory_log_appends_in_order() {
        let log = InMemoryMessageLog::new();
        log.append(ChatMessage::user_text("one")).await;
        log.append(ChatMessage::bot_text("two")).await;

        let entries = log.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "one");
        assert_eq!(entries[0].sender, Sender::User);
        assert_eq!(entries[1].sender, Sender::Bot);
    }

    #[test]
    fn test_chat_message_wire_shape() {
        let msg = ChatMessage::user_text("see attached").with_attachment("https://store/doc.pdf");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["sender"], "user");
        assert_eq!(json["attachmentUrl"], "https://store/doc.pdf");
        // Unset author fields stay off the wire
        assert!(json.get("authorName").is_none());
    }
}
