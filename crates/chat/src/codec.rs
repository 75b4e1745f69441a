//! Chat message wire format: `{username, message, timestamp}`.

use chrono::{DateTime, Local, NaiveTime};
use serde::{Deserialize, Serialize};

/// Local time of day, second precision.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// An outgoing chat line.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    username: String,
    text: String,
    sent_at: DateTime<Local>,
}

impl ChatMessage {
    pub fn new(username: impl Into<String>, text: impl Into<String>, sent_at: DateTime<Local>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
            sent_at,
        }
    }

    /// Stamp with the current local time.
    pub fn now(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(username, text, Local::now())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sent_at(&self) -> DateTime<Local> {
        self.sent_at
    }
}

/// The record exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    pub username: String,
    pub message: String,
    pub timestamp: String,
}

/// A decoded inbound chat line. Missing or non-string fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub username: String,
    pub text: String,
    pub timestamp: String,
}

impl ReceivedMessage {
    /// Parsed time of day, if the timestamp is well-formed.
    pub fn sent_at(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT).ok()
    }
}

pub fn encode(msg: &ChatMessage) -> WireRecord {
    WireRecord {
        username: msg.username.clone(),
        message: msg.text.clone(),
        timestamp: msg.sent_at.format(TIMESTAMP_FORMAT).to_string(),
    }
}

/// Decode an inbound payload. Never fails on a JSON object: absent or
/// wrong-typed fields become empty strings. Non-object payloads yield `None`.
pub fn decode(payload: &serde_json::Value) -> Option<ReceivedMessage> {
    let obj = payload.as_object()?;
    let field = |name: &str| match obj.get(name).and_then(serde_json::Value::as_str) {
        Some(s) => s.to_string(),
        None => {
            tracing::debug!(field = name, "Inbound record field missing or not a string");
            String::new()
        }
    };
    Some(ReceivedMessage {
        username: field("username"),
        text: field("message"),
        timestamp: field("timestamp"),
    })
}
