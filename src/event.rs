//! Event types flowing from sources through attribution into the counter

use serde::{Deserialize, Serialize};

/// A raw access event as produced by an [`crate::source::EventSource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// Keyspace notification: the source already resolved the key name
    KeyTouch { key: String },
    /// Command tap: the full command line (verb followed by arguments)
    Command { line: String },
}

impl RawEvent {
    pub fn key_touch(key: impl Into<String>) -> Self {
        RawEvent::KeyTouch { key: key.into() }
    }

    pub fn command(line: impl Into<String>) -> Self {
        RawEvent::Command { line: line.into() }
    }
}

/// A key and the weight it contributes to the key's score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributedEvent {
    pub key: String,
    /// Always at least 1
    pub weight: u64,
}

/// A message delivered by a pattern subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMessage {
    /// Message type (`pmessage`, `psubscribe`, ...)
    pub kind: String,
    pub pattern: String,
    pub channel: String,
    pub payload: String,
}

impl PubSubMessage {
    /// Build a pattern message (`pmessage`)
    pub fn pmessage(
        pattern: impl Into<String>,
        channel: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            kind: "pmessage".to_string(),
            pattern: pattern.into(),
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    pub fn is_pmessage(&self) -> bool {
        self.kind == "pmessage"
    }
}

/// A single command observed by a command tap
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorRecord {
    /// Server timestamp (seconds since epoch)
    pub time: f64,
    pub db: u32,
    pub client_address: String,
    /// Command verb and arguments joined by single spaces
    pub command: String,
}

impl MonitorRecord {
    /// Record with only the command field populated
    pub fn from_command(command: impl Into<String>) -> Self {
        Self {
            time: 0.0,
            db: 0,
            client_address: String::new(),
            command: command.into(),
        }
    }
}
