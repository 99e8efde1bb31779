// ABOUTME: Raw platform events and the filter that picks out genuine text messages
// ABOUTME: Presence pings, reactions, and partial events are dropped without error

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tag carried by text message events
pub const MESSAGE_TYPE: &str = "message";

/// An arbitrary event object delivered by the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformEvent(Map<String, Value>);

impl PlatformEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter, mostly for adapters and tests
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Wrap a JSON value; only objects are events
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The `type` tag, when present
    pub fn kind(&self) -> Option<&str> {
        self.get_str("type")
    }
}

impl From<Map<String, Value>> for PlatformEvent {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A message event that passed the filter, still carrying raw ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: String,
    pub channel_id: String,
    /// Text after whitespace cleanup
    pub text: String,
}

/// Classifies raw events; only complete, non-empty text messages pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct InboundFilter;

impl InboundFilter {
    pub fn new() -> Self {
        Self
    }

    /// True iff the event has `type`, `channel`, `text`, and `user`, is a
    /// message, and its text is non-empty.
    pub fn accept(&self, event: &PlatformEvent) -> bool {
        let complete = ["type", "channel", "text", "user"]
            .iter()
            .all(|key| event.contains(key));
        if !complete || event.kind() != Some(MESSAGE_TYPE) {
            return false;
        }
        matches!(event.get_str("text"), Some(text) if !text.is_empty())
    }

    /// Accept the event and pull out its addressing and cleaned text.
    pub fn extract(&self, event: &PlatformEvent) -> Option<InboundMessage> {
        if !self.accept(event) {
            return None;
        }
        let user_id = event.get_str("user")?;
        let channel_id = event.get_str("channel")?;
        let text = event.get_str("text")?;
        Some(InboundMessage {
            user_id: user_id.to_string(),
            channel_id: channel_id.to_string(),
            text: clean_text(text),
        })
    }
}

/// Collapse whitespace runs inside each line and trim it, keeping line breaks.
pub fn clean_text(text: &str) -> String {
    text.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}
