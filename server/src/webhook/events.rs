//! Inbound Event Model & Parser
//!
//! Normalizes the nested `entry[].changes[].value` notification payload into
//! flat sequences of message, status and error records.
//!
//! Parsing never fails: any element with an unexpected shape is dropped and
//! the rest of the payload is still processed.

use serde::Serialize;
use serde_json::Value;

use crate::config::WHATSAPP_OBJECT;

/// Change field carrying messages, statuses and errors.
pub const MESSAGES_FIELD: &str = "messages";

/// Read a string field, accepting JSON numbers as their decimal form.
fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read an array field, treating anything else as empty.
fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Top-level notification.
#[derive(Debug, Clone, Default)]
pub struct InboundEvent {
    /// Object discriminator (`whatsapp_business_account` for this platform)
    pub object: Option<String>,
    pub entries: Vec<Entry>,
}

/// Account-level grouping of changes.
#[derive(Debug, Clone, Default)]
pub struct Entry {
    pub id: Option<String>,
    pub changes: Vec<Change>,
}

/// A typed delta within an entry.
#[derive(Debug, Clone, Default)]
pub struct Change {
    pub field: Option<String>,
    pub value: ChangeValue,
}

/// Payload of a change. Elements are kept raw until record extraction.
#[derive(Debug, Clone, Default)]
pub struct ChangeValue {
    /// Business phone number the change was delivered for
    pub phone_number_id: Option<String>,
    pub messages: Vec<Value>,
    pub statuses: Vec<Value>,
    pub errors: Vec<Value>,
}

impl InboundEvent {
    /// Build the event from decoded JSON, degrading to empty sequences.
    pub fn from_value(payload: &Value) -> Self {
        let entries = array_field(payload, "entry")
            .iter()
            .filter(|e| e.is_object())
            .map(Entry::from_value)
            .collect();

        Self {
            object: str_field(payload, "object"),
            entries,
        }
    }

    /// Whether the object discriminator matches this platform.
    pub fn is_expected_object(&self) -> bool {
        self.object.as_deref() == Some(WHATSAPP_OBJECT)
    }
}

impl Entry {
    fn from_value(entry: &Value) -> Self {
        let changes = array_field(entry, "changes")
            .iter()
            .filter(|c| c.is_object())
            .map(Change::from_value)
            .collect();

        Self {
            id: str_field(entry, "id"),
            changes,
        }
    }
}

impl Change {
    fn from_value(change: &Value) -> Self {
        let value = change.get("value").unwrap_or(&Value::Null);
        Self {
            field: str_field(change, "field"),
            value: ChangeValue {
                phone_number_id: value
                    .get("metadata")
                    .and_then(|m| str_field(m, "phone_number_id")),
                messages: array_field(value, "messages").to_vec(),
                statuses: array_field(value, "statuses").to_vec(),
                errors: array_field(value, "errors").to_vec(),
            },
        }
    }

    pub fn is_messages(&self) -> bool {
        self.field.as_deref() == Some(MESSAGES_FIELD)
    }
}

/// Message type discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Button,
    Interactive,
    Image,
    Audio,
    Document,
    /// Any other platform type (sticker, location, reaction, ...)
    Other(String),
}

impl MessageKind {
    pub fn parse_str(s: &str) -> Self {
        match s {
            "text" => Self::Text,
            "button" => Self::Button,
            "interactive" => Self::Interactive,
            "image" => Self::Image,
            "audio" => Self::Audio,
            "document" => Self::Document,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Button => "button",
            Self::Interactive => "interactive",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Other(s) => s,
        }
    }

    /// Media types whose content marker is the type name itself.
    pub const fn is_media(&self) -> bool {
        matches!(self, Self::Image | Self::Audio | Self::Document)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a record inside the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordSource {
    pub entry: usize,
    pub change: usize,
}

/// A single inbound message.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// Platform message id (dedup key)
    pub id: Option<String>,
    /// Sender id, required to reply
    pub from: Option<String>,
    pub kind: MessageKind,
    /// Origin-side issuance time, seconds since epoch (as sent)
    pub timestamp: Option<String>,
    /// Display text as extracted, not normalized
    pub text: String,
    pub source: RecordSource,
    /// Original message object, kept for persistence
    pub raw: Value,
}

impl MessageRecord {
    fn from_value(raw: &Value, source: RecordSource) -> Self {
        let kind = str_field(raw, "type").map_or_else(
            || MessageKind::Other(String::new()),
            |t| MessageKind::parse_str(&t),
        );
        let text = display_text(&kind, raw);

        Self {
            id: str_field(raw, "id"),
            from: str_field(raw, "from"),
            kind,
            timestamp: str_field(raw, "timestamp"),
            text,
            source,
            raw: raw.clone(),
        }
    }
}

/// Type-dependent display text of a raw message.
fn display_text(kind: &MessageKind, raw: &Value) -> String {
    let text = match kind {
        MessageKind::Text => raw.pointer("/text/body"),
        MessageKind::Button => raw.pointer("/button/text"),
        MessageKind::Interactive => {
            match raw.pointer("/interactive/type").and_then(Value::as_str) {
                Some("button_reply") => raw.pointer("/interactive/button_reply/title"),
                Some("list_reply") => raw.pointer("/interactive/list_reply/title"),
                _ => None,
            }
        }
        k if k.is_media() => return k.as_str().to_string(),
        _ => None,
    };

    text.and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Error object attached to a change or a status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub code: Option<i64>,
    pub title: Option<String>,
    pub message: Option<String>,
}

impl ErrorRecord {
    fn from_value(raw: &Value) -> Self {
        Self {
            code: raw.get("code").and_then(Value::as_i64),
            title: str_field(raw, "title"),
            message: str_field(raw, "message"),
        }
    }
}

/// Delivery status of a previously sent message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    pub id: Option<String>,
    /// sent, delivered, read, failed
    pub status: Option<String>,
    pub recipient_id: Option<String>,
    pub timestamp: Option<String>,
    pub errors: Vec<ErrorRecord>,
}

impl StatusRecord {
    fn from_value(raw: &Value) -> Self {
        Self {
            id: str_field(raw, "id"),
            status: str_field(raw, "status"),
            recipient_id: str_field(raw, "recipient_id"),
            timestamp: str_field(raw, "timestamp"),
            errors: array_field(raw, "errors")
                .iter()
                .filter(|e| e.is_object())
                .map(ErrorRecord::from_value)
                .collect(),
        }
    }
}

/// Flattened records of one notification.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    pub messages: Vec<MessageRecord>,
    pub statuses: Vec<StatusRecord>,
    pub errors: Vec<ErrorRecord>,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.statuses.is_empty() && self.errors.is_empty()
    }
}

/// Walk every entry and change and collect their records.
///
/// Messages are only taken from `messages` changes; statuses and errors are
/// collected from every change value.
pub fn parse(event: &InboundEvent) -> EventBatch {
    let mut batch = EventBatch::default();

    for (entry_idx, entry) in event.entries.iter().enumerate() {
        for (change_idx, change) in entry.changes.iter().enumerate() {
            let source = RecordSource {
                entry: entry_idx,
                change: change_idx,
            };

            if change.is_messages() {
                batch.messages.extend(
                    change
                        .value
                        .messages
                        .iter()
                        .filter(|m| m.is_object())
                        .map(|m| MessageRecord::from_value(m, source)),
                );
            }

            batch.statuses.extend(
                change
                    .value
                    .statuses
                    .iter()
                    .filter(|s| s.is_object())
                    .map(StatusRecord::from_value),
            );
            batch.errors.extend(
                change
                    .value
                    .errors
                    .iter()
                    .filter(|e| e.is_object())
                    .map(ErrorRecord::from_value),
            );
        }
    }

    batch
}

/// Parse decoded JSON directly.
pub fn parse_value(payload: &Value) -> EventBatch {
    parse(&InboundEvent::from_value(payload))
}
