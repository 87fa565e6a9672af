//! Event names and wire-format frames.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event names exchanged with clients.
pub struct EventName;

impl EventName {
    // Inbound.
    pub const JOIN: &'static str = "join";
    pub const LEAVE: &'static str = "leave";
    pub const TYPING_START: &'static str = "typing:start";
    pub const TYPING_STOP: &'static str = "typing:stop";
    pub const PING: &'static str = "ping";

    // Both directions.
    pub const MESSAGE_READ: &'static str = "message:read";

    // Outbound.
    pub const PONG: &'static str = "pong";
    pub const MEMBER_ONLINE: &'static str = "member:online";
    pub const MEMBER_OFFLINE: &'static str = "member:offline";
    pub const MEMBERS_ONLINE: &'static str = "members:online";
    pub const TYPING_UPDATE: &'static str = "typing:update";
    pub const POST_NEW: &'static str = "post:new";
    pub const REPLY_NEW: &'static str = "reply:new";
    pub const POST_LIKE: &'static str = "post:like";
    pub const POST_DELETED: &'static str = "post:deleted";
    pub const POST_UPDATED: &'static str = "post:updated";
    pub const MESSAGE_NEW: &'static str = "message:new";
    pub const MESSAGE_NOTIFICATION: &'static str = "message:notification";
    pub const NOTIFICATION_NEW: &'static str = "notification:new";
}

// ---------------------------------------------------------------------------
// Server → Client frame
// ---------------------------------------------------------------------------

/// A named event pushed to clients as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerEvent {
    pub event: &'static str,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl ServerEvent {
    pub fn new(event: &'static str, data: impl Serialize) -> Self {
        Self {
            event,
            data: serde_json::to_value(data).unwrap_or_default(),
        }
    }

    pub fn pong() -> Self {
        Self {
            event: EventName::PONG,
            data: Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server frame
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadPayload {
    thread_id: WireId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadPayload {
    thread_id: WireId,
    message_id: WireId,
}

/// An id as the client sent it, either a JSON string or a number.
///
/// Room names and registry keys use [`WireId::key`]; echoes back to clients
/// serialize the original JSON value, so `42` stays a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireId(Value);

impl WireId {
    pub fn key(&self) -> Cow<'_, str> {
        match &self.0 {
            Value::String(s) => Cow::Borrowed(s),
            other => Cow::Owned(other.to_string()),
        }
    }

    fn is_empty(&self) -> bool {
        self.key().is_empty()
    }
}

impl<'de> Deserialize<'de> for WireId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            v @ (Value::String(_) | Value::Number(_)) => Ok(Self(v)),
            _ => Err(serde::de::Error::custom("id must be a string or a number")),
        }
    }
}

impl Serialize for WireId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl Hash for WireId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl From<&str> for WireId {
    fn from(s: &str) -> Self {
        Self(Value::String(s.to_string()))
    }
}

impl From<String> for WireId {
    fn from(s: String) -> Self {
        Self(Value::String(s))
    }
}

impl From<u64> for WireId {
    fn from(n: u64) -> Self {
        Self(Value::from(n))
    }
}

impl PartialEq<&str> for WireId {
    fn eq(&self, other: &&str) -> bool {
        matches!(&self.0, Value::String(s) if s == other)
    }
}

/// A validated inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Join(String),
    Leave(String),
    TypingStart { thread_id: WireId },
    TypingStop { thread_id: WireId },
    MessageRead { thread_id: WireId, message_id: WireId },
    Ping,
}

impl ClientEvent {
    /// Parse a text frame. Returns `None` for anything malformed: bad JSON,
    /// unknown event names, or missing/empty ids.
    pub fn parse(text: &str) -> Option<Self> {
        let frame: ClientFrame = serde_json::from_str(text).ok()?;

        let event = match frame.event.as_str() {
            EventName::JOIN => ClientEvent::Join(frame.data.as_str()?.to_string()),
            EventName::LEAVE => ClientEvent::Leave(frame.data.as_str()?.to_string()),
            EventName::TYPING_START => {
                let p: ThreadPayload = serde_json::from_value(frame.data).ok()?;
                ClientEvent::TypingStart {
                    thread_id: p.thread_id,
                }
            }
            EventName::TYPING_STOP => {
                let p: ThreadPayload = serde_json::from_value(frame.data).ok()?;
                ClientEvent::TypingStop {
                    thread_id: p.thread_id,
                }
            }
            EventName::MESSAGE_READ => {
                let p: ReadPayload = serde_json::from_value(frame.data).ok()?;
                if p.message_id.is_empty() {
                    return None;
                }
                ClientEvent::MessageRead {
                    thread_id: p.thread_id,
                    message_id: p.message_id,
                }
            }
            EventName::PING => ClientEvent::Ping,
            _ => return None,
        };

        let missing_thread = match &event {
            ClientEvent::TypingStart { thread_id }
            | ClientEvent::TypingStop { thread_id }
            | ClientEvent::MessageRead { thread_id, .. } => thread_id.is_empty(),
            _ => false,
        };

        (!missing_thread).then_some(event)
    }
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberOnline<'a> {
    pub member_id: &'a str,
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberOffline<'a> {
    pub member_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUpdate<'a> {
    pub thread_id: &'a WireId,
    pub member_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    pub is_typing: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt<'a> {
    pub thread_id: &'a WireId,
    pub message_id: &'a WireId,
    pub member_id: &'a str,
    pub read_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageNotification<'a> {
    pub thread_id: &'a str,
    pub preview: String,
    pub sender_name: &'a str,
}
