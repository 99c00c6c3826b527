//! Log data model
//!
//! - Ids: tracer / writer / trace, all allocated by the container
//! - Payload: what instrumented code writes (TEXT, DATA or LIST)
//! - Records: what the container hands back when reading

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};

/// One logical execution session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TracerId(pub u64);

/// One nested logging scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriterId(pub u64);

/// Position of an event in the log (defines the total order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraceId(pub u64);

macro_rules! display_id {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0)
            }
        })*
    };
}

display_id!(TracerId, WriterId, TraceId);

/// Stored message type (the `type` column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Text,
    Data,
    List,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "TEXT",
            MessageType::Data => "DATA",
            MessageType::List => "LIST",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(MessageType::Text),
            "DATA" => Ok(MessageType::Data),
            "LIST" => Ok(MessageType::List),
            other => Err(format!("unknown message type '{}'", other)),
        }
    }
}

/// Message written by instrumented code
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Free text, usually a single line
    Text(String),
    /// Multi-line dump of a value
    Data(String),
    /// Key/value couples, rendered sorted by key
    List(BTreeMap<String, String>),
}

impl Payload {
    pub fn text(message: impl Into<String>) -> Self {
        Payload::Text(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Payload::Data(message.into())
    }

    pub fn list<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Payload::List(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::Text(_) => MessageType::Text,
            Payload::Data(_) => MessageType::Data,
            Payload::List(_) => MessageType::List,
        }
    }

    /// Stored form of the message (LIST is JSON-encoded)
    pub fn encode(&self) -> Result<String> {
        match self {
            Payload::Text(s) | Payload::Data(s) => Ok(s.clone()),
            Payload::List(map) => Ok(serde_json::to_string(map)?),
        }
    }

    /// Rebuild a payload from its stored form
    pub fn decode(kind: MessageType, body: &str, trace: TraceId) -> Result<Self> {
        match kind {
            MessageType::Text => Ok(Payload::Text(body.to_string())),
            MessageType::Data => Ok(Payload::Data(body.to_string())),
            MessageType::List => serde_json::from_str::<BTreeMap<String, String>>(body)
                .map(Payload::List)
                .map_err(|e| TraceError::MalformedPayload {
                    trace: trace.0,
                    details: e.to_string(),
                }),
        }
    }
}

/// Content of a stored event
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Structural marker written when a writer opens
    Open,
    /// Structural marker written when a writer closes
    Close,
    Message { kind: MessageType, body: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TracerRecord {
    pub id: TracerId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriterRecord {
    pub id: WriterId,
    pub tracer: TracerId,
    /// Unset until the resolver runs
    pub depth: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub id: TraceId,
    pub tracer: TracerId,
    pub writer: WriterId,
    pub timestamp: String,
    pub entry: Entry,
    /// Resolved depth of the owning writer
    pub depth: Option<u32>,
}

impl TraceRecord {
    pub fn is_open(&self) -> bool {
        matches!(self.entry, Entry::Open)
    }

    pub fn is_close(&self) -> bool {
        matches!(self.entry, Entry::Close)
    }
}

/// Timestamp format shared by all containers
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_round_trips_through_column_text() {
        for kind in [MessageType::Text, MessageType::Data, MessageType::List] {
            assert_eq!(kind.as_str().parse::<MessageType>().unwrap(), kind);
        }
        assert!("FIRST".parse::<MessageType>().is_err());
    }

    #[test]
    fn list_encodes_as_json_object() {
        let payload = Payload::list([("k20", "9"), ("k1", "4")]);
        assert_eq!(payload.message_type(), MessageType::List);
        assert_eq!(payload.encode().unwrap(), r#"{"k1":"4","k20":"9"}"#);
    }

    #[test]
    fn decode_rejects_non_object_list() {
        let err = Payload::decode(MessageType::List, "not json", TraceId(12)).unwrap_err();
        match err {
            TraceError::MalformedPayload { trace, .. } => assert_eq!(trace, 12),
            other => panic!("Expected MalformedPayload, got {other:?}"),
        }

        // Values must be strings
        assert!(Payload::decode(MessageType::List, r#"{"a": 1}"#, TraceId(1)).is_err());
    }

    #[test]
    fn decode_text_is_verbatim() {
        let payload = Payload::decode(MessageType::Data, "a\nb", TraceId(1)).unwrap();
        assert_eq!(payload, Payload::data("a\nb"));
    }

    #[test]
    fn ids_display_with_hash() {
        assert_eq!(WriterId(3).to_string(), "#3");
        assert_eq!(TraceId(10).to_string(), "#10");
    }

    #[test]
    fn timestamp_has_millisecond_precision() {
        let ts = now_timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).is_ok());
        assert_eq!(ts.len(), "2024-01-01 00:00:00.000".len());
    }
}
