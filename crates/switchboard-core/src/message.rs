//! Outbound wire envelope.
//!
//! Every outbound frame is one JSON object with exactly the fields `type`,
//! `event`, `data`, `timestamp` in that order. `timestamp` is an RFC 3339
//! UTC string or `null`. Inbound timestamps without an offset are read as
//! UTC.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};

use crate::errors::EnvelopeError;
use crate::transport::Frame;

/// A message delivered to one or more connections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message category (e.g. `chat`, `system`, `error`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Event name within the category.
    #[serde(default)]
    pub event: String,
    /// Arbitrary payload.
    #[serde(default)]
    pub data: Value,
    /// When the message was produced, if stamped.
    #[serde(
        default,
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

fn serialize_timestamp<S: Serializer>(
    ts: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match ts {
        Some(t) => serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    parse_timestamp(&raw)
        .map(Some)
        .ok_or_else(|| D::Error::custom(format!("invalid timestamp `{raw}`")))
}

/// Parse RFC 3339, or an ISO 8601 date-time without offset taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl Envelope {
    /// Create an unstamped envelope.
    pub fn new(kind: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            event: event.into(),
            data,
            timestamp: None,
        }
    }

    /// Set an explicit timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Stamp with the current UTC time.
    #[must_use]
    pub fn stamped(self) -> Self {
        self.with_timestamp(Utc::now())
    }

    /// Serialize to a shareable text frame. Called once per fan-out.
    pub fn encode(&self) -> Result<Frame, EnvelopeError> {
        let json = serde_json::to_string(self)?;
        Ok(Arc::from(json))
    }

    /// Welcome message sent to a freshly accepted connection.
    pub fn connected(connection_id: &str, user_id: Option<&str>, room_id: Option<&str>) -> Self {
        Self::new(
            "connection",
            "connected",
            json!({
                "connection_id": connection_id,
                "user_id": user_id,
                "chat_id": room_id,
                "message": "WebSocket connected successfully",
            }),
        )
    }

    /// Error-shaped reply for a single connection.
    pub fn error(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new("error", event, json!({ "message": message.into() }))
    }

    /// Reply to an application-level ping.
    pub fn pong() -> Self {
        Self::new("pong", "response", json!({ "message": "pong" }))
    }
}
