//! Connection-time parameters and inbound message shapes.

use serde::Deserialize;
use serde_json::{Map, Value};
use switchboard_core::ids::new_connection_id;

/// Query parameters on `GET /ws`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectParams {
    /// Logical owner.
    pub user_id: Option<String>,
    /// Room the connection is scoped to.
    pub chat_id: Option<String>,
    /// Caller-chosen connection id.
    pub client_id: Option<String>,
}

/// Identity of one accepted connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    /// Registry key.
    pub connection_id: String,
    /// Logical owner, if given.
    pub user_id: Option<String>,
    /// Room, if given.
    pub room_id: Option<String>,
}

impl SessionContext {
    /// Resolve query parameters. Empty strings count as absent; a missing
    /// `client_id` gets a generated id.
    pub fn from_params(params: ConnectParams) -> Self {
        let present = |v: Option<String>| v.filter(|s| !s.is_empty());
        Self {
            connection_id: present(params.client_id).unwrap_or_else(new_connection_id),
            user_id: present(params.user_id),
            room_id: present(params.chat_id),
        }
    }
}

/// An inbound client message: `{type, event, data}`.
///
/// Parsed leniently: a `type` or `event` that is not a string counts as
/// absent, and a non-object `data` is treated as empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClientMessage {
    /// Message type; selects the handler.
    pub kind: Option<String>,
    /// Event name, informational.
    pub event: Option<String>,
    /// Payload object.
    pub data: Map<String, Value>,
}

impl ClientMessage {
    /// Read a message out of a decoded JSON value. `None` unless it is an
    /// object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let string = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_owned);
        Some(Self {
            kind: string("type"),
            event: string("event"),
            data: obj
                .get("data")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        })
    }
}

/// A string field that is present and non-empty.
pub fn non_empty_str<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_with_client_id() {
        let ctx = SessionContext::from_params(ConnectParams {
            user_id: Some("u1".into()),
            chat_id: Some("r1".into()),
            client_id: Some("c1".into()),
        });
        assert_eq!(ctx.connection_id, "c1");
        assert_eq!(ctx.user_id.as_deref(), Some("u1"));
        assert_eq!(ctx.room_id.as_deref(), Some("r1"));
    }

    #[test]
    fn missing_client_id_is_generated() {
        let ctx = SessionContext::from_params(ConnectParams::default());
        assert!(ctx.connection_id.starts_with("conn_"));
        assert!(ctx.user_id.is_none());
    }

    #[test]
    fn empty_params_count_as_absent() {
        let ctx = SessionContext::from_params(ConnectParams {
            user_id: Some(String::new()),
            chat_id: Some(String::new()),
            client_id: Some(String::new()),
        });
        assert!(ctx.connection_id.starts_with("conn_"));
        assert!(ctx.user_id.is_none());
        assert!(ctx.room_id.is_none());
    }

    #[test]
    fn client_message_defaults() {
        let msg = ClientMessage::from_value(&json!({})).unwrap();
        assert!(msg.kind.is_none());
        assert!(msg.data.is_empty());
    }

    #[test]
    fn client_message_fields() {
        let msg = ClientMessage::from_value(&json!({
            "type": "chat", "event": "send", "data": {"message": "hi"}
        }))
        .unwrap();
        assert_eq!(msg.kind.as_deref(), Some("chat"));
        assert_eq!(msg.event.as_deref(), Some("send"));
        assert_eq!(msg.data["message"], "hi");
    }

    #[test]
    fn non_object_data_is_empty() {
        let msg = ClientMessage::from_value(&json!({"type": "chat", "data": "hello"})).unwrap();
        assert!(msg.data.is_empty());
    }

    #[test]
    fn non_string_type_is_absent() {
        let msg = ClientMessage::from_value(&json!({"type": 5})).unwrap();
        assert!(msg.kind.is_none());
    }

    #[test]
    fn non_object_message_rejected() {
        assert!(ClientMessage::from_value(&json!([1, 2])).is_none());
        assert!(ClientMessage::from_value(&json!("ping")).is_none());
    }

    #[test]
    fn non_empty_str_filters() {
        let data = json!({"a": "x", "b": "", "c": 3}).as_object().cloned().unwrap();
        assert_eq!(non_empty_str(&data, "a"), Some("x"));
        assert_eq!(non_empty_str(&data, "b"), None);
        assert_eq!(non_empty_str(&data, "c"), None);
        assert_eq!(non_empty_str(&data, "d"), None);
    }
}
