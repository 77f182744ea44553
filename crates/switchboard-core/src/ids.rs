//! Connection identifiers.
//!
//! Ids are opaque, caller-chosen strings. When the accepting layer receives
//! none it generates one here.

use uuid::Uuid;

/// Prefix for generated connection ids.
pub const CONNECTION_ID_PREFIX: &str = "conn_";

/// Generate a fresh connection id (`conn_<uuid v7>`).
pub fn new_connection_id() -> String {
    format!("{CONNECTION_ID_PREFIX}{}", Uuid::now_v7())
}
