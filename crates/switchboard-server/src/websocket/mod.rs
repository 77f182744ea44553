//! WebSocket accept, session lifecycle and inbound message handling.

pub mod handler;
pub mod protocol;
pub mod session;
