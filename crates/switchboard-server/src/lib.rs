//! # switchboard-server
//!
//! Axum HTTP + `WebSocket` gateway in front of a shared
//! [`switchboard_core::Registry`].
//!
//! - `GET /ws`: accepts a client, registers it, and runs its session
//! - `POST /api/publish`: delivers an envelope to a user, room, connection,
//!   or everyone
//! - `GET /health`, `GET /stats`, `GET /metrics`
//! - Graceful shutdown that drains live connections before exit

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{ApiError, ServerError};
pub use server::SwitchboardServer;
pub use shutdown::{DrainReport, ShutdownCoordinator};
