//! # switchboard-core
//!
//! In-memory connection registry and fan-out broadcaster for persistent,
//! bidirectional client connections.
//!
//! - **Registry**: connection id → transport handle + metadata, with
//!   secondary indexes by user and by room kept consistent under one lock
//! - **Dispatcher**: resolves a target (user, room, connection, broadcast
//!   minus exclusions) into recipients, serializes once, sends outside the
//!   lock, and evicts recipients whose send failed
//! - **Reaper**: sweeps connections idle beyond a threshold through the same
//!   removal path
//!
//! The registry is an explicitly constructed value; callers share it as
//! `Arc<Registry>`.

#![deny(unsafe_code)]

pub mod clock;
pub mod dispatch;
pub mod errors;
pub mod ids;
pub mod index;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod reaper;
pub mod registry;
pub mod transport;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{DeliveryReport, DeliveryTarget, Dispatcher};
pub use errors::{EnvelopeError, SendError};
pub use index::ConnectionIndex;
pub use message::Envelope;
pub use reaper::Reaper;
pub use registry::{ConnectionMetadata, Registry, RegistryStats};
pub use transport::{ChannelTransport, Frame, Transport};
