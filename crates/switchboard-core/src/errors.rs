//! Error types for delivery and envelope encoding.
//!
//! Unknown connection ids and empty targets are not errors: they surface as
//! `false` / empty [`DeliveryReport`](crate::dispatch::DeliveryReport)s and a
//! warning in the log.

use std::time::Duration;

use thiserror::Error;

/// Failure to hand a frame to one recipient's transport.
///
/// Never propagated out of a fan-out call; the dispatcher logs it and
/// removes the recipient once the pass completes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The remote side (or its writer task) is gone.
    #[error("transport closed")]
    Closed,
    /// The transport did not accept the frame within its send timeout.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    /// Transport-specific rejection.
    #[error("send rejected: {0}")]
    Rejected(String),
}

/// Failure to serialize an outbound envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// JSON encoding failed.
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}
