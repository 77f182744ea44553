//! Fan-out delivery to resolved recipient sets.
//!
//! Every fan-out follows the same shape:
//!
//! 1. resolve the target to `(id, handle)` pairs, copied out under the
//!    registry lock
//! 2. encode the envelope once
//! 3. send the shared frame to every recipient concurrently, lock released
//! 4. refresh `last_activity` for the successes, then remove the failures
//!
//! Per-recipient failures never reach the caller; they show up in the
//! returned [`DeliveryReport`] and in the log.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::message::Envelope;
use crate::metrics::{DELIVERIES_TOTAL, DELIVERY_FAILURES_TOTAL, EMPTY_TARGETS_TOTAL};
use crate::registry::{Recipient, Registry};

/// Who a message is for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryTarget {
    /// A single connection.
    Connection(String),
    /// Every connection owned by a user.
    User(String),
    /// Every connection scoped to a room.
    Room(String),
    /// Every connection except the excluded ids.
    Broadcast {
        /// Connection ids to skip.
        #[serde(default)]
        exclude: Vec<String>,
    },
}

impl DeliveryTarget {
    /// Broadcast to everyone.
    pub fn everyone() -> Self {
        Self::Broadcast {
            exclude: Vec::new(),
        }
    }

    /// Metric label for this kind of target.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::User(_) => "user",
            Self::Room(_) => "room",
            Self::Broadcast { .. } => "broadcast",
        }
    }
}

impl fmt::Display for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(id) => write!(f, "connection:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
            Self::Room(id) => write!(f, "room:{id}"),
            Self::Broadcast { exclude } if exclude.is_empty() => f.write_str("broadcast"),
            Self::Broadcast { exclude } => write!(f, "broadcast(excluding {})", exclude.len()),
        }
    }
}

/// Outcome of one fan-out call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Recipients resolved from the target.
    pub targeted: usize,
    /// Recipients whose transport accepted the frame.
    pub delivered: usize,
    /// Recipients whose send failed; already removed from the registry.
    pub failed: Vec<String>,
}

impl DeliveryReport {
    /// Whether the target resolved to nobody.
    pub fn is_empty(&self) -> bool {
        self.targeted == 0
    }
}

/// Resolves targets against a [`Registry`] and delivers envelopes.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    /// Create a dispatcher over a shared registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// The registry this dispatcher delivers through.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Deliver to every connection owned by `user_id`.
    pub async fn send_to_user(&self, user_id: &str, envelope: &Envelope) -> DeliveryReport {
        self.publish(&DeliveryTarget::User(user_id.to_owned()), envelope)
            .await
    }

    /// Deliver to every connection scoped to `room_id`.
    pub async fn send_to_room(&self, room_id: &str, envelope: &Envelope) -> DeliveryReport {
        self.publish(&DeliveryTarget::Room(room_id.to_owned()), envelope)
            .await
    }

    /// Deliver to one connection.
    pub async fn send_to_connection(&self, id: &str, envelope: &Envelope) -> DeliveryReport {
        self.publish(&DeliveryTarget::Connection(id.to_owned()), envelope)
            .await
    }

    /// Deliver to every connection not in `exclude`.
    pub async fn broadcast(&self, envelope: &Envelope, exclude: &[String]) -> DeliveryReport {
        self.publish(
            &DeliveryTarget::Broadcast {
                exclude: exclude.to_vec(),
            },
            envelope,
        )
        .await
    }

    /// Resolve `target` and deliver `envelope` to it.
    pub async fn publish(&self, target: &DeliveryTarget, envelope: &Envelope) -> DeliveryReport {
        let recipients = match target {
            DeliveryTarget::Connection(id) => self.registry.connection_recipient(id),
            DeliveryTarget::User(id) => self.registry.user_recipients(id),
            DeliveryTarget::Room(id) => self.registry.room_recipients(id),
            DeliveryTarget::Broadcast { exclude } => self.registry.all_recipients(exclude),
        };
        self.deliver(recipients, target, envelope).await
    }

    async fn deliver(
        &self,
        recipients: Vec<Recipient>,
        target: &DeliveryTarget,
        envelope: &Envelope,
    ) -> DeliveryReport {
        let kind = target.kind();
        if recipients.is_empty() {
            counter!(EMPTY_TARGETS_TOTAL, "target" => kind).increment(1);
            warn!(
                destination = %target,
                event_type = %envelope.kind,
                event = %envelope.event,
                "no connections for target"
            );
            return DeliveryReport::default();
        }

        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(destination = %target, event_type = %envelope.kind, error = %e, "failed to encode envelope");
                return DeliveryReport {
                    targeted: recipients.len(),
                    ..DeliveryReport::default()
                };
            }
        };

        let results = join_all(
            recipients
                .iter()
                .map(|(_, transport)| transport.send(Arc::clone(&frame))),
        )
        .await;

        let mut delivered = Vec::with_capacity(recipients.len());
        let mut failed = Vec::new();
        for (recipient, result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => delivered.push(recipient),
                Err(e) => {
                    warn!(conn_id = %recipient.0, destination = %target, error = %e, "send failed, removing connection");
                    failed.push(recipient);
                }
            }
        }

        self.registry.touch(&delivered);
        for (id, handle) in &failed {
            let _ = self.registry.remove_if_same(id, handle, "send_failed");
        }

        counter!(DELIVERIES_TOTAL, "target" => kind).increment(delivered.len() as u64);
        if !failed.is_empty() {
            counter!(DELIVERY_FAILURES_TOTAL, "target" => kind).increment(failed.len() as u64);
        }
        debug!(
            destination = %target,
            event_type = %envelope.kind,
            event = %envelope.event,
            recipients = recipients.len(),
            delivered = delivered.len(),
            failed = failed.len(),
            "fan-out complete"
        );

        DeliveryReport {
            targeted: recipients.len(),
            delivered: delivered.len(),
            failed: failed.into_iter().map(|(id, _)| id.clone()).collect(),
        }
    }
}
