//! HTTP API: publish and stats.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use metrics::counter;
use serde::{Deserialize, Serialize};
use switchboard_core::{DeliveryReport, DeliveryTarget, Envelope, RegistryStats};
use tracing::{info, warn};

use crate::errors::ApiError;
use crate::metrics::PUBLISH_REQUESTS_TOTAL;
use crate::server::AppState;

/// Body of `POST /api/publish`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Who receives the message.
    pub target: DeliveryTarget,
    /// What they receive. Stamped with the current time if it has no
    /// timestamp.
    pub message: Envelope,
}

/// POST /api/publish
pub async fn publish(
    State(state): State<AppState>,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<Json<DeliveryReport>, ApiError> {
    let Json(req) = body.map_err(|rejection| {
        warn!(error = %rejection, "rejected publish request");
        ApiError::invalid_request(rejection.body_text())
    })?;

    counter!(PUBLISH_REQUESTS_TOTAL, "target" => req.target.kind()).increment(1);
    let message = if req.message.timestamp.is_some() {
        req.message
    } else {
        req.message.stamped()
    };

    let report = state.dispatcher.publish(&req.target, &message).await;
    info!(
        destination = %req.target,
        message_type = %message.kind,
        targeted = report.targeted,
        delivered = report.delivered,
        "publish request handled"
    );
    Ok(Json(report))
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.dispatcher.registry().stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn publish_request_shapes() {
        let req: PublishRequest = serde_json::from_value(json!({
            "target": {"room": "r1"},
            "message": {"type": "system", "event": "notice", "data": {"text": "hi"}}
        }))
        .unwrap();
        assert_eq!(req.target, DeliveryTarget::Room("r1".into()));
        assert_eq!(req.message.kind, "system");
        assert!(req.message.timestamp.is_none());

        let req: PublishRequest = serde_json::from_value(json!({
            "target": {"broadcast": {}},
            "message": {"type": "system"}
        }))
        .unwrap();
        assert_eq!(req.target, DeliveryTarget::everyone());
        assert_eq!(req.message.event, "");
    }

    #[test]
    fn publish_request_requires_message_type() {
        let err = serde_json::from_value::<PublishRequest>(json!({
            "target": {"user": "u1"},
            "message": {"event": "notice"}
        }));
        assert!(err.is_err());
    }
}
