//! Prometheus recorder and gateway-level metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the global Prometheus recorder.
///
/// Returns the handle used to render `/metrics`. Fails if another recorder
/// is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Inbound WebSocket messages (counter, labels: type).
pub const WS_INBOUND_MESSAGES_TOTAL: &str = "ws_inbound_messages_total";
/// Inbound frames that were not valid JSON (counter).
pub const WS_INBOUND_INVALID_TOTAL: &str = "ws_inbound_invalid_total";
/// WebSocket session duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Publish API requests (counter, labels: target).
pub const PUBLISH_REQUESTS_TOTAL: &str = "publish_requests_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_metrics_is_empty_text() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        assert!(render(&handle).trim().is_empty());
    }

    #[test]
    fn names_are_distinct() {
        let names = [
            WS_INBOUND_MESSAGES_TOTAL,
            WS_INBOUND_INVALID_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            PUBLISH_REQUESTS_TOTAL,
        ];
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
