//! Metric name constants.
//!
//! Emitted through the `metrics` facade; the binary decides which recorder
//! (if any) is installed.

/// Connections registered (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Connections removed, for any reason (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Currently registered connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Frames handed to a transport successfully (counter, labels: target).
pub const DELIVERIES_TOTAL: &str = "deliveries_total";
/// Per-recipient send failures (counter, labels: target).
pub const DELIVERY_FAILURES_TOTAL: &str = "delivery_failures_total";
/// Fan-out calls that resolved no recipients (counter, labels: target).
pub const EMPTY_TARGETS_TOTAL: &str = "empty_targets_total";
/// Connections removed by the idle sweep (counter).
pub const IDLE_EVICTIONS_TOTAL: &str = "idle_evictions_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_snake_case() {
        for name in [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            DELIVERIES_TOTAL,
            DELIVERY_FAILURES_TOTAL,
            EMPTY_TARGETS_TOTAL,
            IDLE_EVICTIONS_TOTAL,
        ] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name}"
            );
        }
    }
}
