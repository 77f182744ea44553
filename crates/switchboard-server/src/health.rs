//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;
use switchboard_core::RegistryStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered connections.
    pub connections: usize,
    /// Distinct connected users.
    pub users: usize,
    /// Distinct rooms with at least one connection.
    pub rooms: usize,
}

/// Build a health response from a registry snapshot.
pub fn health_check(start_time: Instant, stats: &RegistryStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.total_connections,
        users: stats.users_connected,
        rooms: stats.rooms_connected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), &RegistryStats::default());
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, &RegistryStats::default());
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn counts_come_from_stats() {
        let stats = RegistryStats {
            total_connections: 5,
            users_connected: 3,
            rooms_connected: 2,
            ..RegistryStats::default()
        };
        let json = serde_json::to_value(health_check(Instant::now(), &stats)).unwrap();
        assert_eq!(json["connections"], 5);
        assert_eq!(json["users"], 3);
        assert_eq!(json["rooms"], 2);
    }
}
