//! Settings types.
//!
//! Every section uses `camelCase` keys and falls back to its defaults for
//! any key the file omits.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_core::logging::LogFormat;

use crate::errors::{Result, SettingsError};

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwitchboardSettings {
    /// HTTP / WebSocket listener.
    pub server: ServerSettings,
    /// Idle-connection sweeping.
    pub reaper: ReaperSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl SwitchboardSettings {
    /// Reject values the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.server.host.trim().is_empty(), "server.host", "must not be empty"),
            (self.server.max_message_size == 0, "server.maxMessageSize", "must be non-zero"),
            (self.server.send_queue_capacity == 0, "server.sendQueueCapacity", "must be non-zero"),
            (self.server.send_timeout_ms == 0, "server.sendTimeoutMs", "must be non-zero"),
            (self.server.ping_interval_secs == 0, "server.pingIntervalSecs", "must be non-zero"),
            (self.reaper.interval_secs == 0, "reaper.intervalSecs", "must be non-zero"),
            (self.reaper.max_idle_secs == 0, "reaper.maxIdleSecs", "must be non-zero"),
        ];
        match checks.into_iter().find(|(bad, _, _)| *bad) {
            Some((_, key, reason)) => Err(SettingsError::InvalidValue { key, reason }),
            None => Ok(()),
        }
    }
}

/// Listener and per-connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` picks an ephemeral port.
    pub port: u16,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// How long a send waits for queue space before the recipient is dropped.
    pub send_timeout_ms: u64,
    /// Transport-level ping interval.
    pub ping_interval_secs: u64,
}

impl ServerSettings {
    /// `send_timeout_ms` as a [`Duration`].
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// `ping_interval_secs` as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_message_size: 1024 * 1024,
            send_queue_capacity: 256,
            send_timeout_ms: 5_000,
            ping_interval_secs: 30,
        }
    }
}

/// Idle sweep settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReaperSettings {
    /// Whether the periodic sweep runs at all.
    pub enabled: bool,
    /// Seconds between sweeps.
    pub interval_secs: u64,
    /// Connections idle longer than this are removed.
    pub max_idle_secs: u64,
}

impl ReaperSettings {
    /// `interval_secs` as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// `max_idle_secs` as a [`Duration`].
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            max_idle_secs: 30 * 60,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
