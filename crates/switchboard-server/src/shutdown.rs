//! Shutdown and connection draining.
//!
//! Cancelling the token makes every session send a close frame and release
//! its registry entry. [`ShutdownCoordinator::drain`] then waits for the
//! tracked background tasks and for the registry to empty, and evicts
//! whatever is still registered once the deadline passes.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use switchboard_core::Registry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often draining re-checks the registry.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Outcome of [`ShutdownCoordinator::drain`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Connections registered when draining began.
    pub connections_at_start: usize,
    /// Background tasks awaited.
    pub tasks: usize,
    /// Connections force-removed after the deadline.
    pub evicted: usize,
    /// Whether the deadline passed before everything finished.
    pub timed_out: bool,
}

/// Owns the cancellation token shared by the listener, every session and
/// the reaper, plus the task handles to await on the way down.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    registry: Arc<Registry>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator draining `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            token: CancellationToken::new(),
            registry,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Await `handle` during [`drain`](Self::drain).
    pub fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    /// Number of tracked tasks not yet drained.
    pub fn tracked(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown, then wait up to `timeout` for tracked tasks to exit
    /// and live connections to release themselves. Connections still
    /// registered at the deadline are disconnected, which drops their send
    /// queues.
    pub async fn drain(&self, timeout: Duration) -> DrainReport {
        self.shutdown();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        let mut report = DrainReport {
            connections_at_start: self.registry.len(),
            tasks: tasks.len(),
            ..DrainReport::default()
        };
        info!(
            connections = report.connections_at_start,
            task_count = report.tasks,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "draining connections"
        );

        let registry = Arc::clone(&self.registry);
        let settle = async move {
            let _ = futures::future::join_all(tasks).await;
            while !registry.is_empty() {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        };
        report.timed_out = tokio::time::timeout(timeout, settle).await.is_err();

        if report.timed_out {
            report.evicted = self
                .registry
                .connection_ids()
                .iter()
                .filter(|id| self.registry.disconnect(id))
                .count();
            warn!(
                evicted = report.evicted,
                "drain deadline passed, evicted remaining connections"
            );
        } else {
            info!("all connections drained");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::ChannelTransport;

    fn coordinator() -> (ShutdownCoordinator, Arc<Registry>) {
        let registry = Arc::new(Registry::new());
        (ShutdownCoordinator::new(Arc::clone(&registry)), registry)
    }

    fn connect(registry: &Registry, id: &str) -> tokio::sync::mpsc::Receiver<switchboard_core::Frame> {
        let (transport, rx) = ChannelTransport::channel(4, Duration::from_secs(1));
        registry.connect(id, Arc::new(transport), Some("u1"), None);
        rx
    }

    #[test]
    fn starts_live() {
        let (coord, _) = coordinator();
        assert!(!coord.is_shutting_down());
        assert_eq!(coord.tracked(), 0);
    }

    #[test]
    fn shutdown_cancels_every_token() {
        let (coord, _) = coordinator();
        let t1 = coord.token();
        let t2 = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn drain_on_idle_registry_finishes_immediately() {
        let (coord, _) = coordinator();
        let report = coord.drain(Duration::from_secs(1)).await;
        assert_eq!(report, DrainReport::default());
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn drain_waits_for_sessions_to_release() {
        let (coord, registry) = coordinator();
        let _rx = connect(&registry, "c1");

        let token = coord.token();
        let session_registry = Arc::clone(&registry);
        coord.track(tokio::spawn(async move {
            token.cancelled().await;
            let _ = session_registry.disconnect("c1");
        }));
        assert_eq!(coord.tracked(), 1);

        let report = coord.drain(Duration::from_secs(5)).await;
        assert_eq!(report.connections_at_start, 1);
        assert_eq!(report.tasks, 1);
        assert_eq!(report.evicted, 0);
        assert!(!report.timed_out);
        assert!(registry.is_empty());
        assert_eq!(coord.tracked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_evicts_connections_left_at_deadline() {
        let (coord, registry) = coordinator();
        let mut rx = connect(&registry, "c1");
        let _rx2 = connect(&registry, "c2");
        coord.track(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }));

        let report = coord.drain(Duration::from_millis(50)).await;
        assert!(report.timed_out);
        assert_eq!(report.connections_at_start, 2);
        assert_eq!(report.evicted, 2);
        assert!(registry.is_empty());
        assert!(registry.stats().connections_by_user.is_empty());
        // the evicted handle was the only sender
        assert!(rx.recv().await.is_none());
    }
}
