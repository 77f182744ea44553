//! Connection registry.
//!
//! Maps connection id → transport handle + [`ConnectionMetadata`], with a
//! user index and a room index derived from the metadata. All three maps sit
//! behind one `parking_lot::Mutex` so no caller ever observes a partial
//! update. The lock is never held across an `.await`; callers that perform
//! I/O copy the handles they need out first.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::index::ConnectionIndex;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::transport::Transport;

/// A connection id paired with the transport handle it was resolved to.
pub(crate) type Recipient = (String, Arc<dyn Transport>);

/// Per-connection metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    /// Logical owner, if any.
    pub user_id: Option<String>,
    /// Room the connection is scoped to, if any.
    pub room_id: Option<String>,
    /// Set once at registration.
    pub connected_at: DateTime<Utc>,
    /// Refreshed on every successful outbound delivery.
    pub last_activity: DateTime<Utc>,
}

/// Point-in-time counts, taken under the registry lock.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Registered connections.
    pub total_connections: usize,
    /// Distinct users with at least one connection.
    pub users_connected: usize,
    /// Distinct rooms with at least one connection.
    pub rooms_connected: usize,
    /// Connections per user.
    pub connections_by_user: BTreeMap<String, usize>,
    /// Connections per room.
    pub connections_by_room: BTreeMap<String, usize>,
}

struct Entry {
    transport: Arc<dyn Transport>,
    metadata: ConnectionMetadata,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<String, Entry>,
    users: ConnectionIndex,
    rooms: ConnectionIndex,
}

impl Inner {
    /// Remove `id` from the primary map and both indexes.
    fn detach(&mut self, id: &str) -> Option<Entry> {
        let entry = self.connections.remove(id)?;
        if let Some(user) = &entry.metadata.user_id {
            let _ = self.users.remove(user, id);
        }
        if let Some(room) = &entry.metadata.room_id {
            let _ = self.rooms.remove(room, id);
        }
        Some(entry)
    }

    fn recipients<'a>(&self, ids: impl IntoIterator<Item = &'a String>) -> Vec<Recipient> {
        ids.into_iter()
            .filter_map(|id| {
                self.connections
                    .get(id)
                    .map(|e| (id.clone(), Arc::clone(&e.transport)))
            })
            .collect()
    }

    fn recipients_in(&self, index: &ConnectionIndex, key: &str) -> Vec<Recipient> {
        index
            .get(key)
            .map(|ids| self.recipients(ids))
            .unwrap_or_default()
    }
}

/// Set the active-connections gauge. Callers hold the registry lock.
#[allow(clippy::cast_precision_loss)]
fn publish_active(total: usize) {
    gauge!(WS_CONNECTIONS_ACTIVE).set(total as f64);
}

/// Authoritative set of live connections.
pub struct Registry {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl Registry {
    /// Create an empty registry using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty registry with an injected clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Current time according to the registry's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register a connection.
    ///
    /// Re-registering an id that is already live overwrites it: the old
    /// entry is detached from both indexes and its handle dropped before the
    /// new one is inserted.
    pub fn connect(
        &self,
        id: impl Into<String>,
        transport: Arc<dyn Transport>,
        user_id: Option<&str>,
        room_id: Option<&str>,
    ) {
        let id = id.into();
        let now = self.clock.now();
        let metadata = ConnectionMetadata {
            user_id: user_id.map(str::to_owned),
            room_id: room_id.map(str::to_owned),
            connected_at: now,
            last_activity: now,
        };

        let (replaced, total) = {
            let mut inner = self.inner.lock();
            let replaced = inner.detach(&id).is_some();
            if let Some(user) = &metadata.user_id {
                let _ = inner.users.insert(user, &id);
            }
            if let Some(room) = &metadata.room_id {
                let _ = inner.rooms.insert(room, &id);
            }
            let _ = inner
                .connections
                .insert(id.clone(), Entry { transport, metadata });
            let total = inner.connections.len();
            publish_active(total);
            (replaced, total)
        };

        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        info!(
            conn_id = %id,
            user_id = user_id.unwrap_or("-"),
            room_id = room_id.unwrap_or("-"),
            replaced,
            total,
            "connection registered"
        );
    }

    /// Remove a connection. Returns `false` if `id` was not registered.
    pub fn disconnect(&self, id: &str) -> bool {
        let (entry, total) = {
            let mut inner = self.inner.lock();
            let entry = inner.detach(id);
            let total = inner.connections.len();
            if entry.is_some() {
                publish_active(total);
            }
            (entry, total)
        };
        match entry {
            Some(entry) => {
                self.record_removal(id, &entry.metadata, "disconnect", total);
                true
            }
            None => {
                debug!(conn_id = %id, "disconnect for unknown connection");
                false
            }
        }
    }

    /// Remove `id` only if it is still bound to `handle`.
    ///
    /// Used by the owner of a transport when tearing it down, and internally
    /// after a failed send or idle sweep, so a client that has since
    /// re-registered under the same id keeps its new entry.
    pub fn release(&self, id: &str, handle: &Arc<dyn Transport>) -> bool {
        self.remove_if_same(id, handle, "release")
    }

    pub(crate) fn remove_if_same(
        &self,
        id: &str,
        handle: &Arc<dyn Transport>,
        reason: &'static str,
    ) -> bool {
        let (entry, total) = {
            let mut inner = self.inner.lock();
            let same = inner
                .connections
                .get(id)
                .is_some_and(|e| Arc::ptr_eq(&e.transport, handle));
            let entry = if same { inner.detach(id) } else { None };
            let total = inner.connections.len();
            if entry.is_some() {
                publish_active(total);
            }
            (entry, total)
        };
        match entry {
            Some(entry) => {
                self.record_removal(id, &entry.metadata, reason, total);
                true
            }
            None => false,
        }
    }

    fn record_removal(
        &self,
        id: &str,
        metadata: &ConnectionMetadata,
        reason: &'static str,
        total: usize,
    ) {
        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason).increment(1);
        let lifetime_secs = (self.clock.now() - metadata.connected_at).num_seconds();
        info!(
            conn_id = %id,
            user_id = metadata.user_id.as_deref().unwrap_or("-"),
            room_id = metadata.room_id.as_deref().unwrap_or("-"),
            reason,
            lifetime_secs,
            total,
            "connection removed"
        );
    }

    /// Counts per user and per room.
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        RegistryStats {
            total_connections: inner.connections.len(),
            users_connected: inner.users.len(),
            rooms_connected: inner.rooms.len(),
            connections_by_user: inner.users.counts(),
            connections_by_room: inner.rooms.counts(),
        }
    }

    /// Metadata snapshot for `id`.
    pub fn metadata(&self, id: &str) -> Option<ConnectionMetadata> {
        self.inner
            .lock()
            .connections
            .get(id)
            .map(|e| e.metadata.clone())
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().connections.contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().connections.is_empty()
    }

    /// All registered ids, sorted.
    pub fn connection_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock().connections.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Ids connected as `user_id`, sorted.
    pub fn user_connections(&self, user_id: &str) -> Vec<String> {
        let mut ids = self.inner.lock().users.ids(user_id);
        ids.sort_unstable();
        ids
    }

    /// Ids scoped to `room_id`, sorted.
    pub fn room_connections(&self, room_id: &str) -> Vec<String> {
        let mut ids = self.inner.lock().rooms.ids(room_id);
        ids.sort_unstable();
        ids
    }

    // Recipient resolution. Each copies handles out under the lock.

    pub(crate) fn connection_recipient(&self, id: &str) -> Vec<Recipient> {
        let inner = self.inner.lock();
        inner
            .connections
            .get(id)
            .map(|e| vec![(id.to_owned(), Arc::clone(&e.transport))])
            .unwrap_or_default()
    }

    pub(crate) fn user_recipients(&self, user_id: &str) -> Vec<Recipient> {
        let inner = self.inner.lock();
        inner.recipients_in(&inner.users, user_id)
    }

    pub(crate) fn room_recipients(&self, room_id: &str) -> Vec<Recipient> {
        let inner = self.inner.lock();
        inner.recipients_in(&inner.rooms, room_id)
    }

    pub(crate) fn all_recipients(&self, exclude: &[String]) -> Vec<Recipient> {
        let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();
        let inner = self.inner.lock();
        inner
            .connections
            .iter()
            .filter(|(id, _)| !exclude.contains(id.as_str()))
            .map(|(id, e)| (id.clone(), Arc::clone(&e.transport)))
            .collect()
    }

    /// Refresh `last_activity` for delivered recipients still bound to the
    /// same handle.
    pub(crate) fn touch(&self, delivered: &[&Recipient]) {
        if delivered.is_empty() {
            return;
        }
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        for (id, handle) in delivered {
            if let Some(entry) = inner.connections.get_mut(id.as_str()) {
                if Arc::ptr_eq(&entry.transport, handle) {
                    entry.metadata.last_activity = now;
                }
            }
        }
    }

    /// Recipients whose `last_activity` is strictly before `cutoff`.
    pub(crate) fn idle_before(&self, cutoff: DateTime<Utc>) -> Vec<Recipient> {
        let inner = self.inner.lock();
        inner
            .connections
            .iter()
            .filter(|(_, e)| e.metadata.last_activity < cutoff)
            .map(|(id, e)| (id.clone(), Arc::clone(&e.transport)))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&self, id: &str, at: DateTime<Utc>) {
        if let Some(entry) = self.inner.lock().connections.get_mut(id) {
            entry.metadata.last_activity = at;
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("connections", &self.len())
            .finish_non_exhaustive()
    }
}
