//! The connection registry.
//!
//! Maps generated connection ids to live or faded handles. Deletion is two
//! phase:
//!
//! 1. The engine calls [`ConnectionRegistry::fade`] when a socket closes.
//!    The entry stays in the map with its handle replaced by a faded marker.
//! 2. The host calls [`ConnectionRegistry::purge`] from its own tick to reap
//!    faded entries.
//!
//! [`ConnectionRegistry::shut_down`] is the one place outside the engine that
//! fades entries: it closes the registry to new connections and fades every
//! live entry in one step, so a stopped server reports no live connections.
//!
//! `purge` and `shut_down` must never be called from inside an engine task.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use pylon_core::{BroadcastStatus, ConnectionId, SendStatus};
use pylon_telemetry::metrics;
use tracing::{debug, info, warn};

use crate::error::CloseCode;
use crate::handle::{BackpressurePolicy, ConnectionHandle};
use crate::outbound::Outbound;

/// A registry entry.
#[derive(Debug, Clone)]
pub enum ConnectionEntry {
    /// The socket is open.
    Live(ConnectionHandle),
    /// The socket closed; the entry awaits purge.
    Faded,
}

impl ConnectionEntry {
    /// Returns `true` if the entry has been faded.
    pub fn is_faded(&self) -> bool {
        matches!(self, Self::Faded)
    }

    /// Returns the handle if the entry is live.
    pub fn handle(&self) -> Option<&ConnectionHandle> {
        match self {
            Self::Live(handle) => Some(handle),
            Self::Faded => None,
        }
    }
}

/// Statistics about the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Live entries.
    pub live: usize,
    /// Faded entries awaiting purge.
    pub faded: usize,
    /// Connections ever registered.
    pub total_registered: usize,
    /// Entries ever purged.
    pub total_purged: usize,
}

/// Map from connection id to live or faded handle.
///
/// # Example
///
/// ```
/// use pylon_core::ConnectionId;
/// use pylon_ws::{ConnectionHandle, ConnectionRegistry};
///
/// let registry = ConnectionRegistry::default();
/// let id = ConnectionId::new();
/// let (handle, _rx) = ConnectionHandle::channel(id);
///
/// assert!(registry.register(id, handle));
/// assert!(registry.fade(&id));
/// assert!(registry.find_by_id(&id).unwrap().is_faded());
/// assert_eq!(registry.purge(), 1);
/// assert_eq!(registry.count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    shut: RwLock<bool>,
    policy: BackpressurePolicy,
    total_registered: AtomicUsize,
    total_purged: AtomicUsize,
}

impl ConnectionRegistry {
    /// Creates an empty registry with the given backpressure policy.
    pub fn new(policy: BackpressurePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Returns the backpressure policy applied to sends.
    pub fn policy(&self) -> &BackpressurePolicy {
        &self.policy
    }

    /// Registers a freshly upgraded connection.
    ///
    /// Returns `false`, leaving the registry unchanged, if the id is taken or
    /// the registry has been shut down.
    pub fn register(&self, id: ConnectionId, handle: ConnectionHandle) -> bool {
        self.register_then(id, handle, || {})
    }

    /// Registers a connection and runs `on_registered` before a concurrent
    /// [`shut_down`](Self::shut_down) can fade it.
    pub fn register_then(
        &self,
        id: ConnectionId,
        handle: ConnectionHandle,
        on_registered: impl FnOnce(),
    ) -> bool {
        let shut = self.shut.read();
        if *shut {
            debug!(connection_id = %id, "Registry shut down, registration rejected");
            return false;
        }
        let inserted = match self.connections.entry(id) {
            Entry::Occupied(_) => {
                warn!(connection_id = %id, "Connection id collision, registration rejected");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(ConnectionEntry::Live(handle));
                self.total_registered.fetch_add(1, Ordering::Relaxed);
                true
            }
        };
        if inserted {
            debug!(connection_id = %id, total = self.connections.len(), "Connection registered");
            on_registered();
        }
        inserted
    }

    /// Returns `true` while new connections are accepted.
    pub fn is_accepting(&self) -> bool {
        !*self.shut.read()
    }

    /// Accepts new connections again after a [`shut_down`](Self::shut_down).
    pub fn reopen(&self) {
        *self.shut.write() = false;
    }

    /// Replaces a live handle with the faded marker.
    ///
    /// Returns `true` only if a live entry was faded by this call.
    pub fn fade(&self, id: &ConnectionId) -> bool {
        match self.connections.get_mut(id) {
            Some(mut entry) if !entry.is_faded() => {
                *entry = ConnectionEntry::Faded;
                debug!(connection_id = %id, "Connection faded");
                true
            }
            _ => false,
        }
    }

    /// Removes every faded entry and returns how many were removed.
    pub fn purge(&self) -> usize {
        let mut removed = 0;
        self.connections.retain(|_, entry| {
            if entry.is_faded() {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            self.total_purged.fetch_add(removed, Ordering::Relaxed);
            debug!(count = removed, "Purged faded connections");
        }
        removed
    }

    /// Looks up an entry, faded or not.
    pub fn find_by_id(&self, id: &ConnectionId) -> Option<ConnectionEntry> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    /// Returns `true` if the id is registered, faded or not.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of entries, including faded ones not yet purged.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Number of live entries.
    pub fn live_count(&self) -> usize {
        self.connections.iter().filter(|e| !e.is_faded()).count()
    }

    /// Returns `true` if there are no entries at all.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Sends one frame to one connection.
    pub fn send(&self, id: &ConnectionId, outbound: Outbound) -> SendStatus {
        let status = match self.live_handle(id) {
            Some(handle) => handle.send(outbound, &self.policy),
            None => {
                debug!(connection_id = %id, "Send to unknown or faded connection");
                SendStatus::NotFound
            }
        };
        metrics::record_message_sent(status.as_str());
        status
    }

    /// Sends one frame to every live connection.
    ///
    /// Faded entries are skipped silently. The result is `Dropped` if any
    /// live delivery failed.
    pub fn broadcast(&self, outbound: &Outbound) -> BroadcastStatus {
        let handles = self.live_handles();
        if handles.is_empty() {
            return BroadcastStatus::NoRecipients;
        }

        handles
            .iter()
            .map(|handle| {
                let status = handle.send(outbound.clone(), &self.policy);
                metrics::record_message_sent(status.as_str());
                status
            })
            .fold(BroadcastStatus::Success, BroadcastStatus::merge)
    }

    /// Closes one live connection.
    ///
    /// The entry is faded later by the session when the socket is gone.
    pub fn disconnect(&self, id: &ConnectionId, code: CloseCode, reason: &str) -> bool {
        self.live_handle(id)
            .is_some_and(|handle| handle.close(code, reason))
    }

    /// Stops accepting connections, asks every live one to close and fades
    /// it.
    ///
    /// Returns the ids faded by this call. Their sessions find the entries
    /// already faded, so the caller owns their CLOSE envelopes. Faded entries
    /// are skipped, so calling this twice is harmless.
    pub fn shut_down(&self, code: CloseCode, reason: &str) -> Vec<ConnectionId> {
        let mut shut = self.shut.write();
        *shut = true;

        let mut faded = Vec::new();
        for mut entry in self.connections.iter_mut() {
            let Some(handle) = entry.handle() else {
                continue;
            };
            handle.close(code, reason);
            faded.push(*entry.key());
            *entry = ConnectionEntry::Faded;
        }
        drop(shut);

        if !faded.is_empty() {
            info!(connections = faded.len(), code = code.as_u16(), "Closed and faded all connections");
        }
        faded
    }

    /// Returns registry statistics.
    pub fn stats(&self) -> RegistryStats {
        let mut live = 0;
        let mut faded = 0;
        for entry in self.connections.iter() {
            if entry.is_faded() {
                faded += 1;
            } else {
                live += 1;
            }
        }
        RegistryStats {
            live,
            faded,
            total_registered: self.total_registered.load(Ordering::Relaxed),
            total_purged: self.total_purged.load(Ordering::Relaxed),
        }
    }

    fn live_handle(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        self.connections
            .get(id)
            .and_then(|entry| entry.handle().cloned())
    }

    fn live_handles(&self) -> Vec<ConnectionHandle> {
        self.connections
            .iter()
            .filter_map(|entry| entry.handle().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::OutboundReceiver;

    fn register(registry: &ConnectionRegistry) -> (ConnectionId, OutboundReceiver) {
        let id = ConnectionId::new();
        let (handle, rx) = ConnectionHandle::channel(id);
        assert!(registry.register(id, handle));
        (id, rx)
    }

    #[test]
    fn test_register_and_find() {
        let registry = ConnectionRegistry::default();
        let (id, _rx) = register(&registry);

        let entry = registry.find_by_id(&id).unwrap();
        assert_eq!(entry.handle().unwrap().id(), id);
        assert!(registry.contains(&id));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_register_collision_rejected() {
        let registry = ConnectionRegistry::default();
        let (id, _rx) = register(&registry);
        let (other, _other_rx) = ConnectionHandle::channel(id);

        assert!(!registry.register(id, other));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.stats().total_registered, 1);
    }

    #[test]
    fn test_fade_keeps_entry_until_purge() {
        let registry = ConnectionRegistry::default();
        let (a, _ra) = register(&registry);
        let (b, _rb) = register(&registry);
        let (_c, _rc) = register(&registry);

        assert!(registry.fade(&a));
        assert!(!registry.fade(&a));
        assert!(registry.fade(&b));

        assert!(registry.find_by_id(&a).unwrap().is_faded());
        assert_eq!(registry.count(), 3);
        assert_eq!(registry.live_count(), 1);

        assert_eq!(registry.purge(), 2);
        assert_eq!(registry.count(), 1);
        assert!(registry.find_by_id(&a).is_none());
        assert_eq!(registry.purge(), 0);
        assert_eq!(registry.stats().total_purged, 2);
    }

    #[test]
    fn test_fade_unknown_is_noop() {
        let registry = ConnectionRegistry::default();
        assert!(!registry.fade(&ConnectionId::new()));
    }

    #[tokio::test]
    async fn test_send_to_live_faded_and_unknown() {
        let registry = ConnectionRegistry::default();
        let (id, mut rx) = register(&registry);

        assert_eq!(
            registry.send(&id, Outbound::text("pong").unwrap()),
            SendStatus::Success
        );
        assert_eq!(rx.recv().await.unwrap(), Outbound::Text("pong".into()));

        registry.fade(&id);
        assert_eq!(
            registry.send(&id, Outbound::binary(vec![1])),
            SendStatus::NotFound
        );
        assert_eq!(
            registry.send(&ConnectionId::new(), Outbound::binary(vec![1])),
            SendStatus::NotFound
        );
    }

    #[tokio::test]
    async fn test_broadcast_skips_faded() {
        let registry = ConnectionRegistry::default();
        let (a, mut ra) = register(&registry);
        let (b, mut rb) = register(&registry);
        let (c, mut rc) = register(&registry);
        registry.fade(&b);

        let status = registry.broadcast(&Outbound::binary(vec![7]));
        assert_eq!(status, BroadcastStatus::Success);

        assert_eq!(ra.recv().await.unwrap(), Outbound::binary(vec![7]));
        assert_eq!(rc.recv().await.unwrap(), Outbound::binary(vec![7]));
        assert!(rb.try_recv().is_none());
        let _ = (a, c);
    }

    #[test]
    fn test_broadcast_dropped_if_any_live_delivery_fails() {
        let registry = ConnectionRegistry::default();
        let (_a, _ra) = register(&registry);
        let (_b, rb) = register(&registry);
        drop(rb);

        let status = registry.broadcast(&Outbound::binary(vec![1]));
        assert_eq!(status, BroadcastStatus::Dropped);
    }

    #[test]
    fn test_broadcast_without_recipients() {
        let registry = ConnectionRegistry::default();
        assert_eq!(
            registry.broadcast(&Outbound::binary(vec![1])),
            BroadcastStatus::NoRecipients
        );

        let (id, _rx) = register(&registry);
        registry.fade(&id);
        assert_eq!(
            registry.broadcast(&Outbound::binary(vec![1])),
            BroadcastStatus::NoRecipients
        );
    }

    #[tokio::test]
    async fn test_shut_down_fades_live_entries_once() {
        let registry = ConnectionRegistry::default();
        let (a, mut ra) = register(&registry);
        let (b, _rb) = register(&registry);
        registry.fade(&b);

        assert_eq!(registry.shut_down(CloseCode::GoingAway, "shutdown"), vec![a]);
        assert_eq!(
            ra.recv().await.unwrap(),
            Outbound::close(CloseCode::GoingAway, "shutdown")
        );
        assert!(registry.find_by_id(&a).unwrap().is_faded());
        assert!(!registry.fade(&a));
        assert_eq!(registry.live_count(), 0);

        assert!(registry.shut_down(CloseCode::GoingAway, "shutdown").is_empty());
        assert_eq!(registry.purge(), 2);
    }

    #[test]
    fn test_register_rejected_after_shut_down_until_reopen() {
        let registry = ConnectionRegistry::default();
        registry.shut_down(CloseCode::GoingAway, "shutdown");
        assert!(!registry.is_accepting());

        let id = ConnectionId::new();
        let (handle, _rx) = ConnectionHandle::channel(id);
        let mut notified = false;
        assert!(!registry.register_then(id, handle.clone(), || notified = true));
        assert!(!notified);
        assert!(registry.is_empty());

        registry.reopen();
        assert!(registry.register_then(id, handle, || notified = true));
        assert!(notified);
        assert_eq!(registry.live_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_one() {
        let registry = ConnectionRegistry::default();
        let (id, mut rx) = register(&registry);

        assert!(registry.disconnect(&id, CloseCode::Normal, "bye"));
        assert_eq!(rx.recv().await.unwrap(), Outbound::close(CloseCode::Normal, "bye"));
        assert!(!registry.disconnect(&ConnectionId::new(), CloseCode::Normal, ""));
    }
}
