//! Connection manager
//!
//! The single context object owning the connection table, the key
//! registry, and the local identity. There is no process-wide singleton:
//! the caller (normally the socket-loop collaborator) constructs one
//! manager and passes it by reference into every core operation. All
//! methods are synchronous and bounded by the table capacity; callers
//! running multiple socket threads wrap the manager in their own lock.

use std::net::SocketAddr;

use peerlink_proto::{KeyId, KeyMaterial, PeerAddress};
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::config::NetConfig;
use crate::error::NetResult;
use crate::ident::ConnectionId;
use crate::identity::LocalIdentity;
use crate::keys::{KeyPairRecord, KeyRegistry};
use crate::table::{ConnectionRecord, ConnectionTable, SocketRole};
use crate::CONNECTION_TIMEOUT_MS;

/// Hooks fired toward the event-dispatch collaborator.
///
/// All methods have empty defaults; implement only what you need.
pub trait NetEvents: Send {
    /// A connection was evicted or explicitly unregistered
    fn peer_departed(&mut self, _id: ConnectionId) {}

    /// A valid presence broadcast arrived on the local segment
    fn peer_announced(&mut self, _from: SocketAddr) {}
}

/// Aggregate statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetStats {
    /// Valid connection slots
    pub connections: usize,
    /// Connections past the handshake
    pub established: usize,
    /// Packets sent across all connections
    pub packets_sent: u64,
    /// Packets received across all connections
    pub packets_received: u64,
    /// Bytes sent across all connections
    pub bytes_sent: u64,
    /// Bytes received across all connections
    pub bytes_received: u64,
    /// Datagrams discarded by header/size validation
    pub malformed_datagrams: u64,
}

/// Owner of the connection table, key registry, and local identity
pub struct ConnectionManager {
    pub(crate) config: NetConfig,
    pub(crate) table: ConnectionTable,
    pub(crate) keys: KeyRegistry,
    pub(crate) local: Option<LocalIdentity>,
    pub(crate) events: Option<Box<dyn NetEvents>>,
    pub(crate) malformed_datagrams: u64,
}

impl ConnectionManager {
    /// Create a manager from a validated configuration
    pub fn new(config: NetConfig) -> NetResult<Self> {
        config.validate()?;
        debug!(
            "connection manager up: {} connection slots, {} key slots",
            config.max_connections, config.max_key_pairs
        );
        Ok(Self {
            table: ConnectionTable::new(config.max_connections),
            keys: KeyRegistry::new(config.max_key_pairs),
            local: None,
            events: None,
            malformed_datagrams: 0,
            config,
        })
    }

    /// The configuration supplied at construction
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Register the event-dispatch hook
    pub fn set_event_hook(&mut self, events: Box<dyn NetEvents>) {
        self.events = Some(events);
    }

    // === connection table ===

    /// Resolve an identifier to its record; `None` for stale, foreign,
    /// or out-of-range identifiers.
    pub fn lookup(&self, id: ConnectionId) -> Option<&ConnectionRecord> {
        self.table.lookup(id)
    }

    /// Create a connection for a newly observed peer, or update the
    /// existing one for repeat contact with a known source address.
    pub fn create_or_update(
        &mut self,
        observed_addr: SocketAddr,
        peer: PeerAddress,
        key_id: KeyId,
        from_connect_packet: bool,
        now_ms: u64,
    ) -> NetResult<ConnectionId> {
        if let Some(id) = self.table.find_by_addr(observed_addr) {
            if let Some(record) = self.table.lookup_mut(id) {
                record.peer = peer;
                record.key_id = key_id;
                record.touch(now_ms);
            }
            return Ok(id);
        }

        let id = self.table.insert(peer, observed_addr, key_id, now_ms)?;
        debug!(
            "connection {} created for {} ({})",
            id,
            observed_addr,
            if from_connect_packet {
                "inbound connect"
            } else {
                "outbound connect"
            }
        );
        Ok(id)
    }

    /// Update a connection's last-interaction timestamp. Returns false
    /// (and logs) when the identifier no longer resolves; this is an
    /// expected condition, not an error.
    pub fn touch(&mut self, id: ConnectionId, now_ms: u64) -> bool {
        match self.table.lookup_mut(id) {
            Some(record) => {
                record.touch(now_ms);
                true
            }
            None => {
                warn!("touch on unresolved connection identifier {}", id);
                false
            }
        }
    }

    /// Tear down a connection. Idempotent; fires the peer-departed hook
    /// when a record was actually removed.
    pub fn unregister(&mut self, id: ConnectionId) {
        if self.table.remove(id).is_some() {
            if let Some(events) = self.events.as_mut() {
                events.peer_departed(id);
            }
        }
    }

    /// Store a NAT-observed peer address for one of the secondary socket
    /// roles. Returns false if the identifier no longer resolves.
    pub fn record_nat_observation(
        &mut self,
        id: ConnectionId,
        role: SocketRole,
        addr: SocketAddr,
    ) -> bool {
        match self.table.lookup_mut(id) {
            Some(record) => {
                record.set_nat_observation(role, addr);
                true
            }
            None => {
                warn!("NAT observation for unresolved connection identifier {}", id);
                false
            }
        }
    }

    /// Account for an outbound packet the socket collaborator just sent
    pub fn record_sent(&mut self, id: ConnectionId, bytes: u64, now_ms: u64) -> bool {
        match self.table.lookup_mut(id) {
            Some(record) => {
                record.record_sent(bytes, now_ms);
                true
            }
            None => false,
        }
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.table.len()
    }

    /// Resolve a connection's session key against the registry.
    ///
    /// Performed on demand every time: the registry may have replaced or
    /// evicted the entry since the connection was created.
    pub fn connection_key(&self, id: ConnectionId) -> Option<&KeyPairRecord> {
        let record = self.table.lookup(id)?;
        self.keys.lookup(&record.key_id)
    }

    // === liveness sweep ===

    /// Evict every connection silent for longer than
    /// [`CONNECTION_TIMEOUT_MS`]. Strictly longer: a connection at
    /// exactly the timeout survives this sweep.
    ///
    /// Synchronous scan; cadence is the caller's event loop's business.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let expired: Vec<ConnectionId> = self
            .table
            .iter()
            .filter(|r| now_ms.saturating_sub(r.last_interaction_ms()) > CONNECTION_TIMEOUT_MS)
            .map(|r| r.id)
            .collect();

        let count = expired.len();
        for id in expired {
            debug!("sweeping lost connection {}", id);
            self.unregister(id);
        }
        count
    }

    // === key registry ===

    /// Register session key material; replaces on duplicate key id
    pub fn register_key(&mut self, key_id: KeyId, key_material: KeyMaterial) -> NetResult<()> {
        self.keys.register(key_id, key_material)
    }

    /// Remove session key material; no-op if absent
    pub fn unregister_key(&mut self, key_id: &KeyId) {
        self.keys.unregister(key_id)
    }

    /// Look up a registered key pair
    pub fn key_pair(&self, key_id: &KeyId) -> Option<&KeyPairRecord> {
        self.keys.lookup(key_id)
    }

    /// The most recently registered key pair, if still present
    pub fn most_recent_key(&self) -> Option<&KeyPairRecord> {
        self.keys.most_recent()
    }

    // === local identity ===

    /// Populate the local identity record. Later calls overwrite.
    pub fn setup_local_identity(&mut self, addr: PeerAddress) {
        debug!("local identity set up ({}, {})", addr.online_ip, addr.lan_ip);
        self.local = Some(LocalIdentity::new(addr));
    }

    /// Securely zero and drop the local identity
    pub fn teardown_local_identity(&mut self) {
        if let Some(mut identity) = self.local.take() {
            identity.zeroize();
            debug!("local identity torn down");
        }
    }

    /// The local identity, or `None` before setup — a normal, checkable
    /// state rather than an error.
    pub fn local_identity(&self) -> Option<&LocalIdentity> {
        self.local.as_ref()
    }

    // === statistics ===

    /// Aggregate snapshot across all connections
    pub fn stats(&self) -> NetStats {
        let mut stats = NetStats {
            connections: self.table.len(),
            malformed_datagrams: self.malformed_datagrams,
            ..Default::default()
        };

        for record in self.table.iter() {
            if record.is_established() {
                stats.established += 1;
            }
            stats.packets_sent += record.packets_sent;
            stats.packets_received += record.packets_received;
            stats.bytes_sent += record.bytes_sent;
            stats.bytes_received += record.bytes_received;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::{Arc, Mutex};

    fn manager(slots: usize) -> ConnectionManager {
        ConnectionManager::new(NetConfig {
            max_connections: slots,
            max_key_pairs: 4,
            ..Default::default()
        })
        .unwrap()
    }

    fn peer() -> PeerAddress {
        PeerAddress {
            lan_ip: Ipv4Addr::new(192, 168, 0, 7),
            online_ip: Ipv4Addr::new(203, 0, 113, 7),
            port: 1000,
            mac: [7u8; 6],
            online_key: [8u8; 20],
        }
    }

    fn key_id() -> KeyId {
        KeyId::from_bytes([5u8; 8])
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([203, 0, 113, 7], port))
    }

    struct Departures(Arc<Mutex<Vec<ConnectionId>>>);

    impl NetEvents for Departures {
        fn peer_departed(&mut self, id: ConnectionId) {
            self.0.lock().unwrap().push(id);
        }
    }

    #[test]
    fn test_create_then_lookup_until_unregistered() {
        let mut mgr = manager(4);
        let id = mgr
            .create_or_update(addr(1000), peer(), key_id(), true, 0)
            .unwrap();

        assert!(mgr.lookup(id).is_some());
        assert_eq!(mgr.connection_count(), 1);

        mgr.unregister(id);
        assert!(mgr.lookup(id).is_none());
        assert_eq!(mgr.connection_count(), 0);
    }

    #[test]
    fn test_repeat_contact_updates_instead_of_allocating() {
        let mut mgr = manager(4);
        let first = mgr
            .create_or_update(addr(1000), peer(), key_id(), true, 0)
            .unwrap();
        let second = mgr
            .create_or_update(addr(1000), peer(), key_id(), true, 500)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(mgr.connection_count(), 1);
        assert_eq!(mgr.lookup(first).unwrap().last_interaction_ms(), 500);
    }

    #[test]
    fn test_touch_unknown_identifier_is_reported_noop() {
        let mut mgr = manager(4);
        assert!(!mgr.touch(ConnectionId::encode(0, 1), 100));
    }

    #[test]
    fn test_sweep_boundary() {
        let mut mgr = manager(4);
        let id = mgr
            .create_or_update(addr(1000), peer(), key_id(), true, 1_000)
            .unwrap();

        // Exactly at the timeout: survives.
        assert_eq!(mgr.sweep(1_000 + CONNECTION_TIMEOUT_MS), 0);
        assert!(mgr.lookup(id).is_some());

        // One past the timeout: evicted.
        assert_eq!(mgr.sweep(1_000 + CONNECTION_TIMEOUT_MS + 1), 1);
        assert!(mgr.lookup(id).is_none());
    }

    #[test]
    fn test_sweep_only_evicts_silent_connections() {
        let mut mgr = manager(4);
        let stale = mgr
            .create_or_update(addr(1000), peer(), key_id(), true, 0)
            .unwrap();
        let fresh = mgr
            .create_or_update(addr(2000), peer(), key_id(), true, 0)
            .unwrap();

        mgr.touch(fresh, 20_000);
        assert_eq!(mgr.sweep(20_000), 1);
        assert!(mgr.lookup(stale).is_none());
        assert!(mgr.lookup(fresh).is_some());
    }

    #[test]
    fn test_departure_hook_fires_on_unregister_and_sweep() {
        let departed = Arc::new(Mutex::new(Vec::new()));
        let mut mgr = manager(4);
        mgr.set_event_hook(Box::new(Departures(departed.clone())));

        let a = mgr
            .create_or_update(addr(1000), peer(), key_id(), true, 0)
            .unwrap();
        let b = mgr
            .create_or_update(addr(2000), peer(), key_id(), true, 0)
            .unwrap();

        mgr.unregister(a);
        mgr.unregister(a); // idempotent, must not re-fire
        mgr.sweep(CONNECTION_TIMEOUT_MS + 1);

        assert_eq!(*departed.lock().unwrap(), vec![a, b]);
    }

    #[test]
    fn test_connection_key_resolves_live_registry_entry() {
        let mut mgr = manager(4);
        mgr.register_key(key_id(), KeyMaterial::from_bytes([1u8; 16]))
            .unwrap();
        let id = mgr
            .create_or_update(addr(1000), peer(), key_id(), true, 0)
            .unwrap();

        assert!(mgr.connection_key(id).is_some());

        // Registry replacement is visible through the weak reference.
        mgr.register_key(key_id(), KeyMaterial::from_bytes([2u8; 16]))
            .unwrap();
        assert_eq!(
            mgr.connection_key(id).unwrap().key_material,
            KeyMaterial::from_bytes([2u8; 16])
        );

        // Eviction is too.
        mgr.unregister_key(&key_id());
        assert!(mgr.connection_key(id).is_none());
    }

    #[test]
    fn test_local_identity_lifecycle() {
        let mut mgr = manager(4);
        assert!(mgr.local_identity().is_none());

        mgr.setup_local_identity(peer());
        assert_eq!(mgr.local_identity().unwrap().addr, peer());

        mgr.teardown_local_identity();
        assert!(mgr.local_identity().is_none());
    }

    #[test]
    fn test_stats_aggregate() {
        let mut mgr = manager(4);
        let id = mgr
            .create_or_update(addr(1000), peer(), key_id(), true, 0)
            .unwrap();
        mgr.record_sent(id, 84, 10);

        let stats = mgr.stats();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.bytes_sent, 84);
        assert_eq!(stats.established, 0);
    }
}
