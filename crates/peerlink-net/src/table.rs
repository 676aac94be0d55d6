//! Connection table
//!
//! Fixed-capacity arena of connection records. Each slot carries a
//! generation counter that outlives the records stored in it: the counter
//! is seeded randomly at construction and bumped on every allocation, and
//! it is baked into the identifier handed to the peer. A stale identifier
//! therefore fails the equality check in [`ConnectionTable::lookup`] even
//! when its slot has been reused for a different peer.

use std::net::SocketAddr;

use peerlink_proto::{KeyId, PeerAddress};
use rand::Rng;
use tracing::debug;

use crate::error::{NetError, NetResult};
use crate::ident::{ConnectionId, GENERATION_MASK};

/// Number of well-known secondary sockets whose NAT mappings are tracked
pub const NAT_SOCKET_COUNT: usize = 2;

/// Which well-known socket a datagram arrived on.
///
/// The higher-level protocol runs two fixed sockets; NAT mappings are
/// learned per socket so later exchanges reach the peer on the port
/// mapping its NAT actually opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRole {
    /// Primary game traffic socket
    Game,
    /// QoS probe socket
    Probe,
}

impl SocketRole {
    /// Index into the per-connection NAT observation array
    pub fn index(self) -> usize {
        match self {
            SocketRole::Game => 0,
            SocketRole::Probe => 1,
        }
    }
}

/// Protocol status of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Handshake in progress
    Connecting,
    /// Ping/pong round-trip completed
    Established,
    /// Teardown in progress
    Closing,
    /// Connection failed
    Error,
}

/// One live connection
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    /// Identifier currently bound to this record's slot
    pub id: ConnectionId,

    /// Peer's address descriptor (online + LAN)
    pub peer: PeerAddress,

    /// Socket address the peer's datagrams actually arrive from
    pub observed_addr: SocketAddr,

    /// Session key this connection is associated with. Weak reference:
    /// resolved against the key registry on demand, never cached, since
    /// the registry may replace or evict the entry independently.
    pub key_id: KeyId,

    /// Protocol status
    status: ConnectionStatus,

    /// Packets sent on this connection
    pub packets_sent: u64,

    /// Packets received on this connection
    pub packets_received: u64,

    /// Bytes sent on this connection
    pub bytes_sent: u64,

    /// Bytes received on this connection
    pub bytes_received: u64,

    /// NAT-observed peer addresses, one per secondary socket role
    nat_observations: [Option<SocketAddr>; NAT_SOCKET_COUNT],

    /// Monotonic timestamp of the last successful interaction
    last_interaction_ms: u64,
}

impl ConnectionRecord {
    fn new(
        id: ConnectionId,
        peer: PeerAddress,
        observed_addr: SocketAddr,
        key_id: KeyId,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            peer,
            observed_addr,
            key_id,
            status: ConnectionStatus::Connecting,
            packets_sent: 0,
            packets_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
            nat_observations: [None; NAT_SOCKET_COUNT],
            last_interaction_ms: now_ms,
        }
    }

    /// Get protocol status
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Set protocol status
    pub fn set_status(&mut self, status: ConnectionStatus) {
        debug!(
            "connection {} status: {:?} -> {:?}",
            self.id, self.status, status
        );
        self.status = status;
    }

    /// Check whether the handshake has completed
    pub fn is_established(&self) -> bool {
        self.status == ConnectionStatus::Established
    }

    /// Update the last-interaction timestamp
    pub fn touch(&mut self, now_ms: u64) {
        self.last_interaction_ms = now_ms;
    }

    /// Monotonic timestamp of the last interaction
    pub fn last_interaction_ms(&self) -> u64 {
        self.last_interaction_ms
    }

    /// Account for an outbound packet
    pub fn record_sent(&mut self, bytes: u64, now_ms: u64) {
        self.packets_sent += 1;
        self.bytes_sent += bytes;
        self.touch(now_ms);
    }

    /// Account for an inbound packet
    pub fn record_received(&mut self, bytes: u64, now_ms: u64) {
        self.packets_received += 1;
        self.bytes_received += bytes;
        self.touch(now_ms);
    }

    /// NAT-observed address for a socket role, if learned
    pub fn nat_observation(&self, role: SocketRole) -> Option<SocketAddr> {
        self.nat_observations[role.index()]
    }

    /// Store a NAT-observed address for a socket role
    pub fn set_nat_observation(&mut self, role: SocketRole, addr: SocketAddr) {
        self.nat_observations[role.index()] = Some(addr);
    }

    /// Does this datagram source address belong to this connection?
    pub fn matches_addr(&self, addr: SocketAddr) -> bool {
        self.observed_addr == addr || self.nat_observations.iter().any(|o| *o == Some(addr))
    }
}

struct Slot {
    generation: u32,
    record: Option<ConnectionRecord>,
}

/// Fixed-capacity arena of connection records
pub struct ConnectionTable {
    slots: Vec<Slot>,
}

impl ConnectionTable {
    /// Create a table with `capacity` slots and randomly seeded
    /// generation counters.
    pub fn new(capacity: usize) -> Self {
        let mut rng = rand::thread_rng();
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: rng.gen::<u32>() & GENERATION_MASK,
                record: None,
            })
            .collect();
        Self { slots }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of valid (occupied) slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.record.is_some()).count()
    }

    /// Whether the table holds no connections
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.record.is_none())
    }

    /// Resolve an identifier to its record.
    ///
    /// Returns `None` for out-of-range slots, empty slots, and stale
    /// identifiers whose generation no longer matches. This is the
    /// expected cheap negative path for spoofed or late datagrams.
    pub fn lookup(&self, id: ConnectionId) -> Option<&ConnectionRecord> {
        self.slots
            .get(id.slot())?
            .record
            .as_ref()
            .filter(|r| r.id == id)
    }

    /// Mutable variant of [`ConnectionTable::lookup`]
    pub fn lookup_mut(&mut self, id: ConnectionId) -> Option<&mut ConnectionRecord> {
        self.slots
            .get_mut(id.slot())?
            .record
            .as_mut()
            .filter(|r| r.id == id)
    }

    /// Allocate the first free slot for a new connection.
    ///
    /// Bumps the slot generation so the returned identifier differs from
    /// every identifier the slot has carried before.
    pub fn insert(
        &mut self,
        peer: PeerAddress,
        observed_addr: SocketAddr,
        key_id: KeyId,
        now_ms: u64,
    ) -> NetResult<ConnectionId> {
        let capacity = self.capacity();
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.record.is_none())
            .ok_or(NetError::TableFull { capacity })?;

        slot.generation = slot.generation.wrapping_add(1) & GENERATION_MASK;
        let id = ConnectionId::encode(index, slot.generation);
        slot.record = Some(ConnectionRecord::new(id, peer, observed_addr, key_id, now_ms));

        debug!("connection {} bound to slot {}", id, index);
        Ok(id)
    }

    /// Clear a slot and return its record. Idempotent: removing an
    /// identifier that no longer resolves returns `None`.
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionRecord> {
        let slot = self.slots.get_mut(id.slot())?;
        if slot.record.as_ref().is_some_and(|r| r.id == id) {
            debug!("connection {} unbound from slot {}", id, id.slot());
            slot.record.take()
        } else {
            None
        }
    }

    /// Find the connection a datagram source address belongs to
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.iter().find(|r| r.matches_addr(addr)).map(|r| r.id)
    }

    /// Iterate over valid records
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.slots.iter().filter_map(|s| s.record.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn peer() -> PeerAddress {
        PeerAddress {
            lan_ip: Ipv4Addr::new(192, 168, 0, 2),
            online_ip: Ipv4Addr::new(203, 0, 113, 9),
            port: 1000,
            mac: [2u8; 6],
            online_key: [3u8; 20],
        }
    }

    fn key_id() -> KeyId {
        KeyId::from_bytes([1u8; 8])
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([203, 0, 113, 9], port))
    }

    #[test]
    fn test_insert_then_lookup() {
        let mut table = ConnectionTable::new(4);
        let id = table.insert(peer(), addr(1000), key_id(), 100).unwrap();

        let record = table.lookup(id).expect("fresh identifier must resolve");
        assert_eq!(record.status(), ConnectionStatus::Connecting);
        assert_eq!(record.observed_addr, addr(1000));
        assert_eq!(record.last_interaction_ms(), 100);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut table = ConnectionTable::new(4);
        let id = table.insert(peer(), addr(1000), key_id(), 0).unwrap();

        assert!(table.remove(id).is_some());
        assert!(table.lookup(id).is_none());
        assert!(table.remove(id).is_none());
    }

    #[test]
    fn test_table_full() {
        let mut table = ConnectionTable::new(2);
        table.insert(peer(), addr(1), key_id(), 0).unwrap();
        table.insert(peer(), addr(2), key_id(), 0).unwrap();

        let err = table.insert(peer(), addr(3), key_id(), 0).unwrap_err();
        assert!(matches!(err, NetError::TableFull { capacity: 2 }));
    }

    #[test]
    fn test_slot_reuse_gets_fresh_identifier() {
        let mut table = ConnectionTable::new(1);
        let first = table.insert(peer(), addr(1000), key_id(), 0).unwrap();
        table.remove(first);

        let second = table.insert(peer(), addr(1000), key_id(), 0).unwrap();
        assert_eq!(first.slot(), second.slot());
        assert_ne!(first, second);

        // The stale identifier must not resolve to the new occupant.
        assert!(table.lookup(first).is_none());
        assert!(table.lookup(second).is_some());
    }

    #[test]
    fn test_foreign_identifier_does_not_resolve() {
        let mut table = ConnectionTable::new(4);
        let id = table.insert(peer(), addr(1000), key_id(), 0).unwrap();

        let forged = ConnectionId::encode(id.slot(), id.generation() ^ 1);
        assert!(table.lookup(forged).is_none());

        let out_of_range = ConnectionId::encode(200, 7);
        assert!(table.lookup(out_of_range).is_none());
    }

    #[test]
    fn test_find_by_addr_checks_nat_observations() {
        let mut table = ConnectionTable::new(4);
        let id = table.insert(peer(), addr(1000), key_id(), 0).unwrap();

        assert_eq!(table.find_by_addr(addr(1000)), Some(id));
        assert_eq!(table.find_by_addr(addr(1001)), None);

        table
            .lookup_mut(id)
            .unwrap()
            .set_nat_observation(SocketRole::Probe, addr(1001));
        assert_eq!(table.find_by_addr(addr(1001)), Some(id));
    }

    #[test]
    fn test_counters_accumulate_and_touch() {
        let mut table = ConnectionTable::new(4);
        let id = table.insert(peer(), addr(1000), key_id(), 0).unwrap();

        let record = table.lookup_mut(id).unwrap();
        record.record_received(84, 10);
        record.record_sent(84, 20);

        let record = table.lookup(id).unwrap();
        assert_eq!(record.packets_received, 1);
        assert_eq!(record.packets_sent, 1);
        assert_eq!(record.bytes_received, 84);
        assert_eq!(record.bytes_sent, 84);
        assert_eq!(record.last_interaction_ms(), 20);
    }
}
