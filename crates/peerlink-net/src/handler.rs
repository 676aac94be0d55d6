//! Handshake protocol handler
//!
//! Consumes raw datagrams delivered by the socket collaborator, decides
//! the packet kind, mutates the connection table accordingly, and hands
//! back any reply for the collaborator to send. The handler never touches
//! a socket itself.
//!
//! Per-connection state machine:
//!
//! ```text
//! unknown -> connecting   first secure-establish received or sent
//! connecting -> established   first completed ping/pong round-trip
//! established -> closed   secure-close, explicit unregister, or timeout
//! ```
//!
//! Closed is terminal: the slot is freed, and a later secure-establish
//! from the same remote address allocates a new slot and identifier.
//!
//! Malformed or foreign traffic on the shared socket is expected, so
//! header/size validation failures discard the datagram silently; they
//! are counted but never surfaced as errors.

use std::net::SocketAddr;

use bytes::Bytes;
use peerlink_proto::{
    BroadcastPacket, KeyId, PeerAddress, RequestKind, RequestPacket, WirePacket,
};
use tracing::{debug, trace, warn};

use crate::error::{NetError, NetResult};
use crate::ident::ConnectionId;
use crate::manager::ConnectionManager;
use crate::table::{ConnectionStatus, SocketRole};

/// A packet the socket collaborator should send
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Destination address
    pub dest: SocketAddr,
    /// Encoded packet bytes
    pub bytes: Bytes,
}

impl ConnectionManager {
    /// Process one inbound datagram.
    ///
    /// `role` names the well-known socket the datagram arrived on, `from`
    /// its source address, and `now_ms` the caller's monotonic clock.
    /// Returns the reply to send, if the protocol calls for one.
    pub fn handle_datagram(
        &mut self,
        role: SocketRole,
        from: SocketAddr,
        data: &[u8],
        now_ms: u64,
    ) -> Option<Outbound> {
        let packet = match WirePacket::parse(data) {
            Ok(packet) => packet,
            Err(e) => {
                self.malformed_datagrams += 1;
                trace!("discarding datagram from {}: {}", from, e);
                return None;
            }
        };

        match packet {
            WirePacket::Broadcast => {
                debug!("presence broadcast from {}", from);
                if let Some(events) = self.events.as_mut() {
                    events.peer_announced(from);
                }
                None
            }
            WirePacket::Request(request) => {
                self.handle_request(role, from, request, data.len() as u64, now_ms)
            }
        }
    }

    fn handle_request(
        &mut self,
        role: SocketRole,
        from: SocketAddr,
        request: RequestPacket,
        wire_len: u64,
        now_ms: u64,
    ) -> Option<Outbound> {
        match request.kind {
            RequestKind::Ping | RequestKind::Pong => {
                // Keepalive traffic only ever refers to a connection we
                // already know by source address; anything else is late
                // or spoofed and is ignored.
                let id = self.table.find_by_addr(from)?;
                let record = self.table.lookup_mut(id)?;
                record.record_received(wire_len, now_ms);

                // Any keepalive from the peer proves our traffic reached
                // it, which completes the handshake round-trip.
                if record.status() == ConnectionStatus::Connecting {
                    record.set_status(ConnectionStatus::Established);
                }

                match request.kind {
                    RequestKind::Ping => Some(self.reply_pong(id, from, request.key_id, now_ms)),
                    _ => None,
                }
            }

            RequestKind::SecureClose => {
                let id = self.table.find_by_addr(from)?;
                debug!("secure-close from {}, dropping connection {}", from, id);
                self.unregister(id);
                None
            }

            RequestKind::SecureEstablish => {
                if self.keys.lookup(&request.key_id).is_none() {
                    debug!(
                        "secure-establish from {} for unregistered key id {}, ignoring",
                        from, request.key_id
                    );
                    return None;
                }

                let id = match self.create_or_update(from, request.address, request.key_id, true, now_ms)
                {
                    Ok(id) => id,
                    Err(e) => {
                        warn!("cannot accept connection from {}: {}", from, e);
                        return None;
                    }
                };

                self.record_nat_observation(id, role, from);
                if let Some(record) = self.table.lookup_mut(id) {
                    record.record_received(wire_len, now_ms);
                }

                Some(self.reply_pong(id, from, request.key_id, now_ms))
            }
        }
    }

    fn reply_pong(
        &mut self,
        id: ConnectionId,
        dest: SocketAddr,
        key_id: KeyId,
        now_ms: u64,
    ) -> Outbound {
        let bytes = RequestPacket::pong(key_id).to_bytes();
        if let Some(record) = self.table.lookup_mut(id) {
            record.record_sent(bytes.len() as u64, now_ms);
        }
        Outbound { dest, bytes }
    }

    /// Initiate a connection toward a peer.
    ///
    /// Allocates a connecting slot and returns the secure-establish
    /// request to send. Requires the key id to be registered and the
    /// local identity to be set up, since the request carries our own
    /// address descriptor.
    pub fn connect(
        &mut self,
        dest: SocketAddr,
        peer: PeerAddress,
        key_id: KeyId,
        now_ms: u64,
    ) -> NetResult<(ConnectionId, Outbound)> {
        if self.keys.lookup(&key_id).is_none() {
            return Err(NetError::UnknownKeyId(key_id));
        }
        let local = self.local.as_ref().ok_or(NetError::NoLocalIdentity)?;

        let request = RequestPacket::secure_establish(key_id, local.addr);
        let id = self.create_or_update(dest, peer, key_id, false, now_ms)?;

        let bytes = request.to_bytes();
        if let Some(record) = self.table.lookup_mut(id) {
            record.record_sent(bytes.len() as u64, now_ms);
        }

        Ok((id, Outbound { dest, bytes }))
    }

    /// Encode a presence announcement for the subnet broadcast address
    pub fn presence_announcement(&self) -> Bytes {
        BroadcastPacket.to_bytes()
    }
}
