//! Handshake packet shapes
//!
//! Two wire shapes share a fixed header of a 4-byte magic tag plus a
//! 32-byte null-padded ASCII identifier string. The string exists purely
//! as a sanity check against misrouted or truncated datagrams on the
//! shared game socket; both fields must match byte-exact or the datagram
//! is discarded.
//!
//! Wire layout:
//!
//! ```text
//! broadcast: [magic: 4][header string: 32]
//! request:   [magic: 4][header string: 32][key id: 8][kind: 4][address: 36]
//! ```
//!
//! The request body always carries the full union payload (sized to the
//! address-descriptor variant); kinds that use no address send it zeroed.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtoError, ProtoResult};
use crate::types::{KeyId, PeerAddress, KEY_ID_LEN};

/// Length of the fixed ASCII identifier string
pub const HEADER_STR_LEN: usize = 32;

/// Packet header length (magic + identifier string)
pub const HEADER_LEN: usize = 4 + HEADER_STR_LEN;

/// Total broadcast packet length (header only)
pub const BROADCAST_LEN: usize = HEADER_LEN;

/// Total request packet length (header + key id + kind + union payload)
pub const REQUEST_LEN: usize = HEADER_LEN + KEY_ID_LEN + 4 + PeerAddress::WIRE_LEN;

/// Magic tag of request packets, big-endian "PLrq"
pub const REQUEST_MAGIC: u32 = u32::from_be_bytes(*b"PLrq");

/// Magic tag of broadcast packets, big-endian "PLbc"
pub const BROADCAST_MAGIC: u32 = u32::from_be_bytes(*b"PLbc");

/// Identifier string carried by request packets
pub const REQUEST_HEADER_STR: [u8; HEADER_STR_LEN] = pad_header_str("peerlink-request");

/// Identifier string carried by broadcast packets
pub const BROADCAST_HEADER_STR: [u8; HEADER_STR_LEN] = pad_header_str("peerlink-broadcast");

const fn pad_header_str(s: &str) -> [u8; HEADER_STR_LEN] {
    let bytes = s.as_bytes();
    let mut out = [0u8; HEADER_STR_LEN];
    let mut i = 0;
    while i < bytes.len() {
        out[i] = bytes[i];
        i += 1;
    }
    out
}

/// Request discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RequestKind {
    /// Keepalive probe
    Ping = 0x0,

    /// Keepalive answer; completes the handshake round-trip
    Pong = 0x2,

    /// Tear down the secure connection immediately
    SecureClose = 0x4,

    /// Establish a secure connection; carries the sender's address descriptor
    SecureEstablish = 0x8,
}

impl TryFrom<u32> for RequestKind {
    type Error = ProtoError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Ping),
            0x2 => Ok(Self::Pong),
            0x4 => Ok(Self::SecureClose),
            0x8 => Ok(Self::SecureEstablish),
            other => Err(ProtoError::UnknownRequestKind(other)),
        }
    }
}

/// Presence announcement sent to the subnet broadcast address.
///
/// Carries nothing beyond the header; the sender's address is implicit
/// from the datagram source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastPacket;

impl BroadcastPacket {
    /// Serialize to bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(BROADCAST_LEN);
        buf.put_u32(BROADCAST_MAGIC);
        buf.put_slice(&BROADCAST_HEADER_STR);
        buf.freeze()
    }
}

/// Handshake request packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPacket {
    /// Network session-key identifier the request refers to
    pub key_id: KeyId,

    /// Request discriminant
    pub kind: RequestKind,

    /// Union payload; meaningful only for [`RequestKind::SecureEstablish`]
    pub address: PeerAddress,
}

impl RequestPacket {
    /// Create a ping request
    pub fn ping(key_id: KeyId) -> Self {
        Self {
            key_id,
            kind: RequestKind::Ping,
            address: PeerAddress::empty(),
        }
    }

    /// Create a pong request
    pub fn pong(key_id: KeyId) -> Self {
        Self {
            key_id,
            kind: RequestKind::Pong,
            address: PeerAddress::empty(),
        }
    }

    /// Create a secure-close request
    pub fn secure_close(key_id: KeyId) -> Self {
        Self {
            key_id,
            kind: RequestKind::SecureClose,
            address: PeerAddress::empty(),
        }
    }

    /// Create a secure-establish request carrying the sender's descriptor
    pub fn secure_establish(key_id: KeyId, address: PeerAddress) -> Self {
        Self {
            key_id,
            kind: RequestKind::SecureEstablish,
            address,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(REQUEST_LEN);
        buf.put_u32(REQUEST_MAGIC);
        buf.put_slice(&REQUEST_HEADER_STR);
        buf.put_slice(self.key_id.as_bytes());
        buf.put_u32_ne(self.kind as u32);
        self.address.encode(&mut buf);
        buf.freeze()
    }
}

/// A validated inbound datagram, classified by magic tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirePacket {
    /// Presence announcement
    Broadcast,
    /// Handshake request
    Request(RequestPacket),
}

impl WirePacket {
    /// Parse and validate a raw datagram.
    ///
    /// Validation order: header length, magic tag, declared-size check
    /// against the bytes actually received, identifier string, then the
    /// type-specific body. Any failure rejects the datagram before any
    /// state could be mutated.
    pub fn parse(data: &[u8]) -> ProtoResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(ProtoError::Truncated {
                needed: HEADER_LEN,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let magic = buf.get_u32();

        let (expected_len, expected_str) = match magic {
            BROADCAST_MAGIC => (BROADCAST_LEN, &BROADCAST_HEADER_STR),
            REQUEST_MAGIC => (REQUEST_LEN, &REQUEST_HEADER_STR),
            other => return Err(ProtoError::BadMagic(other)),
        };

        if data.len() != expected_len {
            return Err(ProtoError::LengthMismatch {
                expected: expected_len,
                actual: data.len(),
            });
        }

        let mut header_str = [0u8; HEADER_STR_LEN];
        buf.copy_to_slice(&mut header_str);
        if header_str != *expected_str {
            return Err(ProtoError::BadHeaderString);
        }

        if magic == BROADCAST_MAGIC {
            return Ok(Self::Broadcast);
        }

        let mut key_id = [0u8; KEY_ID_LEN];
        buf.copy_to_slice(&mut key_id);
        let kind = RequestKind::try_from(buf.get_u32_ne())?;
        let address = PeerAddress::decode(&mut buf)?;

        Ok(Self::Request(RequestPacket {
            key_id: KeyId::from_bytes(key_id),
            kind,
            address,
        }))
    }
}
