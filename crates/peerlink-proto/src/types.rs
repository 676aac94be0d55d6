//! Opaque value types carried by the handshake protocol
//!
//! These are stored and forwarded by the identity layer but never
//! interpreted by it: the key material belongs to a higher-level
//! authenticated exchange, the address descriptor to the socket layer.

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ProtoError, ProtoResult};

/// Size of a session-key identifier in bytes
pub const KEY_ID_LEN: usize = 8;

/// Size of session-key secret material in bytes
pub const KEY_MATERIAL_LEN: usize = 16;

/// Session-key identifier.
///
/// Opaque 8-byte value chosen by the higher-level authentication exchange.
/// Carried in every request packet so the receiver can associate the
/// connection with previously registered key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(pub [u8; KEY_ID_LEN]);

impl KeyId {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; KEY_ID_LEN] {
        &self.0
    }

    /// Hex form for display and logging
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Session-key secret material.
///
/// Never logged, never sent on the wire by this layer; zeroed on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial(pub [u8; KEY_MATERIAL_LEN]);

impl KeyMaterial {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_MATERIAL_LEN]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes (use with caution!)
    pub fn as_bytes(&self) -> &[u8; KEY_MATERIAL_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyMaterial(..)")
    }
}

/// A peer's full network address descriptor.
///
/// Describes how a peer can be reached both on the local segment and
/// through its externally visible ("online") address. This is the single
/// union variant carried by secure-establish request packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddress {
    /// LAN address on the local segment
    pub lan_ip: Ipv4Addr,

    /// Externally reachable online address
    pub online_ip: Ipv4Addr,

    /// Port the peer listens on
    pub port: u16,

    /// Ethernet hardware address
    pub mac: [u8; 6],

    /// Opaque online service key bytes
    pub online_key: [u8; 20],
}

impl PeerAddress {
    /// Encoded size on the wire
    pub const WIRE_LEN: usize = 4 + 4 + 2 + 6 + 20;

    /// A zeroed descriptor, used as union padding for request kinds that
    /// carry no address.
    pub fn empty() -> Self {
        Self {
            lan_ip: Ipv4Addr::UNSPECIFIED,
            online_ip: Ipv4Addr::UNSPECIFIED,
            port: 0,
            mac: [0u8; 6],
            online_key: [0u8; 20],
        }
    }

    /// Append the wire form to a buffer
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.lan_ip.octets());
        buf.put_slice(&self.online_ip.octets());
        buf.put_u16_ne(self.port);
        buf.put_slice(&self.mac);
        buf.put_slice(&self.online_key);
    }

    /// Decode the wire form from a buffer
    pub fn decode<B: Buf>(buf: &mut B) -> ProtoResult<Self> {
        if buf.remaining() < Self::WIRE_LEN {
            return Err(ProtoError::Truncated {
                needed: Self::WIRE_LEN,
                actual: buf.remaining(),
            });
        }

        let mut lan = [0u8; 4];
        buf.copy_to_slice(&mut lan);
        let mut online = [0u8; 4];
        buf.copy_to_slice(&mut online);
        let port = buf.get_u16_ne();
        let mut mac = [0u8; 6];
        buf.copy_to_slice(&mut mac);
        let mut online_key = [0u8; 20];
        buf.copy_to_slice(&mut online_key);

        Ok(Self {
            lan_ip: Ipv4Addr::from(lan),
            online_ip: Ipv4Addr::from(online),
            port,
            mac,
            online_key,
        })
    }
}

impl Zeroize for PeerAddress {
    fn zeroize(&mut self) {
        self.lan_ip = Ipv4Addr::UNSPECIFIED;
        self.online_ip = Ipv4Addr::UNSPECIFIED;
        self.port.zeroize();
        self.mac.zeroize();
        self.online_key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn sample_address() -> PeerAddress {
        PeerAddress {
            lan_ip: Ipv4Addr::new(192, 168, 1, 10),
            online_ip: Ipv4Addr::new(203, 0, 113, 7),
            port: 2000,
            mac: [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01],
            online_key: [0x42; 20],
        }
    }

    #[test]
    fn test_address_roundtrip() {
        let addr = sample_address();
        let mut buf = BytesMut::new();
        addr.encode(&mut buf);
        assert_eq!(buf.len(), PeerAddress::WIRE_LEN);

        let decoded = PeerAddress::decode(&mut buf.freeze()).unwrap();
        assert_eq!(addr, decoded);
    }

    #[test]
    fn test_address_truncated() {
        let addr = sample_address();
        let mut buf = BytesMut::new();
        addr.encode(&mut buf);
        let mut short = buf.freeze().slice(..PeerAddress::WIRE_LEN - 1);
        assert!(PeerAddress::decode(&mut short).is_err());
    }

    #[test]
    fn test_address_zeroize() {
        let mut addr = sample_address();
        addr.zeroize();
        assert_eq!(addr, PeerAddress::empty());
    }

    #[test]
    fn test_key_id_display() {
        let id = KeyId::from_bytes([0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
        assert_eq!(id.to_hex(), "1122334455667788");
    }

    #[test]
    fn test_key_material_debug_redacted() {
        let key = KeyMaterial::from_bytes([7u8; 16]);
        assert_eq!(format!("{:?}", key), "KeyMaterial(..)");
    }
}
