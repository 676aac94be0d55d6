//! Peerlink Wire Protocol
//!
//! Defines the on-the-wire shapes of the peerlink handshake protocol:
//! - Packet header (magic tag + fixed ASCII identifier string)
//! - Broadcast and request packets
//! - Opaque key and address value types
//!
//! All multi-byte integer fields are native-endian except the magic tag,
//! which is the big-endian interpretation of a four-character ASCII tag.
//! This is a LAN/peer protocol: both ends of a deployment run the same
//! build, so native byte order is consistent across the wire.

pub mod error;
pub mod packet;
pub mod types;

pub use error::{ProtoError, ProtoResult};
pub use packet::{
    BroadcastPacket, RequestKind, RequestPacket, WirePacket, BROADCAST_LEN, BROADCAST_MAGIC,
    HEADER_LEN, REQUEST_LEN, REQUEST_MAGIC,
};
pub use types::{KeyId, KeyMaterial, PeerAddress};
