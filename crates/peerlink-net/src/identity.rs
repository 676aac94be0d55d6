//! Local identity holder
//!
//! One record describing this process's own addressing, set up once at
//! startup and securely zeroed at teardown so address and key bytes do
//! not linger in process memory after shutdown. The local process has no
//! connection identifier of its own.

use peerlink_proto::PeerAddress;
use zeroize::Zeroize;

/// This process's own network identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    /// Our own address descriptor (online + LAN + name fields)
    pub addr: PeerAddress,
}

impl LocalIdentity {
    /// Build the identity from its address descriptor
    pub fn new(addr: PeerAddress) -> Self {
        Self { addr }
    }
}

impl Zeroize for LocalIdentity {
    fn zeroize(&mut self) {
        self.addr.zeroize();
    }
}
