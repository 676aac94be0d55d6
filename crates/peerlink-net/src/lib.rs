//! Peerlink Connection-Identity Core
//!
//! Replaces a platform's native online-service addressing with an
//! equivalent built on plain UDP sockets:
//! - Fixed-capacity table of live connections addressed by opaque
//!   generation-tagged identifiers
//! - Broadcast/request handshake protocol handler
//! - Session key-pair registry
//! - NAT-address learning
//! - Timeout-based liveness sweeping
//!
//! The core performs no I/O and contains no suspension points: datagrams
//! come in from the socket collaborator, the handler decides what to
//! mutate and what to send back, and the monotonic clock is supplied by
//! the caller on every time-sensitive operation. All mutation goes
//! through a single [`ConnectionManager`] owned by the caller.

pub mod config;
pub mod error;
pub mod handler;
pub mod ident;
pub mod identity;
pub mod keys;
pub mod manager;
pub mod table;

pub use config::NetConfig;
pub use error::{NetError, NetResult};
pub use handler::Outbound;
pub use ident::ConnectionId;
pub use identity::LocalIdentity;
pub use keys::{KeyPairRecord, KeyRegistry};
pub use manager::{ConnectionManager, NetEvents, NetStats};
pub use table::{ConnectionRecord, ConnectionStatus, SocketRole};

/// A connection with no interaction for this long is considered lost.
pub const CONNECTION_TIMEOUT_MS: u64 = 15_000;
