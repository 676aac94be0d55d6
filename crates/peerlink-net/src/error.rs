//! Core error types

use peerlink_proto::KeyId;
use thiserror::Error;

/// Connection-identity core errors.
///
/// Negative lookups (unknown or stale identifiers) are *not* errors: they
/// are expected, frequent conditions and are modelled as `Option::None`
/// throughout. Nothing here is fatal to the process.
#[derive(Debug, Error)]
pub enum NetError {
    /// Connection table at capacity; the handshake cannot proceed
    #[error("connection table full ({capacity} slots)")]
    TableFull { capacity: usize },

    /// Key registry at capacity and the key id is new
    #[error("key registry full ({capacity} slots)")]
    KeyRegistryFull { capacity: usize },

    /// No key material registered under this key id
    #[error("no key pair registered for key id {0}")]
    UnknownKeyId(KeyId),

    /// Outbound connect attempted before local identity setup
    #[error("local identity not set up")]
    NoLocalIdentity,

    /// Configuration rejected at construction
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for core operations
pub type NetResult<T> = Result<T, NetError>;
