//! Wire protocol error types

use thiserror::Error;

/// Errors produced while decoding wire packets.
///
/// Every variant here means the datagram must be discarded; none of them
/// is fatal to the process. Callers count rejected datagrams rather than
/// surfacing these as failures.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Datagram shorter than the fixed packet header
    #[error("datagram too short: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    /// Magic tag does not match any known packet shape
    #[error("unknown magic tag: 0x{0:08x}")]
    BadMagic(u32),

    /// Header identifier string does not match the expected constant
    #[error("header identifier string mismatch")]
    BadHeaderString,

    /// Declared packet size does not match the bytes actually received
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Request discriminant is not a known request kind
    #[error("unknown request kind: 0x{0:x}")]
    UnknownRequestKind(u32),
}

/// Result type for wire decoding
pub type ProtoResult<T> = Result<T, ProtoError>;
