//! Connection identifier codec
//!
//! A connection identifier is an opaque 32-bit token a peer uses to
//! address a specific table slot. The reserved high byte encodes the slot
//! index; the low 24 bits carry the slot's generation counter. The
//! generation is seeded randomly per slot and bumped on every reuse, so
//! an identifier from a dead connection can never resolve to a slot that
//! now belongs to a different peer, and identifiers look unguessable from
//! the outside.
//!
//! Pure functions only. Range checking the decoded slot index is the
//! connection table's responsibility.

use serde::{Deserialize, Serialize};

/// Mask selecting the slot index bits
pub const SLOT_MASK: u32 = 0xFF00_0000;

/// Mask selecting the generation bits
pub const GENERATION_MASK: u32 = 0x00FF_FFFF;

const SLOT_SHIFT: u32 = 24;

/// Number of slots addressable by the identifier's index byte
pub const MAX_SLOTS: usize = 256;

/// Opaque identifier for one live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(u32);

impl ConnectionId {
    /// Pack a slot index and generation into an identifier.
    ///
    /// Generations wider than 24 bits are truncated; slot indices are
    /// taken modulo 256 by construction of the cast.
    pub fn encode(slot: usize, generation: u32) -> Self {
        Self(((slot as u32) << SLOT_SHIFT) | (generation & GENERATION_MASK))
    }

    /// Extract the table slot index
    pub fn slot(self) -> usize {
        ((self.0 & SLOT_MASK) >> SLOT_SHIFT) as usize
    }

    /// Extract the generation counter
    pub fn generation(self) -> u32 {
        self.0 & GENERATION_MASK
    }

    /// Raw 32-bit value, as carried by external API surfaces
    pub fn to_u32(self) -> u32 {
        self.0
    }

    /// Wrap a raw 32-bit value received from an external API surface
    pub fn from_u32(raw: u32) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
