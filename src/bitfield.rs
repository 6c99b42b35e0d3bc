//! The compact per-peer piece availability map (component C1).
//!
//! A bitfield is a bit vector, most significant bit first within each byte,
//! where a set bit at position `i` means the peer has piece `i`. The trailing
//! bits of the last byte that don't correspond to a real piece are spare
//! padding and must be ignored.

use bitvec::prelude::{BitVec, Msb0};

/// Per-peer piece availability map.
///
/// `has` and `set` are total: querying or setting a bit past the field's
/// current capacity never panics, mirroring how the wire-supplied bitfield
/// may be padded out to a byte boundary we don't otherwise track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bitfield(BitVec<Msb0, u8>);

impl Bitfield {
    /// Creates a bitfield with room for exactly `piece_count` pieces, all
    /// initially unset.
    pub fn new(piece_count: usize) -> Self {
        Self(BitVec::repeat(false, piece_count))
    }

    /// Wraps the raw bytes received on the wire (MSB-first per byte) as
    /// a bitfield without any validation: bits beyond the the number of
    /// pieces in the torrent are simply never consulted by `has`.
    pub fn from_wire_bytes(bytes: &[u8]) -> Self {
        Self(BitVec::from_slice(bytes))
    }

    /// Returns whether the peer has the piece at `index`.
    ///
    /// Returns `false`, rather than panicking, if `index` is beyond the
    /// bitfield's bit capacity.
    pub fn has(&self, index: usize) -> bool {
        self.0.get(index).map(|b| *b).unwrap_or(false)
    }

    /// Marks piece `index` as available.
    ///
    /// A `set` beyond the current capacity is a no-op: HAVE messages for
    /// piece indices outside the torrent are a protocol violation by the
    /// peer, not something we act on.
    pub fn set(&mut self, index: usize) {
        if let Some(mut bit) = self.0.get_mut(index) {
            *bit = true;
        }
    }

    /// Returns true if every piece in `0..piece_count` is set, i.e. the peer
    /// is a seed.
    pub fn has_all(&self, piece_count: usize) -> bool {
        (0..piece_count).all(|i| self.has(i))
    }

    /// The number of pieces this bitfield has room to represent.
    pub fn capacity(&self) -> usize {
        self.0.len()
    }
}
