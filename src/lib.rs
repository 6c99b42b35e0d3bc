#[macro_use]
extern crate serde_derive;

pub mod bitfield;
pub mod conf;
pub mod error;
pub mod metainfo;
pub mod peer;
pub mod piece;
pub mod torrent;
pub mod tracker;

pub use bitfield::Bitfield;
pub use error::{Error, Result};

/// The type of a piece's index.
///
/// On the wire all integers are sent as 4-byte big endian integers, but in the
/// source code we use `usize` to be consistent with other index types in Rust.
pub type PieceIndex = usize;

/// The peer ID is an arbitrary 20 byte string.
///
/// Guidelines for choosing a peer ID: http://bittorrent.org/beps/bep_0020.html.
pub type PeerId = [u8; 20];

/// A SHA-1 hash digest, 20 bytes long.
pub type Sha1Hash = [u8; 20];

/// This is the only block length we're dealing with (except for possibly the
/// last block). It is the widely used and accepted 16 KiB.
pub(crate) const BLOCK_LEN: u32 = 0x4000;

/// The number of outstanding block requests a piece download keeps pipelined
/// to a single peer.
pub(crate) const MAX_BACKLOG: usize = 5;

/// Returns the length of the block at the given byte offset within a piece
/// of the given length, capped at `max_len`.
///
/// # Panics
///
/// Panics if `offset` is not smaller than `piece_len`.
pub(crate) fn block_len(piece_len: u32, offset: u32, max_len: u32) -> u32 {
    assert!(piece_len > offset);
    std::cmp::min(piece_len - offset, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_len() {
        let piece_len = 2 * BLOCK_LEN;
        assert_eq!(block_len(piece_len, 0, BLOCK_LEN), BLOCK_LEN);
        assert_eq!(block_len(piece_len, BLOCK_LEN, BLOCK_LEN), BLOCK_LEN);

        let overlap = 234;
        let uneven_piece_len = 2 * BLOCK_LEN + overlap;
        assert_eq!(block_len(uneven_piece_len, 0, BLOCK_LEN), BLOCK_LEN);
        assert_eq!(block_len(uneven_piece_len, BLOCK_LEN, BLOCK_LEN), BLOCK_LEN);
        assert_eq!(
            block_len(uneven_piece_len, 2 * BLOCK_LEN, BLOCK_LEN),
            overlap
        );
    }

    #[test]
    #[should_panic]
    fn test_block_len_invalid_offset_panics() {
        block_len(2 * BLOCK_LEN, 2 * BLOCK_LEN, BLOCK_LEN);
    }
}
