//! This module defines the tunables of the download engine: timeouts,
//! backlog size, and client identity, in place of scattered literals.

use std::time::Duration;

use crate::PeerId;

/// The fixed prefix of the client id this leecher announces to trackers and
/// peers. The remaining bytes are randomized per run; see
/// `main::random_peer_id`.
pub const CLIENT_ID: &PeerId = b"-SL0001-000000000000";

/// The global configuration for a single torrent download.
#[derive(Clone, Copy, Debug)]
pub struct Conf {
    /// TCP dial timeout for a peer connection.
    pub dial_timeout: Duration,
    /// Timeout for sending/receiving the handshake.
    pub handshake_timeout: Duration,
    /// Timeout for receiving the peer's initial bitfield.
    pub bitfield_timeout: Duration,
    /// Total time budget for downloading a single piece, covering all reads
    /// and writes for that piece.
    pub piece_timeout: Duration,
    /// Maximum number of outstanding block requests pipelined per piece.
    pub max_backlog: usize,
    /// Maximum length of a single requested block.
    pub max_block_len: u32,
    /// Tracker HTTP request timeout.
    pub tracker_timeout: Duration,
    /// The port we claim to listen on when announcing to the tracker.
    ///
    /// This leecher never actually listens (it only makes outbound
    /// connections), but trackers expect a port in the announce request.
    pub port: u16,
}

impl Default for Conf {
    /// A 3 s dial/handshake timeout, a 5 s bitfield timeout, a 30 s
    /// per-piece timeout, a backlog of 5, and 16 KiB blocks.
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(3),
            bitfield_timeout: Duration::from_secs(5),
            piece_timeout: Duration::from_secs(30),
            max_backlog: crate::MAX_BACKLOG,
            max_block_len: crate::BLOCK_LEN,
            tracker_timeout: Duration::from_secs(15),
            port: 6881,
        }
    }
}
