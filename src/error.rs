//! Crate-wide error type.
//!
//! Each variant corresponds to one row of the error handling table: fatal
//! errors (metainfo, tracker, output file) are meant to propagate to `main`
//! and abort the process; per-peer and per-piece errors are caught close to
//! their origin and never surface past the worker that produced them.

use crate::PieceIndex;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --- fatal: metainfo parsing ---
    #[error("could not read torrent file {path}: {source}")]
    TorrentFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed torrent metainfo in {path}: {source}")]
    MetainfoDecode {
        path: String,
        #[source]
        source: serde_bencode::Error,
    },
    #[error("torrent info-hash could not be computed: {0}")]
    InfoHashEncode(serde_bencode::Error),
    #[error("pieces field length {0} is not a multiple of 20")]
    InvalidPieceHashesLength(usize),
    #[error("multi-file torrents are not supported")]
    MultiFileTorrentUnsupported,
    #[error("metainfo is missing the single-file `length` field")]
    MissingLength,

    // --- fatal: tracker ---
    #[error("could not build tracker URL from announce {announce}: {source}")]
    InvalidAnnounceUrl {
        announce: String,
        #[source]
        source: url::ParseError,
    },
    #[error("tracker request to {url} failed: {source}")]
    TrackerRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("tracker at {url} returned a non-success status {status}")]
    TrackerHttpStatus { url: String, status: u16 },
    #[error("could not decode tracker response from {url}: {source}")]
    TrackerResponseDecode {
        url: String,
        #[source]
        source: serde_bencode::Error,
    },
    #[error("tracker at {url} reported failure: {reason}")]
    TrackerFailure { url: String, reason: String },

    // --- per-peer (caught by workers, never surfaces) ---
    #[error("dialing peer {0} timed out")]
    DialTimeout(std::net::SocketAddr),
    #[error("connecting to peer {0} failed: {1}")]
    Connect(std::net::SocketAddr, std::io::Error),
    #[error("handshake with peer {0} timed out")]
    HandshakeTimeout(std::net::SocketAddr),
    #[error("peer {0} sent a handshake with a mismatched info hash")]
    InvalidPeerInfoHash(std::net::SocketAddr),
    #[error("peer sent a malformed handshake")]
    InvalidHandshake,
    #[error("waiting for peer {0}'s bitfield timed out")]
    BitfieldTimeout(std::net::SocketAddr),
    #[error("peer {0} sent {1:?} before its bitfield")]
    ExpectedBitfield(std::net::SocketAddr, crate::peer::codec::MessageId),
    #[error("peer {0} connection error: {1}")]
    PeerIo(std::net::SocketAddr, std::io::Error),
    #[error("peer sent a malformed message: {0}")]
    MalformedMessage(String),
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    // --- per-piece ---
    #[error("piece {0} download timed out")]
    PieceTimeout(PieceIndex),
    #[error("piece {0} failed its integrity check")]
    IntegrityFailure(PieceIndex),

    // --- orchestrator-level fatal ---
    #[error("no peers remaining and {0} piece(s) still undownloaded")]
    NoPeersRemaining(usize),

    // --- fatal: output file ---
    #[error("could not write output file {path}: {source}")]
    WriteOutputFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
