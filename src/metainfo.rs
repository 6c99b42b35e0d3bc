//! Parsing of `.torrent` metainfo files (component C6, collaborator).
//!
//! Single-file torrents only: a metainfo whose `info` dictionary carries
//! a `files` list (i.e. a multi-file torrent) is rejected.

use std::path::Path;

use sha1::{Digest, Sha1};

use crate::{error::Result, Error, Sha1Hash};

/// The raw bencoded `.torrent` structure, as it appears on disk.
#[derive(Debug, Deserialize)]
struct RawMetainfo {
    announce: String,
    info: RawInfo,
}

/// The raw bencoded `info` dictionary.
///
/// `length` and `files` are mutually exclusive: single-file torrents carry
/// `length`, multi-file torrents carry `files`.
/// `Serialize` is needed to re-encode this dictionary exactly as it appeared
/// in the torrent file, to compute the info-hash.
#[derive(Debug, Serialize, Deserialize)]
struct RawInfo {
    name: String,
    #[serde(with = "serde_bytes")]
    pieces: Vec<u8>,
    #[serde(rename = "piece length")]
    piece_length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<Vec<RawFile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    private: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawFile {
    path: Vec<String>,
    length: i64,
}

/// The immutable torrent plan derived from a `.torrent` file: everything the
/// download engine needs to know about what it's downloading and where from.
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// The tracker's announce URL.
    pub announce: String,
    /// SHA-1 of the bencoded `info` dictionary.
    pub info_hash: Sha1Hash,
    /// The expected SHA-1 hash of each piece, in order.
    pub piece_hashes: Vec<Sha1Hash>,
    /// The nominal length of a piece, in bytes. Only the last piece may be
    /// shorter than this.
    pub piece_len: u32,
    /// The total length of the file, in bytes.
    pub total_len: u64,
    /// The name of the file to create on disk.
    pub name: String,
}

impl Metainfo {
    /// Reads and parses a `.torrent` file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| Error::TorrentFileIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(&bytes, &path.display().to_string())
    }

    /// Parses a `.torrent` file's raw bencoded bytes.
    pub fn from_bytes(buf: &[u8], path: &str) -> Result<Self> {
        let raw: RawMetainfo =
            serde_bencode::from_bytes(buf).map_err(|source| Error::MetainfoDecode {
                path: path.to_string(),
                source,
            })?;

        if raw.info.files.is_some() {
            return Err(Error::MultiFileTorrentUnsupported);
        }
        let total_len = raw.info.length.ok_or(Error::MissingLength)?;

        let info_hash = Self::hash_info(&raw.info)?;
        let piece_hashes = Self::split_piece_hashes(&raw.info.pieces)?;

        Ok(Self {
            announce: raw.announce,
            info_hash,
            piece_hashes,
            piece_len: raw.info.piece_length as u32,
            total_len,
            name: raw.info.name,
        })
    }

    /// The number of pieces in the torrent.
    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Returns the length of the piece at `index`: `piece_len` for every
    /// piece but the last, whose length is whatever remains of `total_len`.
    pub fn piece_len(&self, index: crate::PieceIndex) -> u32 {
        let piece_count = self.piece_count();
        if index == piece_count - 1 {
            let full_pieces_len =
                self.piece_len as u64 * (piece_count - 1) as u64;
            (self.total_len - full_pieces_len) as u32
        } else {
            self.piece_len
        }
    }

    fn hash_info(info: &RawInfo) -> Result<Sha1Hash> {
        let encoded =
            serde_bencode::to_bytes(info).map_err(Error::InfoHashEncode)?;
        let digest = Sha1::digest(&encoded);
        let mut hash = [0; 20];
        hash.copy_from_slice(&digest);
        Ok(hash)
    }

    fn split_piece_hashes(pieces: &[u8]) -> Result<Vec<Sha1Hash>> {
        if pieces.len() % 20 != 0 {
            return Err(Error::InvalidPieceHashesLength(pieces.len()));
        }
        Ok(pieces
            .chunks_exact(20)
            .map(|chunk| {
                let mut hash = [0; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes(piece_hashes: &[[u8; 20]], piece_length: u64, total_len: u64) -> Vec<u8> {
        let mut pieces = Vec::new();
        for h in piece_hashes {
            pieces.extend_from_slice(h);
        }
        let info = RawInfo {
            name: "sample.iso".to_string(),
            pieces,
            piece_length,
            length: Some(total_len),
            files: None,
            private: None,
        };
        let raw = RawMetainfo {
            announce: "http://tracker.example:6969/announce".to_string(),
            info,
        };
        serde_bencode::to_bytes(&raw).unwrap()
    }

    #[test]
    fn parses_single_file_torrent() {
        let hashes = [[1u8; 20], [2u8; 20]];
        let bytes = sample_bytes(&hashes, 32768, 40000);
        let meta = Metainfo::from_bytes(&bytes, "test.torrent").unwrap();
        assert_eq!(meta.announce, "http://tracker.example:6969/announce");
        assert_eq!(meta.piece_count(), 2);
        assert_eq!(meta.piece_len(0), 32768);
        assert_eq!(meta.piece_len(1), 40000 - 32768);
        assert_eq!(meta.total_len, 40000);
        assert_eq!(meta.name, "sample.iso");
    }

    #[test]
    fn info_hash_is_deterministic() {
        let hashes = [[3u8; 20]];
        let bytes = sample_bytes(&hashes, 16384, 16384);
        let a = Metainfo::from_bytes(&bytes, "a").unwrap();
        let b = Metainfo::from_bytes(&bytes, "b").unwrap();
        assert_eq!(a.info_hash, b.info_hash);
    }

    #[test]
    fn rejects_pieces_not_multiple_of_20() {
        let info = RawInfo {
            name: "x".to_string(),
            pieces: vec![0; 21],
            piece_length: 16384,
            length: Some(16384),
            files: None,
            private: None,
        };
        let raw = RawMetainfo {
            announce: "http://tracker.example".to_string(),
            info,
        };
        let bytes = serde_bencode::to_bytes(&raw).unwrap();
        let err = Metainfo::from_bytes(&bytes, "test.torrent").unwrap_err();
        assert!(matches!(err, Error::InvalidPieceHashesLength(21)));
    }

    #[test]
    fn rejects_multi_file_torrents() {
        let info = RawInfo {
            name: "x".to_string(),
            pieces: vec![0; 20],
            piece_length: 16384,
            length: None,
            files: Some(vec![RawFile {
                path: vec!["a".to_string()],
                length: 10,
            }]),
            private: None,
        };
        let raw = RawMetainfo {
            announce: "http://tracker.example".to_string(),
            info,
        };
        let bytes = serde_bencode::to_bytes(&raw).unwrap();
        let err = Metainfo::from_bytes(&bytes, "test.torrent").unwrap_err();
        assert!(matches!(err, Error::MultiFileTorrentUnsupported));
    }

    #[test]
    fn last_piece_sizing() {
        // total length = 16385, piece length = 16384: piece 0 is 16384,
        // piece 1 is 1 byte.
        let hashes = [[0u8; 20], [1u8; 20]];
        let bytes = sample_bytes(&hashes, 16384, 16385);
        let meta = Metainfo::from_bytes(&bytes, "test.torrent").unwrap();
        assert_eq!(meta.piece_len(0), 16384);
        assert_eq!(meta.piece_len(1), 1);
    }
}
