//! The HTTP tracker client (component C6).
//!
//! Builds the announce GET request, sends it, and decodes the compact peer
//! list from the bencoded response.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use percent_encoding::{percent_encode, AsciiSet, CONTROLS};
use serde::de::{self, Deserialize, Deserializer, Visitor};
use url::Url;

use crate::error::{Error, Result};
use crate::{PeerId, Sha1Hash};

/// Bytes that must be percent-encoded in `info_hash`/`peer_id` query
/// parameters: everything outside the unreserved set, since these are raw
/// 20-byte strings, not text.
const RAW_BYTE_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'&')
    .add(b'+')
    .add(b'=')
    .add(b':');

#[derive(Debug, Deserialize)]
struct TrackerResponse {
    #[serde(default)]
    #[serde(rename = "failure reason")]
    failure_reason: Option<String>,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    peers: Option<PeerList>,
}

/// The compact peer list the tracker returns: a byte string that's a
/// concatenation of 6-byte peer entries (4-byte IPv4 address, 2-byte big
/// endian port).
#[derive(Debug, Default)]
struct PeerList(Vec<SocketAddrV4>);

impl<'de> Deserialize<'de> for PeerList {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PeerListVisitor;

        impl<'de> Visitor<'de> for PeerListVisitor {
            type Value = PeerList;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a byte string whose length is a multiple of 6")
            }

            fn visit_bytes<E>(self, bytes: &[u8]) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                if bytes.len() % 6 != 0 {
                    return Err(de::Error::invalid_length(bytes.len(), &self));
                }
                let peers = bytes
                    .chunks_exact(6)
                    .map(|chunk| {
                        let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
                        let port = u16::from_be_bytes([chunk[4], chunk[5]]);
                        SocketAddrV4::new(ip, port)
                    })
                    .collect();
                Ok(PeerList(peers))
            }
        }

        deserializer.deserialize_bytes(PeerListVisitor)
    }
}

/// Announces to the tracker at `announce` and returns the list of peers it
/// hands back.
pub async fn announce(
    announce: &str,
    info_hash: &Sha1Hash,
    peer_id: &PeerId,
    left: u64,
    conf: &crate::conf::Conf,
) -> Result<Vec<SocketAddr>> {
    let url = build_announce_url(announce, info_hash, peer_id, left, conf.port)?;

    let client = reqwest::Client::builder()
        .timeout(conf.tracker_timeout)
        .build()
        .map_err(|source| Error::TrackerRequest {
            url: url.to_string(),
            source,
        })?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|source| Error::TrackerRequest {
            url: url.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(Error::TrackerHttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|source| Error::TrackerRequest {
            url: url.to_string(),
            source,
        })?;

    let parsed: TrackerResponse =
        serde_bencode::from_bytes(&body).map_err(|source| Error::TrackerResponseDecode {
            url: url.to_string(),
            source,
        })?;

    if let Some(reason) = parsed.failure_reason {
        return Err(Error::TrackerFailure {
            url: url.to_string(),
            reason,
        });
    }

    Ok(parsed
        .peers
        .unwrap_or_default()
        .0
        .into_iter()
        .map(SocketAddr::V4)
        .collect())
}

fn build_announce_url(
    announce: &str,
    info_hash: &Sha1Hash,
    peer_id: &PeerId,
    left: u64,
    port: u16,
) -> Result<Url> {
    let mut url = Url::parse(announce).map_err(|source| Error::InvalidAnnounceUrl {
        announce: announce.to_string(),
        source,
    })?;

    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    pairs.append_pair("port", &port.to_string());
    pairs.append_pair("uploaded", "0");
    pairs.append_pair("downloaded", "0");
    pairs.append_pair("left", &left.to_string());
    pairs.append_pair("compact", "1");
    drop(pairs);

    let info_hash_enc = url_encode_bytes(info_hash);
    let peer_id_enc = url_encode_bytes(peer_id);
    let separator = if url.query().is_some() { "&" } else { "?" };
    let with_raw = format!(
        "{}{}info_hash={}&peer_id={}",
        url, separator, info_hash_enc, peer_id_enc
    );
    Url::parse(&with_raw).map_err(|source| Error::InvalidAnnounceUrl {
        announce: announce.to_string(),
        source,
    })
}

fn url_encode_bytes(bytes: &[u8]) -> String {
    percent_encode(bytes, RAW_BYTE_ENCODE_SET).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_compact_peer_list() {
        let bytes: &[u8] = &[127, 0, 0, 1, 0x1a, 0xe1, 10, 0, 0, 5, 0x1a, 0xe2];
        #[derive(Deserialize)]
        struct Wrap(PeerList);
        impl<'de> Deserialize<'de> for Wrap {
            fn deserialize<D>(d: D) -> std::result::Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                PeerList::deserialize(d).map(Wrap)
            }
        }
        // deserialize straight off a bencode byte string
        let encoded = serde_bencode::to_bytes(&serde_bytes::Bytes::new(bytes)).unwrap();
        let Wrap(list) = serde_bencode::from_bytes(&encoded).unwrap();
        assert_eq!(list.0.len(), 2);
        assert_eq!(list.0[0].port(), 0x1ae1);
        assert_eq!(list.0[1].ip(), &Ipv4Addr::new(10, 0, 0, 5));
    }

    #[test]
    fn rejects_peer_list_not_multiple_of_6() {
        let bytes: &[u8] = &[1, 2, 3];
        let encoded = serde_bencode::to_bytes(&serde_bytes::Bytes::new(bytes)).unwrap();
        let result: std::result::Result<PeerList, _> = serde_bencode::from_bytes(&encoded);
        assert!(result.is_err());
    }

    #[test]
    fn announce_url_carries_raw_byte_params() {
        let info_hash = [0xffu8; 20];
        let peer_id = [0x20u8; 20];
        let url = build_announce_url(
            "http://tracker.example:6969/announce",
            &info_hash,
            &peer_id,
            1234,
            6881,
        )
        .unwrap();
        let s = url.to_string();
        assert!(s.contains("info_hash=%FF%FF"));
        assert!(s.contains("peer_id=%20%20"));
        assert!(s.contains("left=1234"));
        assert!(s.contains("compact=1"));
    }
}
