use std::collections::HashMap;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use sha1::{Digest, Sha1};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, FramedParts};

use soloterrent::conf::Conf;
use soloterrent::metainfo::Metainfo;
use soloterrent::peer::codec::{Handshake, HandshakeCodec, Message, PeerCodec};
use soloterrent::torrent;
use soloterrent::Sha1Hash;

/// Stands in for a real peer: completes the handshake, announces it has
/// every piece, unchokes the client, then answers REQUESTs. Serves piece 1
/// corrupted the first time it's asked and correct on every later ask, so a
/// single connection exercises both the happy path and the integrity-retry
/// path.
async fn run_mock_peer(stream: TcpStream, info_hash: Sha1Hash, pieces: Vec<Vec<u8>>) {
    let mut hs_socket = Framed::new(stream, HandshakeCodec);
    let client_hs = hs_socket.next().await.unwrap().unwrap();
    assert_eq!(client_hs.info_hash, info_hash);
    hs_socket
        .send(Handshake::new(info_hash, [9u8; 20]))
        .await
        .unwrap();

    let parts = hs_socket.into_parts();
    let mut new_parts = FramedParts::new(parts.io, PeerCodec);
    new_parts.read_buf = parts.read_buf;
    new_parts.write_buf = parts.write_buf;
    let mut socket = Framed::from_parts(new_parts);

    let bitfield_byte: u8 = match pieces.len() {
        2 => 0b1100_0000,
        _ => panic!("mock peer only supports 2 pieces"),
    };
    socket
        .send(Message::Bitfield(Bytes::copy_from_slice(&[bitfield_byte])))
        .await
        .unwrap();

    let m1 = socket.next().await.unwrap().unwrap();
    assert_eq!(m1, Message::Unchoke);
    let m2 = socket.next().await.unwrap().unwrap();
    assert_eq!(m2, Message::Interested);

    socket.send(Message::Unchoke).await.unwrap();

    let mut attempts: HashMap<u32, u32> = HashMap::new();
    loop {
        let msg = match socket.next().await {
            Some(Ok(m)) => m,
            _ => return,
        };
        if let Message::Request {
            piece_index,
            offset,
            len,
        } = msg
        {
            let piece = &pieces[piece_index as usize];
            let data = &piece[offset as usize..offset as usize + len as usize];
            let count = attempts.entry(piece_index).or_insert(0);
            *count += 1;
            let payload = if piece_index == 1 && *count == 1 {
                vec![0u8; data.len()]
            } else {
                data.to_vec()
            };
            socket
                .send(Message::Block {
                    piece_index,
                    offset,
                    data: Bytes::from(payload),
                })
                .await
                .unwrap();
        }
    }
}

fn sha1_of(data: &[u8]) -> Sha1Hash {
    let digest = Sha1::digest(data);
    let mut hash = [0; 20];
    hash.copy_from_slice(&digest);
    hash
}

#[tokio::test]
async fn downloads_both_pieces_retrying_after_integrity_failure() {
    let piece0 = b"0123456789".to_vec();
    let piece1 = b"abcde".to_vec();
    let info_hash = [0x55u8; 20];

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let pieces = vec![piece0.clone(), piece1.clone()];
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        run_mock_peer(stream, info_hash, pieces).await;
    });

    let metainfo = Metainfo {
        announce: "http://tracker.example/announce".to_string(),
        info_hash,
        piece_hashes: vec![sha1_of(&piece0), sha1_of(&piece1)],
        piece_len: 10,
        total_len: 15,
        name: "out.bin".to_string(),
    };

    let conf = Conf::default();
    let client_id = [7u8; 20];

    let data = torrent::download(&metainfo, vec![addr], client_id, conf)
        .await
        .unwrap();

    assert_eq!(data.len(), 15);
    assert_eq!(&data[0..10], &piece0[..]);
    assert_eq!(&data[10..15], &piece1[..]);
}
