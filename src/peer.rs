//! A single outbound connection to a peer (component C3).
//!
//! A `PeerSession` owns the TCP connection from handshake through the
//! bitfield exchange. Once established, the session is driven one piece at a
//! time by the download worker in `torrent.rs`, via
//! [`piece::download_piece`](crate::piece::download_piece).

pub mod codec;

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, FramedParts};

use crate::conf::Conf;
use crate::error::{Error, Result};
use crate::peer::codec::{Handshake, HandshakeCodec, Message, PeerCodec};
use crate::{Bitfield, PeerId, Sha1Hash};

/// An established, handshaken, bitfield-exchanged connection to a peer,
/// ready to serve piece downloads.
pub struct PeerSession {
    pub addr: SocketAddr,
    pub peer_id: PeerId,
    pub bitfield: Bitfield,
    /// Whether the peer is currently choking us. Starts `true`: per the
    /// protocol, a connection begins choked until the peer says otherwise.
    pub choked: bool,
    pub socket: Framed<TcpStream, PeerCodec>,
}

impl PeerSession {
    /// Dials `addr`, exchanges handshakes, waits for the peer's bitfield,
    /// then announces that we're unchoked and interested. Each step is
    /// bounded by its own timeout from `conf`.
    ///
    /// Peers that turn out to have only part of the torrent are accepted
    /// here regardless; `torrent.rs` checks `bitfield` against the piece
    /// it wants before handing work to this session.
    pub async fn connect(
        addr: SocketAddr,
        info_hash: Sha1Hash,
        client_id: PeerId,
        piece_count: usize,
        conf: &Conf,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(conf.dial_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::DialTimeout(addr))?
            .map_err(|source| Error::Connect(addr, source))?;

        let mut handshake_socket = Framed::new(stream, HandshakeCodec);
        let handshake = Handshake::new(info_hash, client_id);

        let peer_id = tokio::time::timeout(conf.handshake_timeout, async {
            handshake_socket
                .send(handshake)
                .await
                .map_err(|source| into_peer_io(addr, source))?;

            let peer_handshake = handshake_socket
                .next()
                .await
                .ok_or(Error::InvalidHandshake)?
                .map_err(|source| into_peer_io(addr, source))?;

            if peer_handshake.info_hash != info_hash {
                return Err(Error::InvalidPeerInfoHash(addr));
            }

            Ok(peer_handshake.peer_id)
        })
        .await
        .map_err(|_| Error::HandshakeTimeout(addr))??;

        // Switch from the fixed-size handshake codec to the length-prefixed
        // message codec, carrying over any bytes the peer already sent past
        // its handshake.
        let old_parts = handshake_socket.into_parts();
        let mut new_parts = FramedParts::new(old_parts.io, PeerCodec);
        new_parts.read_buf = old_parts.read_buf;
        new_parts.write_buf = old_parts.write_buf;
        let mut socket = Framed::from_parts(new_parts);

        let bitfield = tokio::time::timeout(conf.bitfield_timeout, async {
            match socket
                .next()
                .await
                .ok_or(Error::BitfieldTimeout(addr))?
                .map_err(|source| into_peer_io(addr, source))?
            {
                Message::Bitfield(bits) => Ok(Bitfield::from_wire_bytes(&bits)),
                other => Err(Error::ExpectedBitfield(addr, message_id(&other))),
            }
        })
        .await
        .map_err(|_| Error::BitfieldTimeout(addr))??;

        if !bitfield.has_all(piece_count) {
            log::debug!("peer {} is not a full seed", addr);
        }

        socket
            .send(Message::Unchoke)
            .await
            .map_err(|source| into_peer_io(addr, source))?;
        socket
            .send(Message::Interested)
            .await
            .map_err(|source| into_peer_io(addr, source))?;

        Ok(Self {
            addr,
            peer_id,
            bitfield,
            choked: true,
            socket,
        })
    }
}

fn message_id(msg: &Message) -> crate::peer::codec::MessageId {
    use crate::peer::codec::MessageId;
    match msg {
        // KeepAlive has no id byte on the wire; map it to Choke for logging.
        Message::KeepAlive => MessageId::Choke,
        Message::Choke => MessageId::Choke,
        Message::Unchoke => MessageId::Unchoke,
        Message::Interested => MessageId::Interested,
        Message::NotInterested => MessageId::NotInterested,
        Message::Have { .. } => MessageId::Have,
        Message::Bitfield(_) => MessageId::Bitfield,
        Message::Request { .. } => MessageId::Request,
        Message::Block { .. } => MessageId::Block,
        Message::Cancel { .. } => MessageId::Cancel,
    }
}

fn into_peer_io(addr: SocketAddr, err: Error) -> Error {
    match err {
        Error::Io(io_err) => Error::PeerIo(addr, io_err),
        other => other,
    }
}
