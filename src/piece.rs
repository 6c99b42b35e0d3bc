//! Pipelined single-piece download (component C4).
//!
//! Requests a piece's blocks from one peer, keeping up to `max_backlog`
//! requests outstanding at a time, and assembles the replies into a single
//! in-memory buffer. The whole piece download is bounded by one deadline;
//! nothing here writes to disk or talks to more than one peer.

use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use sha1::{Digest, Sha1};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::conf::Conf;
use crate::error::{Error, Result};
use crate::peer::codec::{Message, PeerCodec};
use crate::{block_len, Bitfield, PieceIndex, Sha1Hash};

/// A piece still waiting to be downloaded.
#[derive(Clone, Debug)]
pub struct PieceWork {
    pub index: PieceIndex,
    pub hash: Sha1Hash,
    pub len: u32,
}

/// A successfully downloaded and verified piece.
#[derive(Debug)]
pub struct PieceResult {
    pub index: PieceIndex,
    pub data: Vec<u8>,
}

struct Progress {
    buf: Vec<u8>,
    downloaded: u32,
    requested: u32,
    backlog: usize,
}

/// Downloads a single piece from the peer on the other end of `socket`,
/// pipelining requests up to `conf.max_backlog` deep, honoring choke state,
/// and enforcing `conf.piece_timeout` across the whole piece. Any HAVE the
/// peer sends while the piece is in flight updates `bitfield`.
///
/// On success the piece's integrity has already been verified against
/// `work.hash`; the caller doesn't need to re-check it.
pub async fn download_piece(
    socket: &mut Framed<TcpStream, PeerCodec>,
    choked: &mut bool,
    bitfield: &mut Bitfield,
    addr: SocketAddr,
    work: &PieceWork,
    conf: &Conf,
) -> Result<PieceResult> {
    let fut = download_piece_inner(socket, choked, bitfield, addr, work, conf);
    match tokio::time::timeout(conf.piece_timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::PieceTimeout(work.index)),
    }
}

async fn download_piece_inner(
    socket: &mut Framed<TcpStream, PeerCodec>,
    choked: &mut bool,
    bitfield: &mut Bitfield,
    addr: SocketAddr,
    work: &PieceWork,
    conf: &Conf,
) -> Result<PieceResult> {
    let mut progress = Progress {
        buf: vec![0; work.len as usize],
        downloaded: 0,
        requested: 0,
        backlog: 0,
    };

    while progress.downloaded < work.len {
        if !*choked {
            while progress.backlog < conf.max_backlog && progress.requested < work.len {
                let len = block_len(work.len, progress.requested, conf.max_block_len);
                socket
                    .send(Message::Request {
                        piece_index: work.index as u32,
                        offset: progress.requested,
                        len,
                    })
                    .await
                    .map_err(|source| into_peer_io(addr, source))?;
                progress.backlog += 1;
                progress.requested += len;
            }
        }

        let msg = socket
            .next()
            .await
            .ok_or(Error::PeerIo(addr, std::io::ErrorKind::UnexpectedEof.into()))?
            .map_err(|source| into_peer_io(addr, source))?;

        apply_message(&mut progress, choked, bitfield, addr, work, msg)?;
    }

    let data = std::mem::take(&mut progress.buf);
    verify_integrity(work, &data)?;

    Ok(PieceResult {
        index: work.index,
        data,
    })
}

fn apply_message(
    progress: &mut Progress,
    choked: &mut bool,
    bitfield: &mut Bitfield,
    addr: SocketAddr,
    work: &PieceWork,
    msg: Message,
) -> Result<()> {
    match msg {
        Message::Unchoke => *choked = false,
        Message::Choke => *choked = true,
        Message::Have { piece_index } => {
            bitfield.set(piece_index as usize);
        }
        Message::KeepAlive | Message::Interested | Message::NotInterested => {
            // Irrelevant to an in-flight piece download.
        }
        Message::Request { .. } => {
            // This leecher never seeds; peers asking us for blocks go unanswered.
        }
        Message::Block {
            piece_index,
            offset,
            data,
        } => {
            write_block(progress, work.index, piece_index, offset, &data)?;
        }
        other => {
            return Err(Error::MalformedMessage(format!(
                "peer {} sent unexpected {:?} during piece download",
                addr, other
            )));
        }
    }
    Ok(())
}

fn write_block(
    progress: &mut Progress,
    expected_index: PieceIndex,
    piece_index: u32,
    offset: u32,
    data: &Bytes,
) -> Result<()> {
    if piece_index as usize != expected_index {
        return Err(Error::MalformedMessage(format!(
            "block for piece {} received while downloading piece {}",
            piece_index, expected_index
        )));
    }

    let offset = offset as usize;
    if offset + data.len() > progress.buf.len() {
        return Err(Error::MalformedMessage(format!(
            "block at offset {} len {} overruns piece buffer of len {}",
            offset,
            data.len(),
            progress.buf.len()
        )));
    }
    progress.buf[offset..offset + data.len()].copy_from_slice(data);
    progress.downloaded += data.len() as u32;
    progress.backlog = progress.backlog.saturating_sub(1);
    Ok(())
}

fn verify_integrity(work: &PieceWork, data: &[u8]) -> Result<()> {
    let digest = Sha1::digest(data);
    if digest.as_slice() != work.hash {
        return Err(Error::IntegrityFailure(work.index));
    }
    Ok(())
}

fn into_peer_io(addr: SocketAddr, err: Error) -> Error {
    match err {
        Error::Io(io_err) => Error::PeerIo(addr, io_err),
        other => other,
    }
}
