//! Wire framing for the handshake and the peer message stream.
//!
//! Two codecs are used in sequence on the same TCP connection: a
//! `HandshakeCodec` for the fixed 68-byte handshake, then a `PeerCodec` for
//! the length-prefixed message stream that follows it.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Error, Result};
use crate::{PeerId, Sha1Hash};

const PROTOCOL_STRING: &str = "BitTorrent protocol";
/// 1 (pstrlen) + 19 (pstr) + 8 (reserved) + 20 (info_hash) + 20 (peer_id).
const HANDSHAKE_LEN: usize = 1 + 19 + 8 + 20 + 20;

/// The message ids that appear as the first byte of a peer message, per the
/// BitTorrent wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Block = 7,
    Cancel = 8,
}

impl MessageId {
    fn from_u8(id: u8) -> Option<Self> {
        Some(match id {
            0 => Self::Choke,
            1 => Self::Unchoke,
            2 => Self::Interested,
            3 => Self::NotInterested,
            4 => Self::Have,
            5 => Self::Bitfield,
            6 => Self::Request,
            7 => Self::Block,
            8 => Self::Cancel,
            _ => return None,
        })
    }
}

/// The handshake message exchanged before any other peer communication.
#[derive(Clone, Debug)]
pub struct Handshake {
    pub prot: [u8; 19],
    pub reserved: [u8; 8],
    pub info_hash: Sha1Hash,
    pub peer_id: PeerId,
}

impl Handshake {
    pub fn new(info_hash: Sha1Hash, peer_id: PeerId) -> Self {
        let mut prot = [0; 19];
        prot.copy_from_slice(PROTOCOL_STRING.as_bytes());
        Self {
            prot,
            reserved: [0; 8],
            info_hash,
            peer_id,
        }
    }
}

pub struct HandshakeCodec;

impl Encoder<Handshake> for HandshakeCodec {
    type Error = Error;

    fn encode(&mut self, handshake: Handshake, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(HANDSHAKE_LEN);
        buf.put_u8(19);
        buf.put_slice(&handshake.prot);
        buf.put_slice(&handshake.reserved);
        buf.put_slice(&handshake.info_hash);
        buf.put_slice(&handshake.peer_id);
        Ok(())
    }
}

impl Decoder for HandshakeCodec {
    type Item = Handshake;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Handshake>> {
        if buf.len() < HANDSHAKE_LEN {
            return Ok(None);
        }

        let pstrlen = buf[0] as usize;
        if pstrlen != 19 {
            buf.advance(buf.len());
            return Err(Error::InvalidHandshake);
        }

        let mut prot = [0; 19];
        prot.copy_from_slice(&buf[1..20]);
        let mut reserved = [0; 8];
        reserved.copy_from_slice(&buf[20..28]);
        let mut info_hash = [0; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        let mut peer_id = [0; 20];
        peer_id.copy_from_slice(&buf[48..68]);

        buf.advance(HANDSHAKE_LEN);

        Ok(Some(Handshake {
            prot,
            reserved,
            info_hash,
            peer_id,
        }))
    }
}

/// A single peer wire message, post-handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield(bytes::Bytes),
    Request { piece_index: u32, offset: u32, len: u32 },
    Block { piece_index: u32, offset: u32, data: bytes::Bytes },
    Cancel { piece_index: u32, offset: u32, len: u32 },
}

pub struct PeerCodec;

impl Encoder<Message> for PeerCodec {
    type Error = Error;

    fn encode(&mut self, msg: Message, buf: &mut BytesMut) -> Result<()> {
        match msg {
            Message::KeepAlive => {
                buf.put_u32(0);
            }
            Message::Choke => {
                buf.put_u32(1);
                buf.put_u8(MessageId::Choke as u8);
            }
            Message::Unchoke => {
                buf.put_u32(1);
                buf.put_u8(MessageId::Unchoke as u8);
            }
            Message::Interested => {
                buf.put_u32(1);
                buf.put_u8(MessageId::Interested as u8);
            }
            Message::NotInterested => {
                buf.put_u32(1);
                buf.put_u8(MessageId::NotInterested as u8);
            }
            Message::Have { piece_index } => {
                buf.put_u32(5);
                buf.put_u8(MessageId::Have as u8);
                buf.put_u32(piece_index);
            }
            Message::Bitfield(bits) => {
                buf.put_u32(1 + bits.len() as u32);
                buf.put_u8(MessageId::Bitfield as u8);
                buf.put_slice(&bits);
            }
            Message::Request {
                piece_index,
                offset,
                len,
            } => {
                buf.put_u32(13);
                buf.put_u8(MessageId::Request as u8);
                buf.put_u32(piece_index);
                buf.put_u32(offset);
                buf.put_u32(len);
            }
            Message::Block {
                piece_index,
                offset,
                data,
            } => {
                buf.put_u32(9 + data.len() as u32);
                buf.put_u8(MessageId::Block as u8);
                buf.put_u32(piece_index);
                buf.put_u32(offset);
                buf.put_slice(&data);
            }
            Message::Cancel {
                piece_index,
                offset,
                len,
            } => {
                buf.put_u32(13);
                buf.put_u8(MessageId::Cancel as u8);
                buf.put_u32(piece_index);
                buf.put_u32(offset);
                buf.put_u32(len);
            }
        }
        Ok(())
    }
}

impl Decoder for PeerCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if buf.len() < 4 + len {
            buf.reserve(4 + len - buf.len());
            return Ok(None);
        }

        buf.advance(4);
        if len == 0 {
            return Ok(Some(Message::KeepAlive));
        }

        let id = buf[0];
        let id = MessageId::from_u8(id)
            .ok_or_else(|| Error::MalformedMessage(format!("unknown message id {}", id)))?;
        let mut payload = buf.split_to(len);
        payload.advance(1);

        let msg = match id {
            MessageId::Choke => Message::Choke,
            MessageId::Unchoke => Message::Unchoke,
            MessageId::Interested => Message::Interested,
            MessageId::NotInterested => Message::NotInterested,
            MessageId::Have => {
                if payload.len() != 4 {
                    return Err(malformed("have payload must be 4 bytes"));
                }
                Message::Have {
                    piece_index: payload.get_u32(),
                }
            }
            MessageId::Bitfield => Message::Bitfield(payload.freeze()),
            MessageId::Request => {
                if payload.len() != 12 {
                    return Err(malformed("request payload must be 12 bytes"));
                }
                Message::Request {
                    piece_index: payload.get_u32(),
                    offset: payload.get_u32(),
                    len: payload.get_u32(),
                }
            }
            MessageId::Block => {
                if payload.len() < 8 {
                    return Err(malformed("block payload must be at least 8 bytes"));
                }
                Message::Block {
                    piece_index: payload.get_u32(),
                    offset: payload.get_u32(),
                    data: payload.freeze(),
                }
            }
            MessageId::Cancel => {
                if payload.len() != 12 {
                    return Err(malformed("cancel payload must be 12 bytes"));
                }
                Message::Cancel {
                    piece_index: payload.get_u32(),
                    offset: payload.get_u32(),
                    len: payload.get_u32(),
                }
            }
        };

        Ok(Some(msg))
    }
}

fn malformed(msg: &str) -> Error {
    Error::MalformedMessage(msg.to_string())
}
