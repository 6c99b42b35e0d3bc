//! The download orchestrator (component C5).
//!
//! Spawns one worker task per peer, feeds them piece work from a shared
//! queue, collects verified pieces on a result channel, and assembles them
//! into the output buffer. If every worker exits without having finished
//! the torrent, the download fails rather than hanging forever waiting on
//! results that will never arrive.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::SinkExt;
use tokio::sync::{mpsc, Mutex};

use crate::conf::Conf;
use crate::error::{Error, Result};
use crate::metainfo::Metainfo;
use crate::peer::codec::Message;
use crate::peer::PeerSession;
use crate::piece::{self, PieceResult, PieceWork};
use crate::PeerId;

/// The shared work queue: a channel wrapped in a mutex so any number of
/// workers can pull from (and push back onto) it.
struct WorkQueue {
    tx: mpsc::UnboundedSender<PieceWork>,
    rx: Mutex<mpsc::UnboundedReceiver<PieceWork>>,
}

impl WorkQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    fn requeue(&self, work: PieceWork) {
        // The receiving half never drops while any worker (or the
        // orchestrator below) holds a clone of `self`, so this can't fail.
        let _ = self.tx.send(work);
    }

    async fn recv(&self) -> Option<PieceWork> {
        self.rx.lock().await.recv().await
    }
}

/// Downloads every piece of `metainfo` from `peers`, returning the
/// assembled file contents in file order.
pub async fn download(
    metainfo: &Metainfo,
    peers: Vec<SocketAddr>,
    client_id: PeerId,
    conf: Conf,
) -> Result<Vec<u8>> {
    let piece_count = metainfo.piece_count();

    let queue = Arc::new(WorkQueue::new());
    for index in 0..piece_count {
        queue.requeue(PieceWork {
            index,
            hash: metainfo.piece_hashes[index],
            len: metainfo.piece_len(index),
        });
    }

    let (result_tx, mut result_rx) = mpsc::channel::<PieceResult>(piece_count.max(1));
    let info_hash = metainfo.info_hash;

    if peers.is_empty() {
        return Err(Error::NoPeersRemaining(piece_count));
    }

    for addr in peers {
        let queue = Arc::clone(&queue);
        let result_tx = result_tx.clone();
        tokio::spawn(async move {
            run_worker(addr, info_hash, client_id, piece_count, queue, result_tx, conf).await;
        });
    }
    // Drop our own sender so the result channel closes once every worker
    // has exited and there's truly nothing left to produce.
    drop(result_tx);

    let mut buf = vec![0u8; metainfo.total_len as usize];
    let mut done = 0;

    while done < piece_count {
        let result = match result_rx.recv().await {
            Some(result) => result,
            None => return Err(Error::NoPeersRemaining(piece_count - done)),
        };

        let offset = result.index * metainfo.piece_len as usize;
        buf[offset..offset + result.data.len()].copy_from_slice(&result.data);
        done += 1;
        log::info!(
            "downloaded piece {} ({:.1}%)",
            result.index,
            done as f64 / piece_count as f64 * 100.0
        );
    }

    Ok(buf)
}

async fn run_worker(
    addr: SocketAddr,
    info_hash: crate::Sha1Hash,
    client_id: PeerId,
    piece_count: usize,
    queue: Arc<WorkQueue>,
    mut result_tx: mpsc::Sender<PieceResult>,
    conf: Conf,
) {
    let mut session = match PeerSession::connect(addr, info_hash, client_id, piece_count, &conf).await {
        Ok(session) => session,
        Err(err) => {
            log::warn!("peer {} session failed: {}", addr, err);
            return;
        }
    };

    log::info!("peer {} ready", addr);

    while let Some(work) = queue.recv().await {
        if !session.bitfield.has(work.index) {
            queue.requeue(work);
            continue;
        }

        match piece::download_piece(
            &mut session.socket,
            &mut session.choked,
            &mut session.bitfield,
            addr,
            &work,
            &conf,
        )
        .await
        {
            Ok(result) => {
                let have = Message::Have {
                    piece_index: result.index as u32,
                };
                if let Err(err) = session.socket.send(have).await {
                    log::warn!("peer {} could not be told about piece {}: {}", addr, result.index, err);
                }
                if result_tx.send(result).await.is_err() {
                    return;
                }
            }
            Err(Error::IntegrityFailure(index)) => {
                log::warn!("peer {} sent a corrupt piece {}", addr, index);
                queue.requeue(work);
            }
            Err(err) => {
                log::warn!("peer {} dropped during piece {}: {}", addr, work.index, err);
                queue.requeue(work);
                return;
            }
        }
    }
}
