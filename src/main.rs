use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rand::Rng;

use soloterrent::conf::Conf;
use soloterrent::error::Error;
use soloterrent::metainfo::Metainfo;
use soloterrent::{torrent, tracker};

/// A single-file BitTorrent leecher: downloads the file described by a
/// `.torrent` and writes it to disk.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the `.torrent` file to download.
    input: PathBuf,

    /// Where to write the downloaded file.
    #[arg(default_value = "default.iso")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> soloterrent::error::Result<()> {
    let metainfo = Metainfo::open(&args.input)?;
    log::info!(
        "loaded {} ({} pieces, {} bytes, info hash {})",
        metainfo.name,
        metainfo.piece_count(),
        metainfo.total_len,
        hex::encode(metainfo.info_hash)
    );

    let conf = Conf::default();
    let client_id = random_peer_id();

    let peers = tracker::announce(
        &metainfo.announce,
        &metainfo.info_hash,
        &client_id,
        metainfo.total_len,
        &conf,
    )
    .await?;
    log::info!("tracker returned {} peer(s)", peers.len());

    let data = torrent::download(&metainfo, peers, client_id, conf).await?;

    let output = args.output;
    tokio::fs::write(&output, &data)
        .await
        .map_err(|source| Error::WriteOutputFile {
            path: output.display().to_string(),
            source,
        })?;
    log::info!("wrote {}", output.display());

    Ok(())
}

/// The client id we announce: the fixed prefix from `conf::CLIENT_ID`
/// followed by a random suffix, so the tracker can tell repeated runs
/// of this client apart.
fn random_peer_id() -> soloterrent::PeerId {
    let mut id = *soloterrent::conf::CLIENT_ID;
    rand::thread_rng().fill(&mut id[8..]);
    id
}
