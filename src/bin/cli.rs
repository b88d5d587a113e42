use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rs_leecher::{
    DownloadConfig, FsWriter, HttpTracker, LogProgress, TorrentClient, parse_torrent_file,
};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Download a single-file torrent from its peers.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the .torrent file.
    torrent: PathBuf,

    /// Directory the downloaded file is written to.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Port announced to the tracker.
    #[arg(long, default_value_t = rs_leecher::config::DEFAULT_PORT)]
    port: u16,

    /// Abort once a single piece has failed this many times.
    #[arg(long)]
    max_piece_attempts: Option<u32>,

    /// Drop a peer after this many consecutive failed pieces.
    #[arg(long)]
    max_session_failures: Option<u32>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> DownloadConfig {
        DownloadConfig {
            port: self.port,
            max_piece_attempts: self.max_piece_attempts,
            max_session_failures: self.max_session_failures,
            ..DownloadConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run(&args).await {
        Ok(path) => {
            info!(path = %path.display(), "download complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> rs_leecher::Result<PathBuf> {
    let torrent = parse_torrent_file(&args.torrent)?;
    info!(
        name = %torrent.name,
        pieces = torrent.piece_count(),
        bytes = torrent.length,
        "loaded torrent"
    );

    let client = TorrentClient::new(args.config());
    debug!(peer_id = %String::from_utf8_lossy(&client.peer_id()), "client ready");
    client
        .download(
            &torrent,
            &HttpTracker::for_torrent(&torrent),
            &FsWriter::new(&args.output),
            &mut LogProgress,
        )
        .await
}
