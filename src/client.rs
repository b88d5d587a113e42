use std::path::PathBuf;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::error::Result;
use crate::output::{FileWriter, ProgressReporter};
use crate::peer::{Peer, PeerSession, generate_peer_id};
use crate::scheduler::Scheduler;
use crate::torrent::Torrent;
use crate::tracker::TrackerClient;

/// Main BitTorrent client: announce, connect, download, write.
pub struct TorrentClient {
    config: DownloadConfig,
    peer_id: [u8; 20],
}

impl TorrentClient {
    pub fn new(config: DownloadConfig) -> Self {
        Self::with_peer_id(config, generate_peer_id())
    }

    pub fn with_peer_id(config: DownloadConfig, peer_id: [u8; 20]) -> Self {
        Self { config, peer_id }
    }

    pub fn peer_id(&self) -> [u8; 20] {
        self.peer_id
    }

    /// Downloads `torrent` and returns the path of the written file.
    pub async fn download<T, W, R>(
        &self,
        torrent: &Torrent,
        tracker: &T,
        writer: &W,
        reporter: &mut R,
    ) -> Result<PathBuf>
    where
        T: TrackerClient,
        W: FileWriter,
        R: ProgressReporter,
    {
        let peers = tracker
            .announce(torrent.infohash, self.peer_id, self.config.port)
            .await?;
        info!(count = peers.len(), "tracker returned peers");

        let sessions = connect_all(
            &peers,
            torrent.infohash,
            self.peer_id,
            torrent.piece_count(),
            &self.config,
        )
        .await;
        if sessions.is_empty() {
            warn!("no peer completed the handshake");
        } else {
            info!(connected = sessions.len(), "sessions established");
        }

        Scheduler::for_torrent(torrent, self.config.clone())
            .run(sessions, &torrent.name, writer, reporter)
            .await
    }
}

/// Establishes sessions with every peer concurrently, keeping the ones that succeed.
pub async fn connect_all(
    peers: &[Peer],
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    piece_count: usize,
    config: &DownloadConfig,
) -> Vec<PeerSession> {
    let mut attempts = JoinSet::new();
    for &peer in peers {
        let config = config.clone();
        attempts.spawn(async move {
            let outcome =
                PeerSession::connect(peer, info_hash, peer_id, piece_count, &config).await;
            (peer, outcome)
        });
    }

    let mut sessions = Vec::with_capacity(peers.len());
    while let Some(joined) = attempts.join_next().await {
        match joined {
            Ok((_, Ok(session))) => sessions.push(session),
            Ok((peer, Err(e))) => debug!(%peer, error = %e, "dropping peer"),
            Err(e) => warn!(error = %e, "connection task failed"),
        }
    }
    sessions
}
