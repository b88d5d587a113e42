//! Distributes pieces across peer sessions and assembles the result.
//!
//! Each session gets its own [`Worker`] task. Workers share a [`WorkQueue`]
//! seeded with every piece, and send verified pieces over a channel to the
//! single [`Aggregator`], which owns the output buffer.

pub mod aggregator;
pub mod queue;
pub mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::info;

pub use aggregator::Aggregator;
pub use queue::{Ticket, WorkQueue};
pub use worker::Worker;

use crate::config::DownloadConfig;
use crate::error::Result;
use crate::output::{FileWriter, ProgressReporter};
use crate::peer::PeerSession;
use crate::piece::PieceWork;
use crate::torrent::Torrent;

pub struct Scheduler {
    works: Vec<PieceWork>,
    piece_length: u32,
    total_length: u64,
    config: Arc<DownloadConfig>,
}

impl Scheduler {
    pub fn new(
        works: Vec<PieceWork>,
        piece_length: u32,
        total_length: u64,
        config: DownloadConfig,
    ) -> Self {
        Self {
            works,
            piece_length,
            total_length,
            config: Arc::new(config),
        }
    }

    pub fn for_torrent(torrent: &Torrent, config: DownloadConfig) -> Self {
        Self::new(
            torrent.piece_works(),
            torrent.piece_length,
            torrent.length,
            config,
        )
    }

    /// Downloads every piece through `sessions` and writes the assembled file.
    pub async fn run<S, W, R>(
        self,
        sessions: Vec<PeerSession<S>>,
        name: &str,
        writer: &W,
        reporter: &mut R,
    ) -> Result<PathBuf>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        W: FileWriter,
        R: ProgressReporter,
    {
        let piece_count = self.works.len();
        let peers = sessions.len();
        info!(pieces = piece_count, peers, "starting download");

        let queue = WorkQueue::new(self.works, self.config.max_piece_attempts);
        let (results_tx, results_rx) = mpsc::channel(1);

        let mut workers = JoinSet::new();
        for session in sessions {
            let worker = Worker::new(
                session,
                queue.clone(),
                results_tx.clone(),
                Arc::clone(&self.config),
            );
            workers.spawn(worker.run());
        }
        drop(results_tx);

        let outcome = Aggregator::new(self.piece_length, self.total_length, piece_count)
            .collect(results_rx, &queue, peers, reporter)
            .await;

        // Idle workers leave on their own once the queue is closed; any still
        // blocked on a peer are cancelled here.
        workers.shutdown().await;

        let buf = outcome?;
        writer.write(name, &buf).await
    }
}
