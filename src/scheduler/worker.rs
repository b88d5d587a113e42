use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::error::Result;
use crate::peer::PeerSession;
use crate::piece::{PieceResult, PieceWork};
use crate::scheduler::queue::WorkQueue;

/// Drains the shared queue through a single peer session.
pub struct Worker<S> {
    session: PeerSession<S>,
    queue: WorkQueue,
    results: mpsc::Sender<PieceResult>,
    config: Arc<DownloadConfig>,
}

impl<S> Worker<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        session: PeerSession<S>,
        queue: WorkQueue,
        results: mpsc::Sender<PieceResult>,
        config: Arc<DownloadConfig>,
    ) -> Self {
        Self {
            session,
            queue,
            results,
            config,
        }
    }

    /// Runs until the queue is closed, the session is retired or the
    /// connection is lost.
    ///
    /// Every piece taken from the queue is either published as a result or
    /// put back before the next one is taken. A piece in flight when the
    /// connection drops goes back without counting as a failed attempt. The
    /// session is dropped, and its connection closed, when this returns.
    pub async fn run(mut self) {
        let peer = self.session.peer();

        if let Err(e) = self.open().await {
            warn!(%peer, error = %e, "could not start session");
            return;
        }

        let mut consecutive_failures = 0u32;
        while !self.session.is_closed() {
            let Some(ticket) = self.queue.pop().await else {
                break;
            };
            let index = ticket.work().index;

            if !self.session.has_piece(index) {
                self.queue.requeue(ticket);
                tokio::task::yield_now().await;
                continue;
            }

            match self.attempt(ticket.work()).await {
                Ok(data) => {
                    consecutive_failures = 0;
                    if let Err(e) = self.session.send_have(index).await {
                        warn!(%peer, index, error = %e, "failed to announce piece");
                    }
                    if self.results.send(PieceResult { index, data }).await.is_err() {
                        break;
                    }
                }
                Err(e) if self.session.is_closed() => {
                    info!(%peer, index, error = %e, "connection lost, leaving");
                    self.queue.requeue(ticket);
                }
                Err(e) => {
                    debug!(%peer, index, error = %e, "piece attempt failed");
                    consecutive_failures += 1;

                    if !self.queue.retry(ticket) {
                        warn!(%peer, index, "giving up on piece, stopping download");
                        self.queue.close();
                        break;
                    }
                    if self
                        .config
                        .max_session_failures
                        .is_some_and(|limit| consecutive_failures >= limit)
                    {
                        info!(%peer, failures = consecutive_failures, "retiring peer");
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            }
        }

        debug!(%peer, "worker finished");
    }

    async fn open(&mut self) -> Result<()> {
        self.session.send_unchoke().await?;
        self.session.send_interested().await
    }

    async fn attempt(&mut self, work: &PieceWork) -> Result<Vec<u8>> {
        let data = self.session.download_piece(work, &self.config).await?;
        work.check_integrity(&data)?;
        Ok(data)
    }
}
