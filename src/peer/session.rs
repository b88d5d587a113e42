//! One connection to one peer.
//!
//! A session is established in three steps (dial, handshake, initial
//! bitfield) and then drives the pipelined download of one piece at a time:
//!
//! ```text
//! Idle -> Requesting -> AwaitingBlocks -> Verifying -> Done
//!                 \___________\_______________________-> Failed
//! ```
//!
//! Requests are only issued while the peer has us unchoked, and never more
//! than `max_backlog` at once. Verification is left to the caller.
//!
//! Once the peer hangs up, or the stream fails to read or write, the session
//! is closed for good and every later call fails.

use std::io;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::peer::codec::MessageCodec;
use crate::peer::{Bitfield, Handshake, Message, MessageId, Peer};
use crate::piece::PieceWork;

#[derive(Debug)]
pub struct PeerSession<S = TcpStream> {
    conn: Framed<S, MessageCodec>,
    choked: bool,
    possessed: Bitfield,
    peer: Peer,
    closed: bool,
}

impl PeerSession<TcpStream> {
    /// Dials `peer` and establishes a session, each step under its own timeout.
    pub async fn connect(
        peer: Peer,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        piece_count: usize,
        config: &DownloadConfig,
    ) -> Result<Self> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(peer.addr()))
            .await
            .map_err(|_| Error::timeout("connecting"))??;
        debug!(%peer, "connected");

        Self::establish(stream, peer, info_hash, peer_id, piece_count, config).await
    }
}

impl<S> PeerSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Runs the handshake and waits for the peer's bitfield on an open stream.
    ///
    /// The stream is dropped, and so closed, on every error path.
    pub async fn establish(
        mut stream: S,
        peer: Peer,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        piece_count: usize,
        config: &DownloadConfig,
    ) -> Result<Self> {
        let remote = timeout(
            config.handshake_timeout,
            exchange_handshake(&mut stream, info_hash, peer_id),
        )
        .await
        .map_err(|_| Error::timeout("exchanging handshake"))??;

        if remote.infohash != info_hash {
            return Err(Error::Auth {
                expected: info_hash,
                actual: remote.infohash,
            });
        }

        let mut conn = Framed::new(stream, MessageCodec);
        let first = match timeout(config.bitfield_timeout, conn.next()).await {
            Ok(Some(message)) => message?,
            Ok(None) => return Err(closed_by_peer()),
            Err(_) => {
                return Err(Error::protocol(format!(
                    "no bitfield received within {:?}",
                    config.bitfield_timeout
                )));
            }
        };
        if first.kind != MessageId::Bitfield {
            return Err(Error::protocol(format!(
                "expected bitfield as first message, got {:?}",
                first.kind
            )));
        }
        let possessed = Bitfield::from_bytes(first.payload, piece_count)?;

        debug!(%peer, pieces = possessed.count(), "session established");

        Ok(Self {
            conn,
            choked: true,
            possessed,
            peer,
            closed: false,
        })
    }

    pub fn peer(&self) -> Peer {
        self.peer
    }

    pub fn is_choked(&self) -> bool {
        self.choked
    }

    /// Whether the connection is gone; a closed session cannot recover.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn possessed(&self) -> &Bitfield {
        &self.possessed
    }

    /// Whether the peer advertised `index`; out-of-range indices count as missing.
    pub fn has_piece(&self, index: u32) -> bool {
        matches!(self.possessed.has_piece(index as usize), Ok(true))
    }

    pub async fn send(&mut self, message: Message) -> Result<()> {
        trace!(peer = %self.peer, kind = ?message.kind, "send");
        let sent = self.conn.send(message).await;
        self.track(sent)
    }

    pub async fn send_unchoke(&mut self) -> Result<()> {
        self.send(Message::new(MessageId::Unchoke)).await
    }

    pub async fn send_interested(&mut self) -> Result<()> {
        self.send(Message::new(MessageId::Interested)).await
    }

    pub async fn send_have(&mut self, index: u32) -> Result<()> {
        self.send(Message::have(index)).await
    }

    pub async fn send_request(&mut self, index: u32, begin: u32, length: u32) -> Result<()> {
        self.send(Message::request(index, begin, length)).await
    }

    /// Waits for the next typed message; keep-alives are skipped.
    pub async fn next_message(&mut self) -> Result<Message> {
        let received = match self.conn.next().await {
            Some(message) => message,
            None => Err(closed_by_peer()),
        };
        self.track(received)
    }

    /// Marks the session closed when a read or write on the stream failed.
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() && !self.closed {
            debug!(peer = %self.peer, "connection lost");
            self.closed = true;
        }
        result
    }

    /// Downloads every block of `work` under the per-attempt deadline.
    ///
    /// Returns the assembled, not yet verified, piece.
    pub async fn download_piece(
        &mut self,
        work: &PieceWork,
        config: &DownloadConfig,
    ) -> Result<Vec<u8>> {
        match timeout(config.piece_timeout, self.fetch_blocks(work, config)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(&format!("downloading piece {}", work.index))),
        }
    }

    async fn fetch_blocks(&mut self, work: &PieceWork, config: &DownloadConfig) -> Result<Vec<u8>> {
        let mut progress = PieceProgress::new(work);

        while !progress.is_complete() {
            if !self.choked {
                self.fill_pipeline(&mut progress, config).await?;
            }

            // Suspends here while choked until the peer says otherwise.
            let message = self.next_message().await?;
            self.apply(message, &mut progress)?;
        }

        trace!(peer = %self.peer, index = work.index, "all blocks received");
        Ok(progress.buf)
    }

    async fn fill_pipeline(
        &mut self,
        progress: &mut PieceProgress,
        config: &DownloadConfig,
    ) -> Result<()> {
        let mut queued = 0;
        while let Some((begin, length)) =
            progress.next_request(config.max_backlog, config.max_block_size)
        {
            let fed = self
                .conn
                .feed(Message::request(progress.index, begin, length))
                .await;
            self.track(fed)?;
            progress.mark_requested(length);
            queued += 1;
        }

        if queued > 0 {
            let flushed = self.conn.flush().await;
            self.track(flushed)?;
            trace!(
                peer = %self.peer,
                index = progress.index,
                queued,
                backlog = progress.backlog,
                "requested blocks"
            );
        }
        Ok(())
    }

    fn apply(&mut self, message: Message, progress: &mut PieceProgress) -> Result<()> {
        match message.kind {
            MessageId::Unchoke => self.choked = false,
            MessageId::Choke => self.choked = true,
            MessageId::Have => {
                let index = message.parse_have()?;
                self.possessed.mark_piece(index as usize)?;
            }
            MessageId::Piece => {
                // Answers to requests from an earlier, abandoned attempt.
                if let Some(index) = message.piece_index().filter(|&i| i != progress.index) {
                    debug!(peer = %self.peer, index, expected = progress.index, "dropping stale block");
                    return Ok(());
                }
                let n = message.parse_piece(progress.index, &mut progress.buf)?;
                progress.downloaded += n;
                progress.backlog = progress.backlog.saturating_sub(1);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Bookkeeping for one attempt at one piece; dropped when the attempt ends.
#[derive(Debug)]
struct PieceProgress {
    index: u32,
    buf: Vec<u8>,
    downloaded: usize,
    requested: usize,
    backlog: usize,
}

impl PieceProgress {
    fn new(work: &PieceWork) -> Self {
        Self {
            index: work.index,
            buf: vec![0; work.length as usize],
            downloaded: 0,
            requested: 0,
            backlog: 0,
        }
    }

    fn is_complete(&self) -> bool {
        self.downloaded >= self.buf.len()
    }

    /// Offset and length of the next block to request, if the pipeline has room.
    fn next_request(&self, max_backlog: usize, max_block_size: u32) -> Option<(u32, u32)> {
        if self.backlog >= max_backlog || self.requested >= self.buf.len() {
            return None;
        }
        let length = (self.buf.len() - self.requested).min(max_block_size as usize);
        Some((self.requested as u32, length as u32))
    }

    fn mark_requested(&mut self, length: u32) {
        self.backlog += 1;
        self.requested += length as usize;
    }
}

async fn exchange_handshake<S>(
    stream: &mut S,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
) -> Result<Handshake>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&Handshake::new(info_hash, peer_id).serialize())
        .await?;
    Handshake::read_from(stream).await
}

fn closed_by_peer() -> Error {
    Error::Network(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "peer closed the connection",
    ))
}
