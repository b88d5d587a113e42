#![allow(dead_code)]

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use rs_leecher::peer::codec::MessageCodec;
use rs_leecher::peer::{Handshake, Message, MessageId};
use rs_leecher::{FileWriter, Peer, PieceWork, ProgressReporter, TrackerClient};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

pub const PEER_ID: [u8; 20] = *b"-RL0001-testtesttest";

/// Content, hashes and work items for a synthetic torrent.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub content: Arc<Vec<u8>>,
    pub piece_length: u32,
    pub works: Vec<PieceWork>,
    pub info_hash: [u8; 20],
}

impl Fixture {
    pub fn new(total_length: usize, piece_length: u32) -> Self {
        let content: Vec<u8> = (0..total_length).map(|i| (i * 7 % 251) as u8).collect();
        let works = content
            .chunks(piece_length as usize)
            .enumerate()
            .map(|(index, chunk)| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&Sha1::digest(chunk));
                PieceWork::new(index as u32, hash, chunk.len() as u32)
            })
            .collect();

        Self {
            content: Arc::new(content),
            piece_length,
            works,
            info_hash: [0x5a; 20],
        }
    }

    pub fn piece_count(&self) -> usize {
        self.works.len()
    }

    pub fn total_length(&self) -> u64 {
        self.content.len() as u64
    }

    /// A seeder holding every piece and serving them faithfully.
    pub fn seeder(&self) -> SimPeer {
        SimPeer {
            info_hash: self.info_hash,
            content: Arc::clone(&self.content),
            piece_length: self.piece_length,
            pieces: (0..self.piece_count() as u32).collect(),
            corrupt: HashSet::new(),
            hangs_up: false,
        }
    }
}

/// Scripted remote peer.
#[derive(Debug, Clone)]
pub struct SimPeer {
    pub info_hash: [u8; 20],
    pub content: Arc<Vec<u8>>,
    pub piece_length: u32,
    /// Pieces advertised in the bitfield and served on request.
    pub pieces: HashSet<u32>,
    /// Pieces served with flipped bytes.
    pub corrupt: HashSet<u32>,
    /// Drops the connection as soon as it receives Interested.
    pub hangs_up: bool,
}

impl SimPeer {
    pub fn with_pieces(mut self, pieces: impl IntoIterator<Item = u32>) -> Self {
        self.pieces = pieces.into_iter().collect();
        self
    }

    pub fn corrupting(mut self, pieces: impl IntoIterator<Item = u32>) -> Self {
        self.corrupt = pieces.into_iter().collect();
        self
    }

    pub fn hanging_up(mut self) -> Self {
        self.hangs_up = true;
        self
    }

    pub fn answering_for(mut self, info_hash: [u8; 20]) -> Self {
        self.info_hash = info_hash;
        self
    }

    fn piece_count(&self) -> usize {
        self.content.len().div_ceil(self.piece_length as usize)
    }

    fn bitfield(&self) -> Vec<u8> {
        let mut bits = vec![0u8; self.piece_count().div_ceil(8)];
        for &index in &self.pieces {
            bits[index as usize / 8] |= 1 << (7 - index % 8);
        }
        bits
    }

    /// Listens on a loopback port and serves every incoming connection.
    pub async fn listen(self) -> Peer {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(self.clone().serve(stream));
            }
        });

        match addr {
            SocketAddr::V4(v4) => Peer::new(*v4.ip(), v4.port()),
            SocketAddr::V6(_) => unreachable!("bound to an IPv4 address"),
        }
    }

    pub async fn serve<S>(self, mut stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut theirs = [0u8; 68];
        if stream.read_exact(&mut theirs).await.is_err() {
            return;
        }
        let reply = Handshake::new(self.info_hash, [0x77; 20]).serialize();
        if stream.write_all(&reply).await.is_err() {
            return;
        }

        let mut conn = Framed::new(stream, MessageCodec);
        let bitfield = Message {
            kind: MessageId::Bitfield,
            payload: self.bitfield(),
        };
        if conn.send(bitfield).await.is_err() {
            return;
        }

        while let Some(Ok(message)) = conn.next().await {
            let reply = match message.kind {
                MessageId::Interested if self.hangs_up => return,
                MessageId::Interested => Message::new(MessageId::Unchoke),
                MessageId::Request => match self.block(&message.payload) {
                    Some(piece) => piece,
                    None => continue,
                },
                _ => continue,
            };
            if conn.send(reply).await.is_err() {
                return;
            }
        }
    }

    fn block(&self, request: &[u8]) -> Option<Message> {
        let field = |i: usize| u32::from_be_bytes(request[i * 4..i * 4 + 4].try_into().unwrap());
        let (index, begin, length) = (field(0), field(1), field(2));
        if !self.pieces.contains(&index) {
            return None;
        }

        let start = index as usize * self.piece_length as usize + begin as usize;
        let mut data = self.content.get(start..start + length as usize)?.to_vec();
        if self.corrupt.contains(&index) {
            data.iter_mut().for_each(|b| *b ^= 0xff);
        }

        let mut payload = Vec::with_capacity(8 + data.len());
        payload.extend_from_slice(&index.to_be_bytes());
        payload.extend_from_slice(&begin.to_be_bytes());
        payload.extend_from_slice(&data);
        Some(Message {
            kind: MessageId::Piece,
            payload,
        })
    }
}

/// Keeps the written file in memory.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    pub written: Mutex<Option<(String, Vec<u8>)>>,
}

impl MemoryWriter {
    pub fn bytes(&self) -> Option<Vec<u8>> {
        self.written
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, bytes)| bytes.clone())
    }
}

impl FileWriter for MemoryWriter {
    async fn write(&self, name: &str, bytes: &[u8]) -> rs_leecher::Result<PathBuf> {
        *self.written.lock().unwrap() = Some((name.to_string(), bytes.to_vec()));
        Ok(PathBuf::from(name))
    }
}

/// Records every progress report.
#[derive(Debug, Default)]
pub struct Recorder {
    pub reports: Vec<(usize, usize, u32, usize)>,
}

impl ProgressReporter for Recorder {
    fn report(&mut self, done: usize, total: usize, index: u32, peers: usize) {
        self.reports.push((done, total, index, peers));
    }
}

/// Tracker returning a fixed peer list.
#[derive(Debug, Clone)]
pub struct StaticTracker(pub Vec<Peer>);

impl TrackerClient for StaticTracker {
    async fn announce(
        &self,
        _info_hash: [u8; 20],
        _peer_id: [u8; 20],
        _port: u16,
    ) -> rs_leecher::Result<Vec<Peer>> {
        Ok(self.0.clone())
    }
}
