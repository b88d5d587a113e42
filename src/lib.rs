pub mod bencode_parser;
pub mod client;
pub mod config;
pub mod error;
pub mod output;
pub mod peer;
pub mod piece;
pub mod scheduler;
pub mod torrent;
pub mod tracker;

// Re-export commonly used types and functions for easier access
pub use bencode_parser::{Value, parse};
pub use client::{TorrentClient, connect_all};
pub use config::DownloadConfig;
pub use error::{Error, Result};
pub use output::{FileWriter, FsWriter, LogProgress, ProgressReporter};
pub use peer::{Peer, PeerSession, generate_peer_id};
pub use piece::{PieceResult, PieceWork};
pub use scheduler::Scheduler;
pub use torrent::{Torrent, parse_torrent_bytes, parse_torrent_file};
pub use tracker::{HttpTracker, TrackerClient};
