use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors produced while loading metadata, talking to peers or assembling pieces.
///
/// `Network`, `Protocol` and `Integrity` raised during a piece attempt are
/// recoverable: the worker re-enqueues the piece and moves on. `Auth` and any
/// failure during session establishment only drop the offending peer. `Parse`
/// on the torrent file is fatal.
#[derive(Debug, Error)]
pub enum Error {
    /// Dial, read, write or timeout failure.
    #[error("network error: {0}")]
    Network(#[from] io::Error),

    /// Reading the torrent file or writing the output failed.
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The tracker could not be reached over HTTP.
    #[error("tracker request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed handshake, frame or message from a peer.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer answered the handshake for a different torrent.
    #[error("info hash mismatch: expected {}, got {}", hex(expected), hex(actual))]
    Auth {
        expected: [u8; 20],
        actual: [u8; 20],
    },

    /// Assembled piece does not match its expected SHA-1.
    #[error("piece {index} failed integrity check")]
    Integrity { index: u32 },

    /// Malformed torrent file or tracker payload.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("piece index {index} out of range for {capacity} pieces")]
    IndexOutOfRange { index: usize, capacity: usize },

    /// The tracker answered with a failure reason or a bad status.
    #[error("tracker error: {0}")]
    Tracker(String),

    /// No worker is left able to finish the download.
    #[error("download incomplete: {done} of {total} pieces")]
    Incomplete { done: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn timeout(what: &str) -> Self {
        Error::Network(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("timed out while {what}"),
        ))
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
