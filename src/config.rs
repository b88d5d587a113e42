use std::time::Duration;

pub const MAX_BLOCK_SIZE: u32 = 65536;
pub const MAX_BACKLOG: usize = 5;
pub const DEFAULT_PORT: u16 = 6881;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
const BITFIELD_TIMEOUT: Duration = Duration::from_secs(5);
const PIECE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for session establishment, pipelining and retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    /// How long to wait for the bitfield that must follow the handshake.
    pub bitfield_timeout: Duration,
    /// Hard deadline for one attempt at one piece.
    pub piece_timeout: Duration,
    pub max_backlog: usize,
    pub max_block_size: u32,
    /// Port announced to the tracker.
    pub port: u16,
    /// Give up on the whole download once a piece failed this many times.
    /// `None` retries forever.
    pub max_piece_attempts: Option<u32>,
    /// Retire a session after this many consecutive failed attempts.
    /// `None` keeps every session until the download ends.
    pub max_session_failures: Option<u32>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            bitfield_timeout: BITFIELD_TIMEOUT,
            piece_timeout: PIECE_TIMEOUT,
            max_backlog: MAX_BACKLOG,
            max_block_size: MAX_BLOCK_SIZE,
            port: DEFAULT_PORT,
            max_piece_attempts: None,
            max_session_failures: None,
        }
    }
}
