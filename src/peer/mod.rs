use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use rand::Rng;
use rand::distr::Alphanumeric;

pub mod bitfield;
pub mod codec;
pub mod handshake;
pub mod message;
pub mod session;

pub use bitfield::Bitfield;
pub use handshake::Handshake;
pub use message::{Message, MessageId};
pub use session::PeerSession;

pub const PSTR: &str = "BitTorrent protocol";
const PEER_ID_PREFIX: &[u8; 8] = b"-RL0001-";

/// A remote endpoint as returned by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    pub ip_addr: Ipv4Addr,
    pub port: u16,
}

impl Peer {
    pub fn new(ip_addr: Ipv4Addr, port: u16) -> Self {
        Self { ip_addr, port }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((self.ip_addr, self.port))
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip_addr, self.port)
    }
}

/// Azureus-style peer id: client prefix followed by random alphanumerics.
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    peer_id[..8].copy_from_slice(PEER_ID_PREFIX);
    for (slot, byte) in peer_id[8..]
        .iter_mut()
        .zip(rand::rng().sample_iter(Alphanumeric))
    {
        *slot = byte;
    }
    peer_id
}
