use std::net::Ipv4Addr;
use std::time::Duration;

use once_cell::sync::Lazy;
use percent_encoding::{NON_ALPHANUMERIC, percent_encode};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::bencode_parser::{Value, parse};
use crate::error::{Error, Result};
use crate::peer::Peer;
use crate::torrent::Torrent;

const TRACKER_TIMEOUT: Duration = Duration::from_secs(15);

static HTTP_CLIENT: Lazy<reqwest::Result<Client>> = Lazy::new(|| {
    Client::builder()
        .user_agent(concat!("rs_leecher/", env!("CARGO_PKG_VERSION")))
        .timeout(TRACKER_TIMEOUT)
        .build()
});

/// Source of candidate peers for a torrent.
pub trait TrackerClient {
    fn announce(
        &self,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        port: u16,
    ) -> impl Future<Output = Result<Vec<Peer>>> + Send;
}

/// HTTP(S) tracker asking for compact peer lists.
#[derive(Debug, Clone)]
pub struct HttpTracker {
    announce: String,
    left: u64,
}

impl HttpTracker {
    pub fn new(announce: impl Into<String>, left: u64) -> Self {
        Self {
            announce: announce.into(),
            left,
        }
    }

    pub fn for_torrent(torrent: &Torrent) -> Self {
        Self::new(torrent.announce.clone(), torrent.length)
    }

    fn url(&self, info_hash: &[u8; 20], peer_id: &[u8; 20], port: u16) -> Result<Url> {
        build_tracker_url(&self.announce, info_hash, peer_id, port, self.left)
    }
}

impl TrackerClient for HttpTracker {
    async fn announce(&self, info_hash: [u8; 20], peer_id: [u8; 20], port: u16) -> Result<Vec<Peer>> {
        let url = self.url(&info_hash, &peer_id, port)?;
        debug!(tracker = %self.announce, "announcing");

        let body = contact_tracker(url).await?;
        let announce = parse_announce_response(&body)?;
        debug!(
            interval = ?announce.interval,
            peers = announce.peers.len(),
            "tracker answered"
        );
        Ok(announce.peers)
    }
}

fn encode_bytes(bytes: &[u8]) -> String {
    percent_encode(bytes, NON_ALPHANUMERIC).to_string()
}

fn build_tracker_url(
    announce: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    left: u64,
) -> Result<Url> {
    let mut base = Url::parse(announce)
        .map_err(|e| Error::parse(format!("invalid announce url '{announce}': {e}")))?;

    let query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&compact=1&left={}",
        encode_bytes(info_hash),
        encode_bytes(peer_id),
        port,
        left
    );

    // Keep whatever the announce URL already carries, e.g. a passkey.
    let query = match base.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
        _ => query,
    };
    base.set_query(Some(&query));
    Ok(base)
}

async fn contact_tracker(url: Url) -> Result<Vec<u8>> {
    let client = HTTP_CLIENT
        .as_ref()
        .map_err(|e| Error::Tracker(format!("could not build HTTP client: {e}")))?;
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(Error::Tracker(format!("HTTP status {}", response.status())));
    }

    let bytes = response.bytes().await?;
    Ok(bytes.to_vec())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    pub interval: Option<i64>,
    pub peers: Vec<Peer>,
}

pub fn parse_announce_response(body: &[u8]) -> Result<AnnounceResponse> {
    let values = parse(body)?;
    let dict = values
        .first()
        .filter(|v| v.as_dict().is_some())
        .ok_or_else(|| Error::parse("tracker response is not a dictionary"))?;

    if let Some(reason) = dict.get(b"failure reason").and_then(Value::as_bytes) {
        return Err(Error::Tracker(String::from_utf8_lossy(reason).into_owned()));
    }

    let interval = dict.get(b"interval").and_then(Value::as_integer);

    let peers = match dict.get(b"peers") {
        Some(Value::Bytes(peers)) => extract_peers(peers)?,
        Some(_) => return Err(Error::parse("only compact peer lists are supported")),
        None => return Err(Error::parse("tracker response has no peers")),
    };

    Ok(AnnounceResponse { interval, peers })
}

fn extract_peers(bytes: &[u8]) -> Result<Vec<Peer>> {
    if bytes.len() % 6 != 0 {
        return Err(Error::parse(format!(
            "compact peer list of {} bytes is not a multiple of 6",
            bytes.len()
        )));
    }
    let peers = bytes
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            Peer::new(ip, port)
        })
        .collect();

    Ok(peers)
}
