use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::peer::PSTR;

const RESERVED_LEN: usize = 8;
/// Reserved bytes, info hash and peer id that follow the protocol label.
const TAIL_LEN: usize = RESERVED_LEN + 20 + 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Between 1 and 255 bytes, so its length fits the leading byte.
    protocol: Vec<u8>,
    pub infohash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(infohash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            protocol: PSTR.as_bytes().to_vec(),
            infohash,
            peer_id,
        }
    }

    /// Handshake carrying a custom protocol label.
    pub fn with_protocol(
        protocol: impl Into<Vec<u8>>,
        infohash: [u8; 20],
        peer_id: [u8; 20],
    ) -> Result<Self> {
        let protocol = protocol.into();
        let len = u8::try_from(protocol.len()).map_err(|_| {
            Error::protocol(format!(
                "handshake protocol length {} does not fit in one byte",
                protocol.len()
            ))
        })?;
        check_label_len(len)?;
        Ok(Self {
            protocol,
            infohash,
            peer_id,
        })
    }

    /// Protocol label as sent by the peer; its content is not checked.
    pub fn protocol(&self) -> &[u8] {
        &self.protocol
    }

    /// `<len><label><8 reserved zero bytes><info hash><peer id>`
    pub fn serialize(&self) -> Vec<u8> {
        let label_len = self.protocol.len();
        let mut buf = Vec::with_capacity(1 + label_len + TAIL_LEN);
        buf.push(label_len as u8);
        buf.extend_from_slice(&self.protocol);
        buf.extend_from_slice(&[0u8; RESERVED_LEN]);
        buf.extend_from_slice(&self.infohash);
        buf.extend_from_slice(&self.peer_id);

        buf
    }

    /// Parses a complete handshake held in memory.
    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        let (&label_len, rest) = buf
            .split_first()
            .ok_or_else(|| Error::protocol("empty handshake"))?;
        let label_len = check_label_len(label_len)?;
        if rest.len() < label_len + TAIL_LEN {
            return Err(Error::protocol(format!(
                "handshake truncated: {} of {} bytes",
                rest.len(),
                label_len + TAIL_LEN
            )));
        }

        Ok(Self::from_body(&rest[..label_len + TAIL_LEN], label_len))
    }

    /// Reads a handshake off the wire.
    ///
    /// A zero label length is a protocol error; a connection that closes early
    /// surfaces as a network error.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let label_len = check_label_len(reader.read_u8().await?)?;

        let mut body = vec![0u8; label_len + TAIL_LEN];
        reader.read_exact(&mut body).await?;

        Ok(Self::from_body(&body, label_len))
    }

    fn from_body(body: &[u8], label_len: usize) -> Self {
        let hash_start = label_len + RESERVED_LEN;
        let mut infohash = [0u8; 20];
        let mut peer_id = [0u8; 20];
        infohash.copy_from_slice(&body[hash_start..hash_start + 20]);
        peer_id.copy_from_slice(&body[hash_start + 20..hash_start + 40]);

        Self {
            protocol: body[..label_len].to_vec(),
            infohash,
            peer_id,
        }
    }
}

fn check_label_len(len: u8) -> Result<usize> {
    if len == 0 {
        return Err(Error::protocol("handshake protocol length cannot be 0"));
    }
    Ok(len as usize)
}
