use crate::error::{Error, Result};

/// Frames longer than this are refused before any allocation.
pub const MAX_FRAME_LEN: u32 = 8 * 1024 * 1024;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Choke),
            1 => Ok(Self::Unchoke),
            2 => Ok(Self::Interested),
            3 => Ok(Self::NotInterested),
            4 => Ok(Self::Have),
            5 => Ok(Self::Bitfield),
            6 => Ok(Self::Request),
            7 => Ok(Self::Piece),
            8 => Ok(Self::Cancel),
            other => Err(Error::protocol(format!("unknown message id {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageId,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: MessageId) -> Self {
        Self {
            kind,
            payload: vec![],
        }
    }

    pub fn have(index: u32) -> Self {
        Self {
            kind: MessageId::Have,
            payload: index.to_be_bytes().to_vec(),
        }
    }

    pub fn request(index: u32, begin: u32, length: u32) -> Self {
        Self {
            kind: MessageId::Request,
            payload: block_triple(index, begin, length),
        }
    }

    pub fn cancel(index: u32, begin: u32, length: u32) -> Self {
        Self {
            kind: MessageId::Cancel,
            payload: block_triple(index, begin, length),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let total_len = 1 + self.payload.len(); // 1 byte for ID
        let mut buf = Vec::with_capacity(4 + total_len);

        buf.extend_from_slice(&(total_len as u32).to_be_bytes());
        buf.push(self.kind as u8);
        buf.extend_from_slice(&self.payload);

        buf
    }

    /// Parses one complete frame held in memory.
    ///
    /// Returns `Ok(None)` for a keep-alive.
    pub fn deserialize(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < 4 {
            return Err(Error::protocol("frame shorter than its length prefix"));
        }

        let len = frame_len(&buf[0..4])?;
        if len == 0 {
            return Ok(None);
        }
        let body = buf
            .get(4..4 + len)
            .ok_or_else(|| Error::protocol(format!("frame truncated: expected {len} bytes")))?;

        Self::from_body(body).map(Some)
    }

    /// Copies the block carried by a piece message into `buf`.
    ///
    /// Every field is checked against the piece being assembled so that a
    /// misbehaving peer can never write outside of it.
    pub fn parse_piece(&self, expected_index: u32, buf: &mut [u8]) -> Result<usize> {
        if self.kind != MessageId::Piece {
            return Err(Error::protocol(format!(
                "expected PIECE, got {:?}",
                self.kind
            )));
        }
        if self.payload.len() < 8 {
            return Err(Error::protocol(format!(
                "piece payload too short: {} < 8",
                self.payload.len()
            )));
        }

        let index = read_u32(&self.payload[0..4]);
        if index != expected_index {
            return Err(Error::protocol(format!(
                "expected piece {expected_index}, got {index}"
            )));
        }

        let begin = read_u32(&self.payload[4..8]) as usize;
        if begin >= buf.len() {
            return Err(Error::protocol(format!(
                "block offset too high: {begin} >= {}",
                buf.len()
            )));
        }

        let block = &self.payload[8..];
        if begin + block.len() > buf.len() {
            return Err(Error::protocol(format!(
                "block of {} bytes at offset {begin} overflows piece of {} bytes",
                block.len(),
                buf.len()
            )));
        }

        buf[begin..begin + block.len()].copy_from_slice(block);
        Ok(block.len())
    }

    pub fn parse_have(&self) -> Result<u32> {
        if self.kind != MessageId::Have {
            return Err(Error::protocol(format!(
                "expected HAVE, got {:?}",
                self.kind
            )));
        }
        if self.payload.len() != 4 {
            return Err(Error::protocol(format!(
                "have payload must be 4 bytes, got {}",
                self.payload.len()
            )));
        }
        Ok(read_u32(&self.payload))
    }

    /// Index field of a piece message, if the payload is long enough to hold one.
    pub fn piece_index(&self) -> Option<u32> {
        match self.kind {
            MessageId::Piece if self.payload.len() >= 4 => Some(read_u32(&self.payload[0..4])),
            _ => None,
        }
    }

    fn from_body(body: &[u8]) -> Result<Self> {
        let kind = MessageId::try_from(body[0])?;
        Ok(Self {
            kind,
            payload: body[1..].to_vec(),
        })
    }
}

pub(crate) fn frame_len(prefix: &[u8]) -> Result<usize> {
    let len = read_u32(prefix);
    if len > MAX_FRAME_LEN {
        return Err(Error::protocol(format!(
            "frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
        )));
    }
    Ok(len as usize)
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn block_triple(index: u32, begin: u32, length: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(12);
    payload.extend_from_slice(&index.to_be_bytes());
    payload.extend_from_slice(&begin.to_be_bytes());
    payload.extend_from_slice(&length.to_be_bytes());
    payload
}
