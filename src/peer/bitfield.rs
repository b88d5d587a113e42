use crate::error::{Error, Result};

/// Pieces a peer advertises as available.
///
/// Bit `i` lives in byte `i / 8`, counted from the most significant bit, so
/// piece 0 is `0b1000_0000` of the first byte. Only indices below the torrent's
/// piece count are addressable; spare trailing bits are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
    piece_count: usize,
}

impl Bitfield {
    pub fn new(piece_count: usize) -> Self {
        Self {
            bits: vec![0; piece_count.div_ceil(8)],
            piece_count,
        }
    }

    /// Wraps the payload of a bitfield message.
    ///
    /// Fails when the payload is too short to cover `piece_count` pieces.
    pub fn from_bytes(bits: Vec<u8>, piece_count: usize) -> Result<Self> {
        let needed = piece_count.div_ceil(8);
        if bits.len() < needed {
            return Err(Error::protocol(format!(
                "bitfield of {} bytes cannot cover {} pieces",
                bits.len(),
                piece_count
            )));
        }
        Ok(Self { bits, piece_count })
    }

    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn has_piece(&self, index: usize) -> Result<bool> {
        let (byte, mask) = self.locate(index)?;
        Ok(self.bits[byte] & mask != 0)
    }

    pub fn mark_piece(&mut self, index: usize) -> Result<()> {
        let (byte, mask) = self.locate(index)?;
        self.bits[byte] |= mask;
        Ok(())
    }

    /// Number of available pieces.
    pub fn count(&self) -> usize {
        (0..self.piece_count)
            .filter(|&i| matches!(self.has_piece(i), Ok(true)))
            .count()
    }

    fn locate(&self, index: usize) -> Result<(usize, u8)> {
        if index >= self.piece_count {
            return Err(Error::IndexOutOfRange {
                index,
                capacity: self.piece_count,
            });
        }
        Ok((index / 8, 1 << (7 - index % 8)))
    }
}
