use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// One piece to fetch: its index, expected SHA-1 and exact length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceWork {
    pub index: u32,
    pub hash: [u8; 20],
    pub length: u32,
}

/// A downloaded piece whose hash has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceResult {
    pub index: u32,
    pub data: Vec<u8>,
}

impl PieceWork {
    pub fn new(index: u32, hash: [u8; 20], length: u32) -> Self {
        Self {
            index,
            hash,
            length,
        }
    }

    pub fn check_integrity(&self, data: &[u8]) -> Result<()> {
        let digest = Sha1::digest(data);
        if data.len() != self.length as usize || digest.as_slice() != &self.hash[..] {
            return Err(Error::Integrity { index: self.index });
        }
        Ok(())
    }
}

pub(crate) fn sha1(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Sha1::digest(data));
    out
}
