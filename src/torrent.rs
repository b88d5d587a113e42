use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::bencode_parser::{Value, parse};
use crate::error::{Error, Result};
use crate::piece::{PieceWork, sha1};

/// Metadata of a single-file torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Torrent {
    pub announce: String,
    pub creation_date: Option<i64>,
    pub length: u64,
    pub piece_length: u32,
    pub name: String,
    pub pieces: Vec<[u8; 20]>,
    pub infohash: [u8; 20],
}

impl Torrent {
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Exact length of piece `index`; the last one may be short.
    pub fn piece_length_at(&self, index: usize) -> u32 {
        let begin = index as u64 * self.piece_length as u64;
        let end = (begin + self.piece_length as u64).min(self.length);
        end.saturating_sub(begin) as u32
    }

    /// One work item per piece, in index order.
    pub fn piece_works(&self) -> Vec<PieceWork> {
        self.pieces
            .iter()
            .enumerate()
            .map(|(index, hash)| PieceWork::new(index as u32, *hash, self.piece_length_at(index)))
            .collect()
    }
}

type Dict<'a> = HashMap<&'a [u8], Value<'a>>;

fn get_string(dict: &Dict<'_>, key: &str) -> Result<String> {
    let bytes = dict
        .get(key.as_bytes())
        .ok_or_else(|| Error::parse(format!("missing '{key}' field")))?
        .as_bytes()
        .ok_or_else(|| Error::parse(format!("'{key}' must be a string")))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::parse(format!("'{key}' is not valid UTF-8")))
}

fn get_positive(dict: &Dict<'_>, key: &str) -> Result<u64> {
    let value = dict
        .get(key.as_bytes())
        .ok_or_else(|| Error::parse(format!("missing '{key}' field")))?
        .as_integer()
        .ok_or_else(|| Error::parse(format!("'{key}' must be an integer")))?;
    u64::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| Error::parse(format!("'{key}' must be positive, got {value}")))
}

/// Parse torrent from file path
pub fn parse_torrent_file(file_path: impl AsRef<Path>) -> Result<Torrent> {
    let file_path = file_path.as_ref();
    let data = fs::read(file_path).map_err(|e| Error::io(file_path, e))?;
    parse_torrent_bytes(&data)
}

/// Parse torrent from byte slice
pub fn parse_torrent_bytes(data: &[u8]) -> Result<Torrent> {
    let parsed = parse(data)?;
    let dict = parsed
        .first()
        .ok_or_else(|| Error::parse("empty torrent file"))?
        .as_dict()
        .ok_or_else(|| Error::parse("expected top-level dictionary"))?;

    let announce = get_string(dict, "announce")?;
    let creation_date = dict
        .get(b"creation date" as &[u8])
        .and_then(Value::as_integer);

    let (info, raw_info) = match dict.get(b"info" as &[u8]) {
        Some(Value::Dictionary { entries, raw }) => (entries, *raw),
        Some(_) => return Err(Error::parse("'info' must be a dictionary")),
        None => return Err(Error::parse("missing 'info' field")),
    };

    if info.contains_key(b"files" as &[u8]) {
        return Err(Error::parse("multi-file torrents are not supported"));
    }

    let name = get_string(info, "name")?;
    let length = get_positive(info, "length")?;
    let piece_length = u32::try_from(get_positive(info, "piece length")?)
        .map_err(|_| Error::parse("'piece length' does not fit in 32 bits"))?;

    let pieces_bytes = info
        .get(b"pieces" as &[u8])
        .and_then(Value::as_bytes)
        .ok_or_else(|| Error::parse("missing or invalid 'pieces' field"))?;
    if pieces_bytes.len() % 20 != 0 {
        return Err(Error::parse(format!(
            "'pieces' length {} is not a multiple of 20",
            pieces_bytes.len()
        )));
    }

    let pieces: Vec<[u8; 20]> = pieces_bytes
        .chunks_exact(20)
        .map(|chunk| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect();

    let expected = length.div_ceil(piece_length as u64);
    if pieces.len() as u64 != expected {
        return Err(Error::parse(format!(
            "{} piece hashes for {expected} pieces",
            pieces.len()
        )));
    }

    Ok(Torrent {
        announce,
        creation_date,
        length,
        piece_length,
        name,
        pieces,
        infohash: sha1(raw_info),
    })
}
