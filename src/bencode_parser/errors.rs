use nom::error::{ErrorKind, ParseError};
use thiserror::Error;

use crate::error::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BencodeError<I> {
    /// Leading zeros, `-0` or a bare sign.
    #[error("invalid integer")]
    InvalidInteger(I),

    #[error("integer does not fit in 64 bits")]
    Overflow(I),

    #[error("byte string length exceeds remaining input")]
    InvalidBytesLength(I),

    /// Lists and dictionaries nested past `MAX_DEPTH`.
    #[error("nesting too deep")]
    TooDeep(I),

    #[error("unexpected input ({1:?})")]
    Nom(I, ErrorKind),
}

impl<I> BencodeError<I> {
    pub fn input(&self) -> &I {
        match self {
            BencodeError::InvalidInteger(i)
            | BencodeError::Overflow(i)
            | BencodeError::InvalidBytesLength(i)
            | BencodeError::TooDeep(i)
            | BencodeError::Nom(i, _) => i,
        }
    }
}

impl<I> ParseError<I> for BencodeError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        BencodeError::Nom(input, kind)
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}

impl From<nom::Err<BencodeError<&[u8]>>> for Error {
    fn from(err: nom::Err<BencodeError<&[u8]>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => Error::parse("bencode: unexpected end of input"),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                let near = &e.input()[..e.input().len().min(16)];
                Error::parse(format!(
                    "bencode: {e} near {:?}",
                    String::from_utf8_lossy(near)
                ))
            }
        }
    }
}
