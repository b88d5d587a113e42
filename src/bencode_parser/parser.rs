use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take,
    character::complete::{char, digit1},
    combinator::{eof, opt, recognize},
    multi::{many_till, many0},
    sequence::{delimited, pair, terminated},
};
use std::collections::HashMap;

pub use nom::Err;

use crate::bencode_parser::errors::BencodeError;
type ParseResult<'a, O> = IResult<&'a [u8], O, BencodeError<&'a [u8]>>;
type BenResult<'a> = ParseResult<'a, Value<'a>>;

/// Deepest list or dictionary nesting accepted before parsing fails.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<'a> {
    Bytes(&'a [u8]),
    Integer(i64),
    List(Vec<Self>),
    /// `raw` is the exact encoded span, from `d` through the closing `e`.
    Dictionary {
        entries: HashMap<&'a [u8], Self>,
        raw: &'a [u8],
    },
}

impl<'a> Value<'a> {
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&HashMap<&'a [u8], Self>> {
        match self {
            Value::Dictionary { entries, .. } => Some(entries),
            _ => None,
        }
    }

    /// Dictionary lookup; `None` for missing keys and non-dictionaries.
    pub fn get(&self, key: &[u8]) -> Option<&Self> {
        self.as_dict()?.get(key)
    }

    fn parse_top_level(inp: &'a [u8]) -> BenResult<'a> {
        Self::parse_value(inp, 0)
    }

    /// `depth` counts the containers enclosing `inp`.
    fn parse_value(inp: &'a [u8], depth: usize) -> BenResult<'a> {
        if depth >= MAX_DEPTH && matches!(inp.first(), Some(b'l' | b'd')) {
            return Err(nom::Err::Failure(BencodeError::TooDeep(inp)));
        }
        alt((
            Self::parse_bytes,
            Self::parse_integer,
            |i: &'a [u8]| Self::parse_list(i, depth + 1),
            |i: &'a [u8]| Self::parse_dict(i, depth + 1),
        ))
        .parse(inp)
    }

    fn parse_integer(start_inp: &'a [u8]) -> BenResult<'a> {
        let integer: ParseResult<'a, &'a [u8]> = delimited(
            char('i'),
            recognize(pair(opt(char('-')), digit1)),
            char('e'),
        )
        .parse(start_inp);
        let (inp, digits) = integer?;

        if digits.starts_with(b"-0") || (digits.starts_with(b"0") && digits.len() > 1) {
            return Err(nom::Err::Failure(BencodeError::InvalidInteger(start_inp)));
        }

        let (negative, magnitude) = match digits.split_first() {
            Some((b'-', rest)) => (true, rest),
            _ => (false, digits),
        };
        let value = decimal(magnitude)
            .and_then(|n| if negative { n.checked_neg() } else { Some(n) })
            .ok_or(nom::Err::Failure(BencodeError::Overflow(start_inp)))?;

        Ok((inp, Value::Integer(value)))
    }

    fn parse_bytes(start_inp: &'a [u8]) -> BenResult<'a> {
        let prefix: ParseResult<'a, &'a [u8]> = terminated(digit1, char(':')).parse(start_inp);
        let (inp, length) = prefix?;

        let length = decimal(length)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n <= inp.len())
            .ok_or(nom::Err::Failure(BencodeError::InvalidBytesLength(start_inp)))?;

        let body: ParseResult<'a, &'a [u8]> = take(length).parse(inp);
        let (inp, characters) = body?;

        Ok((inp, Value::Bytes(characters)))
    }

    fn parse_list(start_inp: &'a [u8], depth: usize) -> BenResult<'a> {
        let item = |i: &'a [u8]| Self::parse_value(i, depth);
        let (inp, (items, _)) = (char('l'), many_till(item, char('e')))
            .map(|(_, list)| list)
            .parse(start_inp)?;

        Ok((inp, Value::List(items)))
    }

    fn parse_dict(start_inp: &'a [u8], depth: usize) -> BenResult<'a> {
        let item = |i: &'a [u8]| Self::parse_value(i, depth);
        let (inp, (pairs, _)) = (
            char('d'),
            many_till(pair(Self::parse_key, item), char('e')),
        )
            .map(|(_, dict)| dict)
            .parse(start_inp)?;

        let raw = &start_inp[..start_inp.len() - inp.len()];
        let entries = pairs.into_iter().collect();

        Ok((inp, Value::Dictionary { entries, raw }))
    }

    // Keys are always byte strings.
    fn parse_key(inp: &'a [u8]) -> ParseResult<'a, &'a [u8]> {
        let (inp, key) = Self::parse_bytes(inp)?;
        match key {
            Value::Bytes(key) => Ok((inp, key)),
            _ => Err(nom::Err::Failure(BencodeError::Nom(
                inp,
                nom::error::ErrorKind::Verify,
            ))),
        }
    }
}

/// Unsigned decimal from ASCII digits, `None` on overflow.
fn decimal(digits: &[u8]) -> Option<i64> {
    digits.iter().try_fold(0i64, |acc, &d| {
        acc.checked_mul(10)?.checked_add(i64::from(d - b'0'))
    })
}

/// Parses the provided bencode `source`.
///
/// # Errors
/// Returns `Err` if there was an error parsing `source`, including any
/// trailing bytes that do not form a value.
pub fn parse(source: &[u8]) -> Result<Vec<Value<'_>>, Err<BencodeError<&[u8]>>> {
    let (rest, items) = many0(Value::parse_top_level).parse(source)?;

    let _ = eof::<_, BencodeError<&[u8]>>(rest)?;

    Ok(items)
}
