//! Bencode encoding and decoding
//!
//! Bencode is the encoding used by BitTorrent for storing and transmitting
//! loosely structured data. It supports four data types:
//! - Byte strings
//! - Integers
//! - Lists
//! - Dictionaries
//!
//! Dict keys are stored in a `BTreeMap<Vec<u8>, Value>` so the
//! lexicographic-order invariant bencode requires is structural rather than
//! something callers have to maintain by hand.

use std::collections::BTreeMap;
use std::fmt;

/// A decoded bencode value.
///
/// Integers are stored as `i128` rather than the wire-narrower `i64`:
/// bencode integers are arbitrary precision, and a torrent can legally carry
/// an oversized value in a field nothing here reads (a custom `x_...` key, an
/// odd `creation date`). Decode only rejects what it cannot represent at all;
/// narrowing a specific field to 64 bits, and failing if it doesn't fit, is
/// the torrent model's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    Int(i128),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Decode the UTF-8 bytes of a byte-string value, replacing invalid
    /// sequences rather than failing. Returns `None` for non-byte-string
    /// values.
    pub fn as_text_lossy(&self) -> Option<String> {
        self.as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// Whether dict keys must appear in strict lexicographic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// BEP3-conformant: dict keys MUST be strictly increasing.
    Strict,
    /// Tolerates unsorted or duplicate dict keys, as seen in third-party
    /// torrents in the wild; later keys win on duplicates.
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    UnexpectedEof,
    InvalidInteger,
    InvalidLengthPrefix,
    UnsortedDictKeys,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub offset: usize,
}

impl DecodeError {
    fn new(kind: DecodeErrorKind, offset: usize) -> Self {
        DecodeError { kind, offset }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bencode decode error {:?} at offset {}", self.kind, self.offset)
    }
}

impl std::error::Error for DecodeError {}

/// Decode a single bencoded value from `data`. Trailing bytes after the
/// value are ignored, matching the common tolerance for a trailing newline
/// on `.torrent` files found in the wild.
pub fn decode(data: &[u8], mode: Mode) -> Result<Value, DecodeError> {
    let (value, _) = parse_value(data, 0, mode)?;
    Ok(value)
}

fn parse_value(data: &[u8], pos: usize, mode: Mode) -> Result<(Value, usize), DecodeError> {
    match data.get(pos) {
        None => Err(DecodeError::new(DecodeErrorKind::UnexpectedEof, pos)),
        Some(b'i') => parse_int(data, pos),
        Some(b'l') => parse_list(data, pos, mode),
        Some(b'd') => parse_dict(data, pos, mode),
        Some(b'0'..=b'9') => parse_bytes(data, pos),
        Some(_) => Err(DecodeError::new(DecodeErrorKind::InvalidLengthPrefix, pos)),
    }
}

fn parse_int(data: &[u8], pos: usize) -> Result<(Value, usize), DecodeError> {
    debug_assert_eq!(data[pos], b'i');
    let start = pos + 1;
    let end = find_byte(data, start, b'e').ok_or(DecodeError::new(DecodeErrorKind::UnexpectedEof, start))?;
    let digits = &data[start..end];
    if digits.is_empty() {
        return Err(DecodeError::new(DecodeErrorKind::InvalidInteger, start));
    }
    let (neg, digits) = match digits.first() {
        Some(b'-') => (true, &digits[1..]),
        _ => (false, digits),
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::new(DecodeErrorKind::InvalidInteger, start));
    }
    // Leading zeros are rejected except for the literal "0"; "-0" is rejected too.
    if digits.len() > 1 && digits[0] == b'0' {
        return Err(DecodeError::new(DecodeErrorKind::InvalidInteger, start));
    }
    if neg && digits == b"0" {
        return Err(DecodeError::new(DecodeErrorKind::InvalidInteger, start));
    }
    let text = std::str::from_utf8(digits).expect("validated ascii digits");
    let magnitude: i128 = text.parse().map_err(|_| DecodeError::new(DecodeErrorKind::InvalidInteger, start))?;
    let value = if neg { -magnitude } else { magnitude };
    Ok((Value::Int(value), end + 1))
}

fn parse_bytes(data: &[u8], pos: usize) -> Result<(Value, usize), DecodeError> {
    let colon = find_byte(data, pos, b':').ok_or(DecodeError::new(DecodeErrorKind::UnexpectedEof, pos))?;
    let len_digits = &data[pos..colon];
    if len_digits.is_empty() || !len_digits.iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::new(DecodeErrorKind::InvalidLengthPrefix, pos));
    }
    if len_digits.len() > 1 && len_digits[0] == b'0' {
        return Err(DecodeError::new(DecodeErrorKind::InvalidLengthPrefix, pos));
    }
    let text = std::str::from_utf8(len_digits).expect("validated ascii digits");
    let len: usize = text.parse().map_err(|_| DecodeError::new(DecodeErrorKind::InvalidLengthPrefix, pos))?;
    let start = colon + 1;
    let end = start.checked_add(len).ok_or(DecodeError::new(DecodeErrorKind::InvalidLengthPrefix, pos))?;
    if end > data.len() {
        return Err(DecodeError::new(DecodeErrorKind::UnexpectedEof, start));
    }
    Ok((Value::Bytes(data[start..end].to_vec()), end))
}

fn parse_list(data: &[u8], pos: usize, mode: Mode) -> Result<(Value, usize), DecodeError> {
    debug_assert_eq!(data[pos], b'l');
    let mut items = Vec::new();
    let mut cursor = pos + 1;
    loop {
        match data.get(cursor) {
            None => return Err(DecodeError::new(DecodeErrorKind::UnexpectedEof, cursor)),
            Some(b'e') => return Ok((Value::List(items), cursor + 1)),
            Some(_) => {
                let (value, next) = parse_value(data, cursor, mode)?;
                items.push(value);
                cursor = next;
            }
        }
    }
}

fn parse_dict(data: &[u8], pos: usize, mode: Mode) -> Result<(Value, usize), DecodeError> {
    debug_assert_eq!(data[pos], b'd');
    let mut entries: BTreeMap<Vec<u8>, Value> = BTreeMap::new();
    let mut cursor = pos + 1;
    let mut last_key: Option<Vec<u8>> = None;
    loop {
        match data.get(cursor) {
            None => return Err(DecodeError::new(DecodeErrorKind::UnexpectedEof, cursor)),
            Some(b'e') => return Ok((Value::Dict(entries), cursor + 1)),
            Some(_) => {
                let key_pos = cursor;
                let (key_value, after_key) = parse_bytes(data, cursor)?;
                let key = match key_value {
                    Value::Bytes(b) => b,
                    _ => unreachable!("parse_bytes always returns Value::Bytes"),
                };
                if mode == Mode::Strict {
                    if let Some(prev) = &last_key {
                        if &key <= prev {
                            return Err(DecodeError::new(DecodeErrorKind::UnsortedDictKeys, key_pos));
                        }
                    }
                }
                last_key = Some(key.clone());
                let (value, after_value) = parse_value(data, after_key, mode)?;
                entries.insert(key, value);
                cursor = after_value;
            }
        }
    }
}

fn find_byte(data: &[u8], from: usize, target: u8) -> Option<usize> {
    data[from..].iter().position(|&b| b == target).map(|i| i + from)
}

/// Encode a value back into its canonical bencoded form. Dict keys are
/// always emitted in sorted order since `Value::Dict` is a `BTreeMap`.
/// Used only by test helpers and the encoder round-trip property.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Bytes(b) => {
            out.extend_from_slice(b.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(b);
        }
        Value::Int(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        Value::List(items) => {
            out.push(b'l');
            for item in items {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        Value::Dict(entries) => {
            out.push(b'd');
            for (key, val) in entries {
                encode_into(&Value::Bytes(key.clone()), out);
                encode_into(val, out);
            }
            out.push(b'e');
        }
    }
}
