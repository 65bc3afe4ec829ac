//! Low-level protobuf wire format.
//!
//! ## Wire Format Overview
//!
//! Each field occurrence is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, bool)
//! - 1: I64 (fixed64)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 5: I32 (fixed32)
//!
//! The deprecated group wire types (3 and 4) are rejected.
//!
//! A decoded occurrence is a [`Token`]. [`TokenMap`] groups tokens by field
//! number, preserving arrival order within each number.

pub mod varint;

use crate::error::{Error, Result};
use crate::MAX_FIELD_NUMBER;
use bytes::{BufMut, Bytes};
use std::collections::BTreeMap;
use tracing::trace;

pub use varint::{decode_varint, encode_varint, varint_len, MAX_VARINT_LEN};

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            5 => Ok(WireType::I32),
            _ => Err(Error::unsupported_wire_type(0, value)),
        }
    }
}

/// A field number paired with a wire type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Field number
    pub number: u32,
    /// Wire type of the value that follows
    pub wire_type: WireType,
}

impl Tag {
    /// Creates a new tag
    pub fn new(number: u32, wire_type: WireType) -> Self {
        Self { number, wire_type }
    }

    /// The varint key `(number << 3) | wire_type`
    pub fn key(&self) -> u64 {
        (u64::from(self.number) << 3) | self.wire_type as u64
    }

    /// Writes the key as a varint
    pub fn encode(&self, buf: &mut impl BufMut) {
        encode_varint(self.key(), buf);
    }

    /// Decodes a tag, returning it with the number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let (key, len) = decode_varint(data)?;

        let wire_type = WireType::try_from((key & 0x07) as u8)?;
        let number = key >> 3;

        if number == 0 || number > u64::from(MAX_FIELD_NUMBER) {
            return Err(Error::InvalidFieldNumber {
                number,
                max: MAX_FIELD_NUMBER,
            });
        }

        Ok((Self::new(number as u32, wire_type), len))
    }
}

/// One decoded field occurrence, before any schema interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Varint payload, carried as its native 64-bit pattern
    Varint(i64),
    /// Little-endian 32-bit payload
    Fixed32(i32),
    /// Little-endian 64-bit payload
    Fixed64(i64),
    /// Length-prefixed payload, owned by the token
    LengthDelimited(Bytes),
}

impl Token {
    /// The wire type this token is written with
    pub fn wire_type(&self) -> WireType {
        match self {
            Token::Varint(_) => WireType::Varint,
            Token::Fixed32(_) => WireType::I32,
            Token::Fixed64(_) => WireType::I64,
            Token::LengthDelimited(_) => WireType::Len,
        }
    }

    /// Writes the payload (without tag)
    pub fn encode(&self, buf: &mut impl BufMut) {
        match self {
            Token::Varint(value) => encode_varint(*value as u64, buf),
            Token::Fixed32(value) => buf.put_i32_le(*value),
            Token::Fixed64(value) => buf.put_i64_le(*value),
            Token::LengthDelimited(data) => {
                encode_varint(data.len() as u64, buf);
                buf.put_slice(data);
            }
        }
    }

    /// Length of the payload written by [`Token::encode`]
    pub fn encoded_len(&self) -> usize {
        match self {
            Token::Varint(value) => varint_len(*value as u64),
            Token::Fixed32(_) => 4,
            Token::Fixed64(_) => 8,
            Token::LengthDelimited(data) => varint_len(data.len() as u64) + data.len(),
        }
    }
}

/// Iterates the `(field number, token)` pairs of a buffer.
///
/// Length-delimited payloads are copied out of the input, so the input may
/// be reused as soon as reading finishes. Error offsets are relative to the
/// start of the input.
#[derive(Debug, Clone)]
pub struct TokenReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> TokenReader<'a> {
    /// Creates a reader over the whole buffer
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.position
    }

    /// Reads the next field occurrence, or `None` at end of input.
    pub fn next_field(&mut self) -> Result<Option<(u32, Token)>> {
        if self.position >= self.data.len() {
            return Ok(None);
        }

        let start = self.position;
        let (tag, tag_len) =
            Tag::decode(&self.data[start..]).map_err(|e| e.offset_by(start))?;
        self.position += tag_len;

        let token = match tag.wire_type {
            WireType::Varint => Token::Varint(self.read_varint()? as i64),
            WireType::I64 => {
                let bytes = self.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Token::Fixed64(i64::from_le_bytes(raw))
            }
            WireType::Len => {
                let length_offset = self.position;
                let length = self.read_varint()?;
                let length = usize::try_from(length).map_err(|_| {
                    Error::truncated(length_offset, usize::MAX, self.remaining())
                })?;
                Token::LengthDelimited(Bytes::copy_from_slice(self.take(length)?))
            }
            WireType::I32 => {
                let bytes = self.take(4)?;
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                Token::Fixed32(i32::from_le_bytes(raw))
            }
        };

        trace!(
            number = tag.number,
            wire_type = ?tag.wire_type,
            offset = start,
            "read field"
        );

        Ok(Some((tag.number, token)))
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn read_varint(&mut self) -> Result<u64> {
        let start = self.position;
        let (value, len) =
            decode_varint(&self.data[start..]).map_err(|e| e.offset_by(start))?;
        self.position += len;
        Ok(value)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::truncated(self.position, len, self.remaining()));
        }
        let data: &'a [u8] = self.data;
        let slice = &data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }
}

/// Field number to ordered token list.
///
/// Iteration runs in ascending field number so encoding is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMap {
    fields: BTreeMap<u32, Vec<Token>>,
}

impl TokenMap {
    /// Creates an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenizes a complete buffer.
    ///
    /// Any malformed occurrence fails the whole buffer.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut map = Self::new();
        let mut reader = TokenReader::new(data);
        while let Some((number, token)) = reader.next_field()? {
            map.push(number, token);
        }
        Ok(map)
    }

    /// Writes every token, tag first, in ascending field number order
    pub fn encode(&self, buf: &mut impl BufMut) {
        for (&number, tokens) in &self.fields {
            for token in tokens {
                Tag::new(number, token.wire_type()).encode(buf);
                token.encode(buf);
            }
        }
    }

    /// Length of the output of [`TokenMap::encode`]
    pub fn encoded_len(&self) -> usize {
        self.fields
            .iter()
            .map(|(&number, tokens)| {
                tokens
                    .iter()
                    .map(|token| {
                        varint_len(Tag::new(number, token.wire_type()).key())
                            + token.encoded_len()
                    })
                    .sum::<usize>()
            })
            .sum()
    }

    /// Appends one occurrence to a field
    pub fn push(&mut self, number: u32, token: Token) {
        self.fields.entry(number).or_default().push(token);
    }

    /// Appends every occurrence of `other` after the existing ones
    pub fn merge(&mut self, other: TokenMap) {
        for (number, tokens) in other.fields {
            self.fields.entry(number).or_default().extend(tokens);
        }
    }

    /// Replaces all occurrences of a field. An empty list removes it.
    pub fn replace(&mut self, number: u32, tokens: Vec<Token>) {
        if tokens.is_empty() {
            self.fields.remove(&number);
        } else {
            self.fields.insert(number, tokens);
        }
    }

    /// Tokens stored for a field, in arrival order
    pub fn get(&self, number: u32) -> &[Token] {
        self.fields.get(&number).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Removes a field, returning its tokens
    pub fn remove(&mut self, number: u32) -> Option<Vec<Token>> {
        self.fields.remove(&number)
    }

    /// Returns true if the field has at least one token
    pub fn contains(&self, number: u32) -> bool {
        self.fields.contains_key(&number)
    }

    /// Keeps only the fields for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(u32) -> bool) {
        self.fields.retain(|&number, _| keep(number));
    }

    /// Field numbers present, ascending
    pub fn numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.fields.keys().copied()
    }

    /// All fields with their tokens, ascending
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[Token])> + '_ {
        self.fields
            .iter()
            .map(|(&number, tokens)| (number, tokens.as_slice()))
    }

    /// Number of distinct field numbers
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field is present
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Decodes the body of a packed repeated-varint block.
pub fn decode_packed_varints(data: &[u8]) -> Result<Vec<i64>> {
    let mut values = Vec::new();
    let mut position = 0;
    while position < data.len() {
        let (value, len) =
            decode_varint(&data[position..]).map_err(|e| e.offset_by(position))?;
        values.push(value as i64);
        position += len;
    }
    Ok(values)
}

/// Encodes values as the body of a packed repeated-varint block.
pub fn encode_packed_varints(values: impl IntoIterator<Item = i64>) -> Bytes {
    let mut buf = Vec::new();
    for value in values {
        encode_varint(value as u64, &mut buf);
    }
    Bytes::from(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_type_conversion() {
        assert_eq!(WireType::try_from(0).unwrap(), WireType::Varint);
        assert_eq!(WireType::try_from(1).unwrap(), WireType::I64);
        assert_eq!(WireType::try_from(2).unwrap(), WireType::Len);
        assert_eq!(WireType::try_from(5).unwrap(), WireType::I32);
        assert!(WireType::try_from(3).is_err());
        assert!(WireType::try_from(4).is_err());
        assert!(WireType::try_from(6).is_err());
    }

    #[test]
    fn test_tag_key() {
        assert_eq!(Tag::new(1, WireType::Varint).key(), 0x08);
        assert_eq!(Tag::new(1, WireType::Len).key(), 0x0A);
        assert_eq!(Tag::new(10, WireType::Len).key(), 0x52);

        let mut buf = Vec::new();
        Tag::new(16, WireType::Varint).encode(&mut buf);
        assert_eq!(buf, vec![0x80, 0x01]);
        assert_eq!(Tag::decode(&buf).unwrap(), (Tag::new(16, WireType::Varint), 2));
    }

    #[test]
    fn test_invalid_field_number() {
        assert!(matches!(
            Tag::decode(&[0x00, 0x01]),
            Err(Error::InvalidFieldNumber { number: 0, .. })
        ));
    }

    #[test]
    fn test_read_each_shape() {
        let data = [
            0x08, 0x96, 0x01, // field 1 varint 150
            0x12, 0x02, b'h', b'i', // field 2 len "hi"
            0x1D, 0x01, 0x00, 0x00, 0x00, // field 3 fixed32 1
            0x21, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // field 4 fixed64 2
        ];
        let mut reader = TokenReader::new(&data);
        assert_eq!(reader.next_field().unwrap(), Some((1, Token::Varint(150))));
        assert_eq!(
            reader.next_field().unwrap(),
            Some((2, Token::LengthDelimited(Bytes::from_static(b"hi"))))
        );
        assert_eq!(reader.next_field().unwrap(), Some((3, Token::Fixed32(1))));
        assert_eq!(reader.next_field().unwrap(), Some((4, Token::Fixed64(2))));
        assert_eq!(reader.next_field().unwrap(), None);
        assert_eq!(reader.position(), data.len());
    }

    #[test]
    fn test_truncated_length_delimited() {
        let data = [0x0A, 0x05, b'h', b'i'];
        assert!(matches!(
            TokenMap::decode(&data),
            Err(Error::TruncatedPayload {
                offset: 2,
                needed: 5,
                available: 2
            })
        ));
    }

    #[test]
    fn test_truncated_fixed() {
        assert!(matches!(
            TokenMap::decode(&[0x0D, 0x01, 0x02]),
            Err(Error::TruncatedPayload { needed: 4, .. })
        ));
        assert!(matches!(
            TokenMap::decode(&[0x09, 0x01]),
            Err(Error::TruncatedPayload { needed: 8, .. })
        ));
    }

    #[test]
    fn test_ends_mid_varint() {
        let data = [0x08, 0x96];
        assert!(matches!(
            TokenMap::decode(&data),
            Err(Error::TruncatedPayload { offset: 1, .. })
        ));
    }

    #[test]
    fn test_group_wire_type_rejected() {
        let data = [0x08, 0x01, 0x13];
        assert!(matches!(
            TokenMap::decode(&data),
            Err(Error::UnsupportedWireType {
                offset: 2,
                wire_type: 3
            })
        ));
    }

    #[test]
    fn test_token_map_preserves_arrival_order() {
        let data = [0x08, 0x03, 0x10, 0x07, 0x08, 0x01, 0x08, 0x02];
        let map = TokenMap::decode(&data).unwrap();
        assert_eq!(
            map.get(1),
            &[Token::Varint(3), Token::Varint(1), Token::Varint(2)]
        );
        assert_eq!(map.get(2), &[Token::Varint(7)]);
        assert!(map.get(9).is_empty());
    }

    #[test]
    fn test_token_map_encodes_ascending() {
        let mut map = TokenMap::new();
        map.push(2, Token::Varint(7));
        map.push(1, Token::Varint(3));
        map.push(1, Token::Varint(1));

        let mut buf = Vec::new();
        map.encode(&mut buf);
        assert_eq!(buf, vec![0x08, 0x03, 0x08, 0x01, 0x10, 0x07]);
        assert_eq!(map.encoded_len(), buf.len());
    }

    #[test]
    fn test_replace_with_empty_removes() {
        let mut map = TokenMap::new();
        map.push(4, Token::Varint(1));
        map.replace(4, Vec::new());
        assert!(!map.contains(4));
        assert!(map.is_empty());
    }

    #[test]
    fn test_fixed_tokens_are_little_endian() {
        let mut buf = Vec::new();
        Token::Fixed32(0x0102_0304).encode(&mut buf);
        assert_eq!(buf, vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_packed_varints() {
        let block = encode_packed_varints([1, 300, -1]);
        assert_eq!(block.len(), 1 + 2 + 10);
        assert_eq!(decode_packed_varints(&block).unwrap(), vec![1, 300, -1]);
        assert!(decode_packed_varints(&[0x01, 0x80]).is_err());
    }
}
