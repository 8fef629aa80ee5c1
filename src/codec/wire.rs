//! # Protobuf Wire Format
//!
//! Protobuf schema files are explicitly out of scope for this crate (§1), so
//! there is no `.proto`/codegen step. Envelope and payload messages are
//! decoded with a small hand-rolled wire-format reader built the same way
//! the base crate hand-rolls its DIF/VIB byte-level parsing with `nom`:
//! varints, tags, and length-delimited framing, consumed field-by-field.

use nom::{
    bytes::complete::take,
    number::complete::{le_u32, le_u64, u8 as nom_u8},
    IResult,
};

/// Protobuf wire types (the low 3 bits of a field tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

/// One decoded `(field_number, wire_type)` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub field_number: u32,
    pub wire_type: u8,
}

/// Reads a base-128 varint (LEB128, as protobuf defines it).
pub fn read_varint(input: &[u8]) -> IResult<&[u8], u64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    let mut remaining = input;

    loop {
        let (rest, byte) = nom_u8(remaining)?;
        remaining = rest;
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((remaining, value));
        }
        shift += 7;
        if shift >= 64 {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::TooLarge,
            )));
        }
    }
}

/// Reads a field tag: a varint whose low 3 bits are the wire type and whose
/// remaining bits are the field number.
pub fn read_tag(input: &[u8]) -> IResult<&[u8], Tag> {
    let (rest, raw) = read_varint(input)?;
    Ok((
        rest,
        Tag {
            field_number: (raw >> 3) as u32,
            wire_type: (raw & 0x7) as u8,
        },
    ))
}

/// Reads a length-delimited field's body: a varint length followed by that
/// many bytes.
pub fn read_length_delimited(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (rest, len) = read_varint(input)?;
    take(len as usize)(rest)
}

/// One `(tag, raw_bytes)` pair produced while walking a message body.
/// `raw_bytes` is the varint's decoded value re-packed as LE bytes for
/// `Varint`/`Fixed32`/`Fixed64`, or the field body for `LengthDelimited`.
pub enum FieldValue<'a> {
    Varint(u64),
    Fixed64(u64),
    LengthDelimited(&'a [u8]),
    Fixed32(u32),
}

/// Reads one `(tag, value)` pair, skipping/consuming exactly the bytes that
/// belong to it so the caller can keep iterating over the rest of the
/// message body.
pub fn read_field(input: &[u8]) -> IResult<&[u8], (Tag, FieldValue<'_>)> {
    let (rest, tag) = read_tag(input)?;
    match WireType::from_u8(tag.wire_type) {
        Some(WireType::Varint) => {
            let (rest, v) = read_varint(rest)?;
            Ok((rest, (tag, FieldValue::Varint(v))))
        }
        Some(WireType::Fixed64) => {
            let (rest, v) = le_u64(rest)?;
            Ok((rest, (tag, FieldValue::Fixed64(v))))
        }
        Some(WireType::LengthDelimited) => {
            let (rest, body) = read_length_delimited(rest)?;
            Ok((rest, (tag, FieldValue::LengthDelimited(body))))
        }
        Some(WireType::Fixed32) => {
            let (rest, v) = le_u32(rest)?;
            Ok((rest, (tag, FieldValue::Fixed32(v))))
        }
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Alt,
        ))),
    }
}

/// Walks every field in a message body, invoking `visit` for each
/// `(field_number, value)` pair. Unknown fields are simply handed to the
/// visitor, which is free to ignore them — this is how forward-compatible
/// protobuf readers are supposed to behave.
pub fn for_each_field<'a, F>(mut body: &'a [u8], mut visit: F) -> Result<(), nom::Err<nom::error::Error<&'a [u8]>>>
where
    F: FnMut(Tag, FieldValue<'a>),
{
    while !body.is_empty() {
        let (rest, (tag, value)) = read_field(body)?;
        visit(tag, value);
        body = rest;
    }
    Ok(())
}

/// Zigzag-encodes a signed 32-bit value for compact varint representation
/// of negative numbers (used for `latitudeI`/`longitudeI`, which are
/// frequently negative).
pub fn zigzag_encode_i32(value: i32) -> u64 {
    (((value << 1) ^ (value >> 31)) as u32) as u64
}

/// Inverse of [`zigzag_encode_i32`].
pub fn zigzag_decode_i32(value: u64) -> i32 {
    let v = value as u32;
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

/// Minimal protobuf message writer: pushes fields in any order, producing a
/// flat byte buffer suitable as a length-delimited field's body or a
/// top-level message.
#[derive(Debug, Default, Clone)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

fn push_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_varint(&mut self, field_number: u32, value: u64) -> &mut Self {
        if value == 0 {
            return self;
        }
        push_varint(&mut self.buf, ((field_number as u64) << 3) | 0);
        push_varint(&mut self.buf, value);
        self
    }

    pub fn write_zigzag_i32(&mut self, field_number: u32, value: i32) -> &mut Self {
        if value == 0 {
            return self;
        }
        self.write_varint(field_number, zigzag_encode_i32(value))
    }

    pub fn write_fixed32(&mut self, field_number: u32, value: u32) -> &mut Self {
        if value == 0 {
            return self;
        }
        push_varint(&mut self.buf, ((field_number as u64) << 3) | 5);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_bytes(&mut self, field_number: u32, bytes: &[u8]) -> &mut Self {
        if bytes.is_empty() {
            return self;
        }
        push_varint(&mut self.buf, ((field_number as u64) << 3) | 2);
        push_varint(&mut self.buf, bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn write_string(&mut self, field_number: u32, value: &str) -> &mut Self {
        self.write_bytes(field_number, value.as_bytes())
    }

    pub fn write_message(&mut self, field_number: u32, nested: &FieldWriter) -> &mut Self {
        self.write_bytes(field_number, &nested.buf)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_single_byte() {
        let (rest, v) = read_varint(&[0x01]).unwrap();
        assert_eq!(v, 1);
        assert!(rest.is_empty());
    }

    #[test]
    fn varint_multi_byte() {
        // 300 = 0b1_0010_1100 -> 0xAC, 0x02
        let (rest, v) = read_varint(&[0xAC, 0x02]).unwrap();
        assert_eq!(v, 300);
        assert!(rest.is_empty());
    }

    #[test]
    fn tag_field1_length_delimited_is_0x0a() {
        let (_, tag) = read_tag(&[0x0A]).unwrap();
        assert_eq!(tag.field_number, 1);
        assert_eq!(tag.wire_type, 2);
    }

    #[test]
    fn length_delimited_round_trip() {
        let mut buf = vec![0x05];
        buf.extend_from_slice(b"hello");
        let (rest, body) = read_length_delimited(&buf).unwrap();
        assert_eq!(body, b"hello");
        assert!(rest.is_empty());
    }

    #[test]
    fn length_delimited_rejects_overrun() {
        let buf = vec![0x05, b'h', b'i'];
        assert!(read_length_delimited(&buf).is_err());
    }
}
