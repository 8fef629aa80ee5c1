//! # Envelope
//!
//! `ServiceEnvelope` / `MeshPacket` validation and decoding (§3, §4.2).

use super::wire::{for_each_field, read_varint, FieldValue, FieldWriter, Tag};
use super::{CodecError, Data};
use crate::constants::{MAX_PACKET_BYTES, MIN_PACKET_BYTES};

/// The packet's `decoded`/`encrypted` oneof (§3: "exactly one ... must be
/// present").
#[derive(Debug, Clone, PartialEq)]
pub enum PacketPayload {
    Decoded(Data),
    Encrypted(Vec<u8>),
}

/// The inner `MeshPacket` record, after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPacket {
    pub from: u32,
    pub to: u32,
    pub id: u32,
    pub rx_time: u32,
    pub rx_snr: f32,
    pub rx_rssi: i32,
    pub hop_limit: u32,
    pub want_ack: bool,
    pub payload: PacketPayload,
}

/// The outer envelope published by a gateway onto MQTT.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEnvelope {
    pub packet: MeshPacket,
    pub channel_id: String,
    pub gateway_id: String,
}

/// Validates a raw buffer against §4.2's pre-decode checks, without
/// attempting to decode it.
///
/// Rejects if:
/// - length < 10 or > 524288;
/// - the first byte's wire type is not length-delimited or its field number
///   is not 1;
/// - the announced length-delimited size exceeds the remaining buffer.
pub fn validate_envelope(buf: &[u8]) -> Result<(), CodecError> {
    if buf.len() < MIN_PACKET_BYTES {
        return Err(CodecError::TooSmall(buf.len()));
    }
    if buf.len() > MAX_PACKET_BYTES {
        return Err(CodecError::TooLarge(buf.len()));
    }

    let first = buf[0];
    let field_number = first >> 3;
    let wire_type = first & 0x7;
    if wire_type != 2 || field_number != 1 {
        return Err(CodecError::BadEnvelopeTag);
    }

    let (rest, len) = read_varint(&buf[1..]).map_err(|_| CodecError::BadEnvelopeTag)?;
    if len as usize > rest.len() {
        return Err(CodecError::LengthOverrun);
    }

    Ok(())
}

fn decode_mesh_packet(body: &[u8]) -> Result<MeshPacket, CodecError> {
    let mut from = 0u32;
    let mut to = 0u32;
    let mut id = 0u32;
    let mut rx_time = 0u32;
    let mut rx_snr = 0f32;
    let mut rx_rssi = 0i32;
    let mut hop_limit = 0u32;
    let mut want_ack = false;
    let mut decoded: Option<Data> = None;
    let mut encrypted: Option<Vec<u8>> = None;

    let mut decode_err: Option<CodecError> = None;
    for_each_field(body, |tag: Tag, value: FieldValue<'_>| {
        if decode_err.is_some() {
            return;
        }
        match (tag.field_number, value) {
            (1, FieldValue::Varint(v)) => from = v as u32,
            (2, FieldValue::Varint(v)) => to = v as u32,
            (4, FieldValue::LengthDelimited(bytes)) => match super::payload::decode_data(bytes) {
                Ok(data) => decoded = Some(data),
                Err(e) => decode_err = Some(e),
            },
            (5, FieldValue::LengthDelimited(bytes)) => encrypted = Some(bytes.to_vec()),
            (6, FieldValue::Varint(v)) => id = v as u32,
            (7, FieldValue::Varint(v)) => rx_time = v as u32,
            (8, FieldValue::Fixed32(v)) => rx_snr = f32::from_bits(v),
            (9, FieldValue::Varint(v)) => hop_limit = v as u32,
            (10, FieldValue::Varint(v)) => want_ack = v != 0,
            (12, FieldValue::Varint(v)) => rx_rssi = super::wire::zigzag_decode_i32(v),
            _ => {}
        }
    })
    .map_err(CodecError::from)?;

    if let Some(err) = decode_err {
        return Err(err);
    }

    let payload = match (decoded, encrypted) {
        (Some(d), None) => PacketPayload::Decoded(d),
        (None, Some(e)) => PacketPayload::Encrypted(e),
        (None, None) => return Err(CodecError::MissingPayload),
        (Some(_), Some(_)) => return Err(CodecError::AmbiguousPayload),
    };

    Ok(MeshPacket {
        from,
        to,
        id,
        rx_time,
        rx_snr,
        rx_rssi,
        hop_limit,
        want_ack,
        payload,
    })
}

/// Decodes a validated buffer into a [`ServiceEnvelope`].
///
/// Callers should run [`validate_envelope`] first; this function re-derives
/// the same envelope body either way.
pub fn decode_service_envelope(buf: &[u8]) -> Result<ServiceEnvelope, CodecError> {
    validate_envelope(buf)?;

    let mut packet: Option<MeshPacket> = None;
    let mut channel_id = String::new();
    let mut gateway_id = String::new();
    let mut decode_err: Option<CodecError> = None;

    for_each_field(buf, |tag: Tag, value: FieldValue<'_>| {
        if decode_err.is_some() {
            return;
        }
        match (tag.field_number, value) {
            (1, FieldValue::LengthDelimited(body)) => match decode_mesh_packet(body) {
                Ok(p) => packet = Some(p),
                Err(e) => decode_err = Some(e),
            },
            (2, FieldValue::LengthDelimited(bytes)) => {
                channel_id = String::from_utf8_lossy(bytes).into_owned();
            }
            (3, FieldValue::LengthDelimited(bytes)) => {
                gateway_id = String::from_utf8_lossy(bytes).into_owned();
            }
            _ => {}
        }
    })
    .map_err(CodecError::from)?;

    if let Some(err) = decode_err {
        return Err(err);
    }

    let packet = packet.ok_or(CodecError::MissingPayload)?;
    Ok(ServiceEnvelope {
        packet,
        channel_id,
        gateway_id,
    })
}

impl MeshPacket {
    fn encode_body(&self) -> FieldWriter {
        let mut w = FieldWriter::new();
        w.write_varint(1, self.from as u64);
        w.write_varint(2, self.to as u64);
        match &self.payload {
            PacketPayload::Decoded(data) => {
                w.write_message(4, &data.encode());
            }
            PacketPayload::Encrypted(bytes) => {
                w.write_bytes(5, bytes);
            }
        }
        w.write_varint(6, self.id as u64);
        w.write_varint(7, self.rx_time as u64);
        if self.rx_snr != 0.0 {
            w.write_fixed32(8, self.rx_snr.to_bits());
        }
        w.write_varint(9, self.hop_limit as u64);
        if self.want_ack {
            w.write_varint(10, 1);
        }
        if self.rx_rssi != 0 {
            w.write_zigzag_i32(12, self.rx_rssi);
        }
        w
    }
}

impl ServiceEnvelope {
    /// Re-encodes this envelope. Used for the round-trip property tests in
    /// §8 ("Encode(Decode(buf)) preserves every field that survives
    /// protobuf's default-omission rules").
    pub fn encode(&self) -> Vec<u8> {
        let mut w = FieldWriter::new();
        w.write_message(1, &self.packet.encode_body());
        w.write_string(2, &self.channel_id);
        w.write_string(3, &self.gateway_id);
        w.into_bytes()
    }
}
