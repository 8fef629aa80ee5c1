//! # Payload
//!
//! The inner `Data { portnum, payload }` record and the per-portnum payload
//! types it carries. Rather than a duck-typed "whichever field happens to be
//! present" struct, `PortPayload` is a closed enum — unknown port numbers
//! still decode, but their payload is kept opaque as raw bytes rather than
//! guessed at.

use super::wire::{for_each_field, zigzag_decode_i32, FieldValue, FieldWriter, Tag};
use super::CodecError;

/// A position report (`POSITION_APP`).
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub latitude_i: i32,
    pub longitude_i: i32,
    pub altitude: i32,
    pub time: u32,
}

/// A node's identity record (`NODEINFO_APP`).
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub long_name: String,
    pub short_name: String,
    pub macaddr: Vec<u8>,
    pub public_key: Vec<u8>,
}

/// Device or environment telemetry (`TELEMETRY_APP`).
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    Device { battery_level: u32, voltage: f32 },
    Environment { temperature: f32, relative_humidity: f32 },
    Unknown,
}

/// A waypoint announcement (`WAYPOINT_APP`).
#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub id: u32,
    pub latitude_i: i32,
    pub longitude_i: i32,
    pub name: String,
}

/// A traceroute request/response (`TRACEROUTE_APP`).
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDiscovery {
    pub route: Vec<u32>,
}

/// A neighbor-table snapshot (`NEIGHBORINFO_APP`).
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborInfo {
    pub node_id: u32,
    pub neighbors: Vec<u32>,
}

/// A map-aggregation report (`MAP_REPORT_APP`).
#[derive(Debug, Clone, PartialEq)]
pub struct MapReport {
    pub long_name: String,
    pub short_name: String,
    pub latitude_i: i32,
    pub longitude_i: i32,
}

/// The decoded payload of a [`Data`] record, dispatched on portnum (§4.3).
/// Closed by design: adding a new port means adding a new variant here, not
/// adding another optional field to a grab-bag struct.
#[derive(Debug, Clone, PartialEq)]
pub enum PortPayload {
    Text(String),
    Position(Position),
    User(User),
    Waypoint(Waypoint),
    Telemetry(Telemetry),
    Traceroute(RouteDiscovery),
    NeighborInfo(NeighborInfo),
    MapReport(MapReport),
    Unknown(Vec<u8>),
}

/// The `Data` record carried by a [`super::MeshPacket`]'s `decoded` oneof
/// arm.
#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    pub portnum: u32,
    pub payload: PortPayload,
}

fn decode_position(body: &[u8]) -> Result<Position, CodecError> {
    let mut latitude_i = 0i32;
    let mut longitude_i = 0i32;
    let mut altitude = 0i32;
    let mut time = 0u32;

    for_each_field(body, |tag: Tag, value: FieldValue<'_>| match (tag.field_number, value) {
        (1, FieldValue::Varint(v)) => latitude_i = zigzag_decode_i32(v),
        (2, FieldValue::Varint(v)) => longitude_i = zigzag_decode_i32(v),
        (3, FieldValue::Varint(v)) => altitude = v as i32,
        (9, FieldValue::Varint(v)) => time = v as u32,
        _ => {}
    })
    .map_err(CodecError::from)?;

    Ok(Position {
        latitude_i,
        longitude_i,
        altitude,
        time,
    })
}

fn encode_position(p: &Position) -> FieldWriter {
    let mut w = FieldWriter::new();
    w.write_zigzag_i32(1, p.latitude_i);
    w.write_zigzag_i32(2, p.longitude_i);
    w.write_varint(3, p.altitude as u64);
    w.write_varint(9, p.time as u64);
    w
}

fn decode_user(body: &[u8]) -> Result<User, CodecError> {
    let mut id = String::new();
    let mut long_name = String::new();
    let mut short_name = String::new();
    let mut macaddr = Vec::new();
    let mut public_key = Vec::new();

    for_each_field(body, |tag: Tag, value: FieldValue<'_>| match (tag.field_number, value) {
        (1, FieldValue::LengthDelimited(b)) => id = String::from_utf8_lossy(b).into_owned(),
        (2, FieldValue::LengthDelimited(b)) => long_name = String::from_utf8_lossy(b).into_owned(),
        (3, FieldValue::LengthDelimited(b)) => short_name = String::from_utf8_lossy(b).into_owned(),
        (4, FieldValue::LengthDelimited(b)) => macaddr = b.to_vec(),
        (8, FieldValue::LengthDelimited(b)) => public_key = b.to_vec(),
        _ => {}
    })
    .map_err(CodecError::from)?;

    Ok(User {
        id,
        long_name,
        short_name,
        macaddr,
        public_key,
    })
}

fn encode_user(u: &User) -> FieldWriter {
    let mut w = FieldWriter::new();
    w.write_string(1, &u.id);
    w.write_string(2, &u.long_name);
    w.write_string(3, &u.short_name);
    w.write_bytes(4, &u.macaddr);
    w.write_bytes(8, &u.public_key);
    w
}

fn decode_telemetry(body: &[u8]) -> Result<Telemetry, CodecError> {
    let mut device: Option<(u32, f32)> = None;
    let mut environment: Option<(f32, f32)> = None;

    for_each_field(body, |tag: Tag, value: FieldValue<'_>| match (tag.field_number, value) {
        (2, FieldValue::LengthDelimited(b)) => {
            let mut battery_level = 0u32;
            let mut voltage = 0f32;
            let _ = for_each_field(b, |t: Tag, v: FieldValue<'_>| match (t.field_number, v) {
                (1, FieldValue::Varint(n)) => battery_level = n as u32,
                (2, FieldValue::Fixed32(n)) => voltage = f32::from_bits(n),
                _ => {}
            });
            device = Some((battery_level, voltage));
        }
        (4, FieldValue::LengthDelimited(b)) => {
            let mut temperature = 0f32;
            let mut relative_humidity = 0f32;
            let _ = for_each_field(b, |t: Tag, v: FieldValue<'_>| match (t.field_number, v) {
                (1, FieldValue::Fixed32(n)) => temperature = f32::from_bits(n),
                (2, FieldValue::Fixed32(n)) => relative_humidity = f32::from_bits(n),
                _ => {}
            });
            environment = Some((temperature, relative_humidity));
        }
        _ => {}
    })
    .map_err(CodecError::from)?;

    Ok(match (device, environment) {
        (Some((battery_level, voltage)), _) => Telemetry::Device { battery_level, voltage },
        (_, Some((temperature, relative_humidity))) => Telemetry::Environment {
            temperature,
            relative_humidity,
        },
        (None, None) => Telemetry::Unknown,
    })
}

fn encode_telemetry(t: &Telemetry) -> FieldWriter {
    let mut w = FieldWriter::new();
    match t {
        Telemetry::Device { battery_level, voltage } => {
            let mut inner = FieldWriter::new();
            inner.write_varint(1, *battery_level as u64);
            if *voltage != 0.0 {
                inner.write_fixed32(2, voltage.to_bits());
            }
            w.write_message(2, &inner);
        }
        Telemetry::Environment {
            temperature,
            relative_humidity,
        } => {
            let mut inner = FieldWriter::new();
            if *temperature != 0.0 {
                inner.write_fixed32(1, temperature.to_bits());
            }
            if *relative_humidity != 0.0 {
                inner.write_fixed32(2, relative_humidity.to_bits());
            }
            w.write_message(4, &inner);
        }
        Telemetry::Unknown => {}
    }
    w
}

fn decode_waypoint(body: &[u8]) -> Result<Waypoint, CodecError> {
    let mut id = 0u32;
    let mut latitude_i = 0i32;
    let mut longitude_i = 0i32;
    let mut name = String::new();

    for_each_field(body, |tag: Tag, value: FieldValue<'_>| match (tag.field_number, value) {
        (1, FieldValue::Varint(v)) => id = v as u32,
        (2, FieldValue::Varint(v)) => latitude_i = zigzag_decode_i32(v),
        (3, FieldValue::Varint(v)) => longitude_i = zigzag_decode_i32(v),
        (4, FieldValue::LengthDelimited(b)) => name = String::from_utf8_lossy(b).into_owned(),
        _ => {}
    })
    .map_err(CodecError::from)?;

    Ok(Waypoint {
        id,
        latitude_i,
        longitude_i,
        name,
    })
}

fn encode_waypoint(w_: &Waypoint) -> FieldWriter {
    let mut w = FieldWriter::new();
    w.write_varint(1, w_.id as u64);
    w.write_zigzag_i32(2, w_.latitude_i);
    w.write_zigzag_i32(3, w_.longitude_i);
    w.write_string(4, &w_.name);
    w
}

fn decode_route_discovery(body: &[u8]) -> Result<RouteDiscovery, CodecError> {
    let mut route = Vec::new();
    for_each_field(body, |tag: Tag, value: FieldValue<'_>| {
        if tag.field_number == 1 {
            if let FieldValue::Varint(v) = value {
                route.push(v as u32);
            }
        }
    })
    .map_err(CodecError::from)?;
    Ok(RouteDiscovery { route })
}

fn encode_route_discovery(r: &RouteDiscovery) -> FieldWriter {
    let mut w = FieldWriter::new();
    for hop in &r.route {
        w.write_varint(1, *hop as u64);
    }
    w
}

fn decode_neighbor_info(body: &[u8]) -> Result<NeighborInfo, CodecError> {
    let mut node_id = 0u32;
    let mut neighbors = Vec::new();

    for_each_field(body, |tag: Tag, value: FieldValue<'_>| match (tag.field_number, value) {
        (1, FieldValue::Varint(v)) => node_id = v as u32,
        (2, FieldValue::LengthDelimited(b)) => {
            let _ = for_each_field(b, |t: Tag, v: FieldValue<'_>| {
                if t.field_number == 1 {
                    if let FieldValue::Varint(n) = v {
                        neighbors.push(n as u32);
                    }
                }
            });
        }
        _ => {}
    })
    .map_err(CodecError::from)?;

    Ok(NeighborInfo { node_id, neighbors })
}

fn encode_neighbor_info(n: &NeighborInfo) -> FieldWriter {
    let mut w = FieldWriter::new();
    w.write_varint(1, n.node_id as u64);
    for neighbor in &n.neighbors {
        let mut inner = FieldWriter::new();
        inner.write_varint(1, *neighbor as u64);
        w.write_message(2, &inner);
    }
    w
}

fn decode_map_report(body: &[u8]) -> Result<MapReport, CodecError> {
    let mut long_name = String::new();
    let mut short_name = String::new();
    let mut latitude_i = 0i32;
    let mut longitude_i = 0i32;

    for_each_field(body, |tag: Tag, value: FieldValue<'_>| match (tag.field_number, value) {
        (1, FieldValue::LengthDelimited(b)) => long_name = String::from_utf8_lossy(b).into_owned(),
        (2, FieldValue::LengthDelimited(b)) => short_name = String::from_utf8_lossy(b).into_owned(),
        (5, FieldValue::Varint(v)) => latitude_i = zigzag_decode_i32(v),
        (6, FieldValue::Varint(v)) => longitude_i = zigzag_decode_i32(v),
        _ => {}
    })
    .map_err(CodecError::from)?;

    Ok(MapReport {
        long_name,
        short_name,
        latitude_i,
        longitude_i,
    })
}

fn encode_map_report(m: &MapReport) -> FieldWriter {
    let mut w = FieldWriter::new();
    w.write_string(1, &m.long_name);
    w.write_string(2, &m.short_name);
    w.write_zigzag_i32(5, m.latitude_i);
    w.write_zigzag_i32(6, m.longitude_i);
    w
}

/// Decodes a `Data { portnum, payload }` record and dispatches the payload
/// bytes to the decoder for its portnum (§4.3). Unknown portnums decode to
/// [`PortPayload::Unknown`] rather than failing — forward compatibility with
/// port numbers this crate doesn't yet know about.
pub fn decode_data(body: &[u8]) -> Result<Data, CodecError> {
    let mut portnum = 0u32;
    let mut raw_payload: &[u8] = &[];

    for_each_field(body, |tag: Tag, value: FieldValue<'_>| match (tag.field_number, value) {
        (1, FieldValue::Varint(v)) => portnum = v as u32,
        (2, FieldValue::LengthDelimited(b)) => raw_payload = b,
        _ => {}
    })
    .map_err(CodecError::from)?;

    let payload = match portnum {
        1 => PortPayload::Text(String::from_utf8_lossy(raw_payload).into_owned()),
        3 => PortPayload::Position(decode_position(raw_payload)?),
        4 => PortPayload::User(decode_user(raw_payload)?),
        8 => PortPayload::Waypoint(decode_waypoint(raw_payload)?),
        67 => PortPayload::Telemetry(decode_telemetry(raw_payload)?),
        70 => PortPayload::Traceroute(decode_route_discovery(raw_payload)?),
        71 => PortPayload::NeighborInfo(decode_neighbor_info(raw_payload)?),
        73 => PortPayload::MapReport(decode_map_report(raw_payload)?),
        _ => PortPayload::Unknown(raw_payload.to_vec()),
    };

    Ok(Data { portnum, payload })
}

impl Data {
    /// Re-encodes this record, for envelope round-trip tests and for
    /// constructing encrypted test fixtures.
    pub fn encode(&self) -> FieldWriter {
        let mut w = FieldWriter::new();
        w.write_varint(1, self.portnum as u64);

        let payload_bytes: Vec<u8> = match &self.payload {
            PortPayload::Text(text) => text.as_bytes().to_vec(),
            PortPayload::Position(p) => encode_position(p).into_bytes(),
            PortPayload::User(u) => encode_user(u).into_bytes(),
            PortPayload::Waypoint(wp) => encode_waypoint(wp).into_bytes(),
            PortPayload::Telemetry(t) => encode_telemetry(t).into_bytes(),
            PortPayload::Traceroute(r) => encode_route_discovery(r).into_bytes(),
            PortPayload::NeighborInfo(n) => encode_neighbor_info(n).into_bytes(),
            PortPayload::MapReport(m) => encode_map_report(m).into_bytes(),
            PortPayload::Unknown(bytes) => bytes.clone(),
        };
        w.write_bytes(2, &payload_bytes);
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_round_trips() {
        let data = Data {
            portnum: 1,
            payload: PortPayload::Text("hello mesh".to_string()),
        };
        let bytes = data.encode().into_bytes();
        let decoded = decode_data(&bytes).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn position_with_negative_longitude_round_trips() {
        let data = Data {
            portnum: 3,
            payload: PortPayload::Position(Position {
                latitude_i: 557_654_321,
                longitude_i: -373_456_789,
                altitude: 42,
                time: 1_720_000_000,
            }),
        };
        let bytes = data.encode().into_bytes();
        let decoded = decode_data(&bytes).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn unknown_portnum_keeps_raw_bytes() {
        let data = Data {
            portnum: 9999,
            payload: PortPayload::Unknown(vec![1, 2, 3]),
        };
        let bytes = data.encode().into_bytes();
        let decoded = decode_data(&bytes).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn user_round_trips_macaddr_and_public_key() {
        let data = Data {
            portnum: 4,
            payload: PortPayload::User(User {
                id: "!015ba416".to_string(),
                long_name: "Node One".to_string(),
                short_name: "N1".to_string(),
                macaddr: vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01],
                public_key: vec![0xAB; 32],
            }),
        };
        let bytes = data.encode().into_bytes();
        let decoded = decode_data(&bytes).unwrap();
        assert_eq!(decoded, data);
    }
}
