//! # JSON Envelope Decoding
//!
//! The `type=="json"` topic branch (§4.2.1): a plain JSON object carrying the
//! same envelope/packet/payload fields as the protobuf path, decoded straight
//! into the same [`ServiceEnvelope`]/[`Data`] shapes `envelope`/`payload`
//! produce from the wire format. Both `camelCase` and `snake_case` field
//! spellings are accepted on read and normalized here, since the JSON this
//! crate receives varies by the publishing gateway's firmware version.

use serde_json::Value;

use super::envelope::{MeshPacket, PacketPayload, ServiceEnvelope};
use super::payload::{Data, NeighborInfo, MapReport, PortPayload, Position, RouteDiscovery, Telemetry, User, Waypoint};
use super::CodecError;
use crate::constants::BROADCAST_ADDR;

/// Looks up a field under either spelling, preferring `camelCase`, skipping
/// an explicit JSON `null` as if the key were absent.
fn field<'a>(obj: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    obj.get(camel).or_else(|| obj.get(snake)).filter(|v| !v.is_null())
}

fn as_u32(v: &Value) -> u32 {
    v.as_u64().unwrap_or(0) as u32
}

fn as_i32(v: &Value) -> i32 {
    v.as_i64().unwrap_or(0) as i32
}

fn as_f32(v: &Value) -> f32 {
    v.as_f64().unwrap_or(0.0) as f32
}

fn as_str(v: &Value) -> String {
    v.as_str().map(str::to_string).unwrap_or_default()
}

fn decode_position(payload: &Value) -> Position {
    Position {
        latitude_i: field(payload, "latitudeI", "latitude_i").map(as_i32).unwrap_or(0),
        longitude_i: field(payload, "longitudeI", "longitude_i").map(as_i32).unwrap_or(0),
        altitude: field(payload, "altitude", "altitude").map(as_i32).unwrap_or(0),
        time: field(payload, "time", "time").map(as_u32).unwrap_or(0),
    }
}

fn decode_user(payload: &Value) -> User {
    User {
        id: field(payload, "id", "id").map(as_str).unwrap_or_default(),
        long_name: field(payload, "longName", "long_name").map(as_str).unwrap_or_default(),
        short_name: field(payload, "shortName", "short_name").map(as_str).unwrap_or_default(),
        macaddr: Vec::new(),
        public_key: Vec::new(),
    }
}

fn decode_telemetry(payload: &Value) -> Telemetry {
    if let Some(device) = field(payload, "deviceMetrics", "device_metrics") {
        return Telemetry::Device {
            battery_level: field(device, "batteryLevel", "battery_level").map(as_u32).unwrap_or(0),
            voltage: field(device, "voltage", "voltage").map(as_f32).unwrap_or(0.0),
        };
    }
    if let Some(env) = field(payload, "environmentMetrics", "environment_metrics") {
        return Telemetry::Environment {
            temperature: field(env, "temperature", "temperature").map(as_f32).unwrap_or(0.0),
            relative_humidity: field(env, "relativeHumidity", "relative_humidity").map(as_f32).unwrap_or(0.0),
        };
    }
    Telemetry::Unknown
}

fn decode_waypoint(payload: &Value) -> Waypoint {
    Waypoint {
        id: field(payload, "id", "id").map(as_u32).unwrap_or(0),
        latitude_i: field(payload, "latitudeI", "latitude_i").map(as_i32).unwrap_or(0),
        longitude_i: field(payload, "longitudeI", "longitude_i").map(as_i32).unwrap_or(0),
        name: field(payload, "name", "name").map(as_str).unwrap_or_default(),
    }
}

fn decode_route_discovery(payload: &Value) -> RouteDiscovery {
    let route = field(payload, "route", "route")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().map(as_u32).collect())
        .unwrap_or_default();
    RouteDiscovery { route }
}

fn decode_neighbor_info(payload: &Value) -> NeighborInfo {
    let neighbors = field(payload, "neighbors", "neighbors")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|n| field(n, "nodeId", "node_id").map(as_u32))
                .collect()
        })
        .unwrap_or_default();
    NeighborInfo {
        node_id: field(payload, "nodeId", "node_id").map(as_u32).unwrap_or(0),
        neighbors,
    }
}

fn decode_map_report(payload: &Value) -> MapReport {
    MapReport {
        long_name: field(payload, "longName", "long_name").map(as_str).unwrap_or_default(),
        short_name: field(payload, "shortName", "short_name").map(as_str).unwrap_or_default(),
        latitude_i: field(payload, "latitudeI", "latitude_i").map(as_i32).unwrap_or(0),
        longitude_i: field(payload, "longitudeI", "longitude_i").map(as_i32).unwrap_or(0),
    }
}

/// Maps the JSON envelope's `type` discriminator to a portnum, mirroring
/// §6.2's port table. Unrecognized kinds map to `0`, routed the same way an
/// unknown protobuf portnum is: appended under a synthesized name, never fed
/// to the MapAggregator.
fn portnum_for_type(kind: &str) -> u32 {
    match kind {
        "text" => 1,
        "position" => 3,
        "nodeinfo" => 4,
        "waypoint" => 8,
        "telemetry" => 67,
        "traceroute" => 70,
        "neighborinfo" => 71,
        "mapreport" => 73,
        _ => 0,
    }
}

fn decode_payload(portnum: u32, payload: &Value) -> PortPayload {
    match portnum {
        1 => PortPayload::Text(field(payload, "text", "text").map(as_str).unwrap_or_default()),
        3 => PortPayload::Position(decode_position(payload)),
        4 => PortPayload::User(decode_user(payload)),
        8 => PortPayload::Waypoint(decode_waypoint(payload)),
        67 => PortPayload::Telemetry(decode_telemetry(payload)),
        70 => PortPayload::Traceroute(decode_route_discovery(payload)),
        71 => PortPayload::NeighborInfo(decode_neighbor_info(payload)),
        73 => PortPayload::MapReport(decode_map_report(payload)),
        _ => PortPayload::Unknown(payload.to_string().into_bytes()),
    }
}

/// Decodes a `type=="json"` topic's body into the same envelope/packet/data
/// shapes the protobuf path produces, so the rest of the pipeline never has
/// to know which wire format a frame arrived in.
///
/// `gateway_id_fallback`/`channel_id_fallback` are the topic's own `user`
/// and `channel` slots, used when the JSON object doesn't carry its own
/// `sender`/`channelId`.
pub fn decode_json_envelope(
    buf: &[u8],
    gateway_id_fallback: &str,
    channel_id_fallback: &str,
) -> Result<ServiceEnvelope, CodecError> {
    let root: Value = serde_json::from_slice(buf).map_err(|e| CodecError::Malformed(e.to_string()))?;

    let kind = field(&root, "type", "type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let payload_value = field(&root, "payload", "payload").cloned().unwrap_or(Value::Null);
    let portnum = portnum_for_type(&kind);
    let payload = decode_payload(portnum, &payload_value);

    let from = field(&root, "from", "from").map(as_u32).unwrap_or(0);
    let to = field(&root, "to", "to").map(as_u32).unwrap_or(BROADCAST_ADDR);
    let id = field(&root, "id", "id").map(as_u32).unwrap_or(0);
    let rx_time = field(&root, "rxTime", "rx_time")
        .or_else(|| field(&root, "timestamp", "timestamp"))
        .map(as_u32)
        .unwrap_or(0);
    let rx_snr = field(&root, "rxSnr", "rx_snr")
        .or_else(|| field(&root, "snr", "snr"))
        .map(as_f32)
        .unwrap_or(0.0);
    let rx_rssi = field(&root, "rxRssi", "rx_rssi")
        .or_else(|| field(&root, "rssi", "rssi"))
        .map(as_i32)
        .unwrap_or(0);
    let hop_limit = field(&root, "hopLimit", "hop_limit").map(as_u32).unwrap_or(0);

    let gateway_id = field(&root, "sender", "sender")
        .or_else(|| field(&root, "gatewayId", "gateway_id"))
        .map(as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| gateway_id_fallback.to_string());
    let channel_id = field(&root, "channelId", "channel_id")
        .map(as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| channel_id_fallback.to_string());

    let packet = MeshPacket {
        from,
        to,
        id,
        rx_time,
        rx_snr,
        rx_rssi,
        hop_limit,
        want_ack: false,
        payload: PacketPayload::Decoded(Data { portnum, payload }),
    };

    Ok(ServiceEnvelope {
        packet,
        channel_id,
        gateway_id,
    })
}
