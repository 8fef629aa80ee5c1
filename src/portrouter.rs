//! # PortRouter
//!
//! Maps a decoded payload's portnum to its list name and derives the two
//! side effects every packet triggers: appending a [`PortnumRecord`] and
//! updating the per-device [`Dot`] (§4.3).

use serde_json::json;

use crate::codec::{Data, PortPayload};
use crate::store::PortnumRecord;

/// Returns the list name for a portnum, synthesizing `UNKNOWN_<n>` for
/// portnums this crate doesn't decode a typed schema for.
pub fn portnum_name(portnum: u32) -> String {
    match portnum {
        1 => "TEXT_MESSAGE_APP".to_string(),
        3 => "POSITION_APP".to_string(),
        4 => "NODEINFO_APP".to_string(),
        8 => "WAYPOINT_APP".to_string(),
        67 => "TELEMETRY_APP".to_string(),
        70 => "TRACEROUTE_APP".to_string(),
        71 => "NEIGHBORINFO_APP".to_string(),
        73 => "MAP_REPORT_APP".to_string(),
        other => format!("UNKNOWN_{other}"),
    }
}

/// All statically-known portnum list names, for fan-out reads like
/// `DeleteDevice` (§4.4).
pub const KNOWN_PORTNUM_NAMES: &[&str] = &[
    "TEXT_MESSAGE_APP",
    "POSITION_APP",
    "NODEINFO_APP",
    "WAYPOINT_APP",
    "TELEMETRY_APP",
    "TRACEROUTE_APP",
    "NEIGHBORINFO_APP",
    "MAP_REPORT_APP",
];

/// Fields the router extracted from one packet, ready to append to the
/// Store (§4.4's `AppendPortnum`).
pub struct RoutedRecord {
    pub portnum_name: String,
    pub record: PortnumRecord,
}

/// Builds the [`PortnumRecord`] for a decoded packet. `timestamp` is the
/// server clock at ingest time, supplied by the caller rather than read
/// from a global clock here.
pub fn build_record(
    data: &Data,
    from: u32,
    to: u32,
    rx_time: u32,
    rx_snr: f32,
    rx_rssi: i32,
    hop_limit: u32,
    gateway_id: &str,
    broker: &str,
    timestamp: i64,
) -> RoutedRecord {
    let raw_data = payload_to_json(&data.payload);
    RoutedRecord {
        portnum_name: portnum_name(data.portnum),
        record: PortnumRecord {
            timestamp,
            from,
            to,
            rx_time,
            rx_snr,
            rx_rssi,
            hop_limit,
            gateway_id: gateway_id.to_string(),
            broker: broker.to_string(),
            raw_data,
        },
    }
}

fn payload_to_json(payload: &PortPayload) -> serde_json::Value {
    match payload {
        PortPayload::Text(text) => json!({ "text": text }),
        PortPayload::Position(p) => json!({
            "latitudeI": p.latitude_i,
            "longitudeI": p.longitude_i,
            "altitude": p.altitude,
            "time": p.time,
        }),
        PortPayload::User(u) => json!({
            "id": u.id,
            "longName": u.long_name,
            "shortName": u.short_name,
            "macaddr": colon_hex(&u.macaddr),
            "publicKey": hex::encode(&u.public_key),
        }),
        PortPayload::Waypoint(w) => json!({
            "id": w.id,
            "latitudeI": w.latitude_i,
            "longitudeI": w.longitude_i,
            "name": w.name,
        }),
        PortPayload::Telemetry(t) => telemetry_to_json(t),
        PortPayload::Traceroute(r) => json!({ "route": r.route }),
        PortPayload::NeighborInfo(n) => json!({
            "nodeId": n.node_id,
            "neighbors": n.neighbors,
        }),
        PortPayload::MapReport(m) => json!({
            "longName": m.long_name,
            "shortName": m.short_name,
            "latitudeI": m.latitude_i,
            "longitudeI": m.longitude_i,
        }),
        PortPayload::Unknown(bytes) => json!({ "bytes": hex::encode(bytes) }),
    }
}

fn telemetry_to_json(t: &crate::codec::payload::Telemetry) -> serde_json::Value {
    use crate::codec::payload::Telemetry;
    match t {
        Telemetry::Device { battery_level, voltage } => json!({
            "kind": "device_metrics",
            "batteryLevel": battery_level,
            "voltage": voltage,
        }),
        Telemetry::Environment {
            temperature,
            relative_humidity,
        } => json!({
            "kind": "environment_metrics",
            "temperature": temperature,
            "relativeHumidity": relative_humidity,
        }),
        Telemetry::Unknown => json!({ "kind": "unknown" }),
    }
}

fn colon_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Whether this packet's portnum has a statically-known typed schema
/// (distinguishes §4.3's "unknown port still appends, but MapAggregator is
/// not updated" rule).
pub fn is_known_portnum(portnum: u32) -> bool {
    matches!(portnum, 1 | 3 | 4 | 8 | 67 | 70 | 71 | 73)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::payload::User;

    #[test]
    fn unknown_portnum_synthesizes_name() {
        assert_eq!(portnum_name(999), "UNKNOWN_999");
        assert!(!is_known_portnum(999));
    }

    #[test]
    fn known_portnums_map_to_fixed_names() {
        assert_eq!(portnum_name(1), "TEXT_MESSAGE_APP");
        assert_eq!(portnum_name(3), "POSITION_APP");
        assert_eq!(portnum_name(73), "MAP_REPORT_APP");
        assert!(is_known_portnum(1));
    }

    #[test]
    fn build_record_carries_text_payload_as_json() {
        let data = Data {
            portnum: 1,
            payload: PortPayload::Text("hi".to_string()),
        };
        let routed = build_record(&data, 42, 0xFFFF_FFFF, 1000, 6.5, -90, 3, "!gwA", "main", 0);
        assert_eq!(routed.portnum_name, "TEXT_MESSAGE_APP");
        assert_eq!(routed.record.raw_data["text"], "hi");
    }

    #[test]
    fn build_record_renders_macaddr_as_colon_hex() {
        let data = Data {
            portnum: 4,
            payload: PortPayload::User(User {
                id: "!0000002a".to_string(),
                long_name: "Alpha".to_string(),
                short_name: "A".to_string(),
                macaddr: vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01],
                public_key: vec![0xAB, 0xCD],
            }),
        };
        let routed = build_record(&data, 42, 0xFFFF_FFFF, 1000, 0.0, 0, 3, "!gwA", "main", 0);
        assert_eq!(routed.record.raw_data["macaddr"], "de:ad:be:ef:00:01");
        assert_eq!(routed.record.raw_data["publicKey"], "abcd");
    }
}
