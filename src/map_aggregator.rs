//! # MapAggregator
//!
//! Produces and maintains the per-device [`Dot`] (§4.6). `update_from_portnum`
//! derives a partial update from the decoded payload and hands it to the
//! `Store`'s read-merge-write, which enforces Dot validity (§3).

use std::sync::Arc;

use crate::codec::{Data, PortPayload};
use crate::store::{Dot, Store, StoreError};

pub struct MapAggregator {
    store: Arc<dyn Store>,
}

impl MapAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Updates the Dot for `from` given a decoded packet (§4.3 rule 2,
    /// §4.6's per-portnum policies). `gateway_numeric` is the gateway id
    /// after hex→numeric conversion; `s_time` is the server clock at
    /// ingest, in milliseconds.
    pub async fn update_from_portnum(
        &self,
        data: &Data,
        from: u32,
        gateway_numeric: u32,
        s_time: i64,
    ) -> Result<(), StoreError> {
        let partial = dot_partial(data, from, gateway_numeric, s_time);
        self.store.upsert_dot(from, partial).await
    }
}

/// Rejects the empty string, whitespace-only strings, and strings whose
/// rendered form is plainly non-printable (§4.3 rule 2).
fn is_valid_user_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed.chars().any(|c| !c.is_control())
}

/// Derives the Dot partial update for a decoded packet. Every packet
/// advances `s_time` and the `mqtt` self-gateway flag; Position and
/// NodeInfo packets additionally carry coordinate/name fields (§4.3, §4.6).
fn dot_partial(data: &Data, from: u32, gateway_numeric: u32, s_time: i64) -> Dot {
    let mqtt_flag = if gateway_numeric == from { "1" } else { "0" };

    let mut partial = Dot {
        mqtt: Some(mqtt_flag.to_string()),
        s_time: Some(s_time),
        ..Default::default()
    };

    match &data.payload {
        PortPayload::Position(p) if p.latitude_i != 0 && p.longitude_i != 0 => {
            partial.latitude = Some(p.latitude_i as f64 / 1e7);
            partial.longitude = Some(p.longitude_i as f64 / 1e7);
        }
        PortPayload::User(u) => {
            if is_valid_user_name(&u.long_name) || is_valid_user_name(&u.short_name) {
                partial.long_name = Some(u.long_name.clone());
                partial.short_name = Some(u.short_name.clone());
            } else {
                partial.long_name = Some(String::new());
                partial.short_name = Some(String::new());
            }
        }
        _ => {}
    }

    partial
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::payload::{Position, User};
    use crate::store::MemoryStore;

    #[test]
    fn zero_coordinates_do_not_update_dot() {
        let data = Data {
            portnum: 3,
            payload: PortPayload::Position(Position {
                latitude_i: 0,
                longitude_i: 0,
                altitude: 0,
                time: 0,
            }),
        };
        let dot = dot_partial(&data, 42, 7, 1000);
        assert!(dot.latitude.is_none());
        assert!(dot.longitude.is_none());
    }

    #[test]
    fn nonzero_coordinates_scale_by_1e7() {
        let data = Data {
            portnum: 3,
            payload: PortPayload::Position(Position {
                latitude_i: 557_654_321,
                longitude_i: 373_456_789,
                altitude: 0,
                time: 0,
            }),
        };
        let dot = dot_partial(&data, 42, 7, 1000);
        assert_eq!(dot.latitude, Some(55.7654321));
        assert_eq!(dot.longitude, Some(37.3456789));
    }

    #[test]
    fn mqtt_flag_is_one_when_gateway_is_self() {
        let data = Data {
            portnum: 1,
            payload: PortPayload::Text("hi".to_string()),
        };
        let dot = dot_partial(&data, 42, 42, 1000);
        assert_eq!(dot.mqtt, Some("1".to_string()));
        let dot_other = dot_partial(&data, 42, 7, 1000);
        assert_eq!(dot_other.mqtt, Some("0".to_string()));
    }

    #[test]
    fn whitespace_and_control_only_names_are_invalid() {
        assert!(!is_valid_user_name(""));
        assert!(!is_valid_user_name("   "));
        assert!(!is_valid_user_name("\t\n"));
        assert!(!is_valid_user_name("\u{0}\u{1}"));
        assert!(is_valid_user_name("Alpha"));
        assert!(is_valid_user_name(" A "));
    }

    #[test]
    fn empty_names_clear_dot_name_fields() {
        let data = Data {
            portnum: 4,
            payload: PortPayload::User(User {
                id: "!0000002a".to_string(),
                long_name: String::new(),
                short_name: String::new(),
                macaddr: vec![],
                public_key: vec![],
            }),
        };
        let dot = dot_partial(&data, 42, 7, 1000);
        assert_eq!(dot.long_name, Some(String::new()));
        assert_eq!(dot.short_name, Some(String::new()));
    }

    #[test]
    fn whitespace_only_name_clears_dot_name_fields() {
        let data = Data {
            portnum: 4,
            payload: PortPayload::User(User {
                id: "!0000002a".to_string(),
                long_name: "   ".to_string(),
                short_name: "\t".to_string(),
                macaddr: vec![],
                public_key: vec![],
            }),
        };
        let dot = dot_partial(&data, 42, 7, 1000);
        assert_eq!(dot.long_name, Some(String::new()));
        assert_eq!(dot.short_name, Some(String::new()));
    }

    #[tokio::test]
    async fn update_from_portnum_invalidates_dot_after_clearing_name_and_position() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let aggregator = MapAggregator::new(store.clone());

        let name_data = Data {
            portnum: 4,
            payload: PortPayload::User(User {
                id: "!0000002a".to_string(),
                long_name: "Alpha".to_string(),
                short_name: "A".to_string(),
                macaddr: vec![],
                public_key: vec![],
            }),
        };
        aggregator.update_from_portnum(&name_data, 42, 7, 1000).await.unwrap();
        assert!(store.read_dot(42).await.unwrap().is_some());

        let zero_position = Data {
            portnum: 3,
            payload: PortPayload::Position(Position {
                latitude_i: 0,
                longitude_i: 0,
                altitude: 0,
                time: 0,
            }),
        };
        aggregator.update_from_portnum(&zero_position, 42, 7, 2000).await.unwrap();
        assert!(store.read_dot(42).await.unwrap().is_some());

        let cleared_name = Data {
            portnum: 4,
            payload: PortPayload::User(User {
                id: "!0000002a".to_string(),
                long_name: String::new(),
                short_name: String::new(),
                macaddr: vec![],
                public_key: vec![],
            }),
        };
        aggregator.update_from_portnum(&cleared_name, 42, 7, 3000).await.unwrap();
        assert!(store.read_dot(42).await.unwrap().is_none());
    }
}
