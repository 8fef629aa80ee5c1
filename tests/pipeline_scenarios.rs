//! End-to-end scenarios exercising the full per-frame chain: Codec ->
//! PortRouter -> Deduper -> Store/MapAggregator -> GroupBuffer -> Notifier.
//! Mirrors the numbered scenarios used during design.

use std::sync::Arc;
use std::time::Duration;

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use base64::{engine::general_purpose::STANDARD, Engine};

use mesh_ingest::codec::{Data, MeshPacket, PacketPayload, PortPayload, ServiceEnvelope};
use mesh_ingest::config::{BrokerConfig, Config};
use mesh_ingest::group_buffer::GroupBuffer;
use mesh_ingest::mqtt::RawFrame;
use mesh_ingest::notifier::LoggingNotifier;
use mesh_ingest::pipeline::Pipeline;
use mesh_ingest::store::{MemoryStore, Store};

const DEFAULT_KEY_B64: &str = "1PG7OiApB1nwvP+rz05pAQ==";

fn ctr_encrypt(key_b64: &str, plaintext: &[u8], id: u32, from: u32) -> Vec<u8> {
    let key = STANDARD.decode(key_b64).unwrap();
    let cipher = Aes128::new_from_slice(&key).unwrap();

    let mut nonce = [0u8; 16];
    nonce[0..8].copy_from_slice(&(id as u64).to_le_bytes());
    nonce[8..12].copy_from_slice(&from.to_le_bytes());

    let mut counter = nonce;
    let mut out = Vec::with_capacity(plaintext.len());
    for chunk in plaintext.chunks(16) {
        let mut keystream = GenericArray::clone_from_slice(&counter);
        cipher.encrypt_block(&mut keystream);
        for (i, &b) in chunk.iter().enumerate() {
            out.push(b ^ keystream[i]);
        }
        for byte in counter[12..16].iter_mut().rev() {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                break;
            }
        }
    }
    out
}

fn envelope_bytes(packet: MeshPacket, gateway_id: &str) -> Vec<u8> {
    ServiceEnvelope {
        packet,
        channel_id: "LongFast".to_string(),
        gateway_id: gateway_id.to_string(),
    }
    .encode()
}

fn decoded_packet(from: u32, to: u32, id: u32, rx_time: u32, data: Data) -> MeshPacket {
    MeshPacket {
        from,
        to,
        id,
        rx_time,
        rx_snr: 6.5,
        rx_rssi: -90,
        hop_limit: 3,
        want_ack: false,
        payload: PacketPayload::Decoded(data),
    }
}

struct Harness {
    store: Arc<dyn Store>,
    pipeline: Pipeline,
    group_buffer: Arc<GroupBuffer>,
    notifier: Arc<LoggingNotifier>,
}

fn harness() -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let notifier = Arc::new(LoggingNotifier::new());
    let group_buffer = Arc::new(GroupBuffer::new(notifier.clone(), Duration::from_millis(30)));
    let config = Arc::new(Config {
        brokers: vec![BrokerConfig {
            name: "main".to_string(),
            address: "mqtt://example".to_string(),
            forward_to_chat: true,
        }],
        ..Config::default()
    });
    let pipeline = Pipeline::new(config, store.clone(), group_buffer.clone());
    Harness {
        store,
        pipeline,
        group_buffer,
        notifier,
    }
}

#[tokio::test]
async fn position_from_two_gateways_three_seconds_apart() {
    let h = harness();
    let from = 0x015b_a416;

    let position = Data {
        portnum: 3,
        payload: PortPayload::Position(mesh_ingest::codec::payload::Position {
            latitude_i: 557_654_321,
            longitude_i: 373_456_789,
            altitude: 100,
            time: 1000,
        }),
    };

    let packet_a = decoded_packet(from, 0xFFFF_FFFF, 42, 1000, position.clone());
    let bytes_a = envelope_bytes(packet_a, "!gwA");
    h.pipeline
        .process(RawFrame {
            broker: "main".to_string(),
            topic: "msh/msk/2/e/LongFast/!gwA".to_string(),
            payload: bytes_a.into(),
        })
        .await;

    tokio::time::sleep(Duration::from_secs(2)).await;

    let packet_b = decoded_packet(from, 0xFFFF_FFFF, 42, 1000, position);
    let bytes_b = envelope_bytes(packet_b, "!gwB");
    h.pipeline
        .process(RawFrame {
            broker: "main".to_string(),
            topic: "msh/msk/2/e/LongFast/!gwB".to_string(),
            payload: bytes_b.into(),
        })
        .await;

    let records = h.store.get_portnum("POSITION_APP", from, 10).await.unwrap();
    assert_eq!(records.len(), 1);

    let dot = h.store.read_dot(from).await.unwrap().unwrap();
    assert_eq!(dot.latitude, Some(55.7654321));
    assert_eq!(dot.longitude, Some(37.3456789));
    assert!(h.store.is_active_device(from).await.unwrap());
}

#[tokio::test]
async fn encrypted_text_broadcast_groups_and_notifies() {
    let h = harness();
    let from = 0x0000_0001;
    let id = 77;

    let text = Data {
        portnum: 1,
        payload: PortPayload::Text("hello".to_string()),
    };
    let plaintext = text.encode();
    let ciphertext = ctr_encrypt(DEFAULT_KEY_B64, &plaintext, id, from);

    let packet = MeshPacket {
        from,
        to: 0xFFFF_FFFF,
        id,
        rx_time: 1000,
        rx_snr: 6.5,
        rx_rssi: -90,
        hop_limit: 3,
        want_ack: false,
        payload: PacketPayload::Encrypted(ciphertext),
    };
    let bytes = envelope_bytes(packet, "!gwA");

    h.pipeline
        .process(RawFrame {
            broker: "main".to_string(),
            topic: "msh/msk/2/e/LongFast/!gwA".to_string(),
            payload: bytes.into(),
        })
        .await;

    let records = h.store.get_portnum("TEXT_MESSAGE_APP", from, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].raw_data["text"], "hello");

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.group_buffer.flush_expired().await;

    assert_eq!(h.notifier.call_count(), 1);
    let observations = h.notifier.last_observations().unwrap();
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].gateway_id, "!gwA");
}

#[tokio::test]
async fn duplicate_from_relay_does_not_grow_list_but_joins_group() {
    let h = harness();
    let from = 0x0000_0002;
    let id = 99;

    let text = Data {
        portnum: 1,
        payload: PortPayload::Text("hello".to_string()),
    };

    let packet_a = decoded_packet(from, 0xFFFF_FFFF, id, 1000, text.clone());
    h.pipeline
        .process(RawFrame {
            broker: "main".to_string(),
            topic: "msh/msk/2/e/LongFast/!gwA".to_string(),
            payload: envelope_bytes(packet_a, "!gwA").into(),
        })
        .await;

    tokio::time::sleep(Duration::from_millis(10)).await;

    let packet_b = decoded_packet(from, 0xFFFF_FFFF, id, 1000, text);
    h.pipeline
        .process(RawFrame {
            broker: "main".to_string(),
            topic: "msh/msk/2/e/LongFast/!gwB".to_string(),
            payload: envelope_bytes(packet_b, "!gwB").into(),
        })
        .await;

    let records = h.store.get_portnum("TEXT_MESSAGE_APP", from, 10).await.unwrap();
    assert_eq!(records.len(), 1, "dedup hit should suppress the second append");

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.group_buffer.flush_expired().await;

    assert_eq!(h.notifier.call_count(), 1);
    let observations = h.notifier.last_observations().unwrap();
    assert_eq!(observations.len(), 2);
}

#[tokio::test]
async fn name_then_zero_position_then_cleared_name_invalidates_dot() {
    let h = harness();
    let from = 0x0000_0003;

    let name_packet = decoded_packet(
        from,
        0xFFFF_FFFF,
        1,
        1000,
        Data {
            portnum: 4,
            payload: PortPayload::User(mesh_ingest::codec::payload::User {
                id: "!00000003".to_string(),
                long_name: "Alpha".to_string(),
                short_name: "A".to_string(),
                macaddr: vec![],
                public_key: vec![],
            }),
        },
    );
    h.pipeline
        .process(RawFrame {
            broker: "main".to_string(),
            topic: "msh/msk/2/e/LongFast/!gwA".to_string(),
            payload: envelope_bytes(name_packet, "!gwA").into(),
        })
        .await;
    assert!(h.store.read_dot(from).await.unwrap().is_some());

    let zero_position = decoded_packet(
        from,
        0xFFFF_FFFF,
        2,
        2000,
        Data {
            portnum: 3,
            payload: PortPayload::Position(mesh_ingest::codec::payload::Position {
                latitude_i: 0,
                longitude_i: 0,
                altitude: 0,
                time: 0,
            }),
        },
    );
    h.pipeline
        .process(RawFrame {
            broker: "main".to_string(),
            topic: "msh/msk/2/e/LongFast/!gwA".to_string(),
            payload: envelope_bytes(zero_position, "!gwA").into(),
        })
        .await;
    assert!(h.store.read_dot(from).await.unwrap().is_some());

    let cleared_name = decoded_packet(
        from,
        0xFFFF_FFFF,
        3,
        3000,
        Data {
            portnum: 4,
            payload: PortPayload::User(mesh_ingest::codec::payload::User {
                id: "!00000003".to_string(),
                long_name: String::new(),
                short_name: String::new(),
                macaddr: vec![],
                public_key: vec![],
            }),
        },
    );
    h.pipeline
        .process(RawFrame {
            broker: "main".to_string(),
            topic: "msh/msk/2/e/LongFast/!gwA".to_string(),
            payload: envelope_bytes(cleared_name, "!gwA").into(),
        })
        .await;
    assert!(h.store.read_dot(from).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_portnum_still_appends_but_does_not_notify() {
    let h = harness();
    let from = 0x0000_0004;

    let packet = decoded_packet(
        from,
        0xFFFF_FFFF,
        5,
        1000,
        Data {
            portnum: 999,
            payload: PortPayload::Unknown(vec![1, 2, 3]),
        },
    );
    h.pipeline
        .process(RawFrame {
            broker: "main".to_string(),
            topic: "msh/msk/2/e/LongFast/!gwA".to_string(),
            payload: envelope_bytes(packet, "!gwA").into(),
        })
        .await;

    let records = h.store.get_portnum("UNKNOWN_999", from, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(h.store.read_dot(from).await.unwrap().is_none());
    assert_eq!(h.notifier.call_count(), 0);
}

#[tokio::test]
async fn json_topic_text_message_is_decoded_routed_and_grouped() {
    let h = harness();
    let from = 0x0000_0006;

    let payload = br#"{"from":6,"to":4294967295,"id":55,"type":"text","payload":{"text":"hi from json"},"sender":"!gwJ","rxSnr":4.0,"rxRssi":-80,"hopLimit":2}"#;

    h.pipeline
        .process(RawFrame {
            broker: "main".to_string(),
            topic: "msh/msk/2/json/LongFast/!gwJ".to_string(),
            payload: payload.to_vec().into(),
        })
        .await;

    let records = h.store.get_portnum("TEXT_MESSAGE_APP", from, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].raw_data["text"], "hi from json");
    assert_eq!(records[0].gateway_id, "!gwJ");

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.group_buffer.flush_expired().await;

    assert_eq!(h.notifier.call_count(), 1);
    let observations = h.notifier.last_observations().unwrap();
    assert_eq!(observations[0].gateway_id, "!gwJ");
}

#[tokio::test]
async fn json_topic_position_uses_snake_case_fields() {
    let h = harness();
    let from = 0x0000_0007;

    let payload = br#"{"from":7,"type":"position","payload":{"latitude_i":557654321,"longitude_i":373456789}}"#;

    h.pipeline
        .process(RawFrame {
            broker: "main".to_string(),
            topic: "msh/msk/2/json/LongFast/!gwK".to_string(),
            payload: payload.to_vec().into(),
        })
        .await;

    let dot = h.store.read_dot(from).await.unwrap().unwrap();
    assert_eq!(dot.latitude, Some(55.7654321));
    assert_eq!(dot.longitude, Some(37.3456789));
}

#[tokio::test]
async fn admin_delete_removes_every_trace_of_a_device() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let device_id = 0x0000_0005;

    for portnum_name in mesh_ingest::portrouter::KNOWN_PORTNUM_NAMES.iter().take(5) {
        store
            .append_portnum(
                portnum_name,
                device_id,
                mesh_ingest::store::PortnumRecord {
                    timestamp: 0,
                    from: device_id,
                    to: 0xFFFF_FFFF,
                    rx_time: 0,
                    rx_snr: 0.0,
                    rx_rssi: 0,
                    hop_limit: 0,
                    gateway_id: "!gwA".to_string(),
                    broker: "main".to_string(),
                    raw_data: serde_json::json!({}),
                },
                200,
            )
            .await
            .unwrap();
    }
    store
        .upsert_dot(
            device_id,
            mesh_ingest::store::Dot {
                long_name: Some("Alpha".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store.set_active_device(device_id).await.unwrap();

    let deleted = store
        .delete_device(device_id, mesh_ingest::portrouter::KNOWN_PORTNUM_NAMES)
        .await
        .unwrap();
    assert!(deleted >= 6);

    for portnum_name in mesh_ingest::portrouter::KNOWN_PORTNUM_NAMES {
        assert!(store.get_portnum(portnum_name, device_id, 10).await.unwrap().is_empty());
    }
    assert!(store.read_dot(device_id).await.unwrap().is_none());
    assert!(!store.is_active_device(device_id).await.unwrap());
}
