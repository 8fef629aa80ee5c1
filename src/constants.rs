//! Ingest Pipeline Constants
//!
//! This module defines the defaults from the ingest pipeline's configuration
//! surface. They are overridable through [`crate::config::Config`]; the
//! values here are what a fresh `Config::default()` carries.

use std::time::Duration;

/// Minimum accepted `ServiceEnvelope` buffer length, in bytes.
pub const MIN_PACKET_BYTES: usize = 10;

/// Maximum accepted `ServiceEnvelope` buffer length, in bytes.
pub const MAX_PACKET_BYTES: usize = 524_288;

/// Maximum plaintext length accepted after AES-CTR decryption.
pub const MAX_DECRYPTED_BYTES: usize = 65_536;

/// Number of most-recent `PortnumRecord`s retained per `{portnum}:{deviceId}` list.
pub const MAX_PORTNUM_MESSAGES: usize = 200;

/// TTL of a store-level and dot-level dedup marker.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(3);

/// Time a `MessageGroup` waits after its last observation before flushing.
pub const GROUP_WINDOW: Duration = Duration::from_secs(8);

/// How long the Notifier remembers a forwarded `(id, gatewayId, broker)` tuple.
pub const PROCESSED_MESSAGES_TTL: Duration = Duration::from_secs(10 * 60);

/// Default width of the ingest worker pool.
pub const WORKER_CONCURRENCY: usize = 10;

/// Default depth of the bounded ingest work queue.
pub const WORK_QUEUE_CAPACITY: usize = 1_024;

/// Fixed reconnect delay for a `BrokerSession` after a dropped connection.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Time allotted to a single connect attempt before it is aborted and retried.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// MQTT keepalive interval.
pub const MQTT_KEEPALIVE: Duration = Duration::from_secs(60);

/// Broadcast destination address (`0xFFFFFFFF`).
pub const BROADCAST_ADDR: u32 = 0xFFFF_FFFF;

/// Topic prefixes eligible for chat-channel forwarding.
pub const ALLOWED_TOPIC_PREFIXES: &[&str] = &["msh/msk/", "msh/kgd/", "msh/ufa/"];

/// Upper bound on the Store's in-memory read cache entry count.
pub const STORE_CACHE_CAPACITY: usize = 4_096;

/// TTL of a Store read-cache entry.
pub const STORE_CACHE_TTL: Duration = Duration::from_secs(15);
