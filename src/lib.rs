//! # mesh-ingest
//!
//! Ingest and fan-in pipeline for a mesh-radio MQTT network (Meshtastic-style).
//!
//! Radio gateways republish over-the-air packets onto MQTT brokers. This crate
//! subscribes to many brokers in parallel, decodes and (when necessary)
//! decrypts packets, derives per-device state, persists structured history
//! into a key-value store, suppresses duplicates seen via redundant gateways,
//! and forwards text broadcasts into chat-channel notifications.
//!
//! ## Layout
//!
//! - [`codec`] — envelope validation, protobuf decoding, AES-CTR decryption.
//! - [`portrouter`] — maps a portnum to a payload kind and its derived effects.
//! - [`store`] — typed writes/reads over a Redis-compatible KV backend.
//! - [`dedup`] — short-window suppression of identical packets.
//! - [`map_aggregator`] — per-device "dot" state.
//! - [`group_buffer`] — time-bounded coalescing of a message across gateways.
//! - [`notifier`] — chat-channel forwarding contract.
//! - [`mqtt`] — per-broker session state machine and supervisor.
//! - [`pipeline`] — wires codec, portrouter, dedup, store and group_buffer
//!   together into the per-frame chain a worker runs.
//! - [`query`] — read contracts consumed by an out-of-tree HTTP/bot layer.
//!
//! ```toml
//! [dependencies]
//! mesh-ingest = "0.1"
//! ```

pub mod codec;
pub mod config;
pub mod constants;
pub mod dedup;
pub mod device_id;
pub mod error;
pub mod group_buffer;
pub mod logging;
pub mod map_aggregator;
pub mod mqtt;
pub mod notifier;
pub mod pipeline;
pub mod portrouter;
pub mod query;
pub mod store;

pub use config::Config;
pub use device_id::DeviceId;
pub use error::IngestError;
