//! # MQTT Transport
//!
//! One long-lived [`BrokerSession`] per configured broker, all feeding a
//! single bounded queue drained by the [`Supervisor`]'s worker pool (§4.1).
//! Per-broker session state is owned, not captured in closures: each session
//! holds its own socket, reconnect state, and a clone of the shared queue's
//! sending half.

mod session;
mod supervisor;
mod topic;

pub use session::BrokerSession;
pub use supervisor::{RawFrame, Supervisor};
pub use topic::{parse_topic, ParsedTopic, TopicKind};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("connection attempt to {broker} timed out after {seconds}s")]
    ConnectTimeout { broker: String, seconds: u64 },

    #[error("work queue closed")]
    QueueClosed,
}
