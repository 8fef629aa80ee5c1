//! A single broker's connection lifecycle: `Disconnected -> Connecting ->
//! Subscribed -> Disconnected`, reconnecting on a fixed delay forever (§4.1).
//! Each session owns its client, its state, and a sender into the shared
//! work queue — no callbacks, no shared mutable flags.

use rand::Rng;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::supervisor::RawFrame;
use super::TransportError;
use crate::config::BrokerConfig;
use crate::constants::{CONNECT_TIMEOUT, MQTT_KEEPALIVE, RECONNECT_DELAY};

/// Identifies this crate to the broker in the client id (§6.1).
const COMPONENT_TAG: &str = "mesh-ingest";

/// Replaces every non-alphanumeric byte with `_` so the broker name can't
/// introduce characters MQTT client ids disallow or strip.
fn sanitize_broker_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Builds a client id unique per session instance: `{componentTag}_{brokerNameSanitized}_{8-hex-random}`
/// (§6.1), so two sessions for the same broker never collide and kick each
/// other off.
fn build_client_id(broker_name: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{COMPONENT_TAG}_{}_{:08x}", sanitize_broker_name(broker_name), suffix)
}

const TOPIC_FILTERS: &[&str] = &[
    "msh/+/2/map/",
    "msh/+/2/e/+/+",
    "msh/+/+/2/map/",
    "msh/+/+/2/e/+/+",
    "msh/+/+/+/2/map/",
    "msh/+/+/+/2/e/+/+",
    "msh/+/+/+/+/2/map/",
    "msh/+/+/+/+/2/e/+/+",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Disconnected,
    Connecting,
    Subscribed,
}

/// A single broker's long-lived MQTT session.
pub struct BrokerSession {
    config: BrokerConfig,
    client_id: String,
    frame_tx: mpsc::Sender<RawFrame>,
    cancel: CancellationToken,
}

impl BrokerSession {
    pub fn new(config: BrokerConfig, frame_tx: mpsc::Sender<RawFrame>, cancel: CancellationToken) -> Self {
        let client_id = build_client_id(&config.name);
        Self {
            config,
            client_id,
            frame_tx,
            cancel,
        }
    }

    /// Runs the session until cancelled. Reconnects on every failure; one
    /// session's failure never propagates to others (the caller spawns this
    /// on its own task).
    pub async fn run(self) {
        let mut state = SessionState::Disconnected;
        loop {
            if self.cancel.is_cancelled() {
                info!(broker = %self.config.name, "session cancelled");
                return;
            }

            state = self.transition(state, SessionState::Connecting);
            let mut options = MqttOptions::new(self.client_id.clone(), self.config.address.clone(), 1883);
            options.set_keep_alive(MQTT_KEEPALIVE);

            let (client, mut event_loop) = AsyncClient::new(options, 64);

            let subscribed = timeout(CONNECT_TIMEOUT, self.subscribe_all(&client)).await;
            match subscribed {
                Ok(Ok(())) => {
                    state = self.transition(state, SessionState::Subscribed);
                }
                Ok(Err(e)) => {
                    let err = TransportError::from(e);
                    warn!(broker = %self.config.name, error = %err, "subscribe failed, retrying");
                    state = self.transition(state, SessionState::Disconnected);
                    self.wait_before_retry().await;
                    continue;
                }
                Err(_) => {
                    let err = TransportError::ConnectTimeout {
                        broker: self.config.name.clone(),
                        seconds: CONNECT_TIMEOUT.as_secs(),
                    };
                    warn!(broker = %self.config.name, error = %err, "connect timed out, retrying");
                    state = self.transition(state, SessionState::Disconnected);
                    self.wait_before_retry().await;
                    continue;
                }
            }

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!(broker = %self.config.name, "session cancelled mid-poll");
                        return;
                    }
                    polled = event_loop.poll() => {
                        match polled {
                            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                                let frame = RawFrame {
                                    broker: self.config.name.clone(),
                                    topic: publish.topic.clone(),
                                    payload: publish.payload.clone(),
                                };
                                if self.frame_tx.send(frame).await.is_err() {
                                    let err = TransportError::QueueClosed;
                                    warn!(broker = %self.config.name, error = %err, "dropping frame");
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!(broker = %self.config.name, error = %e, "connection error, reconnecting");
                                break;
                            }
                        }
                    }
                }
            }

            state = self.transition(state, SessionState::Disconnected);
            self.wait_before_retry().await;
        }
    }

    async fn subscribe_all(&self, client: &AsyncClient) -> Result<(), rumqttc::ClientError> {
        for filter in TOPIC_FILTERS {
            client.subscribe(*filter, QoS::AtMostOnce).await?;
        }
        Ok(())
    }

    async fn wait_before_retry(&self) {
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = self.cancel.cancelled() => {}
        }
    }

    fn transition(&self, from: SessionState, to: SessionState) -> SessionState {
        info!(broker = %self.config.name, ?from, ?to, "session state transition");
        to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_non_alphanumeric() {
        assert_eq!(sanitize_broker_name("main-east.1"), "main_east_1");
        assert_eq!(sanitize_broker_name("main"), "main");
    }

    #[test]
    fn client_id_starts_with_component_tag_and_sanitized_name() {
        let id = build_client_id("main-east");
        assert!(id.starts_with("mesh-ingest_main_east_"));
    }

    #[test]
    fn client_id_suffix_is_eight_hex_chars_and_varies() {
        let a = build_client_id("main");
        let b = build_client_id("main");
        assert_ne!(a, b, "random suffix should differ between sessions");
        let suffix_a = a.rsplit('_').next().unwrap();
        assert_eq!(suffix_a.len(), 8);
        assert!(suffix_a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
