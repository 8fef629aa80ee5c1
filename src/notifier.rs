//! # Notifier
//!
//! Final delivery stage: renders a grouped message (or a single ungrouped
//! packet) into a human-readable line and hands it off. Tracks its own
//! short-term processed-message set via the Store rather than an in-process
//! set, so multiple ingest workers share one dedup view (§4.8 Design Notes).

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::Channel;
use crate::store::{Store, StoreError};

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One gateway's contribution to a delivered message, for rendering
/// per-gateway hop/signal detail.
#[derive(Debug, Clone)]
pub struct GatewayObservation {
    pub gateway_id: String,
    pub hop_limit: u32,
    pub rx_rssi: i32,
    pub rx_snr: f32,
    pub broker: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers message `id` with its text and the set of gateways that
    /// observed it. Implementations should be idempotent against repeat
    /// calls for the same `(id, gateway_id, broker)` within the processed
    /// window; the reference implementation enforces this itself.
    async fn notify(
        &self,
        id: u32,
        text: &str,
        channel: Channel,
        observations: Vec<GatewayObservation>,
    ) -> Result<(), NotifierError>;
}

/// Renders a hop_limit into the §4.8 human label: `7` means the packet
/// never left its originating gateway ("Direct"); anything less is hops
/// taken on the way in.
fn render_hops(hop_limit: u32) -> String {
    if hop_limit >= 7 {
        "Direct".to_string()
    } else {
        format!("{} Hop", 7 - hop_limit)
    }
}

/// `true` when a gateway's observation carries no radio telemetry at all,
/// i.e. it reached us purely over MQTT rather than via its own radio.
fn is_pure_mqtt(observation: &GatewayObservation) -> bool {
    observation.rx_rssi == 0 && observation.rx_snr == 0.0
}

fn render_observation(observation: &GatewayObservation) -> String {
    if is_pure_mqtt(observation) {
        format!("{} (MQTT)", observation.gateway_id)
    } else {
        format!(
            "{} ({}, rssi {}, snr {:.1})",
            observation.gateway_id,
            render_hops(observation.hop_limit),
            observation.rx_rssi,
            observation.rx_snr
        )
    }
}

/// Processed-message TTL, per §4.8: ten minutes.
const PROCESSED_WINDOW_SECONDS: u64 = 600;

/// Production Notifier: logs the rendered line and gates repeat delivery
/// through the shared Store rather than a local set, so it stays correct
/// across multiple worker processes.
pub struct StoreBackedNotifier {
    store: Arc<dyn Store>,
}

impl StoreBackedNotifier {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Notifier for StoreBackedNotifier {
    async fn notify(
        &self,
        id: u32,
        text: &str,
        channel: Channel,
        observations: Vec<GatewayObservation>,
    ) -> Result<(), NotifierError> {
        let mut fresh = Vec::with_capacity(observations.len());
        for observation in observations {
            let key = format!("notified:{id}:{}:{}", observation.gateway_id, observation.broker);
            if self.store.mark_seen(&key, PROCESSED_WINDOW_SECONDS).await? {
                fresh.push(observation);
            }
        }

        if fresh.is_empty() {
            return Ok(());
        }

        let rendered: Vec<String> = fresh.iter().map(render_observation).collect();
        info!(id, ?channel, gateways = %rendered.join(", "), text, "delivering message");
        Ok(())
    }
}

/// In-memory reference Notifier: records every call instead of delivering
/// it, so unit and integration tests can inspect exactly what would have
/// been sent. Mirrors [`crate::store::MemoryStore`]'s role as a
/// dependency-free stand-in for its production counterpart.
pub struct LoggingNotifier {
    calls: std::sync::Mutex<Vec<(u32, String, Vec<GatewayObservation>)>>,
}

impl Default for LoggingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingNotifier {
    pub fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_observations(&self) -> Option<Vec<GatewayObservation>> {
        self.calls.lock().unwrap().last().map(|(_, _, obs)| obs.clone())
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(
        &self,
        id: u32,
        text: &str,
        _channel: Channel,
        observations: Vec<GatewayObservation>,
    ) -> Result<(), NotifierError> {
        self.calls.lock().unwrap().push((id, text.to_string(), observations));
        Ok(())
    }
}
