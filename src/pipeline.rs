//! # Pipeline
//!
//! The per-frame chain a worker runs for every [`RawFrame`]: envelope
//! validation, decode, decrypt, route, dedup-gate, persist, and (for
//! broadcast text) hand-off to the [`GroupBuffer`] (§4's dataflow summary).
//! Errors are classified and logged at this boundary rather than bubbled
//! further — one bad frame never stops the worker loop (§7).

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::codec::is_suppressed;
use crate::config::{Channel, Config};
use crate::constants::{ALLOWED_TOPIC_PREFIXES, BROADCAST_ADDR};
use crate::dedup::Deduper;
use crate::device_id::DeviceId;
use crate::group_buffer::{GatewayReport, GroupBuffer};
use crate::map_aggregator::MapAggregator;
use crate::mqtt::{parse_topic, RawFrame, TopicKind};
use crate::portrouter::{self, is_known_portnum};
use crate::store::Store;

/// Owns the per-frame chain's stateful components and runs it for each
/// [`RawFrame`] a worker receives.
pub struct Pipeline {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    deduper: Deduper,
    aggregator: MapAggregator,
    group_buffer: Arc<GroupBuffer>,
}

impl Pipeline {
    pub fn new(config: Arc<Config>, store: Arc<dyn Store>, group_buffer: Arc<GroupBuffer>) -> Self {
        let deduper = Deduper::new(store.clone(), config.dedup_window.as_secs());
        let aggregator = MapAggregator::new(store.clone());
        Self {
            config,
            store,
            deduper,
            aggregator,
            group_buffer,
        }
    }

    /// Entry point handed to [`crate::mqtt::Supervisor::spawn`]. Never
    /// propagates an error to the caller: every failure is classified and
    /// logged here.
    pub async fn process(&self, frame: RawFrame) {
        if let Err(message) = self.try_process(&frame).await {
            if is_suppressed(&message) {
                debug!(broker = %frame.broker, topic = %frame.topic, "suppressed decode failure");
            } else {
                warn!(broker = %frame.broker, topic = %frame.topic, error = %message, "dropping frame");
            }
        }
    }

    async fn try_process(&self, frame: &RawFrame) -> Result<(), String> {
        let parsed_topic = match parse_topic(&frame.topic) {
            Some(t) => t,
            None => return Ok(()),
        };

        let envelope = match parsed_topic.kind {
            TopicKind::Stat => return Ok(()),
            TopicKind::Protobuf => {
                crate::codec::envelope::validate_envelope(&frame.payload).map_err(stringify)?;
                crate::codec::envelope::decode_service_envelope(&frame.payload).map_err(stringify)?
            }
            TopicKind::Json => {
                crate::codec::decode_json_envelope(&frame.payload, &parsed_topic.user, &parsed_topic.channel)
                    .map_err(stringify)?
            }
        };
        let data =
            crate::codec::crypto::resolve_payload(&envelope.packet, &self.config.decryption_keys).map_err(stringify)?;

        let packet = &envelope.packet;
        let from = packet.from;
        let gateway_numeric = DeviceId::from_hex(&envelope.gateway_id).map(|id| id.numeric()).unwrap_or(0);
        let now_millis = Utc::now().timestamp_millis();

        if self
            .deduper
            .first_seen_portnum(from, data.portnum, packet.rx_time)
            .await
            .map_err(stringify)?
        {
            let routed = portrouter::build_record(
                &data,
                from,
                packet.to,
                packet.rx_time,
                packet.rx_snr,
                packet.rx_rssi,
                packet.hop_limit,
                &envelope.gateway_id,
                &frame.broker,
                now_millis,
            );
            self.store
                .append_portnum(&routed.portnum_name, from, routed.record, self.config.max_portnum_messages)
                .await
                .map_err(stringify)?;
        }

        if is_known_portnum(data.portnum) {
            self.update_dot(&data, from, gateway_numeric, now_millis, packet.rx_time)
                .await?;
        }

        if data.portnum == 1 && packet.to == BROADCAST_ADDR && self.allows_chat_forward(&frame.topic, &frame.broker) {
            if let crate::codec::PortPayload::Text(text) = &data.payload {
                self.group_buffer
                    .observe(
                        packet.id,
                        text,
                        channel_for(&frame.topic),
                        &envelope.gateway_id,
                        GatewayReport {
                            hop_limit: packet.hop_limit,
                            rx_rssi: packet.rx_rssi,
                            rx_snr: packet.rx_snr,
                            broker: frame.broker.clone(),
                        },
                    )
                    .await;
            }
        }

        Ok(())
    }

    /// Whether a broadcast text packet seen on `topic` via `broker` should be
    /// handed to the GroupBuffer: the topic must be in the allowed region
    /// set, and the broker it arrived on must be configured to forward to
    /// chat (§6.5's per-broker `forwardToChat` flag).
    fn allows_chat_forward(&self, topic: &str, broker: &str) -> bool {
        is_allowed_topic(topic)
            && self
                .config
                .brokers
                .iter()
                .any(|b| b.name == broker && b.forward_to_chat)
    }

    async fn update_dot(
        &self,
        data: &crate::codec::Data,
        from: u32,
        gateway_numeric: u32,
        now_millis: i64,
        rx_time: u32,
    ) -> Result<(), String> {
        use crate::codec::PortPayload;

        let first_seen = match &data.payload {
            PortPayload::Position(p) if p.latitude_i != 0 && p.longitude_i != 0 => self
                .deduper
                .first_seen_position(from, p.latitude_i as f64 / 1e7, p.longitude_i as f64 / 1e7)
                .await
                .map_err(stringify)?,
            PortPayload::User(u) => self
                .deduper
                .first_seen_name(from, &u.long_name, &u.short_name)
                .await
                .map_err(stringify)?,
            _ => self
                .deduper
                .first_seen_tick(from, rx_time as i64)
                .await
                .map_err(stringify)?,
        };

        if first_seen {
            self.aggregator
                .update_from_portnum(data, from, gateway_numeric, now_millis)
                .await
                .map_err(stringify)?;
        }
        Ok(())
    }
}

fn is_allowed_topic(topic: &str) -> bool {
    ALLOWED_TOPIC_PREFIXES.iter().any(|prefix| topic.starts_with(prefix))
}

fn channel_for(topic: &str) -> Channel {
    Channel::for_topic(topic).unwrap_or(Channel::Main)
}

fn stringify<E: std::fmt::Display>(err: E) -> String {
    err.to_string()
}
