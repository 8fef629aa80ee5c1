//! # GroupBuffer
//!
//! Time-bounded buffer that coalesces the same logical message (by packet
//! `id`) received via N gateways into one [`Notifier`] call (§3, §4). Each
//! [`MessageGroup`] is owned exclusively by the buffer until it flushes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::warn;

use crate::config::Channel;
use crate::notifier::{GatewayObservation, Notifier};

/// One gateway's observation of a grouped message.
#[derive(Debug, Clone)]
pub struct GatewayReport {
    pub hop_limit: u32,
    pub rx_rssi: i32,
    pub rx_snr: f32,
    pub broker: String,
}

/// A message in the process of being coalesced across gateways.
struct MessageGroup {
    text: String,
    channel: Channel,
    gateways: HashMap<String, GatewayReport>,
    deadline: Instant,
}

/// Coalesces identical broadcast text messages observed by multiple
/// gateways within `group_window` of each other into a single notification.
pub struct GroupBuffer {
    groups: Mutex<HashMap<u32, MessageGroup>>,
    group_window: Duration,
    notifier: Arc<dyn Notifier>,
}

impl GroupBuffer {
    pub fn new(notifier: Arc<dyn Notifier>, group_window: Duration) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            group_window,
            notifier,
        }
    }

    /// Records one gateway's observation of message `id`. Creates the group
    /// on first observation; membership is deduplicated by `gateway_id`
    /// (§3).
    pub async fn observe(&self, id: u32, text: &str, channel: Channel, gateway_id: &str, report: GatewayReport) {
        let mut groups = self.groups.lock().await;
        let group = groups.entry(id).or_insert_with(|| MessageGroup {
            text: text.to_string(),
            channel,
            gateways: HashMap::new(),
            deadline: Instant::now() + self.group_window,
        });
        group.gateways.insert(gateway_id.to_string(), report);
        group.deadline = Instant::now() + self.group_window;
    }

    /// Flushes every group whose deadline has passed, invoking the Notifier
    /// once per group. Intended to be polled by a periodic task.
    pub async fn flush_expired(&self) {
        let now = Instant::now();
        let ready: Vec<u32> = {
            let groups = self.groups.lock().await;
            groups
                .iter()
                .filter(|(_, g)| g.deadline <= now)
                .map(|(id, _)| *id)
                .collect()
        };

        for id in ready {
            let group = {
                let mut groups = self.groups.lock().await;
                groups.remove(&id)
            };
            if let Some(group) = group {
                let observations: Vec<GatewayObservation> = group
                    .gateways
                    .into_iter()
                    .map(|(gateway_id, report)| GatewayObservation {
                        gateway_id,
                        hop_limit: report.hop_limit,
                        rx_rssi: report.rx_rssi,
                        rx_snr: report.rx_snr,
                        broker: report.broker,
                    })
                    .collect();

                if let Err(e) = self.notifier.notify(id, &group.text, group.channel, observations).await {
                    warn!(id, error = %e, "group flush failed, dropping group");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::LoggingNotifier;

    fn sample_report() -> GatewayReport {
        GatewayReport {
            hop_limit: 3,
            rx_rssi: -90,
            rx_snr: 6.5,
            broker: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn flush_before_deadline_does_nothing() {
        let notifier = Arc::new(LoggingNotifier::new());
        let buffer = GroupBuffer::new(notifier.clone(), Duration::from_secs(8));
        buffer
            .observe(42, "hello", Channel::Main, "!gwA", sample_report())
            .await;
        buffer.flush_expired().await;
        assert_eq!(notifier.call_count(), 0);
    }

    #[tokio::test]
    async fn two_gateways_produce_one_notification_with_both() {
        let notifier = Arc::new(LoggingNotifier::new());
        let buffer = GroupBuffer::new(notifier.clone(), Duration::from_millis(20));
        buffer
            .observe(42, "hello", Channel::Main, "!gwA", sample_report())
            .await;
        buffer
            .observe(42, "hello", Channel::Main, "!gwB", sample_report())
            .await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        buffer.flush_expired().await;

        assert_eq!(notifier.call_count(), 1);
        let last = notifier.last_observations().unwrap();
        assert_eq!(last.len(), 2);
    }

    #[tokio::test]
    async fn repeated_observation_from_same_gateway_does_not_duplicate_membership() {
        let notifier = Arc::new(LoggingNotifier::new());
        let buffer = GroupBuffer::new(notifier.clone(), Duration::from_millis(20));
        buffer
            .observe(42, "hello", Channel::Main, "!gwA", sample_report())
            .await;
        buffer
            .observe(42, "hello", Channel::Main, "!gwA", sample_report())
            .await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        buffer.flush_expired().await;

        let last = notifier.last_observations().unwrap();
        assert_eq!(last.len(), 1);
    }
}
