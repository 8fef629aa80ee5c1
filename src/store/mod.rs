//! # Store
//!
//! Typed writes and reads over a key-value backend (§4.4): bounded-history
//! lists, a per-device hash ("Dot"), a set index of active devices, and
//! dedup markers with TTL.
//!
//! [`Store`] is a trait rather than a concrete type so workers, the query
//! facade, and tests all depend on the same narrow surface; [`RedisStore`]
//! is the production implementation and [`memory::MemoryStore`] is an
//! in-process fake for tests, mirroring the base crate's handle/mock split.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One appended record in a `{PortnumName}:{deviceId}` list (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortnumRecord {
    pub timestamp: i64,
    pub from: u32,
    pub to: u32,
    pub rx_time: u32,
    pub rx_snr: f32,
    pub rx_rssi: i32,
    pub hop_limit: u32,
    pub gateway_id: String,
    pub broker: String,
    pub raw_data: serde_json::Value,
}

/// Per-device observable state (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Dot {
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub mqtt: Option<String>,
    pub s_time: Option<i64>,
}

impl Dot {
    /// A Dot is valid iff it has non-zero coordinates or a non-empty name
    /// (§3). Invalid Dots must not be persisted.
    pub fn is_valid(&self) -> bool {
        let has_coords = matches!((self.longitude, self.latitude), (Some(lon), Some(lat)) if lon != 0.0 && lat != 0.0);
        let has_name = self
            .long_name
            .as_deref()
            .map(|s| !s.is_empty())
            .unwrap_or(false)
            || self
                .short_name
                .as_deref()
                .map(|s| !s.is_empty())
                .unwrap_or(false);
        has_coords || has_name
    }

    /// Merges `partial` fields over `self`, leaving unset fields untouched.
    pub fn merge(&self, partial: &Dot) -> Dot {
        Dot {
            long_name: partial.long_name.clone().or_else(|| self.long_name.clone()),
            short_name: partial.short_name.clone().or_else(|| self.short_name.clone()),
            longitude: partial.longitude.or(self.longitude),
            latitude: partial.latitude.or(self.latitude),
            mqtt: partial.mqtt.clone().or_else(|| self.mqtt.clone()),
            s_time: partial.s_time.or(self.s_time),
        }
    }
}

/// Typed KV-backend contract (§4.4). Every method corresponds to one spec
/// operation; none leak Redis-specific types into callers.
#[async_trait]
pub trait Store: Send + Sync {
    async fn append_portnum(
        &self,
        portnum_name: &str,
        device_id: u32,
        record: PortnumRecord,
        max_entries: usize,
    ) -> Result<(), StoreError>;

    async fn get_portnum(
        &self,
        portnum_name: &str,
        device_id: u32,
        limit: usize,
    ) -> Result<Vec<PortnumRecord>, StoreError>;

    async fn list_portnums(&self, portnum_name: &str) -> Result<Vec<u32>, StoreError>;

    /// Read-merge-write on the device's Dot. Also maintains the
    /// `devices:active` invariant: the set contains exactly the device ids
    /// with a currently-valid Dot, so this adds `device_id` to the active
    /// set when the merged Dot is valid and removes it otherwise.
    async fn upsert_dot(&self, device_id: u32, partial: Dot) -> Result<(), StoreError>;

    async fn read_dot(&self, device_id: u32) -> Result<Option<Dot>, StoreError>;

    async fn set_active_device(&self, device_id: u32) -> Result<(), StoreError>;

    async fn clear_active_device(&self, device_id: u32) -> Result<(), StoreError>;

    async fn is_active_device(&self, device_id: u32) -> Result<bool, StoreError>;

    /// Atomic set-if-absent with TTL. Returns `true` iff this call created
    /// the key (i.e. the caller won the race).
    async fn mark_seen(&self, key: &str, ttl_seconds: u64) -> Result<bool, StoreError>;

    /// Removes every port list, the Dot hash, and the active-set membership
    /// for `device_id`. Returns the number of keys deleted.
    async fn delete_device(&self, device_id: u32, portnum_names: &[&str]) -> Result<u64, StoreError>;
}
