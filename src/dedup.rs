//! # Deduper
//!
//! Short-window suppression of identical packets seen via multiple gateways
//! (§4.5). Gates both the Store-level append and the Dot-level upsert with a
//! TTL marker rather than an in-process set — horizontally safe, survives
//! restarts.

use std::sync::Arc;

use crate::store::{Store, StoreError};

pub struct Deduper {
    store: Arc<dyn Store>,
    window_seconds: u64,
}

impl Deduper {
    pub fn new(store: Arc<dyn Store>, window_seconds: u64) -> Self {
        Self { store, window_seconds }
    }

    /// Gates `AppendPortnum` (§4.5 rule 1). Returns `true` iff this call is
    /// the first observation of `(from, portnum, rx_time)` within the
    /// window — i.e. the caller should proceed to append.
    pub async fn first_seen_portnum(&self, from: u32, portnum: u32, rx_time: u32) -> Result<bool, StoreError> {
        let key = format!("portnum:{from}:{portnum}:{rx_time}");
        self.store.mark_seen(&key, self.window_seconds).await
    }

    /// Gates a coordinate-driven Dot upsert (§4.5 rule 2). Coordinates are
    /// rounded to six decimal digits before keying, matching the spec's
    /// `round(lat*1e6)` scheme.
    pub async fn first_seen_position(&self, from: u32, latitude: f64, longitude: f64) -> Result<bool, StoreError> {
        let lat_key = (latitude * 1e6).round() as i64;
        let lon_key = (longitude * 1e6).round() as i64;
        let key = format!("dot:{from}:pos:{lat_key}:{lon_key}");
        self.store.mark_seen(&key, self.window_seconds).await
    }

    /// Gates a name-driven Dot upsert (§4.5 rule 2).
    pub async fn first_seen_name(&self, from: u32, long_name: &str, short_name: &str) -> Result<bool, StoreError> {
        let key = format!("dot:{from}:name:{long_name}:{short_name}");
        self.store.mark_seen(&key, self.window_seconds).await
    }

    /// Gates a bare activity-tick Dot upsert (§4.5 rule 2). `unix_seconds`
    /// should be supplied by the caller, not read from a global clock here.
    pub async fn first_seen_tick(&self, from: u32, unix_seconds: i64) -> Result<bool, StoreError> {
        let key = format!("dot:{from}:time:{unix_seconds}");
        self.store.mark_seen(&key, self.window_seconds).await
    }
}
