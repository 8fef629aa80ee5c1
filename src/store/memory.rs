//! In-process [`Store`] fake for tests, mirroring the base crate's
//! mock-handle pattern (`WMBusHandleFactory::create_mock`): no network I/O,
//! same trait surface, same semantics for list trimming and TTL.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{Dot, PortnumRecord, Store, StoreError};

#[derive(Default)]
struct State {
    lists: HashMap<String, Vec<PortnumRecord>>,
    dots: HashMap<u32, Dot>,
    active: HashSet<u32>,
    seen: HashMap<String, Instant>,
}

/// An in-memory [`Store`] for unit and integration tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn portnum_key(portnum_name: &str, device_id: u32) -> String {
    format!("{portnum_name}:{device_id}")
}

#[async_trait]
impl Store for MemoryStore {
    async fn append_portnum(
        &self,
        portnum_name: &str,
        device_id: u32,
        record: PortnumRecord,
        max_entries: usize,
    ) -> Result<(), StoreError> {
        let key = portnum_key(portnum_name, device_id);
        let mut state = self.state.lock().unwrap();
        let list = state.lists.entry(key).or_default();
        list.push(record);
        if max_entries > 0 && list.len() > max_entries {
            let overflow = list.len() - max_entries;
            list.drain(0..overflow);
        }
        Ok(())
    }

    async fn get_portnum(
        &self,
        portnum_name: &str,
        device_id: u32,
        limit: usize,
    ) -> Result<Vec<PortnumRecord>, StoreError> {
        let key = portnum_key(portnum_name, device_id);
        let state = self.state.lock().unwrap();
        let mut records = state.lists.get(&key).cloned().unwrap_or_default();
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    async fn list_portnums(&self, portnum_name: &str) -> Result<Vec<u32>, StoreError> {
        let prefix = format!("{portnum_name}:");
        let state = self.state.lock().unwrap();
        Ok(state
            .lists
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|id| id.parse().ok())
            .collect())
    }

    async fn upsert_dot(&self, device_id: u32, partial: Dot) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let existing = state.dots.get(&device_id).cloned().unwrap_or_default();
        let merged = existing.merge(&partial);
        if merged.is_valid() {
            state.dots.insert(device_id, merged);
            state.active.insert(device_id);
        } else {
            state.dots.remove(&device_id);
            state.active.remove(&device_id);
        }
        Ok(())
    }

    async fn read_dot(&self, device_id: u32) -> Result<Option<Dot>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.dots.get(&device_id).cloned())
    }

    async fn set_active_device(&self, device_id: u32) -> Result<(), StoreError> {
        self.state.lock().unwrap().active.insert(device_id);
        Ok(())
    }

    async fn clear_active_device(&self, device_id: u32) -> Result<(), StoreError> {
        self.state.lock().unwrap().active.remove(&device_id);
        Ok(())
    }

    async fn is_active_device(&self, device_id: u32) -> Result<bool, StoreError> {
        Ok(self.state.lock().unwrap().active.contains(&device_id))
    }

    async fn mark_seen(&self, key: &str, ttl_seconds: u64) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        state.seen.retain(|_, set_at| now.duration_since(*set_at) < Duration::from_secs(3600));

        if let Some(set_at) = state.seen.get(key) {
            if now.duration_since(*set_at) < Duration::from_secs(ttl_seconds) {
                return Ok(false);
            }
        }
        state.seen.insert(key.to_string(), now);
        Ok(true)
    }

    async fn delete_device(&self, device_id: u32, portnum_names: &[&str]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut deleted = 0u64;

        for portnum_name in portnum_names {
            let key = portnum_key(portnum_name, device_id);
            if state.lists.remove(&key).is_some() {
                deleted += 1;
            }
        }
        if state.dots.remove(&device_id).is_some() {
            deleted += 1;
        }
        if state.active.remove(&device_id) {
            deleted += 1;
        }

        Ok(deleted)
    }
}
