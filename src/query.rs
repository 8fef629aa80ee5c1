//! # Query
//!
//! Read-only facade over the [`Store`] for the handful of lookups the rest
//! of the system (and any outer HTTP layer, out of scope here) needs.
//! Deliberately thin: no framework, no caching, just the Store contract
//! (§4.8).

use std::sync::Arc;

use crate::store::{Dot, PortnumRecord, Store, StoreError};

pub struct Query {
    store: Arc<dyn Store>,
}

impl Query {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get_portnum(
        &self,
        portnum_name: &str,
        device_id: u32,
        limit: usize,
    ) -> Result<Vec<PortnumRecord>, StoreError> {
        self.store.get_portnum(portnum_name, device_id, limit).await
    }

    pub async fn list_portnums(&self, portnum_name: &str) -> Result<Vec<u32>, StoreError> {
        self.store.list_portnums(portnum_name).await
    }

    pub async fn read_dot(&self, device_id: u32) -> Result<Option<Dot>, StoreError> {
        self.store.read_dot(device_id).await
    }

    pub async fn is_active(&self, device_id: u32) -> Result<bool, StoreError> {
        self.store.is_active_device(device_id).await
    }
}
