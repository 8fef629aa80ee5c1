//! Redis-backed [`Store`] implementation, built on [`redis::aio::ConnectionManager`]
//! so a single cloneable, auto-reconnecting handle is shared across workers
//! and the query surface (§4.4.1).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{Dot, PortnumRecord, Store, StoreError};

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(endpoint: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(endpoint)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn portnum_key(portnum_name: &str, device_id: u32) -> String {
        format!("{portnum_name}:{device_id}")
    }

    fn dot_key(device_id: u32) -> String {
        format!("dots:{device_id}")
    }

    const ACTIVE_SET_KEY: &'static str = "devices:active";
}

#[async_trait]
impl Store for RedisStore {
    async fn append_portnum(
        &self,
        portnum_name: &str,
        device_id: u32,
        record: PortnumRecord,
        max_entries: usize,
    ) -> Result<(), StoreError> {
        let key = Self::portnum_key(portnum_name, device_id);
        let encoded = serde_json::to_string(&record)?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(&key, encoded).await?;
        if max_entries > 0 {
            let _: () = conn.ltrim(&key, -(max_entries as isize), -1).await?;
        }
        Ok(())
    }

    async fn get_portnum(
        &self,
        portnum_name: &str,
        device_id: u32,
        limit: usize,
    ) -> Result<Vec<PortnumRecord>, StoreError> {
        let key = Self::portnum_key(portnum_name, device_id);
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(&key, 0, -1).await?;
        let mut records: Vec<PortnumRecord> = raw
            .iter()
            .filter_map(|s| serde_json::from_str(s).ok())
            .collect();
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    async fn list_portnums(&self, portnum_name: &str) -> Result<Vec<u32>, StoreError> {
        let pattern = format!("{portnum_name}:*");
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(&pattern).await?;
        let prefix_len = portnum_name.len() + 1;
        Ok(keys
            .iter()
            .filter_map(|k| k.get(prefix_len..).and_then(|id| id.parse().ok()))
            .collect())
    }

    async fn upsert_dot(&self, device_id: u32, partial: Dot) -> Result<(), StoreError> {
        let key = Self::dot_key(device_id);
        let existing = self.read_dot(device_id).await?.unwrap_or_default();
        let merged = existing.merge(&partial);

        let mut conn = self.conn.clone();
        if merged.is_valid() {
            let fields = merged.to_hash_fields();
            let _: () = conn.del(&key).await?;
            if !fields.is_empty() {
                let _: () = conn.hset_multiple(&key, &fields).await?;
            }
            let _: () = conn.sadd(Self::ACTIVE_SET_KEY, device_id).await?;
        } else {
            let _: () = conn.del(&key).await?;
            let _: () = conn.srem(Self::ACTIVE_SET_KEY, device_id).await?;
        }
        Ok(())
    }

    async fn read_dot(&self, device_id: u32) -> Result<Option<Dot>, StoreError> {
        let key = Self::dot_key(device_id);
        let mut conn = self.conn.clone();
        let fields: std::collections::HashMap<String, String> = conn.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(Dot::from_hash_fields(&fields)))
    }

    async fn set_active_device(&self, device_id: u32) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(Self::ACTIVE_SET_KEY, device_id).await?;
        Ok(())
    }

    async fn clear_active_device(&self, device_id: u32) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.srem(Self::ACTIVE_SET_KEY, device_id).await?;
        Ok(())
    }

    async fn is_active_device(&self, device_id: u32) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let result: bool = conn.sismember(Self::ACTIVE_SET_KEY, device_id).await?;
        Ok(result)
    }

    async fn mark_seen(&self, key: &str, ttl_seconds: u64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    async fn delete_device(&self, device_id: u32, portnum_names: &[&str]) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let mut deleted = 0u64;

        for portnum_name in portnum_names {
            let key = Self::portnum_key(portnum_name, device_id);
            deleted += conn.del::<_, u64>(&key).await?;
        }

        deleted += conn.del::<_, u64>(Self::dot_key(device_id)).await?;
        deleted += conn.srem::<_, _, u64>(Self::ACTIVE_SET_KEY, device_id).await?;

        Ok(deleted)
    }
}

impl Dot {
    fn to_hash_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        if let Some(v) = &self.long_name {
            fields.push(("longName", v.clone()));
        }
        if let Some(v) = &self.short_name {
            fields.push(("shortName", v.clone()));
        }
        if let Some(v) = self.longitude {
            fields.push(("longitude", v.to_string()));
        }
        if let Some(v) = self.latitude {
            fields.push(("latitude", v.to_string()));
        }
        if let Some(v) = &self.mqtt {
            fields.push(("mqtt", v.clone()));
        }
        if let Some(v) = self.s_time {
            fields.push(("s_time", v.to_string()));
        }
        fields
    }

    fn from_hash_fields(fields: &std::collections::HashMap<String, String>) -> Dot {
        Dot {
            long_name: fields.get("longName").cloned(),
            short_name: fields.get("shortName").cloned(),
            longitude: fields.get("longitude").and_then(|v| v.parse().ok()),
            latitude: fields.get("latitude").and_then(|v| v.parse().ok()),
            mqtt: fields.get("mqtt").cloned(),
            s_time: fields.get("s_time").and_then(|v| v.parse().ok()),
        }
    }
}
