//! # Configuration
//!
//! A single immutable [`Config`] is built once at startup from built-in
//! defaults, an optional TOML file, and `INGEST_`-prefixed environment
//! variable overrides, in that order. The loaded value is meant to be
//! wrapped in an `Arc<Config>` by the binary entry point and cloned cheaply
//! into every component, rather than re-read per call (§6.5.1 / §9).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// One configured MQTT broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub forward_to_chat: bool,
}

/// Channel selected by topic prefix, per §6.5's `ChannelByPrefix`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Channel {
    Main,
    Kaliningrad,
    Ufa,
}

impl Channel {
    /// Selects a channel from a topic, per §4.7: `msh/kgd/` → Kaliningrad,
    /// `msh/ufa/` → Ufa, any other allowed prefix → Main.
    pub fn for_topic(topic: &str) -> Option<Self> {
        if topic.starts_with("msh/kgd/") {
            Some(Channel::Kaliningrad)
        } else if topic.starts_with("msh/ufa/") {
            Some(Channel::Ufa)
        } else if topic.starts_with("msh/msk/") {
            Some(Channel::Main)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub brokers: Vec<BrokerConfig>,
    pub kv_endpoint: String,
    #[serde(default)]
    pub kv_credentials: Option<String>,

    #[serde(default = "default_max_portnum_messages")]
    pub max_portnum_messages: usize,
    #[serde(default = "default_max_packet_bytes")]
    pub max_packet_bytes: usize,
    #[serde(with = "duration_secs", default = "default_dedup_window")]
    pub dedup_window: Duration,
    #[serde(with = "duration_secs", default = "default_group_window")]
    pub group_window: Duration,
    #[serde(with = "duration_secs", default = "default_processed_messages_clear")]
    pub processed_messages_clear: Duration,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default)]
    pub admin_shared_secret: String,

    /// Base64-encoded AES keys tried in order during decryption (§6.4).
    #[serde(default = "default_decryption_keys")]
    pub decryption_keys: Vec<String>,
}

mod duration_secs {
    use std::time::Duration;

    pub fn serialize<S: serde::Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }

    use serde::Deserialize;
}

fn default_max_portnum_messages() -> usize {
    constants::MAX_PORTNUM_MESSAGES
}
fn default_max_packet_bytes() -> usize {
    constants::MAX_PACKET_BYTES
}
fn default_dedup_window() -> Duration {
    constants::DEDUP_WINDOW
}
fn default_group_window() -> Duration {
    constants::GROUP_WINDOW
}
fn default_processed_messages_clear() -> Duration {
    constants::PROCESSED_MESSAGES_TTL
}
fn default_worker_concurrency() -> usize {
    constants::WORKER_CONCURRENCY
}

/// Defaults per §6.4: the well-known Meshtastic "default" key and the
/// empty-key ("AQ==") form.
fn default_decryption_keys() -> Vec<String> {
    vec![
        "1PG7OiApB1nwvP+rz05pAQ==".to_string(),
        "AQ==".to_string(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Config {
            brokers: Vec::new(),
            kv_endpoint: "redis://127.0.0.1:6379".to_string(),
            kv_credentials: None,
            max_portnum_messages: default_max_portnum_messages(),
            max_packet_bytes: default_max_packet_bytes(),
            dedup_window: default_dedup_window(),
            group_window: default_group_window(),
            processed_messages_clear: default_processed_messages_clear(),
            worker_concurrency: default_worker_concurrency(),
            admin_shared_secret: String::new(),
            decryption_keys: default_decryption_keys(),
        }
    }
}

impl Config {
    /// Loads defaults, overlays an optional TOML file, then overlays
    /// `INGEST_`-prefixed environment variables.
    pub fn load(file_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(path) = file_path {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        }

        config.apply_env_overrides(&std::env::vars().collect());
        Ok(config)
    }

    fn apply_env_overrides(&mut self, env: &HashMap<String, String>) {
        if let Some(v) = env.get("INGEST_KV_ENDPOINT") {
            self.kv_endpoint = v.clone();
        }
        if let Some(v) = env.get("INGEST_KV_CREDENTIALS") {
            self.kv_credentials = Some(v.clone());
        }
        if let Some(v) = env.get("INGEST_ADMIN_SHARED_SECRET") {
            self.admin_shared_secret = v.clone();
        }
        if let Some(v) = env.get("INGEST_WORKER_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.worker_concurrency = n;
            }
        }
        if let Some(v) = env.get("INGEST_MAX_PORTNUM_MESSAGES") {
            if let Ok(n) = v.parse() {
                self.max_portnum_messages = n;
            }
        }
    }
}
