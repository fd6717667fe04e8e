//! Settings types.
//!
//! Every struct uses `#[serde(default)]` so a partial JSON file only needs the
//! keys it changes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use easyws_core::AuthPolicy;
use serde::{Deserialize, Serialize};

/// Default inbound message size limit (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 << 20;

/// Default capacity of each event bridge queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Root settings object, mirroring `~/.easyws/settings.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EasyWsSettings {
    /// Logging output.
    pub log: LogSettings,
    /// Event bridge queue capacities.
    pub queues: QueueSettings,
    /// Listener-side settings.
    pub server: ServerSettings,
    /// Dialer-side settings.
    pub client: ClientSettings,
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}

/// Capacities of the two bridge queues.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueSettings {
    /// Inbound message queue capacity.
    pub message_capacity: usize,
    /// Lifecycle event queue capacity.
    pub event_capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            message_capacity: DEFAULT_QUEUE_CAPACITY,
            event_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Only upgrade requests on the endpoint path.
    pub path_routing: bool,
    /// Required handshake headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthPolicy>,
    /// Inbound message size limit in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            path_routing: true,
            auth: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Dialer settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Accept any server certificate.
    pub skip_verify: bool,
    /// Validate the chain but ignore a hostname mismatch.
    pub skip_hostname_check: bool,
    /// PEM files added to the trust store.
    pub root_ca_paths: Vec<PathBuf>,
    /// Extra headers sent with the upgrade request.
    pub headers: BTreeMap<String, String>,
    /// Inbound message size limit in bytes.
    pub max_message_size: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            skip_verify: false,
            skip_hostname_check: false,
            root_ca_paths: Vec::new(),
            headers: BTreeMap::new(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
