//! Settings type definitions.
//!
//! Field names are camelCase on the wire. Every section is
//! `#[serde(default)]`, so a settings file only needs the keys it changes.

use serde::{Deserialize, Serialize};

use crate::loader::qrdesk_home;

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "dispatch": { "queueCapacity": 64 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QrdeskSettings {
    /// HTTP / WebSocket listener.
    pub server: ServerSettings,
    /// Background print queue.
    pub dispatch: DispatchSettings,
    /// QR rendering.
    pub qr: QrSettings,
    /// Scan database and uploaded images.
    pub storage: StorageSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Network settings for the HTTP and printer WebSocket listener.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Outbound frames buffered per printer connection before sends fail.
    pub max_send_queue: usize,
    /// Seconds between WebSocket pings to printer agents.
    pub heartbeat_interval_secs: u64,
    /// Prefix for every API route.
    pub api_prefix: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_send_queue: 64,
            heartbeat_interval_secs: 30,
            api_prefix: "/api/v1".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Jobs waiting for the background dispatcher before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QrSettings {
    /// Pixels per QR module.
    pub module_size: u32,
    /// Quiet-zone width in modules.
    pub border: u32,
}

impl Default for QrSettings {
    fn default() -> Self {
        Self {
            module_size: 10,
            border: 4,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// SQLite file holding scan records.
    pub database_path: String,
    /// Directory for images uploaded through scan-from-image.
    pub upload_dir: String,
    /// Largest accepted decoded upload, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: qrdesk_home()
                .join("database")
                .join("qrdesk.db")
                .to_string_lossy()
                .into_owned(),
            upload_dir: "static/uploads".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`..`error`). `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
