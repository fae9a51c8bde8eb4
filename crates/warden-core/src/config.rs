//! Configuration types for the Warden server.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level server configuration, loaded from TOML.
///
/// Every section is optional in the file; missing sections and fields take
/// their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Registry database settings.
    pub storage: StorageConfig,

    /// Server key pair settings.
    pub keys: KeyConfig,

    /// Ingestion cycle limits.
    pub ingest: IngestConfig,

    /// HTTP listener settings.
    pub server: ServerConfig,

    /// Outbound polling settings.
    pub refresh: RefreshConfig,

    /// Site health thresholds.
    pub health: HealthConfig,
}

impl WardenConfig {
    /// Overrides the registry database path.
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.db_path = path.into();
        self
    }

    /// Overrides the secret key path.
    pub fn with_secret_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.keys.secret_key_path = path.into();
        self
    }

    /// Overrides the replay window.
    pub fn with_freshness_window(mut self, secs: u64) -> Self {
        self.ingest.freshness_window_secs = secs;
        self
    }

    /// Overrides the registry call deadline.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.ingest.store_timeout_ms = duration_ms(timeout);
        self
    }

    /// Overrides the dashboard notification deadline.
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.ingest.notify_timeout_ms = duration_ms(timeout);
        self
    }

    /// Overrides the listen address.
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.server.listen_addr = addr;
        self
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Registry database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the sled database directory.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./warden.db"),
        }
    }
}

/// Server key pair settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Base64 X25519 secret key file. Generated on first start.
    pub secret_key_path: PathBuf,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            secret_key_path: PathBuf::from("./warden.key"),
        }
    }
}

/// Ingestion cycle limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Accepted clock skew in seconds, both directions, inclusive.
    pub freshness_window_secs: u64,

    /// Deadline for each registry call, in milliseconds.
    pub store_timeout_ms: u64,

    /// Deadline for the dashboard notification, in milliseconds.
    pub notify_timeout_ms: u64,
}

impl IngestConfig {
    /// Registry call deadline.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Notification deadline.
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            freshness_window_secs: 20,
            store_timeout_ms: 5_000,
            notify_timeout_ms: 1_000,
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub listen_addr: SocketAddr,

    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_body_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// Outbound polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Path appended to a site URL to request its report.
    pub report_path: String,
}

impl RefreshConfig {
    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            report_path: "/admin/reports/warden".to_string(),
        }
    }
}

/// Site health thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds without contact before a site counts as not updated recently.
    pub stale_after_secs: u64,
}

impl HealthConfig {
    /// Staleness threshold as a chrono duration.
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.stale_after_secs).unwrap_or(i64::MAX))
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 24 * 60 * 60,
        }
    }
}
