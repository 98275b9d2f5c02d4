use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub gpc: GpcConfig,
    #[serde(default)]
    pub mhs: MhsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.transfer.large_attachment_threshold <= 4 {
            return Err("transfer.large_attachment_threshold must be > 4 bytes".into());
        }
        if self.transfer.ack_timeout_secs == 0 {
            return Err("transfer.ack_timeout_secs must be > 0".into());
        }
        if self.transfer.reconcile_interval_secs == 0 {
            return Err("transfer.reconcile_interval_secs must be > 0".into());
        }
        if self.transfer.worker_count == 0 {
            return Err("transfer.worker_count must be > 0".into());
        }
        if self.gpc.base_url.is_empty() {
            return Err("gpc.base_url must not be empty".into());
        }
        if self.mhs.base_url.is_empty() {
            return Err("mhs.base_url must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Attachment payloads above this many bytes are chunked before sending.
    #[serde(default = "default_large_attachment_threshold")]
    pub large_attachment_threshold: usize,
    /// How long to wait for the counterpart's acknowledgement of the core
    /// extract before the reconciler closes the conversation.
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Concurrent task consumer workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            large_attachment_threshold: default_large_attachment_threshold(),
            ack_timeout_secs: default_ack_timeout_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            worker_count: default_worker_count(),
        }
    }
}

/// Upstream clinical-record provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpcConfig {
    #[serde(default = "default_gpc_base_url")]
    pub base_url: String,
}

impl Default for GpcConfig {
    fn default() -> Self {
        Self {
            base_url: default_gpc_base_url(),
        }
    }
}

/// Outbound messaging transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MhsConfig {
    #[serde(default = "default_mhs_base_url")]
    pub base_url: String,
}

impl Default for MhsConfig {
    fn default() -> Self {
        Self {
            base_url: default_mhs_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Days before a resolved conversation is eligible for cleanup by the
    /// backing store's TTL policy.
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".into()
}

fn default_large_attachment_threshold() -> usize {
    4_500_000
}

fn default_ack_timeout_secs() -> u64 {
    // Eight days, the protocol's acknowledgement window.
    8 * 24 * 60 * 60
}

fn default_reconcile_interval_secs() -> u64 {
    6 * 60 * 60
}

fn default_worker_count() -> usize {
    4
}

fn default_gpc_base_url() -> String {
    "http://localhost:8090".into()
}

fn default_mhs_base_url() -> String {
    "http://localhost:8081".into()
}

fn default_ttl_days() -> u32 {
    90
}

pub mod loader {
    use std::path::PathBuf;

    use config::{Config, Environment, File};

    use super::AppConfig;

    /// Loads `ehrflow.toml` (or the given path) merged with `EHRFLOW__*`
    /// environment overrides, e.g. `EHRFLOW__SERVER__PORT=9090`.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or("ehrflow.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        builder = builder.add_source(
            Environment::with_prefix("EHRFLOW")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
