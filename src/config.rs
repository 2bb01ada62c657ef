use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sync::WorkerConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Off silences the per-operation ledger events, keeping warnings
    #[serde(default = "default_true")]
    pub enable_tracing: bool,
    /// PostgreSQL connection URL. `DATABASE_URL` takes precedence.
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub peers: PeersConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Create missing tables on startup
    pub ensure_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 50,
            acquire_timeout_secs: 5,
            ensure_schema: true,
        }
    }
}

/// Background sweep settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    pub enabled: bool,
    pub scan_interval_secs: u64,
    pub max_attempts: i32,
    pub batch_size: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: 30,
            max_attempts: 5,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeersConfig {
    /// Counter at which a peer is promoted to trusted. 0 disables promotion.
    pub auto_trust_threshold: i64,
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            auto_trust_threshold: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetentionConfig {
    /// Terminal sync logs older than this are purged. 0 keeps them forever.
    pub sync_log_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { sync_log_days: 30 }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))?;
        config.apply_database_url(std::env::var("DATABASE_URL").ok());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// A non-empty `url` replaces the configured connection URL
    pub fn apply_database_url(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.postgres_url = Some(url);
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            scan_interval: Duration::from_secs(self.sync.scan_interval_secs.max(1)),
            max_attempts: self.sync.max_attempts,
            batch_size: self.sync.batch_size,
            auto_trust_threshold: (self.peers.auto_trust_threshold > 0)
                .then_some(self.peers.auto_trust_threshold),
            retention_days: (self.retention.sync_log_days > 0)
                .then_some(self.retention.sync_log_days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: payon.log
use_json: false
rotation: daily
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert!(config.enable_tracing);
        assert_eq!(config.postgres_url, None);
        assert_eq!(config.database.max_connections, 50);
        assert!(config.sync.enabled);
        assert_eq!(config.peers.auto_trust_threshold, 10);

        let worker = config.worker_config();
        assert_eq!(worker.scan_interval, Duration::from_secs(30));
        assert_eq!(worker.max_attempts, 5);
        assert_eq!(worker.auto_trust_threshold, Some(10));
        assert_eq!(worker.retention_days, Some(30));
    }

    #[test]
    fn test_zero_disables_sweep_steps() {
        let yaml = format!(
            "{MINIMAL}peers:\n  auto_trust_threshold: 0\nretention:\n  sync_log_days: 0\n"
        );
        let worker = AppConfig::from_yaml(&yaml).unwrap().worker_config();
        assert_eq!(worker.auto_trust_threshold, None);
        assert_eq!(worker.retention_days, None);
    }

    #[test]
    fn test_database_url_override() {
        let yaml = format!("{MINIMAL}postgres_url: postgres://file/db\n");
        let mut config = AppConfig::from_yaml(&yaml).unwrap();

        config.apply_database_url(Some("  ".to_string()));
        assert_eq!(config.postgres_url.as_deref(), Some("postgres://file/db"));

        config.apply_database_url(Some("postgres://env/db".to_string()));
        assert_eq!(config.postgres_url.as_deref(), Some("postgres://env/db"));
    }

    #[test]
    fn test_missing_required_field() {
        assert!(AppConfig::from_yaml("log_level: info\n").is_err());
    }

    #[test]
    fn test_shipped_dev_config_parses() {
        let content = std::fs::read_to_string("config/dev.yaml").unwrap();
        let config = AppConfig::from_yaml(&content).unwrap();
        assert!(config.postgres_url.is_some());
    }
}
