//! Configuration for dcrawl.
//!
//! Loaded from a TOML file when present; every field has a default matching
//! the documented ports and timings, so running without a config file works.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Worker-facing protocol listener.
    pub listen_addr: String,
    /// HTTP control API listener.
    pub http_listen_addr: String,
    /// Dashboard page served by `GET /`.
    pub frontend_path: PathBuf,
    /// Where collected books are persisted on shutdown.
    pub books_csv: PathBuf,
    /// Where collected items are persisted on shutdown.
    pub items_csv: PathBuf,
    /// Initial seed URL.
    pub seed_url: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9000".to_string(),
            http_listen_addr: "0.0.0.0:9001".to_string(),
            frontend_path: PathBuf::from("frontend.html"),
            books_csv: PathBuf::from("books.csv"),
            items_csv: PathBuf::from("items.csv"),
            seed_url: "https://books.toscrape.com/".to_string(),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Coordinator address.
    pub server: String,
    /// Coordinator protocol port.
    pub port: u16,
    /// Hostname of the site being crawled.
    pub hostname: String,
    /// Hard per-page fetch timeout; exceeding it forces a reconnect.
    pub fetch_timeout_secs: u64,
    /// Timeout waiting for an ACK to PROCESSED/LINKS.
    pub ack_timeout_secs: u64,
    /// Delay before reconnecting after a lost connection.
    pub reconnect_delay_secs: u64,
    /// Progress heartbeat interval.
    pub heartbeat_interval_secs: u64,
    /// User agent sent with page fetches.
    pub user_agent: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1".to_string(),
            port: 9000,
            hostname: "books.toscrape.com".to_string(),
            fetch_timeout_secs: 60,
            ack_timeout_secs: 30,
            reconnect_delay_secs: 5,
            heartbeat_interval_secs: 2,
            user_agent: format!("dcrawl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("failed to read config file '{}': {}", path.display(), e)
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("failed to parse config file '{}': {}", path.display(), e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all fields, collecting every error into one report.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        for (label, addr) in [
            ("coordinator.listen_addr", &self.coordinator.listen_addr),
            (
                "coordinator.http_listen_addr",
                &self.coordinator.http_listen_addr,
            ),
        ] {
            if addr.parse::<std::net::SocketAddr>().is_err() {
                errors.push(format!("{label} is not a valid socket address: {addr}"));
            }
        }

        if !self.coordinator.seed_url.starts_with("http://")
            && !self.coordinator.seed_url.starts_with("https://")
        {
            errors.push("coordinator.seed_url must be an absolute http(s) URL".to_string());
        }

        if self.worker.port == 0 {
            errors.push("worker.port must be nonzero".to_string());
        }
        if self.worker.hostname.trim().is_empty() {
            errors.push("worker.hostname must not be empty".to_string());
        }
        if self.worker.fetch_timeout_secs == 0 {
            errors.push("worker.fetch_timeout_secs must be positive".to_string());
        }
        if self.worker.ack_timeout_secs == 0 {
            errors.push("worker.ack_timeout_secs must be positive".to_string());
        }
        if self.worker.heartbeat_interval_secs == 0 {
            errors.push("worker.heartbeat_interval_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn default_ports() {
        let config = Config::default();
        assert_eq!(config.coordinator.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.coordinator.http_listen_addr, "0.0.0.0:9001");
        assert_eq!(config.worker.port, 9000);
        assert_eq!(config.worker.server, "127.0.0.1");
        assert_eq!(config.worker.hostname, "books.toscrape.com");
    }

    #[test]
    fn validate_rejects_bad_listen_addr() {
        let mut config = Config::default();
        config.coordinator.listen_addr = "not-an-address".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("coordinator.listen_addr"));
    }

    #[test]
    fn validate_rejects_relative_seed() {
        let mut config = Config::default();
        config.coordinator.seed_url = "books.toscrape.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut config = Config::default();
        config.worker.port = 0;
        config.worker.hostname = String::new();
        config.worker.fetch_timeout_secs = 0;
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("worker.port"));
        assert!(message.contains("worker.hostname"));
        assert!(message.contains("worker.fetch_timeout_secs"));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [worker]
            server = "10.0.0.5"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.worker.server, "10.0.0.5");
        assert_eq!(parsed.worker.port, 9000);
        assert_eq!(parsed.coordinator.listen_addr, "0.0.0.0:9000");
    }
}
