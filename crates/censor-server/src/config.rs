//! Server configuration

use censor_client::ClientConfig;
use censor_providers::{KeywordConfig, ManualConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CensorConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Pipeline, dedup, batch, and poller settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Local keyword provider; registered when present
    #[serde(default)]
    pub keyword: Option<KeywordConfig>,

    /// Human review queue; registered when present
    #[serde(default)]
    pub manual: Option<ManualConfig>,

    /// YAML overrides for per-business-type review requirements
    #[serde(default)]
    pub requirements_path: Option<String>,

    #[serde(default)]
    pub resilience: ResilienceConfig,
}

impl CensorConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &crate::Cli) -> anyhow::Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        if let Some(listen) = &cli.listen {
            config.server.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(primary) = &cli.primary {
            config.client.pipeline.primary = primary.clone();
        }
        if cli.json_logs {
            config.server.json_logs = true;
        }

        config.apply_defaults();
        Ok(config)
    }

    /// Fill in what a minimal file leaves open: with no providers configured
    /// an empty keyword provider is used, and it becomes the primary.
    pub fn apply_defaults(&mut self) {
        if self.keyword.is_none() && self.manual.is_none() {
            self.keyword = Some(KeywordConfig::default());
        }
        if self.client.pipeline.primary.is_empty() {
            if let Some(keyword) = &self.keyword {
                self.client.pipeline.primary = keyword.name.clone();
            }
        }
    }
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,

    /// Run the async task poller in the background
    #[serde(default = "default_true")]
    pub enable_poller: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            json_logs: false,
            enable_poller: true,
        }
    }
}

/// Retry and API call logging around every provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl ResilienceConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(self.max_retries)
            .with_delays(
                Duration::from_millis(self.initial_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )
            .with_jitter(self.jitter)
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    2 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_register_keyword_primary() {
        let mut config = CensorConfig::default();
        config.apply_defaults();
        assert_eq!(config.client.pipeline.primary, "keyword");
        assert!(config.keyword.is_some());
        assert_eq!(config.server.port, 8080);
        assert!(config.resilience.enabled);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  port: 9000
  enable_poller: false
client:
  pipeline:
    primary: keyword
  manual_provider: manual
keyword:
  rules:
    - keyword: spam
      label: ads
manual:
  timeout_secs: 60
resilience:
  max_retries: 1
  initial_delay_ms: 10
"#;
        let mut config: CensorConfig = serde_yaml::from_str(yaml).unwrap();
        config.apply_defaults();

        assert_eq!(config.server.port, 9000);
        assert!(!config.server.enable_poller);
        assert_eq!(config.client.manual_provider.as_deref(), Some("manual"));
        assert_eq!(config.keyword.as_ref().map(|k| k.rules.len()), Some(1));
        assert_eq!(config.manual.as_ref().map(|m| m.timeout_secs), Some(60));

        let retry = config.resilience.retry_config();
        assert_eq!(retry.max_retries, 1);
        assert_eq!(retry.initial_delay, Duration::from_millis(10));
        assert_eq!(retry.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_load_file_with_cli_overrides() {
        use clap::Parser;
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  listen: 127.0.0.1\n  port: 9000\nclient:\n  pipeline:\n    primary: keyword"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = crate::Cli::parse_from(["censor-server", "--config", path.as_str(), "--port", "9100"]);
        let config = CensorConfig::load(&path, &cli).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.client.pipeline.primary, "keyword");

        let cli = crate::Cli::parse_from(["censor-server", "--primary", "manual"]);
        let config = CensorConfig::load("does-not-exist.yaml", &cli).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.client.pipeline.primary, "manual");
    }
}
