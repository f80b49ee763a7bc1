//! Configuration management for the ensemble scoring server

use crate::error::ConfigError;
use crate::models::ModelKind;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Prefix for environment overrides, e.g. `ENSEMBLE__SCORING__PASS_SCORE=2`
pub const ENV_PREFIX: &str = "ENSEMBLE";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Models in registration order. Order matters: it is the evaluation order.
    #[serde(default)]
    pub models: Vec<ModelSpec>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener and per-connection limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, `host:port`
    pub listen_addr: String,
    /// Largest accepted request; requests must arrive in a single read
    pub max_request_bytes: usize,
    /// Time allowed for the client to send its request
    pub read_timeout_ms: u64,
    /// Time allowed for writing the verdict back
    pub write_timeout_ms: u64,
    /// Maximum number of connections handled concurrently
    pub max_connections: usize,
    /// How long `stop()` waits for in-flight connections before aborting them
    pub shutdown_grace_ms: u64,
    /// Period of the metrics summary log, 0 disables it
    pub metrics_interval_secs: u64,
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:1234".to_string(),
            max_request_bytes: 1024,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            max_connections: 256,
            shutdown_grace_ms: 5000,
            metrics_interval_secs: 30,
        }
    }
}

/// Vote aggregation parameters
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    /// Votes needed for a record to pass
    pub pass_score: u32,
    /// Reconstruction error above which an anomaly model votes
    pub anomaly_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            pass_score: 1,
            anomaly_threshold: 5.0,
        }
    }
}

/// One model to load at startup
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelSpec {
    /// Human readable name, used in logs and metrics only
    pub name: String,
    /// Selects both the artifact codec and the vote rule
    pub kind: ModelKind,
    /// Path to the trained artifact
    pub artifact_path: PathBuf,
    /// Intra-op threads for this model's inference session
    #[serde(default = "default_model_threads")]
    pub threads: usize,
}

fn default_model_threads() -> usize {
    1
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, kind: ModelKind, artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            artifact_path: artifact_path.into(),
            threads: default_model_threads(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file, with environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    /// Parse configuration from a TOML string (no environment overrides)
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scoring.pass_score == 0 {
            return Err(ConfigError::Invalid("scoring.pass_score must be at least 1".into()));
        }
        if !self.scoring.anomaly_threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "scoring.anomaly_threshold must be a finite number".into(),
            ));
        }
        if self.models.is_empty() {
            return Err(ConfigError::Invalid("at least one model must be configured".into()));
        }

        let mut seen = HashSet::new();
        for spec in &self.models {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::Invalid("model name must not be empty".into()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate model name '{}'", spec.name)));
            }
            if spec.threads == 0 {
                return Err(ConfigError::Invalid(format!(
                    "model '{}': threads must be at least 1",
                    spec.name
                )));
            }
        }

        if self.server.max_request_bytes == 0 {
            return Err(ConfigError::Invalid("server.max_request_bytes must be positive".into()));
        }
        if self.server.max_connections == 0 {
            return Err(ConfigError::Invalid("server.max_connections must be positive".into()));
        }
        self.listen_addr()?;

        Ok(())
    }

    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.listen_addr.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "server.listen_addr '{}' is not a socket address",
                self.server.listen_addr
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        listen_addr = "127.0.0.1:4000"

        [scoring]
        pass_score = 2

        [[models]]
        name = "Random forest"
        kind = "classifier_vote"
        artifact_path = "models/random_forest.onnx"

        [[models]]
        name = "Autoencoder"
        kind = "reconstruction_anomaly"
        artifact_path = "models/autoencoder.onnx"
        threads = 2
    "#;

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:4000");
        assert_eq!(config.server.max_request_bytes, 1024);
        assert_eq!(config.scoring.pass_score, 2);
        assert_eq!(config.scoring.anomaly_threshold, 5.0);
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models[0].kind, ModelKind::ClassifierVote);
        assert_eq!(config.models[0].threads, 1);
        assert_eq!(config.models[1].kind, ModelKind::ReconstructionAnomaly);
        assert_eq!(config.models[1].threads, 2);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let toml = r#"
            [[models]]
            name = "svm"
            kind = "support_vector"
            artifact_path = "models/svm.onnx"
        "#;
        assert!(matches!(AppConfig::from_toml_str(toml), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_zero_pass_score_rejected() {
        let toml = SAMPLE.replace("pass_score = 2", "pass_score = 0");
        assert!(matches!(AppConfig::from_toml_str(&toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_model_names_rejected() {
        let toml = SAMPLE.replace("name = \"Autoencoder\"", "name = \"Random forest\"");
        let err = AppConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("duplicate model name"));
    }

    #[test]
    fn test_empty_model_list_rejected() {
        let toml = "[scoring]\npass_score = 1\n";
        assert!(matches!(AppConfig::from_toml_str(toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_listen_addr_rejected() {
        let toml = SAMPLE.replace("127.0.0.1:4000", "localhost");
        let err = AppConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("listen_addr"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.models[1].name, "Autoencoder");
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        std::env::set_var("ENSEMBLE__SCORING__ANOMALY_THRESHOLD", "7.5");
        let loaded = AppConfig::load_from_path(&path);
        std::env::remove_var("ENSEMBLE__SCORING__ANOMALY_THRESHOLD");

        let config = loaded.unwrap();
        assert_eq!(config.scoring.anomaly_threshold, 7.5);
        assert_eq!(config.scoring.pass_score, 2);
        assert_eq!(config.server.listen_addr, "127.0.0.1:4000");
    }
}
