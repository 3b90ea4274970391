//! Configuration management for leaky-gate.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{GateError, Result};

/// Prefix for environment overrides, e.g. `LEAKY_GATE__ADMISSION__CAPACITY=10`.
pub const ENV_PREFIX: &str = "LEAKY_GATE";

/// Main configuration for the leaky-gate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission control configuration
    #[serde(default)]
    pub admission: AdmissionConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_addr")]
    pub addr: SocketAddr,

    /// Upper bound on handling a single request, in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// How long in-flight requests may drain after a shutdown signal, in milliseconds
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            request_timeout_ms: default_request_timeout(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 27009))
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_shutdown_grace() -> u64 {
    2000
}

/// Strategy used to decide whether a request is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionMode {
    /// Leaky bucket as a meter
    #[default]
    #[serde(alias = "METER", alias = "Meter")]
    Meter,
    /// Leaky bucket as a queue. Recognized but not implemented.
    #[serde(alias = "QUEUE", alias = "Queue")]
    Queue,
}

impl FromStr for AdmissionMode {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "meter" => Ok(AdmissionMode::Meter),
            "queue" => Ok(AdmissionMode::Queue),
            other => Err(GateError::Config(format!(
                "unknown admission mode {:?}, expected \"meter\" or \"queue\"",
                other
            ))),
        }
    }
}

impl fmt::Display for AdmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionMode::Meter => write!(f, "meter"),
            AdmissionMode::Queue => write!(f, "queue"),
        }
    }
}

/// Admission control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Which admission strategy to run
    #[serde(default)]
    pub mode: AdmissionMode,

    /// Number of unleaked admissions at which requests start being dropped
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Interval between leak ticks, in milliseconds
    #[serde(default = "default_leak_rate")]
    pub leak_rate_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            mode: AdmissionMode::default(),
            capacity: default_capacity(),
            leak_rate_ms: default_leak_rate(),
        }
    }
}

impl AdmissionConfig {
    /// Capacity as a non-zero value, or a configuration error.
    pub fn capacity(&self) -> Result<NonZeroU64> {
        NonZeroU64::new(self.capacity)
            .ok_or_else(|| GateError::Config("admission.capacity must be greater than 0".into()))
    }

    /// Leak interval, or a configuration error if it is zero.
    pub fn leak_rate(&self) -> Result<Duration> {
        if self.leak_rate_ms == 0 {
            return Err(GateError::Config(
                "admission.leak_rate_ms must be greater than 0".into(),
            ));
        }
        Ok(Duration::from_millis(self.leak_rate_ms))
    }
}

fn default_capacity() -> u64 {
    5
}

fn default_leak_rate() -> u64 {
    3000
}

impl GateConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: GateConfig =
            serde_yaml::from_str(contents).map_err(|e| GateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from defaults, an optional YAML file and
    /// `LEAKY_GATE__*` environment variables, in increasing precedence.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&GateConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Yaml).required(true));
        }

        let config: GateConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.admission.capacity()?;
        self.admission.leak_rate()?;
        if self.server.request_timeout_ms == 0 {
            return Err(GateError::Config(
                "server.request_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();

        assert_eq!(config.server.addr.port(), 27009);
        assert_eq!(config.server.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.server.shutdown_grace(), Duration::from_secs(2));
        assert_eq!(config.admission.mode, AdmissionMode::Meter);
        assert_eq!(config.admission.capacity().unwrap().get(), 5);
        assert_eq!(config.admission.leak_rate().unwrap(), Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
admission:
  capacity: 10
  leak_rate_ms: 250
"#;
        let config = GateConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.admission.capacity, 10);
        assert_eq!(config.admission.leak_rate_ms, 250);
        assert_eq!(config.admission.mode, AdmissionMode::Meter);
        assert_eq!(config.server.addr, default_addr());
    }

    #[test]
    fn test_from_yaml_mode_any_case() {
        let config = GateConfig::from_yaml("admission:\n  mode: QUEUE\n").unwrap();
        assert_eq!(config.admission.mode, AdmissionMode::Queue);

        let config = GateConfig::from_yaml("admission:\n  mode: meter\n").unwrap();
        assert_eq!(config.admission.mode, AdmissionMode::Meter);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = GateConfig::from_yaml("admission:\n  capacity: 0\n");
        assert!(matches!(result, Err(GateError::Config(_))));
    }

    #[test]
    fn test_zero_leak_rate_rejected() {
        let result = GateConfig::from_yaml("admission:\n  leak_rate_ms: 0\n");
        assert!(matches!(result, Err(GateError::Config(_))));
    }

    #[test]
    fn test_zero_request_timeout_rejected() {
        let result = GateConfig::from_yaml("server:\n  request_timeout_ms: 0\n");
        assert!(matches!(result, Err(GateError::Config(_))));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("METER".parse::<AdmissionMode>().unwrap(), AdmissionMode::Meter);
        assert_eq!(" Queue ".parse::<AdmissionMode>().unwrap(), AdmissionMode::Queue);
        assert!("bucket".parse::<AdmissionMode>().is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = GateConfig::load(None).unwrap();
        assert_eq!(config.admission.capacity, default_capacity());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("leaky-gate-{}.yaml", std::process::id()));
        std::fs::write(&path, "server:\n  addr: \"127.0.0.1:9000\"\nadmission:\n  capacity: 7\n")
            .unwrap();

        let config = GateConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.server.addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.admission.capacity, 7);
        assert_eq!(config.admission.leak_rate_ms, default_leak_rate());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = GateConfig::load(Some("/nonexistent/leaky-gate.yaml"));
        assert!(matches!(result, Err(GateError::ConfigSource(_))));
    }
}
