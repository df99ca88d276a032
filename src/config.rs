// src/config.rs
use crate::error::{BackendError, Result};
use log::{debug, warn};
use serde::Deserialize;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Backend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Log failures that are otherwise only recorded in the self-health stats
    #[serde(default)]
    pub debug: bool,
    /// Base URL of the Kafka REST proxy; publishing is disabled when unset
    #[serde(default)]
    pub rest_proxy_url: Option<String>,
    /// Topic the metrics are produced to
    #[serde(default)]
    pub kafka_topic: Option<String>,
    /// Namespace segment for the backend's own statistics
    #[serde(default)]
    pub prefix_stats: Option<String>,
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
    /// Seconds between status reports in the daemon
    #[serde(default = "default_status_interval")]
    pub status_interval: u64,
    /// Namespace layout
    #[serde(default)]
    pub kafka: KafkaConfig,
}

/// Default status reporting interval
fn default_status_interval() -> u64 {
    60
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            debug: false,
            rest_proxy_url: None,
            kafka_topic: None,
            prefix_stats: None,
            log_level: LogLevel::default(),
            status_interval: default_status_interval(),
            kafka: KafkaConfig::default(),
        }
    }
}

/// The `[kafka]` table: namespace prefixes and layout.
///
/// `None` means unset and picks up the default, `Some("")` drops the segment.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct KafkaConfig {
    #[serde(default)]
    pub global_prefix: Option<String>,
    #[serde(default)]
    pub prefix_counter: Option<String>,
    #[serde(default)]
    pub prefix_timer: Option<String>,
    #[serde(default)]
    pub prefix_gauge: Option<String>,
    #[serde(default)]
    pub prefix_set: Option<String>,
    #[serde(default)]
    pub legacy_namespace: Option<bool>,
}

/// Logging level
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

impl BackendConfig {
    /// The level to log at, raised to `debug` when the debug flag is set
    pub fn effective_log_level(&self) -> LogLevel {
        match self.log_level {
            LogLevel::Error | LogLevel::Warn | LogLevel::Info if self.debug => LogLevel::Debug,
            level => level,
        }
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_config(vec![ConfigSource::File(path.as_ref().to_path_buf())])
    }
}

/// Where a layer of [`BackendConfig`] values comes from
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A TOML file with top-level backend keys and a `[kafka]` table.
    /// A missing file is skipped with a warning.
    File(PathBuf),
    /// Variables named `<PREFIX>__<KEY>`, with `__` descending into tables:
    /// `KAFKA_BACKEND__KAFKA__GLOBAL_PREFIX=app` sets `kafka.global_prefix`
    Environment(String),
    /// Inline TOML in the same layout as `File`
    Toml(String),
    /// No values; serde defaults fill every key
    Defaults,
}

/// Merge the sources in order, later layers overriding earlier ones.
///
/// Both building and deserializing failures come back as `BackendError::Config`.
pub fn load_config<T>(sources: Vec<ConfigSource>) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    let mut builder = config::Config::builder();

    for source in sources {
        match source {
            ConfigSource::File(path) => {
                if !path.exists() {
                    warn!("Configuration file not found: {}", path.display());
                    continue;
                }

                debug!("Loading TOML configuration from file: {}", path.display());
                builder = builder.add_source(
                    config::File::from(path.as_path()).format(config::FileFormat::Toml),
                );
            }
            ConfigSource::Environment(prefix) => {
                debug!("Loading configuration from environment with prefix: {}", prefix);
                builder = builder.add_source(
                    config::Environment::with_prefix(&prefix)
                        .separator("__")
                        .try_parsing(true),
                );
            }
            ConfigSource::Toml(toml_str) => {
                debug!("Loading configuration from TOML string");
                builder = builder
                    .add_source(config::File::from_str(&toml_str, config::FileFormat::Toml));
            }
            ConfigSource::Defaults => {
                debug!("Using default configuration values");
            }
        }
    }

    let config = builder
        .build()
        .map_err(|e| BackendError::Config(format!("Failed to build configuration: {}", e)))?;

    let result = config
        .try_deserialize()
        .map_err(|e| BackendError::Config(format!("Failed to deserialize configuration: {}", e)))?;

    debug!("Configuration loaded successfully: {:?}", result);

    Ok(result)
}

/// Layers configuration sources for the daemon: defaults, then the `--config`
/// file, then `KAFKA_BACKEND__*` variables
pub struct ConfigBuilder<T: for<'de> Deserialize<'de>> {
    sources: Vec<ConfigSource>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: for<'de> Deserialize<'de> + Debug> ConfigBuilder<T> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Layer a TOML file
    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(ConfigSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Layer `<prefix>__*` variables, e.g. `KAFKA_BACKEND__REST_PROXY_URL`
    pub fn add_env(mut self, prefix: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Environment(prefix.into()));
        self
    }

    /// Layer inline TOML
    pub fn add_toml(mut self, toml: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Toml(toml.into()));
        self
    }

    /// Start from serde defaults
    pub fn use_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Merge every layer into the target type
    pub fn build(self) -> Result<T> {
        load_config::<T>(self.sources)
    }
}

impl<T: for<'de> Deserialize<'de> + Debug> Default for ConfigBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_load_from_toml_file() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            debug = true
            rest_proxy_url = "http://localhost:8082"
            kafka_topic = "metrics"

            [kafka]
            legacy_namespace = false
            global_prefix = "app"
            "#
        )
        .unwrap();

        let config = BackendConfig::load(file.path()).unwrap();
        assert!(config.debug);
        assert_eq!(config.rest_proxy_url.as_deref(), Some("http://localhost:8082"));
        assert_eq!(config.kafka_topic.as_deref(), Some("metrics"));
        assert_eq!(config.kafka.legacy_namespace, Some(false));
        assert_eq!(config.kafka.global_prefix.as_deref(), Some("app"));
        assert_eq!(config.kafka.prefix_counter, None);
        assert_eq!(config.status_interval, 60);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ConfigBuilder::<BackendConfig>::new()
            .use_defaults()
            .build()
            .unwrap();

        assert!(!config.debug);
        assert!(config.rest_proxy_url.is_none());
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.kafka, KafkaConfig::default());
    }

    #[test]
    fn test_explicit_empty_prefix_is_kept() {
        let config = ConfigBuilder::<BackendConfig>::new()
            .add_toml(
                r#"
                [kafka]
                global_prefix = ""
                "#,
            )
            .build()
            .unwrap();

        assert_eq!(config.kafka.global_prefix.as_deref(), Some(""));
    }

    #[test]
    fn test_multiple_sources() {
        let config = ConfigBuilder::<BackendConfig>::new()
            .add_toml(
                r#"
                kafka_topic = "first"
                prefix_stats = "statsd"
                "#,
            )
            .add_toml(r#"kafka_topic = "second""#)
            .build()
            .unwrap();

        // Later sources override earlier ones
        assert_eq!(config.kafka_topic.as_deref(), Some("second"));
        assert_eq!(config.prefix_stats.as_deref(), Some("statsd"));
    }

    #[test]
    fn test_env_separator_reaches_kafka_table() {
        // unique prefix so no other test sees these variables
        unsafe {
            std::env::set_var("KAFKA_BACKEND_ENV_TEST__KAFKA_TOPIC", "metrics");
            std::env::set_var("KAFKA_BACKEND_ENV_TEST__KAFKA__GLOBAL_PREFIX", "app");
            std::env::set_var("KAFKA_BACKEND_ENV_TEST__KAFKA__LEGACY_NAMESPACE", "false");
        }

        let config = ConfigBuilder::<BackendConfig>::new()
            .add_toml(r#"kafka_topic = "from-file""#)
            .add_env("KAFKA_BACKEND_ENV_TEST")
            .build()
            .unwrap();

        assert_eq!(config.kafka_topic.as_deref(), Some("metrics"));
        assert_eq!(config.kafka.global_prefix.as_deref(), Some("app"));
        assert_eq!(config.kafka.legacy_namespace, Some(false));
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let config = ConfigBuilder::<BackendConfig>::new()
            .add_file("/nonexistent/kafka-backend.toml")
            .build()
            .unwrap();
        assert!(config.kafka_topic.is_none());
    }

    #[test]
    fn test_debug_raises_log_level() {
        let mut config = BackendConfig {
            log_level: LogLevel::Warn,
            ..Default::default()
        };
        assert_eq!(config.effective_log_level(), LogLevel::Warn);

        config.debug = true;
        assert_eq!(config.effective_log_level(), LogLevel::Debug);

        config.log_level = LogLevel::Trace;
        assert_eq!(config.effective_log_level(), LogLevel::Trace);
    }
}
