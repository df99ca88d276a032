use log::debug;

use crate::config::BackendConfig;

pub const DEFAULT_GLOBAL_PREFIX: &str = "stats";
pub const DEFAULT_PREFIX_COUNTER: &str = "counters";
pub const DEFAULT_PREFIX_TIMER: &str = "timers";
pub const DEFAULT_PREFIX_GAUGE: &str = "gauges";
pub const DEFAULT_PREFIX_SET: &str = "sets";
pub const DEFAULT_PREFIX_STATS: &str = "statsd";

/// Resolved path prefixes for every metric kind.
///
/// Built once at startup; flushes only read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Prefix for the backend's own statistics
    pub global: Vec<String>,
    pub counters: Vec<String>,
    pub timers: Vec<String>,
    pub gauges: Vec<String>,
    pub sets: Vec<String>,
    /// The resolved `prefix_stats` value, possibly empty
    pub stats_prefix: String,
    /// `global` followed by `stats_prefix`
    pub stats: Vec<String>,
    /// Fixed `stats.*` layout used by older dashboards
    pub legacy: bool,
}

impl NamespaceConfig {
    /// Apply defaults to the configured prefixes and build every namespace
    pub fn resolve(config: &BackendConfig) -> Self {
        let kafka = &config.kafka;
        let global_prefix = kafka.global_prefix.as_deref().unwrap_or(DEFAULT_GLOBAL_PREFIX);
        let prefix_counter = kafka.prefix_counter.as_deref().unwrap_or(DEFAULT_PREFIX_COUNTER);
        let prefix_timer = kafka.prefix_timer.as_deref().unwrap_or(DEFAULT_PREFIX_TIMER);
        let prefix_gauge = kafka.prefix_gauge.as_deref().unwrap_or(DEFAULT_PREFIX_GAUGE);
        let prefix_set = kafka.prefix_set.as_deref().unwrap_or(DEFAULT_PREFIX_SET);
        let prefix_stats = config.prefix_stats.as_deref().unwrap_or(DEFAULT_PREFIX_STATS);
        let legacy = kafka.legacy_namespace.unwrap_or(true);

        let resolved = if legacy {
            Self {
                global: segments(&["stats"]),
                counters: segments(&["stats"]),
                timers: segments(&["stats", "timers"]),
                gauges: segments(&["stats", "gauges"]),
                sets: segments(&["stats", "sets"]),
                stats_prefix: prefix_stats.to_string(),
                stats: segments(&["stats", prefix_stats]),
                legacy,
            }
        } else {
            Self {
                global: segments(&[global_prefix]),
                counters: segments(&[global_prefix, prefix_counter]),
                timers: segments(&[global_prefix, prefix_timer]),
                gauges: segments(&[global_prefix, prefix_gauge]),
                sets: segments(&[global_prefix, prefix_set]),
                stats_prefix: prefix_stats.to_string(),
                stats: segments(&[global_prefix, prefix_stats]),
                legacy,
            }
        };

        debug!("Resolved metric namespaces: {:?}", resolved);
        resolved
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self::resolve(&BackendConfig::default())
    }
}

/// Owned path segments with empty prefixes left out
fn segments(parts: &[&str]) -> Vec<String> {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect()
}

/// Join a namespace and trailing segments with `.`
pub fn join(namespace: &[String], tail: &[&str]) -> String {
    namespace
        .iter()
        .map(String::as_str)
        .chain(tail.iter().copied())
        .collect::<Vec<_>>()
        .join(".")
}
