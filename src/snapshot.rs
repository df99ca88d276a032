//! The aggregation engine's view of one flush interval
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// One aggregated field of a timer: a plain number or one level of named numbers
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TimerValue {
    Number(f64),
    Nested(BTreeMap<String, f64>),
}

impl From<f64> for TimerValue {
    fn from(value: f64) -> Self {
        TimerValue::Number(value)
    }
}

/// Aggregated metrics handed over on every flush tick.
///
/// Maps are ordered so every flush walks keys the same way.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FlushSnapshot {
    /// Raw accumulated counter values
    pub counters: BTreeMap<String, f64>,
    /// Pre-computed per-second rate for each counter
    pub counter_rates: BTreeMap<String, f64>,
    /// Timer aggregates keyed by timer, then by aggregate name
    pub timer_data: BTreeMap<String, BTreeMap<String, TimerValue>>,
    pub gauges: BTreeMap<String, f64>,
    /// Distinct values seen for each set
    pub sets: BTreeMap<String, BTreeSet<String>>,
    /// Internal statistics of the aggregation engine itself
    pub statsd_metrics: BTreeMap<String, f64>,
}

impl FlushSnapshot {
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.timer_data.is_empty()
            && self.gauges.is_empty()
            && self.sets.is_empty()
            && self.statsd_metrics.is_empty()
    }
}
