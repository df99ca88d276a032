//! Metric records as they are published to the REST proxy
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Metric name used when a path carries only tag segments
pub const PLACEHOLDER_METRIC: &str = "undefined";

/// Attribute names that tags can never replace in the serialized record
const RESERVED_FIELDS: [&str; 4] = ["metric", "value", "timestamp", "type"];

/// How downstream consumers should interpret a record's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Gauge,
    Count,
    Timer,
    Set,
    Statsd,
}

impl MetricKind {
    /// The `type` string written on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Count => "count",
            MetricKind::Timer => "timer",
            MetricKind::Set => "set",
            MetricKind::Statsd => "statsd",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MetricKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One data point ready for transmission
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    metric: String,
    value: f64,
    timestamp: i64,
    kind: MetricKind,
    tags: BTreeMap<String, String>,
}

impl MetricRecord {
    /// Build a record from a `;`-separated path such as `name;host=a;env=prod`.
    ///
    /// The first bare segment names the metric and every `key=value` segment
    /// becomes a tag. In `a=b=c` only `a=b` is kept.
    pub fn build(path: &str, value: f64, timestamp: i64, kind: MetricKind) -> Self {
        let mut metric = None;
        let mut tags = BTreeMap::new();

        for segment in path.split(';') {
            if segment.contains('=') {
                // anything after a second `=` is discarded
                let mut parts = segment.split('=').take(2);
                if let (Some(key), Some(val)) = (parts.next(), parts.next()) {
                    tags.insert(key.to_string(), val.to_string());
                }
            } else if metric.is_none() && !segment.is_empty() {
                metric = Some(segment);
            }
        }

        Self {
            metric: metric.unwrap_or(PLACEHOLDER_METRIC).to_string(),
            value,
            timestamp,
            kind,
            tags,
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }
}

impl Serialize for MetricRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let tags: Vec<_> = self
            .tags
            .iter()
            .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
            .collect();

        let mut map = serializer.serialize_map(Some(tags.len() + RESERVED_FIELDS.len()))?;
        for (key, value) in tags {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("metric", &self.metric)?;
        map.serialize_entry("value", &JsonNumber(self.value))?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.serialize_entry("type", &self.kind)?;
        map.end()
    }
}

/// Writes whole floats as integers so `5.0` goes out as `5`
struct JsonNumber(f64);

impl Serialize for JsonNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        // 2^53, the largest range where every integer is exact in an f64
        const EXACT: f64 = 9_007_199_254_740_992.0;
        let v = self.0;
        if v.is_finite() && v.fract() == 0.0 && v.abs() <= EXACT {
            serializer.serialize_i64(v as i64)
        } else {
            serializer.serialize_f64(v)
        }
    }
}
