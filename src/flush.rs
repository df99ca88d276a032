use log::debug;
use std::time::Instant;

use crate::metric::{MetricKind, MetricRecord};
use crate::namespace::{NamespaceConfig, join};
use crate::publisher::{PublishHandle, Publisher};
use crate::snapshot::{FlushSnapshot, TimerValue};

/// Turns each flush snapshot into namespaced records and hands them to the publisher
pub struct FlushCoordinator {
    namespace: NamespaceConfig,
    publisher: Publisher,
    debug: bool,
}

impl FlushCoordinator {
    pub fn new(namespace: NamespaceConfig, publisher: Publisher, debug: bool) -> Self {
        Self {
            namespace,
            publisher,
            debug,
        }
    }

    pub fn namespace(&self) -> &NamespaceConfig {
        &self.namespace
    }

    /// Run one flush cycle. Never blocks on the network and never fails.
    pub fn flush(&self, timestamp: i64, snapshot: &FlushSnapshot) -> Option<PublishHandle> {
        let records = self.build_records(timestamp, snapshot);
        debug!("Flushing {} metrics for timestamp {}", records.len(), timestamp);
        self.publisher.publish(records)
    }

    /// All records for one snapshot, in kind order: counters, timers,
    /// gauges, sets, then the backend's own statistics
    pub fn build_records(&self, timestamp: i64, snapshot: &FlushSnapshot) -> Vec<MetricRecord> {
        let started = Instant::now();
        let ns = &self.namespace;
        let record =
            |name: String, value: f64, kind| MetricRecord::build(&name, value, timestamp, kind);
        let mut records = Vec::new();

        for (key, value) in &snapshot.counters {
            let key = key.as_str();
            let rate = snapshot.counter_rates.get(key).copied().unwrap_or_default();
            if ns.legacy {
                records.push(record(join(&ns.counters, &[key]), rate, MetricKind::Gauge));
                records.push(record(format!("stats_counts.{}", key), *value, MetricKind::Count));
            } else {
                records.push(record(join(&ns.counters, &[key, "rate"]), rate, MetricKind::Gauge));
                let name = join(&ns.counters, &[key, "count"]);
                records.push(record(name, *value, MetricKind::Count));
            }
        }

        for (key, fields) in &snapshot.timer_data {
            for (field, value) in fields {
                let path = [key.as_str(), field.as_str()];
                match value {
                    TimerValue::Number(v) => {
                        records.push(record(join(&ns.timers, &path), *v, MetricKind::Timer));
                    }
                    TimerValue::Nested(values) => {
                        for (sub, v) in values {
                            if self.debug {
                                debug!("{}.{}.{} = {}", key, field, sub, v);
                            }
                            let name = join(&ns.timers, &[path[0], path[1], sub.as_str()]);
                            records.push(record(name, *v, MetricKind::Timer));
                        }
                    }
                }
            }
        }

        for (key, value) in &snapshot.gauges {
            records.push(record(join(&ns.gauges, &[key.as_str()]), *value, MetricKind::Gauge));
        }

        // cardinality, never the members themselves
        for (key, members) in &snapshot.sets {
            let name = join(&ns.sets, &[key.as_str(), "count"]);
            records.push(record(name, members.len() as f64, MetricKind::Set));
        }

        // numStats is always 0
        let num_stats = if !ns.legacy {
            join(&ns.stats, &["numStats"])
        } else if ns.stats_prefix.is_empty() {
            "numStats".to_string()
        } else {
            format!("{}.numStats", ns.stats_prefix)
        };
        records.push(record(num_stats, 0.0, MetricKind::Count));

        let calculation_time = started.elapsed().as_millis() as f64;
        records.push(record(
            join(&ns.stats, &["kafkaStats", "calculationtime"]),
            calculation_time,
            MetricKind::Timer,
        ));

        for (key, value) in &snapshot.statsd_metrics {
            records.push(record(join(&ns.stats, &[key.as_str()]), *value, MetricKind::Statsd));
        }

        records
    }
}
