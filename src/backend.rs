use log::info;
use std::sync::Arc;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::events::{EventRegistrar, StatusWriter};
use crate::flush::FlushCoordinator;
use crate::namespace::NamespaceConfig;
use crate::publisher::{PublishHandle, Publisher};
use crate::snapshot::FlushSnapshot;
use crate::stats::{STATUS_SOURCE, SelfStats};
use crate::transport::{HttpTransport, Transport};

/// The Kafka REST proxy backend: one instance per host process
pub struct KafkaBackend {
    coordinator: FlushCoordinator,
    stats: Arc<SelfStats>,
}

impl KafkaBackend {
    /// Create a backend that publishes through the given transport
    pub fn new(startup_time: i64, config: &BackendConfig, transport: Arc<dyn Transport>) -> Self {
        let namespace = NamespaceConfig::resolve(config);
        let stats = Arc::new(SelfStats::new(startup_time));
        let publisher = Publisher::new(config, &namespace, Arc::clone(&stats), transport);

        Self {
            coordinator: FlushCoordinator::new(namespace, publisher, config.debug),
            stats,
        }
    }

    /// Build the backend over HTTP and register its `flush` and `status` handlers
    pub fn init<R>(startup_time: i64, config: &BackendConfig, events: &mut R) -> Result<Arc<Self>>
    where
        R: EventRegistrar + ?Sized,
    {
        let transport = HttpTransport::new()?;
        let backend = Arc::new(Self::new(startup_time, config, Arc::new(transport)));
        backend.register(events);

        match &config.rest_proxy_url {
            Some(url) => info!(
                "Kafka backend publishing to {} (topic {})",
                url,
                config.kafka_topic.as_deref().unwrap_or("<unset>")
            ),
            None => info!("Kafka backend has no rest_proxy_url, metrics will be dropped"),
        }

        Ok(backend)
    }

    /// Register this backend's handlers with an event host
    pub fn register<R>(self: &Arc<Self>, events: &mut R)
    where
        R: EventRegistrar + ?Sized,
    {
        let backend = Arc::clone(self);
        events.on_flush(Box::new(move |timestamp: i64, snapshot: &FlushSnapshot| {
            backend.flush(timestamp, snapshot);
        }));

        let backend = Arc::clone(self);
        events.on_status(Box::new(move |write: &mut StatusWriter<'_>| {
            backend.report_status(write);
        }));
    }

    /// Translate and publish one snapshot; the returned handle may be dropped
    pub fn flush(&self, timestamp: i64, snapshot: &FlushSnapshot) -> Option<PublishHandle> {
        self.coordinator.flush(timestamp, snapshot)
    }

    /// Report every self-health field under the `kafka` source
    pub fn report_status(&self, write: &mut StatusWriter<'_>) {
        for (name, value) in self.stats.fields() {
            write(None, STATUS_SOURCE, name, value);
        }
    }

    pub fn stats(&self) -> &SelfStats {
        &self.stats
    }

    pub fn namespace(&self) -> &NamespaceConfig {
        self.coordinator.namespace()
    }
}
