//! Flushes aggregated statsd metrics to Kafka through the Confluent REST proxy

pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod flush;
pub mod metric;
pub mod namespace;
pub mod publisher;
pub mod snapshot;
pub mod stats;
pub mod transport;
pub mod util;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::backend::KafkaBackend;
    pub use crate::config::BackendConfig;
    pub use crate::error::{BackendError, Result};
    pub use crate::events::{EventBus, EventRegistrar};
    pub use crate::metric::{MetricKind, MetricRecord};
    pub use crate::publisher::{PublishOutcome, PublishState};
    pub use crate::snapshot::{FlushSnapshot, TimerValue};
    pub use crate::transport::{HttpTransport, Transport};
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
