//! Asynchronous publishing of metric batches to the Kafka REST proxy
use log::{debug, error, trace, warn};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::BackendConfig;
use crate::error::{BackendError, Result};
use crate::metric::{MetricKind, MetricRecord};
use crate::namespace::{NamespaceConfig, join};
use crate::stats::{self, SelfStats};
use crate::transport::{PublishRequest, PublishResponse, Transport};

/// Content type understood by the REST proxy for JSON-encoded records
pub const KAFKA_JSON_CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

#[derive(Serialize)]
struct Envelope<'a> {
    records: Vec<EnvelopeRecord<'a>>,
}

#[derive(Serialize)]
struct EnvelopeRecord<'a> {
    value: &'a MetricRecord,
}

/// Produce response returned by the REST proxy
#[derive(Debug, Deserialize)]
struct ProduceResponse {
    #[serde(default)]
    offsets: Vec<PartitionOffset>,
}

#[derive(Debug, Deserialize)]
struct PartitionOffset {
    #[serde(default)]
    partition: Option<i64>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

/// Lifecycle of one in-flight request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Sent,
    Completed,
    Failed,
}

/// How a dispatched request ended
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// The proxy answered; the self-health stats were updated
    Completed {
        status: u16,
        flush_time_ms: u64,
        flush_length: u64,
        /// Records the proxy reported as failed
        record_errors: usize,
    },
    /// The request never got an answer
    Failed { error: String },
}

impl PublishOutcome {
    pub fn state(&self) -> PublishState {
        match self {
            PublishOutcome::Completed { .. } => PublishState::Completed,
            PublishOutcome::Failed { .. } => PublishState::Failed,
        }
    }
}

/// A request that has been sent and may still be in flight.
///
/// Dropping the handle does not cancel the request.
pub struct PublishHandle {
    task: JoinHandle<PublishOutcome>,
    state: watch::Receiver<PublishState>,
}

impl PublishHandle {
    /// `Sent` until the proxy answers or the request fails
    pub fn state(&self) -> PublishState {
        *self.state.borrow()
    }

    /// Wait for the request to finish
    pub async fn outcome(self) -> Result<PublishOutcome> {
        self.task
            .await
            .map_err(|e| BackendError::Runtime(format!("Publish task failed: {}", e)))
    }
}

/// Sends each flush's records as one batch, fire-and-forget
pub struct Publisher {
    endpoint: Option<String>,
    topic: Option<String>,
    debug: bool,
    /// Namespace for the `kafkaStats.*` records
    health_namespace: Vec<String>,
    stats: Arc<SelfStats>,
    transport: Arc<dyn Transport>,
}

impl Publisher {
    pub fn new(
        config: &BackendConfig,
        namespace: &NamespaceConfig,
        stats: Arc<SelfStats>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            endpoint: config.rest_proxy_url.clone(),
            topic: config.kafka_topic.clone(),
            debug: config.debug,
            health_namespace: namespace.stats.clone(),
            stats,
            transport,
        }
    }

    /// Whether an endpoint is configured at all
    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Publish a batch without waiting for the response.
    ///
    /// Returns `None` when nothing was sent: either no endpoint is configured,
    /// or preparing the request failed and the failure was recorded.
    pub fn publish(&self, records: Vec<MetricRecord>) -> Option<PublishHandle> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            trace!("No REST proxy configured, dropping {} metrics", records.len());
            return None;
        };

        match self.dispatch(endpoint, records) {
            Ok(handle) => Some(handle),
            Err(e) => {
                if self.debug {
                    error!("Failed to publish metrics: {}", e);
                }
                self.stats.record_exception();
                None
            }
        }
    }

    fn dispatch(&self, endpoint: &str, mut records: Vec<MetricRecord>) -> Result<PublishHandle> {
        let started = Instant::now();
        records.extend(self.health_records(stats::now()));

        let request = self.prepare(endpoint, &records)?;
        let runtime = Handle::try_current()
            .map_err(|e| BackendError::Runtime(format!("No async runtime to publish on: {}", e)))?;

        let flush_length = request.body.len() as u64;
        debug!(
            "Publishing {} metrics ({} bytes) to {} via {}",
            records.len(),
            flush_length,
            request.url,
            self.transport.name()
        );

        let transport = Arc::clone(&self.transport);
        let stats = Arc::clone(&self.stats);
        let (state_tx, state) = watch::channel(PublishState::Sent);

        let task = runtime.spawn(async move {
            let outcome = match transport.post(request).await {
                Ok(response) => {
                    let record_errors = inspect_response(&response);
                    let flush_time_ms = started.elapsed().as_millis() as u64;
                    stats.record_flush(flush_time_ms, flush_length);
                    PublishOutcome::Completed {
                        status: response.status,
                        flush_time_ms,
                        flush_length,
                        record_errors,
                    }
                }
                Err(e) => {
                    warn!("Problem with request: {}", e);
                    stats.record_exception();
                    PublishOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            state_tx.send_replace(outcome.state());
            outcome
        });

        Ok(PublishHandle { task, state })
    }

    /// Self-health records reflecting the stats as they are right now
    fn health_records(&self, timestamp: i64) -> [MetricRecord; 4] {
        let name = |field: &str| join(&self.health_namespace, &["kafkaStats", field]);
        [
            MetricRecord::build(
                &name("last_exception"),
                self.stats.last_exception() as f64,
                timestamp,
                MetricKind::Gauge,
            ),
            MetricRecord::build(
                &name("last_flush"),
                self.stats.last_flush() as f64,
                timestamp,
                MetricKind::Gauge,
            ),
            MetricRecord::build(
                &name("flush_time"),
                self.stats.flush_time() as f64,
                timestamp,
                MetricKind::Timer,
            ),
            MetricRecord::build(
                &name("flush_length"),
                self.stats.flush_length() as f64,
                timestamp,
                MetricKind::Timer,
            ),
        ]
    }

    fn prepare(&self, endpoint: &str, records: &[MetricRecord]) -> Result<PublishRequest> {
        let topic = self
            .topic
            .as_deref()
            .ok_or_else(|| BackendError::Config("kafka_topic is not set".to_string()))?;

        let target = format!("{}/{}", endpoint.trim_end_matches('/'), topic);
        let url = Url::parse(&target)
            .map_err(|e| BackendError::Url(format!("Invalid REST proxy URL {}: {}", target, e)))?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(BackendError::Url(format!(
                    "Unsupported scheme {} in {}",
                    scheme, target
                )));
            }
        }

        let body = encode(records)?;

        Ok(PublishRequest {
            url,
            headers: vec![
                ("Content-Length", body.len().to_string()),
                ("Content-Type", KAFKA_JSON_CONTENT_TYPE.to_string()),
                ("Accept", "application/json".to_string()),
            ],
            body,
        })
    }
}

/// Serialize records into the REST proxy envelope `{"records": [{"value": ...}]}`
pub fn encode(records: &[MetricRecord]) -> Result<Vec<u8>> {
    let envelope = Envelope {
        records: records
            .iter()
            .map(|record| EnvelopeRecord { value: record })
            .collect(),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Log per-record errors reported by the proxy; returns how many there were
fn inspect_response(response: &PublishResponse) -> usize {
    if !response.is_success() {
        warn!("REST proxy responded with status {}", response.status);
    }

    let Ok(produced) = serde_json::from_slice::<ProduceResponse>(&response.body) else {
        trace!("Ignoring unparseable REST proxy response");
        return 0;
    };

    let mut errors = 0;
    for offset in &produced.offsets {
        if let Some(error) = &offset.error {
            errors += 1;
            warn!(
                "Error: {} Code: {} Partition: {}",
                error,
                offset.error_code.unwrap_or_default(),
                offset.partition.unwrap_or(-1)
            );
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Records every request and answers with a fixed response
    struct RecordingTransport {
        requests: Mutex<Vec<PublishRequest>>,
        status: u16,
        response_body: &'static str,
    }

    impl RecordingTransport {
        fn new(response_body: &'static str) -> Arc<Self> {
            Self::with_status(200, response_body)
        }

        fn with_status(status: u16, response_body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                status,
                response_body,
            })
        }

        fn requests(&self) -> Vec<PublishRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn post(&self, request: PublishRequest) -> Result<PublishResponse> {
            self.requests.lock().unwrap().push(request);
            Ok(PublishResponse {
                status: self.status,
                body: self.response_body.as_bytes().to_vec(),
            })
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    /// Holds every request until released
    struct GatedTransport {
        release: Notify,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn post(&self, _request: PublishRequest) -> Result<PublishResponse> {
            self.release.notified().await;
            Ok(PublishResponse {
                status: 200,
                body: Vec::new(),
            })
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn post(&self, _request: PublishRequest) -> Result<PublishResponse> {
            Err(BackendError::Transport("connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn config(url: Option<&str>, topic: Option<&str>) -> BackendConfig {
        BackendConfig {
            rest_proxy_url: url.map(str::to_string),
            kafka_topic: topic.map(str::to_string),
            ..Default::default()
        }
    }

    fn publisher(
        config: &BackendConfig,
        transport: Arc<dyn Transport>,
    ) -> (Publisher, Arc<SelfStats>) {
        let stats = Arc::new(SelfStats::new(1_000));
        let publisher = Publisher::new(
            config,
            &NamespaceConfig::resolve(config),
            Arc::clone(&stats),
            transport,
        );
        (publisher, stats)
    }

    fn batch() -> Vec<MetricRecord> {
        vec![MetricRecord::build("stats.foo", 2.5, 1_700_000_000, MetricKind::Gauge)]
    }

    #[tokio::test]
    async fn test_publish_sends_envelope() {
        let transport = RecordingTransport::new(r#"{"offsets":[{"partition":0,"offset":1}]}"#);
        let (publisher, stats) = publisher(
            &config(Some("http://proxy:8082/"), Some("metrics")),
            transport.clone(),
        );

        let started = stats::now();
        let outcome = publisher.publish(batch()).unwrap().outcome().await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.url.as_str(), "http://proxy:8082/metrics");
        assert_eq!(request.header("content-type"), Some(KAFKA_JSON_CONTENT_TYPE));
        assert_eq!(request.header("accept"), Some("application/json"));
        assert_eq!(
            request.header("content-length"),
            Some(request.body.len().to_string().as_str())
        );

        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let records = body["records"].as_array().unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0]["value"]["metric"], "stats.foo");
        assert_eq!(records[1]["value"]["metric"], "stats.statsd.kafkaStats.last_exception");
        assert_eq!(records[1]["value"]["value"], 1_000);
        assert_eq!(records[2]["value"]["metric"], "stats.statsd.kafkaStats.last_flush");
        assert_eq!(records[3]["value"]["metric"], "stats.statsd.kafkaStats.flush_time");
        assert_eq!(records[3]["value"]["type"], "timer");
        assert_eq!(records[4]["value"]["metric"], "stats.statsd.kafkaStats.flush_length");

        assert_eq!(outcome.state(), PublishState::Completed);
        assert!(stats.last_flush() >= started);
        assert_eq!(stats.flush_length(), request.body.len() as u64);
        assert_eq!(stats.last_exception(), 1_000);
    }

    #[tokio::test]
    async fn test_publish_without_endpoint_is_noop() {
        let transport = RecordingTransport::new("");
        let (publisher, stats) = publisher(&config(None, Some("metrics")), transport.clone());

        assert!(!publisher.is_enabled());
        assert!(publisher.publish(batch()).is_none());
        assert!(transport.requests().is_empty());
        assert_eq!(stats.last_flush(), 1_000);
        assert_eq!(stats.last_exception(), 1_000);
        assert_eq!(stats.flush_length(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_records_exception() {
        let (publisher, stats) = publisher(
            &config(Some("http://proxy:8082"), Some("metrics")),
            Arc::new(FailingTransport),
        );

        let outcome = publisher.publish(batch()).unwrap().outcome().await.unwrap();

        assert_eq!(outcome.state(), PublishState::Failed);
        assert!(stats.last_exception() > 1_000);
        assert_eq!(stats.last_flush(), 1_000);
        assert_eq!(stats.flush_length(), 0);
    }

    #[tokio::test]
    async fn test_bad_configuration_is_recorded_not_raised() {
        let transport = RecordingTransport::new("");
        for config in [
            config(Some("http://proxy:8082"), None),
            config(Some("not a url"), Some("metrics")),
            config(Some("ftp://proxy"), Some("metrics")),
        ] {
            let (publisher, stats) = publisher(&config, transport.clone());
            assert!(publisher.publish(batch()).is_none());
            assert!(stats.last_exception() > 1_000);
            assert_eq!(stats.last_flush(), 1_000);
        }
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_publish_outside_runtime_is_recorded() {
        let transport = RecordingTransport::new("");
        let (publisher, stats) = publisher(
            &config(Some("http://proxy:8082"), Some("metrics")),
            transport.clone(),
        );

        assert!(publisher.publish(batch()).is_none());
        assert!(stats.last_exception() > 1_000);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_record_errors_do_not_fail_the_batch() {
        let transport = RecordingTransport::new(
            r#"{"offsets":[
                {"partition":0,"offset":10},
                {"partition":null,"offset":null,"error_code":50002,"error":"Kafka error"}
            ]}"#,
        );
        let (publisher, stats) = publisher(
            &config(Some("https://proxy:8082"), Some("metrics")),
            transport,
        );

        let outcome = publisher.publish(batch()).unwrap().outcome().await.unwrap();
        match outcome {
            PublishOutcome::Completed { record_errors, .. } => assert_eq!(record_errors, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(stats.last_exception(), 1_000);
    }

    #[tokio::test]
    async fn test_error_status_still_completes() {
        let transport = RecordingTransport::with_status(500, "not json");
        let (publisher, stats) = publisher(
            &config(Some("http://proxy:8082"), Some("metrics")),
            transport.clone(),
        );

        let started = stats::now();
        let outcome = publisher.publish(batch()).unwrap().outcome().await.unwrap();

        match outcome {
            PublishOutcome::Completed {
                status,
                flush_length,
                record_errors,
                ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(record_errors, 0);
                assert_eq!(flush_length, transport.requests()[0].body.len() as u64);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(stats.last_flush() >= started);
        assert_eq!(stats.flush_length(), transport.requests()[0].body.len() as u64);
        assert_eq!(stats.last_exception(), 1_000);
    }

    #[tokio::test]
    async fn test_handle_reports_sent_until_answered() {
        let transport = Arc::new(GatedTransport {
            release: Notify::new(),
        });
        let (publisher, stats) = publisher(
            &config(Some("http://proxy:8082"), Some("metrics")),
            transport.clone(),
        );

        let handle = publisher.publish(batch()).unwrap();
        assert_eq!(handle.state(), PublishState::Sent);
        assert_eq!(stats.flush_length(), 0);

        transport.release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.state() == PublishState::Sent {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("request should complete");

        assert_eq!(handle.state(), PublishState::Completed);
        assert!(stats.flush_length() > 0);
        assert_eq!(handle.outcome().await.unwrap().state(), PublishState::Completed);
    }

    #[test]
    fn test_encode_envelope() {
        let body = encode(&batch()).unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            concat!(
                r#"{"records":[{"value":{"metric":"stats.foo","value":2.5,"#,
                r#""timestamp":1700000000,"type":"gauge"}}]}"#
            )
        );
    }
}
