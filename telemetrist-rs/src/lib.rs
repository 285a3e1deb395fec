//! # Telemetrist - Diagnostics Metrics Sink
//!
//! Collects counters and timers emitted while diagnosing failures and
//! publishes them in batches to a metrics endpoint. Recording is
//! fire-and-forget: callers never see a publishing error.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Unit attached to a datapoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    Count,
    Milliseconds,
    Seconds,
    None,
}

/// A single metric datapoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDatum {
    pub name: String,
    pub value: f64,
    pub unit: MetricUnit,
    pub dimensions: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl MetricDatum {
    pub fn new(name: impl Into<String>, value: f64, unit: MetricUnit) -> Self {
        Self {
            name: name.into(),
            value,
            unit,
            dimensions: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// A count of one
    pub fn count(name: impl Into<String>) -> Self {
        Self::new(name, 1.0, MetricUnit::Count)
    }

    pub fn millis(name: impl Into<String>, value: u64) -> Self {
        Self::new(name, value as f64, MetricUnit::Milliseconds)
    }

    pub fn with_dimension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(key.into(), value.into());
        self
    }
}

/// Destination for metrics. Implementations must swallow their own failures.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record(&self, datum: MetricDatum);

    /// Publish anything still buffered
    async fn flush(&self) {}
}

/// Discards everything
#[derive(Debug, Default, Clone)]
pub struct NoopSink;

#[async_trait]
impl MetricsSink for NoopSink {
    async fn record(&self, _datum: MetricDatum) {}
}

/// Keeps every datapoint in memory; used by tests and local runs
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    data: Arc<Mutex<Vec<MetricDatum>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Vec<MetricDatum> {
        self.data.lock().await.clone()
    }

    /// Sum of all values recorded under `name`
    pub async fn total(&self, name: &str) -> f64 {
        self.data
            .lock()
            .await
            .iter()
            .filter(|d| d.name == name)
            .map(|d| d.value)
            .sum()
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn record(&self, datum: MetricDatum) {
        self.data.lock().await.push(datum);
    }
}

/// Configuration for telemetrist
#[derive(Debug, Clone)]
pub struct TelemetristConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub namespace: String,
    pub batch_size: usize,
    pub request_timeout: Duration,
}

impl TelemetristConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: config_rs::get_env_bool("TELEMETRY_ENABLED", false),
            endpoint: config_rs::get_endpoint("TELEMETRY", "http://localhost:4318/v1/metrics"),
            namespace: config_rs::get_env_string("TELEMETRY_NAMESPACE")
                .unwrap_or_else(|| "DE-Agent".to_string()),
            batch_size: config_rs::get_env_or("TELEMETRY_BATCH_SIZE", 20usize).max(1),
            request_timeout: config_rs::get_env_duration_secs("TELEMETRY_TIMEOUT_SECS", 10),
        }
    }
}

/// Body POSTed to the metrics endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricBatch {
    pub namespace: String,
    pub metrics: Vec<MetricDatum>,
}

/// Batching HTTP publisher.
///
/// Full batches are sent from spawned tasks so `record` never waits on the
/// endpoint. `flush` publishes the remainder and waits for sends still in
/// flight; dropping the publisher aborts them.
pub struct Telemetrist {
    publisher: Arc<Publisher>,
    queue: Mutex<VecDeque<MetricDatum>>,
    in_flight: Mutex<JoinSet<()>>,
}

struct Publisher {
    config: TelemetristConfig,
    http_client: reqwest::Client,
}

impl Publisher {
    async fn publish(&self, batch: Vec<MetricDatum>) {
        let count = batch.len();
        match self.send_batch(batch).await {
            Ok(()) => log::debug!("Published {} metric datapoints", count),
            // Dropped; publishing must never affect a diagnosis
            Err(e) => log::warn!("Failed to publish {} metric datapoints: {}", count, e),
        }
    }

    async fn send_batch(&self, metrics: Vec<MetricDatum>) -> Result<(), TelemetristError> {
        let body = MetricBatch {
            namespace: self.config.namespace.clone(),
            metrics,
        };

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| TelemetristError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TelemetristError::Status(response.status().as_u16()));
        }

        Ok(())
    }
}

impl Telemetrist {
    pub fn new(config: TelemetristConfig) -> Result<Self, TelemetristError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TelemetristError::Http(e.to_string()))?;

        Ok(Self {
            publisher: Arc::new(Publisher { config, http_client }),
            queue: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(JoinSet::new()),
        })
    }

    /// Datapoints queued and not yet handed to a send
    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    async fn take_batch(&self) -> Vec<MetricDatum> {
        let mut queue = self.queue.lock().await;
        let n = queue.len().min(self.publisher.config.batch_size);
        queue.drain(..n).collect()
    }
}

#[async_trait]
impl MetricsSink for Telemetrist {
    async fn record(&self, datum: MetricDatum) {
        if !self.publisher.config.enabled {
            return;
        }

        let batch = {
            let mut queue = self.queue.lock().await;
            queue.push_back(datum);
            if queue.len() < self.publisher.config.batch_size {
                return;
            }
            queue.drain(..).collect::<Vec<_>>()
        };

        let publisher = Arc::clone(&self.publisher);
        let mut in_flight = self.in_flight.lock().await;
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(async move { publisher.publish(batch).await });
    }

    async fn flush(&self) {
        loop {
            let batch = self.take_batch().await;
            if batch.is_empty() {
                break;
            }
            self.publisher.publish(batch).await;
        }

        let mut in_flight = std::mem::take(&mut *self.in_flight.lock().await);
        while in_flight.join_next().await.is_some() {}
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetristError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Metrics endpoint returned status: {0}")]
    Status(u16),
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(endpoint: String, batch_size: usize) -> TelemetristConfig {
        TelemetristConfig {
            enabled: true,
            endpoint,
            namespace: "DE-Agent".to_string(),
            batch_size,
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_memory_sink_totals() {
        let sink = MemorySink::new();
        sink.record(MetricDatum::count("probe.success").with_dimension("probe", "dag_state")).await;
        sink.record(MetricDatum::count("probe.success").with_dimension("probe", "mwaa_logs")).await;
        sink.record(MetricDatum::millis("processing_time_ms", 120)).await;

        assert_eq!(sink.total("probe.success").await, 2.0);
        assert_eq!(sink.snapshot().await.len(), 3);
    }

    #[tokio::test]
    async fn test_batch_published_when_full() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/metrics"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let telemetrist = Telemetrist::new(test_config(format!("{}/metrics", mock_server.uri()), 2)).unwrap();
        telemetrist.record(MetricDatum::count("diagnosis.completed")).await;
        assert_eq!(telemetrist.pending().await, 1);
        telemetrist.record(MetricDatum::count("diagnosis.completed")).await;
        assert_eq!(telemetrist.pending().await, 0);
        telemetrist.flush().await;

        let requests = mock_server.received_requests().await.unwrap();
        let body: MetricBatch = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body.namespace, "DE-Agent");
        assert_eq!(body.metrics.len(), 2);
    }

    #[tokio::test]
    async fn test_endpoint_failure_is_swallowed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let telemetrist = Telemetrist::new(test_config(mock_server.uri(), 10)).unwrap();
        telemetrist.record(MetricDatum::count("probe.failure")).await;
        telemetrist.flush().await;

        assert_eq!(telemetrist.pending().await, 0);
    }

    #[tokio::test]
    async fn test_record_does_not_wait_for_slow_endpoint() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let telemetrist = Telemetrist::new(test_config(mock_server.uri(), 1)).unwrap();
        let started = std::time::Instant::now();
        for _ in 0..3 {
            telemetrist.record(MetricDatum::count("probe.success")).await;
        }
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(telemetrist.pending().await, 0);

        telemetrist.flush().await;
        assert_eq!(mock_server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_disabled_records_nothing() {
        let mut config = test_config("http://127.0.0.1:9".to_string(), 1);
        config.enabled = false;
        let telemetrist = Telemetrist::new(config).unwrap();

        telemetrist.record(MetricDatum::count("probe.success")).await;
        assert_eq!(telemetrist.pending().await, 0);
    }
}
