//! Prometheus metrics for worker observability.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OutcomeLabel(pub String);

impl prometheus_client::encoding::EncodeLabelSet for OutcomeLabel {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("outcome", self.0.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct WorkerMetrics {
    pub batches_received: Counter,
    pub objects_processed: Family<OutcomeLabel, Counter>,
    pub findings_detected: Counter,
    pub in_flight: Gauge,
    pub registry: Arc<Registry>,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let batches_received = Counter::default();
        registry.register(
            "sift_worker_batches_received_total",
            "Message batches pulled off the queue",
            batches_received.clone(),
        );

        let objects_processed = Family::<OutcomeLabel, Counter>::default();
        registry.register(
            "sift_worker_objects_processed_total",
            "Objects processed by outcome",
            objects_processed.clone(),
        );

        let findings_detected = Counter::default();
        registry.register(
            "sift_worker_findings_detected_total",
            "Findings detected across all objects",
            findings_detected.clone(),
        );

        let in_flight = Gauge::default();
        registry.register(
            "sift_worker_in_flight",
            "Envelopes currently being processed",
            in_flight.clone(),
        );

        Self {
            batches_received,
            objects_processed,
            findings_detected,
            in_flight,
            registry: Arc::new(registry),
        }
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        encode(&mut buf, &self.registry).unwrap();
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_creates_all_metrics() {
        let metrics = WorkerMetrics::new();
        let output = metrics.encode();

        assert!(output.contains("sift_worker_batches_received_total"));
        assert!(output.contains("sift_worker_objects_processed_total"));
        assert!(output.contains("sift_worker_findings_detected_total"));
        assert!(output.contains("sift_worker_in_flight"));
    }

    #[test]
    fn outcome_labels_encode() {
        let metrics = WorkerMetrics::new();
        metrics
            .objects_processed
            .get_or_create(&OutcomeLabel("succeeded".to_string()))
            .inc();
        metrics
            .objects_processed
            .get_or_create(&OutcomeLabel("skipped".to_string()))
            .inc();

        let output = metrics.encode();
        assert!(output.contains("outcome=\"succeeded\""));
        assert!(output.contains("outcome=\"skipped\""));
    }

    #[test]
    fn gauge_set_reflected_in_encode() {
        let metrics = WorkerMetrics::new();
        metrics.in_flight.set(4);
        assert!(metrics.encode().contains("sift_worker_in_flight 4"));
    }
}
