//! ---
//! oms_section: "01-core-functionality"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Delivery orchestration shell around the correlation engine."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use r_oms_common::config::PipelineConfig;
use r_oms_engine::{CorrelationEngine, EngineError, Outcome, OutagePublisher};
use r_oms_metrics::PipelineMetrics;
use r_oms_msg::{LeasedDelivery, Transport};
use r_oms_schema::TelemetryEvent;
use r_oms_store::StatusStore;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// What to do with a delivery once its decision cycle has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Commit the delivery; redelivery would change nothing.
    Ack,
    /// Hand the delivery back so the transport redelivers it later.
    Redeliver,
}

/// Orchestration shell around the correlation engine.
///
/// Pulls deliveries with a worker pool for cross-device parallelism;
/// per-device serialization lives inside the engine. Each delivery is
/// acknowledged exactly when the error taxonomy says so: malformed
/// payloads and completed decision cycles commit, transient failures
/// retry locally with backoff and only then defer to transport-level
/// redelivery. A structurally valid delivery is never acknowledged
/// before its durable write has been attempted.
pub struct OutageProcessor<S, P> {
    engine: CorrelationEngine<S, P>,
    inbound: Arc<dyn Transport>,
    config: PipelineConfig,
    metrics: Option<PipelineMetrics>,
}

impl<S, P> OutageProcessor<S, P>
where
    S: StatusStore + 'static,
    P: OutagePublisher + 'static,
{
    /// Wire the engine to its inbound telemetry transport.
    pub fn new(
        engine: CorrelationEngine<S, P>,
        inbound: Arc<dyn Transport>,
        config: PipelineConfig,
        metrics: Option<PipelineMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            inbound,
            config,
            metrics,
        })
    }

    /// Start the worker pool and return a handle for lifecycle control.
    pub fn spawn(self: &Arc<Self>, shutdown: &broadcast::Sender<()>) -> ProcessorHandle {
        let mut workers = Vec::with_capacity(self.config.workers);
        for worker_id in 0..self.config.workers {
            let processor = self.clone();
            let shutdown_rx = shutdown.subscribe();
            workers.push(tokio::spawn(async move {
                processor.worker(worker_id, shutdown_rx).await;
            }));
        }
        ProcessorHandle { workers }
    }

    async fn worker(self: Arc<Self>, worker_id: usize, mut shutdown: broadcast::Receiver<()>) {
        debug!(worker_id, transport = self.inbound.name(), "outage worker started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(worker_id, "outage worker shutdown signal received");
                    break;
                }
                delivery = poll_next(&*self.inbound, self.config.poll_interval) => {
                    self.handle(worker_id, delivery).await;
                }
            }
        }
    }

    async fn handle(&self, worker_id: usize, delivery: LeasedDelivery) {
        let lease = delivery.lease;
        match self.process_delivery(&delivery).await {
            Disposition::Ack => {
                if let Err(err) = self.inbound.ack(lease) {
                    error!(worker_id, error = %err, "failed to acknowledge delivery");
                }
            }
            Disposition::Redeliver => {
                if let Err(err) = self.inbound.nack(lease) {
                    error!(worker_id, error = %err, "failed to return delivery");
                }
            }
        }
    }

    async fn process_delivery(&self, delivery: &LeasedDelivery) -> Disposition {
        let event = match TelemetryEvent::parse(&delivery.envelope.data) {
            Ok(event) => event,
            Err(err) => {
                // Redelivery cannot fix a structurally bad payload.
                warn!(
                    envelope_id = %delivery.envelope.id,
                    error = %err,
                    "dropping malformed delivery"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.inc_malformed();
                }
                return Disposition::Ack;
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.inc_event(event.source_system.as_str());
        }

        let retry = self.config.retry;
        for attempt in 0..retry.max_attempts {
            let started = Instant::now();
            match self.engine.process(&event).await {
                Ok(outcome) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.observe_decision(started.elapsed().as_secs_f64());
                        match &outcome {
                            Outcome::NoOp(reason) => metrics.inc_noop(reason.as_str()),
                            Outcome::Applied(notice) => metrics.inc_notice(notice.kind()),
                        }
                    }
                    return Disposition::Ack;
                }
                Err(err) => {
                    if let Some(metrics) = &self.metrics {
                        if matches!(err, EngineError::ConflictExhausted { .. }) {
                            metrics.inc_conflict();
                        }
                    }
                    let backoff = retry.backoff_for(attempt);
                    warn!(
                        device_id = %event.device_id,
                        attempt = attempt + 1,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient decision failure; backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.inc_redelivery();
        }
        warn!(
            device_id = %event.device_id,
            envelope_id = %delivery.envelope.id,
            "local retries exhausted; deferring to transport redelivery"
        );
        Disposition::Redeliver
    }
}

/// Handle to the running worker pool.
pub struct ProcessorHandle {
    workers: Vec<JoinHandle<()>>,
}

impl ProcessorHandle {
    /// Await every worker after the shutdown signal has fired.
    pub async fn join(self) -> Result<()> {
        for worker in self.workers {
            if let Err(err) = worker.await {
                error!(error = %err, "outage worker join error");
            }
        }
        Ok(())
    }
}

async fn poll_next(transport: &dyn Transport, interval: Duration) -> LeasedDelivery {
    loop {
        if let Some(delivery) = transport.pull() {
            return delivery;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use r_oms_engine::publisher::PublishError;
    use r_oms_engine::{EngineConfig, TransportPublisher};
    use r_oms_msg::{Envelope, InMemoryTransport};
    use r_oms_schema::{OutageNotice, OutagePriority};
    use r_oms_store::InMemoryStatusStore;
    use serde_json::json;

    fn pipeline_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.workers = 2;
        config.poll_interval = Duration::from_millis(5);
        config.retry.max_attempts = 2;
        config.retry.initial_backoff = Duration::from_millis(1);
        config
    }

    fn telemetry_payload(device: &str, source: &str, status: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "device_id": device,
            "source_system": source,
            "status": status,
            "timestamp": Utc::now().to_rfc3339(),
        }))
        .expect("serialize")
    }

    struct AlwaysFailingPublisher;

    #[async_trait]
    impl OutagePublisher for AlwaysFailingPublisher {
        async fn publish(&self, _notice: &OutageNotice) -> std::result::Result<(), PublishError> {
            Err(PublishError::Backend("downstream unavailable".to_owned()))
        }
    }

    #[tokio::test]
    async fn pipeline_processes_deliveries_end_to_end() {
        let inbound = Arc::new(InMemoryTransport::new());
        let outages = Arc::new(InMemoryTransport::new());
        let store = InMemoryStatusStore::new();
        let engine = CorrelationEngine::new(
            store.clone(),
            TransportPublisher::new(outages.clone()),
            EngineConfig::default(),
        );
        let processor =
            OutageProcessor::new(engine, inbound.clone(), pipeline_config(), None);

        inbound
            .publish(Envelope::new(telemetry_payload("TX-001", "AMI", "OFF")))
            .expect("publish");
        inbound
            .publish(Envelope::new(b"not even json".to_vec()))
            .expect("publish");

        let (shutdown_tx, _) = broadcast::channel(4);
        let handle = processor.spawn(&shutdown_tx);

        for _ in 0..200 {
            if inbound.pending() == 0 && inbound.in_flight() == 0 && outages.pending() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = shutdown_tx.send(());
        handle.join().await.expect("join");

        // One created outage, the malformed delivery silently committed.
        assert_eq!(outages.pending(), 1);
        let delivery = outages.pull().expect("notice");
        let notice: OutageNotice = serde_json::from_slice(&delivery.envelope.data).expect("decode");
        let OutageNotice::Created(record) = notice else {
            panic!("expected a creation notice");
        };
        assert_eq!(record.priority, OutagePriority::MeterBased);
        assert_eq!(inbound.pending(), 0);
        assert_eq!(inbound.in_flight(), 0);
    }

    #[tokio::test]
    async fn malformed_delivery_is_acked_without_state_mutation() {
        let inbound = Arc::new(InMemoryTransport::new());
        let outages = Arc::new(InMemoryTransport::new());
        let store = InMemoryStatusStore::new();
        let engine = CorrelationEngine::new(
            store.clone(),
            TransportPublisher::new(outages.clone()),
            EngineConfig::default(),
        );
        let processor = OutageProcessor::new(engine, inbound.clone(), pipeline_config(), None);

        // Missing device_id.
        inbound
            .publish(Envelope::new(
                serde_json::to_vec(&json!({
                    "source_system": "SCADA",
                    "status": "OFF",
                    "timestamp": "2024-06-01T12:00:00Z"
                }))
                .expect("serialize"),
            ))
            .expect("publish");

        let delivery = inbound.pull().expect("delivery");
        let disposition = processor.process_delivery(&delivery).await;
        assert_eq!(disposition, Disposition::Ack);
        assert_eq!(store.device_count(), 0);
        assert_eq!(outages.pending(), 0);
    }

    #[tokio::test]
    async fn exhausted_transient_failures_defer_to_redelivery() {
        let inbound = Arc::new(InMemoryTransport::new());
        let engine = CorrelationEngine::new(
            InMemoryStatusStore::new(),
            AlwaysFailingPublisher,
            EngineConfig::default(),
        );
        let processor = OutageProcessor::new(engine, inbound.clone(), pipeline_config(), None);

        inbound
            .publish(Envelope::new(telemetry_payload("TX-002", "SCADA", "OFF")))
            .expect("publish");
        let delivery = inbound.pull().expect("delivery");
        let disposition = processor.process_delivery(&delivery).await;
        assert_eq!(disposition, Disposition::Redeliver);
    }

    #[tokio::test]
    async fn unknown_status_string_is_dropped_as_malformed() {
        let inbound = Arc::new(InMemoryTransport::new());
        let outages = Arc::new(InMemoryTransport::new());
        let store = InMemoryStatusStore::new();
        let engine = CorrelationEngine::new(
            store.clone(),
            TransportPublisher::new(outages.clone()),
            EngineConfig::default(),
        );
        let processor = OutageProcessor::new(engine, inbound.clone(), pipeline_config(), None);

        inbound
            .publish(Envelope::new(telemetry_payload(
                "TX-003",
                "SCADA",
                "FLICKERING",
            )))
            .expect("publish");
        let delivery = inbound.pull().expect("delivery");
        assert_eq!(processor.process_delivery(&delivery).await, Disposition::Ack);
        assert_eq!(store.device_count(), 0);
    }
}
