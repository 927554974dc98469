//! ---
//! oms_section: "03-persistence-logging"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Metrics collection and export utilities."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape endpoint. Returns `text/plain` metrics even on large registries.
async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_str(encoder.format_type())
                    .unwrap_or_else(|_| HeaderValue::from_static("text/plain")),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the telemetry pipeline.
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: SharedRegistry,
    events_total: IntCounterVec,
    malformed_total: IntCounter,
    noops_total: IntCounterVec,
    notices_total: IntCounterVec,
    conflicts_total: IntCounter,
    redeliveries_total: IntCounter,
    decision_seconds: Histogram,
}

impl PipelineMetrics {
    /// Register the pipeline metric families on the shared registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let events_total = IntCounterVec::new(
            Opts::new(
                "r_oms_events_total",
                "Telemetry events accepted by the outage processor, by source",
            ),
            &["source"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let malformed_total = IntCounter::with_opts(Opts::new(
            "r_oms_malformed_total",
            "Deliveries dropped because the payload failed validation",
        ))?;
        registry.register(Box::new(malformed_total.clone()))?;

        let noops_total = IntCounterVec::new(
            Opts::new(
                "r_oms_noops_total",
                "Decision cycles that produced no effect, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(noops_total.clone()))?;

        let notices_total = IntCounterVec::new(
            Opts::new(
                "r_oms_notices_total",
                "Outage lifecycle notices published downstream, by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(notices_total.clone()))?;

        let conflicts_total = IntCounter::with_opts(Opts::new(
            "r_oms_conflicts_total",
            "Conditional-write conflicts that forced a re-read",
        ))?;
        registry.register(Box::new(conflicts_total.clone()))?;

        let redeliveries_total = IntCounter::with_opts(Opts::new(
            "r_oms_redeliveries_total",
            "Deliveries returned to the transport after retry exhaustion",
        ))?;
        registry.register(Box::new(redeliveries_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 14)
            .context("failed to construct histogram buckets")?;
        let decision_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "r_oms_decision_seconds",
                "Wall-clock duration of one decision cycle",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(decision_seconds.clone()))?;

        Ok(Self {
            registry,
            events_total,
            malformed_total,
            noops_total,
            notices_total,
            conflicts_total,
            redeliveries_total,
            decision_seconds,
        })
    }

    /// Access the backing registry.
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Count an accepted event by source label.
    pub fn inc_event(&self, source: &str) {
        self.events_total.with_label_values(&[source]).inc();
    }

    /// Count a dropped malformed delivery.
    pub fn inc_malformed(&self) {
        self.malformed_total.inc();
    }

    /// Count a no-op decision by reason label.
    pub fn inc_noop(&self, reason: &str) {
        self.noops_total.with_label_values(&[reason]).inc();
    }

    /// Count a published lifecycle notice by kind label.
    pub fn inc_notice(&self, kind: &str) {
        self.notices_total.with_label_values(&[kind]).inc();
    }

    /// Count a conditional-write conflict.
    pub fn inc_conflict(&self) {
        self.conflicts_total.inc();
    }

    /// Count a delivery handed back for transport-level redelivery.
    pub fn inc_redelivery(&self) {
        self.redeliveries_total.inc();
    }

    /// Observe one decision cycle's duration.
    pub fn observe_decision(&self, seconds: f64) {
        self.decision_seconds.observe(seconds);
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_families_register_once() {
        let registry = new_registry();
        let metrics = PipelineMetrics::new(registry.clone()).expect("registers");
        metrics.inc_event("SCADA");
        metrics.inc_noop("duplicate_off");
        metrics.inc_notice("created");
        metrics.observe_decision(0.004);

        let families = registry.gather();
        assert!(families
            .iter()
            .any(|family| family.get_name() == "r_oms_events_total"));

        // Registering the same families twice must fail loudly.
        assert!(PipelineMetrics::new(registry).is_err());
    }
}
