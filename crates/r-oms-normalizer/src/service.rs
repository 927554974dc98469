//! ---
//! oms_section: "04-ingest-normalization"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Vendor feed normalizers translating raw payloads to the common schema."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use r_oms_msg::{Envelope, LeasedDelivery, Transport};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::archive::ArchiveSink;
use crate::Normalizer;

/// Consumes one raw vendor feed, archives it, and republishes the
/// normalized events onto the telemetry transport.
///
/// Malformed raw payloads are archived, logged, and acknowledged;
/// redelivery cannot fix them. Archive failures never break the
/// pipeline.
pub struct NormalizerService<N> {
    normalizer: N,
    inbound: Arc<dyn Transport>,
    outbound: Arc<dyn Transport>,
    archive: Arc<dyn ArchiveSink>,
    poll_interval: Duration,
}

impl<N: Normalizer> NormalizerService<N> {
    /// Wire a normalizer between its raw feed and the telemetry transport.
    pub fn new(
        normalizer: N,
        inbound: Arc<dyn Transport>,
        outbound: Arc<dyn Transport>,
        archive: Arc<dyn ArchiveSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            normalizer,
            inbound,
            outbound,
            archive,
            poll_interval,
        }
    }

    /// Run the consume loop until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let source = self.normalizer.source_system();
        debug!(source = %source, transport = self.inbound.name(), "normalizer service started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(source = %source, "normalizer shutdown signal received");
                    break;
                }
                delivery = poll_next(&*self.inbound, self.poll_interval) => {
                    self.handle(delivery)?;
                }
            }
        }
        Ok(())
    }

    fn handle(&self, delivery: LeasedDelivery) -> Result<()> {
        let source = self.normalizer.source_system();

        if let Err(err) = self.archive.record_raw(source, &delivery.envelope.data) {
            warn!(source = %source, error = %err, "raw archive write failed; pipeline continues");
        }

        match self.normalizer.normalize(&delivery.envelope.data) {
            Ok(event) => {
                if let Err(err) = self.archive.record_normalized(&event) {
                    warn!(source = %source, error = %err, "normalized archive write failed; pipeline continues");
                }
                let envelope = Envelope::json(&event)
                    .with_context(|| "failed to serialize normalized event")?;
                match self.outbound.publish(envelope) {
                    Ok(()) => {
                        debug!(
                            source = %source,
                            device_id = %event.device_id,
                            status = %event.status,
                            "normalized event published"
                        );
                        self.inbound
                            .ack(delivery.lease)
                            .with_context(|| "failed to acknowledge raw delivery")?;
                    }
                    Err(err) => {
                        warn!(source = %source, error = %err, "telemetry publish failed; returning delivery");
                        self.inbound
                            .nack(delivery.lease)
                            .with_context(|| "failed to return raw delivery")?;
                    }
                }
            }
            Err(err) => {
                warn!(
                    source = %source,
                    envelope_id = %delivery.envelope.id,
                    error = %err,
                    "dropping malformed raw payload"
                );
                self.inbound
                    .ack(delivery.lease)
                    .with_context(|| "failed to acknowledge malformed delivery")?;
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
