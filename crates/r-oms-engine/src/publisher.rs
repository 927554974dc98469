//! ---
//! oms_section: "01-core-functionality"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Outage detection and cross-source correlation state machine."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::sync::Arc;

use async_trait::async_trait;
use r_oms_msg::{Envelope, Transport};
use r_oms_schema::OutageNotice;
use tracing::debug;

/// Failures raised while handing a notice to downstream consumers.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The publish call exceeded its deadline.
    #[error("publish timed out")]
    Timeout,
    /// The publisher backend rejected or failed the call.
    #[error("publisher backend error: {0}")]
    Backend(String),
}

/// Delivers outage-lifecycle notices downstream, at least once.
#[async_trait]
pub trait OutagePublisher: Send + Sync {
    /// Publish one notice. Retried by the caller on failure.
    async fn publish(&self, notice: &OutageNotice) -> std::result::Result<(), PublishError>;
}

/// Publisher that serializes notices onto an outage transport.
#[derive(Clone)]
pub struct TransportPublisher {
    transport: Arc<dyn Transport>,
}

impl TransportPublisher {
    /// Wrap an outage transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl OutagePublisher for TransportPublisher {
    async fn publish(&self, notice: &OutageNotice) -> std::result::Result<(), PublishError> {
        let envelope =
            Envelope::json(notice).map_err(|err| PublishError::Backend(err.to_string()))?;
        self.transport
            .publish(envelope)
            .map_err(|err| PublishError::Backend(err.to_string()))?;
        debug!(
            kind = notice.kind(),
            device_id = notice.device_id(),
            transport = self.transport.name(),
            "outage notice published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use r_oms_msg::InMemoryTransport;
    use r_oms_schema::{RestorationRecord, SourceSystem};

    #[tokio::test]
    async fn notices_land_on_the_outage_transport() {
        let transport = Arc::new(InMemoryTransport::new());
        let publisher = TransportPublisher::new(transport.clone());

        let notice = OutageNotice::Restored(RestorationRecord {
            outage_id: None,
            device_id: "TX-001".to_owned(),
            restored_at: Utc::now(),
            source_system: SourceSystem::Scada,
        });
        publisher.publish(&notice).await.expect("publish succeeds");

        let delivery = transport.pull().expect("notice delivered");
        let decoded: OutageNotice =
            serde_json::from_slice(&delivery.envelope.data).expect("decodes");
        assert_eq!(decoded, notice);
    }
}
