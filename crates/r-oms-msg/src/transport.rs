//! ---
//! oms_section: "02-messaging-ipc-data-model"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Delivery envelopes and transport abstractions."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::types::Envelope;
use crate::{MessagingError, Result};

/// Transport abstraction with at-least-once delivery semantics.
///
/// A pulled delivery stays leased until it is acknowledged or returned.
/// Consumers must not acknowledge before their decision cycle has
/// attempted its durable write; a returned delivery is redelivered with
/// an incremented attempt counter.
pub trait Transport: Send + Sync {
    /// Enqueue an envelope for delivery.
    fn publish(&self, envelope: Envelope) -> Result<()>;
    /// Lease the next available delivery, if any.
    fn pull(&self) -> Option<LeasedDelivery>;
    /// Acknowledge a leased delivery, removing it permanently.
    fn ack(&self, lease: u64) -> Result<()>;
    /// Return a leased delivery to the queue for redelivery.
    fn nack(&self, lease: u64) -> Result<()>;
    /// Human-readable transport name for logging/metrics.
    fn name(&self) -> &'static str;
}

/// A delivery handed to a consumer together with its lease tag.
#[derive(Debug, Clone)]
pub struct LeasedDelivery {
    /// Lease tag to pass back to [`Transport::ack`] or [`Transport::nack`].
    pub lease: u64,
    /// The delivered envelope.
    pub envelope: Envelope,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<Envelope>,
    inflight: HashMap<u64, Envelope>,
    next_lease: u64,
}

/// In-memory transport backed by a mutex protected queue.
///
/// Single-process stand-in for a broker; used by the daemon's
/// single-instance deployment and by tests.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryTransport {
    /// Create a new empty transport channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of envelopes waiting for delivery.
    pub fn pending(&self) -> usize {
        self.inner.lock().expect("transport poisoned").queue.len()
    }

    /// Number of leased envelopes awaiting acknowledgment.
    pub fn in_flight(&self) -> usize {
        self.inner
            .lock()
            .expect("transport poisoned")
            .inflight
            .len()
    }
}

impl Transport for InMemoryTransport {
    fn publish(&self, envelope: Envelope) -> Result<()> {
        let mut guard = self.inner.lock().expect("transport poisoned");
        guard.queue.push_back(envelope);
        Ok(())
    }

    fn pull(&self) -> Option<LeasedDelivery> {
        let mut guard = self.inner.lock().expect("transport poisoned");
        let envelope = guard.queue.pop_front()?;
        guard.next_lease = guard.next_lease.wrapping_add(1);
        let lease = guard.next_lease;
        guard.inflight.insert(lease, envelope.clone());
        Some(LeasedDelivery { lease, envelope })
    }

    fn ack(&self, lease: u64) -> Result<()> {
        let mut guard = self.inner.lock().expect("transport poisoned");
        guard
            .inflight
            .remove(&lease)
            .map(|_| ())
            .ok_or(MessagingError::UnknownLease(lease))
    }

    fn nack(&self, lease: u64) -> Result<()> {
        let mut guard = self.inner.lock().expect("transport poisoned");
        let mut envelope = guard
            .inflight
            .remove(&lease)
            .ok_or(MessagingError::UnknownLease(lease))?;
        envelope.attempt += 1;
        tracing::debug!(envelope_id = %envelope.id, attempt = envelope.attempt, "delivery returned for redelivery");
        guard.queue.push_back(envelope);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_pull_ack_cycle() {
        let transport = InMemoryTransport::new();
        transport
            .publish(Envelope::new(b"payload".to_vec()))
            .expect("publish succeeds");
        assert_eq!(transport.pending(), 1);

        let delivery = transport.pull().expect("delivery available");
        assert_eq!(delivery.envelope.data, b"payload");
        assert_eq!(transport.pending(), 0);
        assert_eq!(transport.in_flight(), 1);

        transport.ack(delivery.lease).expect("ack succeeds");
        assert_eq!(transport.in_flight(), 0);
        assert!(transport.pull().is_none());
    }

    #[test]
    fn nack_redelivers_with_incremented_attempt() {
        let transport = InMemoryTransport::new();
        transport
            .publish(Envelope::new(b"flaky".to_vec()))
            .expect("publish succeeds");

        let first = transport.pull().expect("first delivery");
        assert_eq!(first.envelope.attempt, 0);
        transport.nack(first.lease).expect("nack succeeds");

        let second = transport.pull().expect("redelivered");
        assert_eq!(second.envelope.attempt, 1);
        assert_eq!(second.envelope.id, first.envelope.id);
    }

    #[test]
    fn double_ack_reports_unknown_lease() {
        let transport = InMemoryTransport::new();
        transport
            .publish(Envelope::new(Vec::new()))
            .expect("publish succeeds");
        let delivery = transport.pull().expect("delivery");
        transport.ack(delivery.lease).expect("first ack");
        assert!(matches!(
            transport.ack(delivery.lease),
            Err(MessagingError::UnknownLease(_))
        ));
    }
}
