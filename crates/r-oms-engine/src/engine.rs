//! ---
//! oms_section: "01-core-functionality"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Outage detection and cross-source correlation state machine."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use r_oms_schema::{
    DeviceState, OutageNotice, OutagePriority, OutageRecord, OutageStatus, PowerStatus,
    RestorationRecord, TelemetryEvent,
};
use r_oms_store::{StatusStore, StoreError};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::publisher::{OutagePublisher, PublishError};
use crate::rules::{evaluate, Decision, NoOpReason};
use crate::{EngineError, Result};

/// Tunables for the decision cycle.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Deadline applied to every store and publisher call.
    pub op_timeout: Duration,
    /// Bounded re-read attempts after a conditional-write conflict.
    pub conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(10),
            conflict_retries: 3,
        }
    }
}

/// Effect of one decision cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing changed; the delivery is acknowledged as processed.
    NoOp(NoOpReason),
    /// A lifecycle transition was written and published.
    Applied(OutageNotice),
}

/// The outage correlation engine.
///
/// Consumes one validated event at a time and drives the status store
/// and publisher through an effectively-atomic decision cycle:
/// read, evaluate the transition table, conditionally write, publish.
///
/// Two layers of protection keep one physical episode from producing
/// two records: an in-process per-device mutex serializes cycles within
/// this instance, and the store's conditional write arbitrates between
/// replicas that share no memory. The publish happens only after the
/// conditional write succeeds, so a replica losing the race never emits
/// a record; on conflict the cycle re-reads and re-evaluates instead of
/// trusting its stale read.
pub struct CorrelationEngine<S, P> {
    store: S,
    publisher: P,
    config: EngineConfig,
    locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S, P> CorrelationEngine<S, P>
where
    S: StatusStore,
    P: OutagePublisher,
{
    /// Build an engine over the given store and publisher.
    pub fn new(store: S, publisher: P, config: EngineConfig) -> Self {
        Self {
            store,
            publisher,
            config,
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Run one decision cycle for a validated event.
    pub async fn process(&self, event: &TelemetryEvent) -> Result<Outcome> {
        let lock = self.device_lock(&event.device_id);
        let _serial = lock.lock().await;

        let mut attempts = 0u32;
        loop {
            let prior = self
                .store_op(self.store.read(&event.device_id), "read")
                .await?;
            let decision = evaluate(&prior, event);

            let (next, notice) = match decision {
                Decision::NoOp(reason) => {
                    debug!(
                        device_id = %event.device_id,
                        source = %event.source_system,
                        status = %event.status,
                        reason = reason.as_str(),
                        "decision cycle is a no-op"
                    );
                    return Ok(Outcome::NoOp(reason));
                }
                Decision::CreateOutage { priority } => build_create(event, priority),
                Decision::UpgradeOutage => build_upgrade(&prior, event),
                Decision::Restore => build_restore(&prior, event),
            };

            let written = self
                .store_op(
                    self.store.compare_and_set(&event.device_id, &prior, next),
                    "compare_and_set",
                )
                .await?;
            if !written {
                attempts += 1;
                if attempts > self.config.conflict_retries {
                    return Err(EngineError::ConflictExhausted { attempts });
                }
                debug!(
                    device_id = %event.device_id,
                    attempts,
                    "conditional write conflict; re-reading"
                );
                continue;
            }

            match timeout(self.config.op_timeout, self.publisher.publish(&notice)).await {
                Ok(result) => result?,
                Err(_) => return Err(EngineError::Publish(PublishError::Timeout)),
            }
            info!(
                device_id = %event.device_id,
                kind = notice.kind(),
                outage_id = ?notice.outage_id(),
                source = %event.source_system,
                "lifecycle transition applied"
            );
            return Ok(Outcome::Applied(notice));
        }
    }

    async fn store_op<T>(
        &self,
        operation: impl Future<Output = r_oms_store::Result<T>>,
        name: &'static str,
    ) -> Result<T> {
        match timeout(self.config.op_timeout, operation).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EngineError::Store(StoreError::Timeout(name))),
        }
    }

    fn device_lock(&self, device_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.locks.lock();
        guard.entry(device_id.to_owned()).or_default().clone()
    }
}

fn build_create(event: &TelemetryEvent, priority: OutagePriority) -> (DeviceState, OutageNotice) {
    let outage_id = Uuid::new_v4();
    let record = OutageRecord {
        outage_id,
        device_id: event.device_id.clone(),
        start_time: event.event_time,
        source_system: event.source_system,
        priority,
        status: OutageStatus::Active,
    };
    let next = DeviceState {
        status: PowerStatus::Off,
        active_outage_id: Some(outage_id),
        confirmed_by: Some(event.source_system),
        last_update: Some(Utc::now()),
    };
    (next, OutageNotice::Created(record))
}

fn build_upgrade(prior: &DeviceState, event: &TelemetryEvent) -> (DeviceState, OutageNotice) {
    let outage_id = prior.active_outage_id.unwrap_or_else(|| {
        warn!(device_id = %event.device_id, "open episode missing its outage id; assigning one");
        Uuid::new_v4()
    });
    let record = OutageRecord {
        outage_id,
        device_id: event.device_id.clone(),
        start_time: event.event_time,
        source_system: event.source_system,
        priority: OutagePriority::Confirmed,
        status: OutageStatus::Active,
    };
    let next = DeviceState {
        status: PowerStatus::Off,
        active_outage_id: Some(outage_id),
        confirmed_by: Some(event.source_system),
        last_update: Some(Utc::now()),
    };
    (next, OutageNotice::Upgraded(record))
}

fn build_restore(prior: &DeviceState, event: &TelemetryEvent) -> (DeviceState, OutageNotice) {
    let record = RestorationRecord {
        outage_id: prior.active_outage_id,
        device_id: event.device_id.clone(),
        restored_at: event.event_time,
        source_system: event.source_system,
    };
    let next = DeviceState {
        status: PowerStatus::On,
        active_outage_id: None,
        confirmed_by: None,
        last_update: Some(Utc::now()),
    };
    (next, OutageNotice::Restored(record))
}
