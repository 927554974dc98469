//! ---
//! oms_section: "01-core-functionality"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Outage detection and cross-source correlation state machine."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use r_oms_schema::{DeviceState, ObservedStatus, OutagePriority, SourceSystem, TelemetryEvent};

/// Why a decision cycle produced no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    /// `OFF` observed while the episode is already open.
    DuplicateOff,
    /// `ON` observed with no open episode.
    AlreadyOn,
    /// Customer report held until an authoritative source corroborates.
    AwaitingCorroboration,
    /// The open episode was already confirmed by the call center.
    AlreadyConfirmed,
    /// Recognized values in an unmodeled combination; forward-compatible drop.
    UnmodeledPair,
}

impl NoOpReason {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            NoOpReason::DuplicateOff => "duplicate_off",
            NoOpReason::AlreadyOn => "already_on",
            NoOpReason::AwaitingCorroboration => "awaiting_corroboration",
            NoOpReason::AlreadyConfirmed => "already_confirmed",
            NoOpReason::UnmodeledPair => "unmodeled_pair",
        }
    }
}

/// Tagged decision produced by [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Leave state and downstream consumers untouched.
    NoOp(NoOpReason),
    /// Open a new episode with the given triage priority.
    CreateOutage {
        /// Priority derived from the confirming source.
        priority: OutagePriority,
    },
    /// Raise the open episode to `CONFIRMED`, reusing its identifier.
    UpgradeOutage,
    /// Close the open episode.
    Restore,
}

/// The transition table, as a pure function of persisted state and event.
///
/// Call-center reports are low confidence and never open an outage on
/// their own; they only raise the priority of an episode an
/// authoritative source already opened. An authoritative `OFF` is
/// sufficient by itself, with AMI marked `METER_BASED` to stay
/// distinguishable from SCADA for downstream triage.
pub fn evaluate(state: &DeviceState, event: &TelemetryEvent) -> Decision {
    match (event.source_system, event.status) {
        (SourceSystem::Scada | SourceSystem::Ami, ObservedStatus::Off) => {
            if state.is_off() {
                Decision::NoOp(NoOpReason::DuplicateOff)
            } else {
                let priority = match event.source_system {
                    SourceSystem::Ami => OutagePriority::MeterBased,
                    _ => OutagePriority::Normal,
                };
                Decision::CreateOutage { priority }
            }
        }
        (SourceSystem::CallCenter, ObservedStatus::OutageReported) => {
            if !state.is_off() {
                Decision::NoOp(NoOpReason::AwaitingCorroboration)
            } else if state.confirmed_by == Some(SourceSystem::CallCenter) {
                Decision::NoOp(NoOpReason::AlreadyConfirmed)
            } else {
                Decision::UpgradeOutage
            }
        }
        (_, ObservedStatus::On) => {
            if state.is_off() {
                Decision::Restore
            } else {
                Decision::NoOp(NoOpReason::AlreadyOn)
            }
        }
        // (SCADA|AMI, OUTAGE_REPORTED) and (CALL_CENTER, OFF) have no row.
        _ => Decision::NoOp(NoOpReason::UnmodeledPair),
    }
}
