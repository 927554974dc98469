//! ---
//! oms_section: "11-simulation-test-harness"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Randomized vendor feed generator for simulation runs."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
#![warn(missing_docs)]

use std::collections::HashSet;

use chrono::Utc;
use r_oms_common::config::SimulationConfig;
use r_oms_normalizer::{RawAmiReading, RawCallReport, RawScadaEvent};
use rand::prelude::*;
use rand_distr::Normal;

const NOMINAL_FEEDER_KV: f64 = 11.0;
const NOMINAL_SERVICE_V: f64 = 120.0;

/// One raw vendor message produced by the generator.
#[derive(Debug, Clone)]
pub enum RawFeedMessage {
    /// A SCADA frame for the transformer feed.
    Scada(RawScadaEvent),
    /// An AMI reading for a meter hanging off the device.
    Ami(RawAmiReading),
    /// A customer report for the device's service area.
    CallCenter(RawCallReport),
}

/// Seeded generator producing correlated raw feeds for a device roster.
///
/// A tick picks one device. Healthy devices emit nominal SCADA/AMI
/// traffic; with the configured probability a device goes down, its
/// meter reading dips under the undervoltage threshold, and sometimes a
/// customer calls it in. A device found down on a later tick restores.
#[derive(Debug)]
pub struct FeedEngine {
    rng: StdRng,
    noise: Normal<f64>,
    devices: Vec<String>,
    outage_probability: f64,
    call_report_probability: f64,
    down: HashSet<String>,
}

impl FeedEngine {
    /// Build a generator from the simulation settings.
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.random_seed),
            noise: Normal::new(0.0, 0.2).expect("sigma must be positive"),
            devices: config.devices.clone(),
            outage_probability: config.outage_probability,
            call_report_probability: config.call_report_probability,
            down: HashSet::new(),
        }
    }

    /// Devices currently simulated as de-energized.
    pub fn down_devices(&self) -> impl Iterator<Item = &str> {
        self.down.iter().map(String::as_str)
    }

    /// Produce the raw messages for one tick.
    pub fn next_tick(&mut self) -> Vec<RawFeedMessage> {
        let device = self.devices[self.rng.gen_range(0..self.devices.len())].clone();
        let timestamp = Utc::now().to_rfc3339();

        if self.down.remove(&device) {
            return self.restoration_messages(&device, &timestamp);
        }

        let goes_down = self.rng.gen_bool(self.outage_probability);
        let mut messages = vec![
            self.scada_frame(&device, &timestamp, goes_down),
            self.ami_reading(&device, &timestamp, goes_down),
        ];
        if goes_down {
            self.down.insert(device.clone());
            if self.rng.gen_bool(self.call_report_probability) {
                messages.push(self.call_report(&device, &timestamp));
            }
        }
        messages
    }

    fn restoration_messages(&mut self, device: &str, timestamp: &str) -> Vec<RawFeedMessage> {
        vec![
            self.scada_frame(device, timestamp, false),
            self.ami_reading(device, timestamp, false),
        ]
    }

    fn scada_frame(&mut self, device: &str, timestamp: &str, down: bool) -> RawFeedMessage {
        let noise = self.noise.sample(&mut self.rng);
        RawFeedMessage::Scada(RawScadaEvent {
            device_id: device.to_owned(),
            status: if down { "DOWN" } else { "UP" }.to_owned(),
            timestamp: timestamp.to_owned(),
            device_type: Some("transformer".to_owned()),
            feeder_id: Some("FD-12".to_owned()),
            substation: Some("SUB-3".to_owned()),
            voltage_kv: Some(if down { 0.0 } else { NOMINAL_FEEDER_KV + noise }),
            current_a: Some(if down {
                0.0
            } else {
                self.rng.gen_range(50.0..120.0)
            }),
            alarm_code: down.then(|| "TRF_OUT".to_owned()),
        })
    }

    fn ami_reading(&mut self, device: &str, timestamp: &str, down: bool) -> RawFeedMessage {
        let noise = self.noise.sample(&mut self.rng);
        RawFeedMessage::Ami(RawAmiReading {
            meter_id: format!("MTR-{device}"),
            voltage: if down { 0.0 } else { NOMINAL_SERVICE_V + noise },
            amr_status: Some(if down { "no_signal" } else { "ok" }.to_owned()),
            reading_time: timestamp.to_owned(),
            feeder_id: Some("FD-12".to_owned()),
        })
    }

    fn call_report(&mut self, device: &str, timestamp: &str) -> RawFeedMessage {
        RawFeedMessage::CallCenter(RawCallReport {
            customer_account_id: device.to_owned(),
            call_timestamp: timestamp.to_owned(),
            caller_name: Some("Simulated Caller".to_owned()),
            issue_description: Some("power is out".to_owned()),
            call_duration_sec: Some(self.rng.gen_range(30..600)),
            service_address_feeder: Some("FD-12".to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r_oms_normalizer::{AmiNormalizer, Normalizer, ScadaNormalizer, UNDERVOLTAGE_THRESHOLD_V};

    fn config(outage: f64, call: f64) -> SimulationConfig {
        SimulationConfig {
            devices: vec!["TX-001".to_owned()],
            outage_probability: outage,
            call_report_probability: call,
            random_seed: 7,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn certain_outage_produces_correlated_feeds() {
        let mut engine = FeedEngine::from_config(&config(1.0, 1.0));
        let messages = engine.next_tick();
        assert_eq!(messages.len(), 3);

        let RawFeedMessage::Scada(frame) = &messages[0] else {
            panic!("first message must be the SCADA frame");
        };
        assert_eq!(frame.status, "DOWN");
        assert_eq!(frame.alarm_code.as_deref(), Some("TRF_OUT"));

        let RawFeedMessage::Ami(reading) = &messages[1] else {
            panic!("second message must be the AMI reading");
        };
        assert!(reading.voltage < UNDERVOLTAGE_THRESHOLD_V);

        assert!(matches!(&messages[2], RawFeedMessage::CallCenter(_)));
        assert_eq!(engine.down_devices().count(), 1);
    }

    #[test]
    fn healthy_tick_produces_nominal_readings() {
        let mut engine = FeedEngine::from_config(&config(0.0, 0.0));
        let messages = engine.next_tick();
        assert_eq!(messages.len(), 2);

        let RawFeedMessage::Scada(frame) = &messages[0] else {
            panic!("expected a SCADA frame");
        };
        assert_eq!(frame.status, "UP");
        assert!(frame.voltage_kv.unwrap() > 10.0);
    }

    #[test]
    fn down_device_restores_on_its_next_tick() {
        let mut engine = FeedEngine::from_config(&config(1.0, 0.0));
        engine.next_tick();
        assert_eq!(engine.down_devices().count(), 1);

        let messages = engine.next_tick();
        let RawFeedMessage::Scada(frame) = &messages[0] else {
            panic!("expected a SCADA frame");
        };
        assert_eq!(frame.status, "UP");
        assert_eq!(engine.down_devices().count(), 0);
    }

    #[test]
    fn generated_frames_pass_their_normalizers() {
        let mut engine = FeedEngine::from_config(&config(1.0, 1.0));
        for message in engine.next_tick() {
            match message {
                RawFeedMessage::Scada(frame) => {
                    let bytes = serde_json::to_vec(&frame).expect("serialize");
                    ScadaNormalizer.normalize(&bytes).expect("normalizes");
                }
                RawFeedMessage::Ami(reading) => {
                    let bytes = serde_json::to_vec(&reading).expect("serialize");
                    AmiNormalizer.normalize(&bytes).expect("normalizes");
                }
                RawFeedMessage::CallCenter(_) => {}
            }
        }
    }
}
