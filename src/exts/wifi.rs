//! Extension for IEEE 802.11ax rate adaptation
//!
//! A station reports, after every transmission opportunity, the simulation
//! time, how many frames succeeded and failed, the number of contending
//! stations, its transmission power, contention window and optionally the MCS
//! it used. From those this extension derives:
//!
//! - `delta_time`: seconds since the previous report of the same station
//! - `rates`: nominal data rate of every MCS (20 MHz, 1 spatial stream, 800 ns GI)
//! - `action`: the MCS that was used

use super::{pass_through, Extension, StepContext};
use crate::agents::wifi::N_MCS;
use crate::error::{Result, RlibError};
use crate::spaces::{Observation, Space, Value, ValueMap};
use std::collections::{BTreeSet, HashMap};

/// Data rates [Mb/s] of MCS 0..=11
pub const DATA_RATES: [f64; N_MCS] = [
    7.3, 14.6, 21.9, 29.3, 43.9, 58.5, 65.8, 73.1, 87.8, 97.5, 109.7, 121.9,
];

/// Default transmission power [dBm]
pub const DEFAULT_POWER: f64 = 16.0206;

#[derive(Debug, Clone, Default)]
pub struct Ieee80211axRa {
    last_time: HashMap<usize, f64>,
}

impl Ieee80211axRa {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Extension for Ieee80211axRa {
    fn name(&self) -> &'static str {
        "Ieee80211axRa"
    }

    fn observation_space(&self) -> Space {
        Space::dict([
            ("time", Space::scalar(0.0, f64::INFINITY)),
            ("n_successful", Space::scalar_int(0.0, f64::INFINITY)),
            ("n_failed", Space::scalar_int(0.0, f64::INFINITY)),
            ("n_wifi", Space::scalar_int(1.0, f64::INFINITY)),
            ("power", Space::scalar(f64::NEG_INFINITY, f64::INFINITY)),
            ("cw", Space::Discrete(32767)),
            ("mcs", Space::Discrete(N_MCS)),
        ])
    }

    fn provided_space(&self) -> Space {
        let mut space = self.observation_space();
        if let Space::Dict(entries) = &mut space {
            entries.insert("delta_time".into(), Space::scalar(0.0, f64::INFINITY));
            entries.insert("rates".into(), Space::float_box(0.0, f64::INFINITY, &[N_MCS]));
            entries.insert("action".into(), Space::Discrete(N_MCS));
        }
        space
    }

    fn default_parameter(&self, name: &str) -> Option<Value> {
        match name {
            "default_power" => Some(Value::Float(DEFAULT_POWER)),
            "min_snr_init" => Some(Value::Float(0.0)),
            "max_snr_init" => Some(Value::Float(40.0)),
            "particles_num" => Some(Value::Int(1000)),
            "scale" => Some(Value::Float(10.0)),
            _ => None,
        }
    }

    fn transform(
        &self,
        raw: &Observation,
        names: &BTreeSet<String>,
        context: StepContext,
    ) -> Result<Observation> {
        let mut out = Observation::new();

        let delta_time = match raw.get("time") {
            Some(_) => {
                let time = raw.get_f64("time")?;
                let previous = self.last_time.get(&context.agent_id);
                Some(previous.map(|p| (time - p).max(0.0)).unwrap_or(0.0))
            }
            None => None,
        };

        for name in names {
            match name.as_str() {
                "delta_time" => {
                    let delta_time = delta_time
                        .ok_or_else(|| RlibError::MissingObservation("time".into()))?;
                    out.insert(name.clone(), Value::Float(delta_time));
                }
                "rates" => {
                    out.insert(name.clone(), Value::Array(DATA_RATES.to_vec()));
                }
                "action" => {
                    let action = match raw.get("mcs") {
                        Some(_) => raw.get_usize("mcs")?,
                        None => context.last_action.unwrap_or(0),
                    };
                    out.insert(name.clone(), Value::from(action));
                }
                _ => pass_through(raw, name, &mut out)?,
            }
        }

        Ok(out)
    }

    /// The clock moves on every completed report, whether or not an agent asked for delta_time
    fn advance(&mut self, raw: &Observation, context: StepContext) {
        if let Ok(time) = raw.get_f64("time") {
            self.last_time.insert(context.agent_id, time);
        }
    }

    /// Goodput of the last transmission: `rate[action] · n_successful / (n_successful + n_failed)`
    fn reward(&self, observation: &Observation) -> Option<f64> {
        let action = observation.get_usize("action").ok()?;
        let n_successful = observation.get_f64("n_successful").ok()?;
        let n_failed = observation.get_f64("n_failed").ok()?;
        let total = n_successful + n_failed;
        let rate = DATA_RATES.get(action)?;

        Some(if total > 0.0 { rate * n_successful / total } else { 0.0 })
    }
}
