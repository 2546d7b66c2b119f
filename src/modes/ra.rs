//! Rate adaptation mode
//!
//! Runs the IEEE 802.11ax scenario: every transmission report from the
//! simulator is decoded from its bridge record, turned into an observation
//! for the station's particle filter instance and answered with the next MCS.
//! One CSV row is written per decision:
//!
//! ```text
//! time,station_id,distance,mcs,n_successful,n_failed,goodput,next_mcs
//! ```
//!
//! The simulation is finished whether the loop completes or fails.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::agents::ParticleFilter;
use crate::bridge::{ActRecord, EnvRecord, RecordKind};
use crate::envs::{WifiConfig, WifiSimulation};
use crate::exts::wifi::DATA_RATES;
use crate::exts::Ieee80211axRa;
use crate::spaces::Params;
use crate::RLib;

/// Configuration for rate adaptation mode
#[derive(Debug, Clone)]
pub struct RaConfig {
    pub wifi: WifiConfig,
    pub csv_path: PathBuf,
    pub seed: u64,
    /// Particle filter parameter overrides
    pub agent_params: Params,
}

impl RaConfig {
    pub fn new(csv_path: PathBuf) -> Self {
        Self {
            wifi: WifiConfig::default(),
            csv_path,
            seed: 42,
            agent_params: Params::new(),
        }
    }
}

/// Totals of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct RaSummary {
    pub decisions: usize,
    /// Mean goodput over all reports [Mb/s]
    pub mean_goodput: f64,
}

pub struct RaMode {
    config: RaConfig,
}

impl RaMode {
    pub fn new(config: RaConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<RaSummary> {
        let mut sim = WifiSimulation::new(self.config.wifi.clone(), self.config.seed)
            .context("Failed to start the Wi-Fi simulation")?;
        self.run_on(&mut sim)
    }

    /// Drive an already started simulation; it is finished on every exit path
    ///
    /// One agent instance is created per station of the mode's configuration.
    pub fn run_on(&self, sim: &mut WifiSimulation) -> Result<RaSummary> {
        let result = self.interact(sim);
        sim.finish();

        let summary = result?;
        println!(
            "Rate adaptation finished: {} decisions, mean goodput {:.2} Mb/s, results in {:?}",
            summary.decisions, summary.mean_goodput, self.config.csv_path
        );
        Ok(summary)
    }

    fn interact(&self, sim: &mut WifiSimulation) -> Result<RaSummary> {
        let mut rlib = RLib::<ParticleFilter>::builder()
            .agent_params(self.config.agent_params.clone())
            .ext(Box::new(Ieee80211axRa::new()))
            .build()
            .context("Failed to build the particle filter agent")?;

        for station_id in 0..self.config.wifi.n_wifi {
            rlib.init(Some(self.config.seed.wrapping_add(station_id as u64)));
        }

        if let Some(parent) = self.config.csv_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(&self.config.csv_path)
            .with_context(|| format!("Failed to create {:?}", self.config.csv_path))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "time,station_id,distance,mcs,n_successful,n_failed,goodput,next_mcs")?;

        let mut decisions = 0;
        let mut total_goodput = 0.0;

        loop {
            let record = EnvRecord::decode(&sim.poll()?)?;
            if record.kind == RecordKind::Finished {
                break;
            }

            let station_id = record.station_id as usize;
            let action = rlib.sample(&record.to_observation(), station_id, true)?;

            let frames = record.n_successful + record.n_failed;
            let goodput = if frames > 0 {
                DATA_RATES[record.mcs as usize] * record.n_successful as f64 / frames as f64
            } else {
                0.0
            };

            writeln!(
                writer,
                "{:.6},{},{:.3},{},{},{},{:.4},{}",
                record.time,
                station_id,
                sim.station_distance(station_id).unwrap_or(f64::NAN),
                record.mcs,
                record.n_successful,
                record.n_failed,
                goodput,
                action
            )?;

            let act = ActRecord {
                station_id: record.station_id,
                mcs: action as u8,
            };
            sim.respond(&act.encode())?;

            decisions += 1;
            total_goodput += goodput;
            if decisions % 1000 == 0 {
                tracing::debug!(decisions, time = record.time, "Rate adaptation progress");
            }
        }

        writer.flush()?;
        rlib.finish()?;

        Ok(RaSummary {
            decisions,
            mean_goodput: if decisions > 0 { total_goodput / decisions as f64 } else { 0.0 },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::Value;
    use crate::RlibError;
    use tempfile::TempDir;

    #[test]
    fn test_short_run_writes_rows() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = RaConfig::new(temp_dir.path().join("out").join("results.csv"));
        config.wifi.simulation_time = 0.2;
        config.wifi.n_wifi = 2;
        config.agent_params.insert("particles_num".into(), Value::Int(100));

        let summary = RaMode::new(config.clone()).run().unwrap();
        assert_eq!(summary.decisions, 40);
        assert!(summary.mean_goodput > 0.0);

        let csv = std::fs::read_to_string(&config.csv_path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 41);
        assert!(lines[0].starts_with("time,station_id"));
        assert_eq!(lines[1].split(',').count(), 8);
    }

    #[test]
    fn test_invalid_agent_params_fail() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = RaConfig::new(temp_dir.path().join("results.csv"));
        config.agent_params.insert("scale".into(), Value::Float(-1.0));
        assert!(RaMode::new(config).run().is_err());
    }

    #[test]
    fn test_simulation_finished_when_agent_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = RaConfig::new(temp_dir.path().join("results.csv"));
        config.agent_params.insert("particles_num".into(), Value::Int(0));

        let mut sim = WifiSimulation::new(config.wifi.clone(), 1).unwrap();
        assert!(RaMode::new(config.clone()).run_on(&mut sim).is_err());
        assert!(sim.is_finished());
        assert!(!config.csv_path.exists());

        let finished = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
        assert_eq!(finished.kind, RecordKind::Finished);
    }

    #[test]
    fn test_simulation_finished_when_station_has_no_agent() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = RaConfig::new(temp_dir.path().join("results.csv"));
        config.wifi.simulation_time = 0.1;
        config.agent_params.insert("particles_num".into(), Value::Int(50));

        // Two stations report, but only one agent instance is created
        let mut sim = WifiSimulation::new(
            WifiConfig {
                n_wifi: 2,
                ..config.wifi.clone()
            },
            1,
        )
        .unwrap();
        let err = RaMode::new(config).run_on(&mut sim).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RlibError>(),
            Some(RlibError::UnknownAgent(1))
        ));
        assert!(sim.is_finished());
    }
}
