//! IEEE 802.11ax rate adaptation scenario
//!
//! A single access point at the origin and `n_wifi` stations uploading
//! saturated traffic. Every `interval` seconds each station transmits with
//! its current MCS and reports the outcome as an [`EnvRecord`]; it then waits
//! for an [`ActRecord`] choosing the MCS for the next interval. After
//! `simulation_time` seconds a [`RecordKind::Finished`] record is emitted.
//!
//! Channel model:
//!
//! ```text
//! path loss  = 46.6777 + 30·log10(d)            [dB, d ≥ 1 m]
//! noise      = −174 + 10·log10(width·1e6) + 7   [dBm]
//! SNR        = power − path loss − noise + N(0, fading_std²)
//! P(frame)   = Φ((SNR − threshold[mcs])·√8) · (1 − P(collision))
//! ```
//!
//! with `P(collision) = 1 − (1 − 2/(cw + 1))^(n_wifi − 1)`. The number of
//! successful frames in an interval is binomial.

use crate::agents::wifi::{MCS_SNR_THRESHOLDS, N_MCS};
use crate::bridge::{ActRecord, EnvRecord, RecordKind};
use crate::error::{Result, RlibError};
use crate::exts::wifi::{DATA_RATES, DEFAULT_POWER};
use crate::utils::math::normal_cdf;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Binomial, Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Path loss at the 1 m reference distance, 5 GHz
const REFERENCE_LOSS: f64 = 46.6777;
const PATH_LOSS_EXPONENT: f64 = 3.0;
const NOISE_FIGURE: f64 = 7.0;
/// Thermal noise density [dBm/Hz]
const THERMAL_NOISE: f64 = -174.0;

/// How stations move during the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MobilityModel {
    /// Stations start `distance` metres from the AP and move away at `velocity`
    Distance,
    /// Random waypoint within an `area` × `area` square around the AP
    Rwpm,
}

/// Scenario configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    /// Number of transmitting stations
    pub n_wifi: usize,
    /// Channel width [MHz]
    pub channel_width: u32,
    /// Initial station distance [m], `Distance` mobility
    pub distance: f64,
    /// Station velocity [m/s], `Distance` mobility
    pub velocity: f64,
    pub mobility_model: MobilityModel,
    /// Side of the square stations roam in [m], `Rwpm` mobility
    pub area: f64,
    /// Station speed [m/s], `Rwpm` mobility
    pub node_speed: f64,
    /// Simulated duration [s]
    pub simulation_time: f64,
    /// Time between reports [s]
    pub interval: f64,
    /// Transmission power [dBm]
    pub power: f64,
    /// Contention window
    pub cw: u32,
    /// Standard deviation of the fading term [dB]
    pub fading_std: f64,
    /// Frame size [bytes]
    pub frame_size: u32,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            n_wifi: 1,
            channel_width: 20,
            distance: 10.0,
            velocity: 0.0,
            mobility_model: MobilityModel::Distance,
            area: 40.0,
            node_speed: 1.4,
            simulation_time: 20.0,
            interval: 0.01,
            power: DEFAULT_POWER,
            cw: 15,
            fading_std: 1.0,
            frame_size: 1500,
        }
    }
}

impl WifiConfig {
    pub fn validate(&self) -> Result<()> {
        let check = |ok: bool, name: &str, reason: &str| {
            if ok {
                Ok(())
            } else {
                Err(RlibError::invalid_parameter(name, reason))
            }
        };

        check(self.n_wifi >= 1, "n_wifi", "at least one station is required")?;
        check(
            matches!(self.channel_width, 20 | 40 | 80 | 160),
            "channel_width",
            "must be 20, 40, 80 or 160 MHz",
        )?;
        check(self.distance >= 0.0, "distance", "must be non-negative")?;
        check(
            self.velocity >= 0.0 && self.velocity.is_finite(),
            "velocity",
            "must be non-negative",
        )?;
        check(self.area > 0.0, "area", "must be positive")?;
        check(self.node_speed >= 0.0, "node_speed", "must be non-negative")?;
        check(self.simulation_time > 0.0, "simulation_time", "must be positive")?;
        check(self.interval > 0.0, "interval", "must be positive")?;
        check(self.cw >= 1, "cw", "must be at least 1")?;
        check(self.fading_std >= 0.0, "fading_std", "must be non-negative")?;
        check(self.frame_size >= 1, "frame_size", "must be positive")?;
        Ok(())
    }

    /// Thermal noise plus noise figure over the channel [dBm]
    pub fn noise_power(&self) -> f64 {
        THERMAL_NOISE + 10.0 * (self.channel_width as f64 * 1e6).log10() + NOISE_FIGURE
    }
}

/// Log-distance path loss [dB]
pub fn path_loss(distance: f64) -> f64 {
    REFERENCE_LOSS + 10.0 * PATH_LOSS_EXPONENT * distance.max(1.0).log10()
}

#[derive(Debug, Clone)]
struct Station {
    position: (f64, f64),
    waypoint: (f64, f64),
    mcs: u8,
}

impl Station {
    fn distance(&self) -> f64 {
        self.position.0.hypot(self.position.1)
    }
}

/// Rate adaptation simulation speaking the bridge record protocol
pub struct WifiSimulation {
    config: WifiConfig,
    rng: StdRng,
    fading: Normal<f64>,
    stations: Vec<Station>,
    time: f64,
    next_station: usize,
    /// Station whose response is awaited
    pending: Option<u32>,
    finished: bool,
}

impl WifiSimulation {
    pub fn new(config: WifiConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let fading = Normal::new(0.0, config.fading_std)
            .map_err(|e| RlibError::invalid_parameter("fading_std", e.to_string()))?;

        let stations = (0..config.n_wifi)
            .map(|i| match config.mobility_model {
                MobilityModel::Distance => {
                    let angle = 2.0 * std::f64::consts::PI * i as f64 / config.n_wifi as f64;
                    let position = (config.distance * angle.cos(), config.distance * angle.sin());
                    Station {
                        position,
                        waypoint: position,
                        mcs: 0,
                    }
                }
                MobilityModel::Rwpm => Station {
                    position: random_point(&mut rng, config.area),
                    waypoint: random_point(&mut rng, config.area),
                    mcs: 0,
                },
            })
            .collect();

        tracing::info!(
            n_wifi = config.n_wifi,
            mobility = ?config.mobility_model,
            simulation_time = config.simulation_time,
            "Wi-Fi simulation started"
        );

        Ok(Self {
            config,
            rng,
            fading,
            stations,
            time: 0.0,
            next_station: 0,
            pending: None,
            finished: false,
        })
    }

    pub fn config(&self) -> &WifiConfig {
        &self.config
    }

    /// Current simulation time [s]
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Distance of a station from the AP [m]
    pub fn station_distance(&self, station_id: usize) -> Option<f64> {
        self.stations.get(station_id).map(Station::distance)
    }

    /// SNR of a station without fading [dB]
    pub fn mean_snr(&self, station_id: usize) -> Option<f64> {
        self.station_distance(station_id)
            .map(|d| self.config.power - path_loss(d) - self.config.noise_power())
    }

    /// Produce the next encoded observation record
    ///
    /// Fails if the previous transmission report has not been answered.
    pub fn poll(&mut self) -> Result<[u8; EnvRecord::SIZE]> {
        if let Some(station_id) = self.pending {
            return Err(RlibError::Record(format!(
                "station {} has not received an action yet",
                station_id
            )));
        }

        if !self.finished && self.next_station == 0 {
            self.time += self.config.interval;
            self.move_stations(self.config.interval);
            if self.time > self.config.simulation_time + 1e-9 {
                self.finish();
            }
        }

        if self.finished {
            return Ok(self.finished_record().encode());
        }

        let station_id = self.next_station;
        let record = self.transmit(station_id)?;
        self.next_station = (self.next_station + 1) % self.stations.len();
        self.pending = Some(record.station_id);
        Ok(record.encode())
    }

    /// Apply an encoded response to the pending report
    pub fn respond(&mut self, bytes: &[u8]) -> Result<()> {
        let act = ActRecord::decode(bytes)?;

        match self.pending {
            Some(station_id) if station_id == act.station_id => {}
            Some(station_id) => {
                return Err(RlibError::Record(format!(
                    "expected an action for station {}, got {}",
                    station_id, act.station_id
                )))
            }
            None => return Err(RlibError::Record("no action is expected".into())),
        }
        if act.mcs as usize >= N_MCS {
            return Err(RlibError::Record(format!("MCS {} is outside of 0..{}", act.mcs, N_MCS)));
        }

        self.stations[act.station_id as usize].mcs = act.mcs;
        self.pending = None;
        Ok(())
    }

    /// End the simulation; further polls return the finished record
    pub fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.pending = None;
            tracing::info!(time = self.time, "Wi-Fi simulation finished");
        }
    }

    fn finished_record(&self) -> EnvRecord {
        EnvRecord {
            power: self.config.power,
            time: self.time,
            cw: self.config.cw,
            n_failed: 0,
            n_successful: 0,
            n_wifi: self.config.n_wifi as u32,
            mcs: 0,
            station_id: 0,
            kind: RecordKind::Finished,
        }
    }

    fn transmit(&mut self, station_id: usize) -> Result<EnvRecord> {
        let mcs = self.stations[station_id].mcs;
        let distance = self.stations[station_id].distance();
        let snr = self.config.power - path_loss(distance) - self.config.noise_power()
            + self.fading.sample(&mut self.rng);

        let n_wifi = self.config.n_wifi as i32;
        let p_collision = 1.0 - (1.0 - 2.0 / (self.config.cw as f64 + 1.0)).powi(n_wifi - 1);
        let p_frame = normal_cdf((snr - MCS_SNR_THRESHOLDS[mcs as usize]) * 8f64.sqrt());
        let p_success = (p_frame * (1.0 - p_collision)).clamp(0.0, 1.0);

        // Airtime of the interval is shared between the stations
        let rate = DATA_RATES[mcs as usize] * self.config.channel_width as f64 / 20.0;
        let bits = rate * 1e6 * self.config.interval / self.config.n_wifi as f64;
        let n_frames = (bits / (self.config.frame_size as f64 * 8.0)).floor().max(1.0) as u64;

        let n_successful = Binomial::new(n_frames, p_success)
            .map_err(|e| RlibError::Record(format!("invalid success probability: {}", e)))?
            .sample(&mut self.rng);

        Ok(EnvRecord {
            power: self.config.power,
            time: self.time,
            cw: self.config.cw,
            n_failed: (n_frames - n_successful) as u32,
            n_successful: n_successful as u32,
            n_wifi: self.config.n_wifi as u32,
            mcs,
            station_id: station_id as u32,
            kind: RecordKind::Transmission,
        })
    }

    fn move_stations(&mut self, dt: f64) {
        match self.config.mobility_model {
            MobilityModel::Distance => {
                let step = self.config.velocity * dt;
                for station in &mut self.stations {
                    let d = station.distance();
                    let (ux, uy) = if d > 0.0 {
                        (station.position.0 / d, station.position.1 / d)
                    } else {
                        (1.0, 0.0)
                    };
                    station.position.0 += ux * step;
                    station.position.1 += uy * step;
                }
            }
            MobilityModel::Rwpm => {
                let step = self.config.node_speed * dt;
                for station in &mut self.stations {
                    let dx = station.waypoint.0 - station.position.0;
                    let dy = station.waypoint.1 - station.position.1;
                    let remaining = dx.hypot(dy);

                    if remaining <= step {
                        station.position = station.waypoint;
                        station.waypoint = random_point(&mut self.rng, self.config.area);
                    } else {
                        station.position.0 += dx / remaining * step;
                        station.position.1 += dy / remaining * step;
                    }
                }
            }
        }
    }
}

/// Uniform point in an `area` × `area` square centred on the AP
fn random_point<R: Rng + ?Sized>(rng: &mut R, area: f64) -> (f64, f64) {
    let half = area / 2.0;
    (rng.gen_range(-half..=half), rng.gen_range(-half..=half))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_config() -> WifiConfig {
        WifiConfig {
            n_wifi: 2,
            simulation_time: 0.05,
            ..Default::default()
        }
    }

    fn answer(sim: &mut WifiSimulation, record: &EnvRecord, mcs: u8) {
        let act = ActRecord {
            station_id: record.station_id,
            mcs,
        };
        sim.respond(&act.encode()).unwrap();
    }

    #[test]
    fn test_channel_model() {
        let config = WifiConfig::default();
        assert!((config.noise_power() - (-93.9897)).abs() < 1e-3);
        assert_eq!(path_loss(0.5), REFERENCE_LOSS);
        assert!((path_loss(10.0) - 76.6777).abs() < 1e-9);

        let sim = WifiSimulation::new(config, 0).unwrap();
        let snr = sim.mean_snr(0).unwrap();
        assert!((snr - (DEFAULT_POWER - 76.6777 + 93.9897)).abs() < 1e-3);
    }

    #[test]
    fn test_records_round_robin_until_finished() {
        let mut sim = WifiSimulation::new(short_config(), 1).unwrap();
        let mut seen = Vec::new();

        loop {
            let record = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
            if record.kind == RecordKind::Finished {
                break;
            }
            seen.push(record.station_id);
            assert!(record.n_successful + record.n_failed >= 1);
            answer(&mut sim, &record, 3);
        }

        assert_eq!(seen, vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
        assert!(sim.is_finished());
        let record = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
        assert_eq!(record.kind, RecordKind::Finished);
    }

    #[test]
    fn test_protocol_errors() {
        let mut sim = WifiSimulation::new(short_config(), 2).unwrap();
        let unexpected = ActRecord { station_id: 0, mcs: 1 };
        assert!(sim.respond(&unexpected.encode()).is_err());

        let record = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
        assert!(sim.poll().is_err());

        let wrong_station = ActRecord { station_id: 1, mcs: 1 };
        assert!(sim.respond(&wrong_station.encode()).is_err());
        let bad_mcs = ActRecord { station_id: record.station_id, mcs: 12 };
        assert!(sim.respond(&bad_mcs.encode()).is_err());

        answer(&mut sim, &record, 11);
        let record = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
        assert_eq!(record.station_id, 1);
    }

    #[test]
    fn test_low_mcs_succeeds_close_to_ap() {
        let config = WifiConfig {
            distance: 5.0,
            fading_std: 0.0,
            ..Default::default()
        };
        let mut sim = WifiSimulation::new(config, 3).unwrap();
        let record = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
        assert_eq!(record.mcs, 0);
        assert_eq!(record.n_failed, 0);
        assert!(record.n_successful > 0);
    }

    #[test]
    fn test_high_mcs_fails_far_from_ap() {
        let config = WifiConfig {
            distance: 60.0,
            fading_std: 0.0,
            ..Default::default()
        };
        let mut sim = WifiSimulation::new(config, 4).unwrap();
        let record = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
        answer(&mut sim, &record, 11);

        let record = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
        assert_eq!(record.mcs, 11);
        assert_eq!(record.n_successful, 0);
    }

    #[test]
    fn test_distance_mobility_moves_away() {
        let config = WifiConfig {
            velocity: 10.0,
            interval: 0.5,
            ..Default::default()
        };
        let mut sim = WifiSimulation::new(config, 5).unwrap();
        sim.poll().unwrap();
        assert!((sim.station_distance(0).unwrap() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_rwpm_stays_in_area() {
        let config = WifiConfig {
            mobility_model: MobilityModel::Rwpm,
            n_wifi: 3,
            area: 10.0,
            node_speed: 5.0,
            interval: 0.1,
            simulation_time: 5.0,
            ..Default::default()
        };
        let mut sim = WifiSimulation::new(config, 6).unwrap();
        loop {
            let record = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
            if record.kind == RecordKind::Finished {
                break;
            }
            for i in 0..3 {
                assert!(sim.station_distance(i).unwrap() <= 5.0 * 2f64.sqrt() + 1e-9);
            }
            answer(&mut sim, &record, 0);
        }
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut sim = WifiSimulation::new(WifiConfig::default(), 7).unwrap();
        let record = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
        assert_eq!(record.kind, RecordKind::Transmission);

        sim.finish();
        sim.finish();
        let record = EnvRecord::decode(&sim.poll().unwrap()).unwrap();
        assert_eq!(record.kind, RecordKind::Finished);
    }

    #[test]
    fn test_invalid_config() {
        let config = WifiConfig {
            channel_width: 30,
            ..Default::default()
        };
        assert!(WifiSimulation::new(config, 0).is_err());
    }

    #[test]
    fn test_negative_velocity_rejected() {
        let config = WifiConfig {
            velocity: -1.0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("velocity"));
        assert!(WifiSimulation::new(config, 0).is_err());
    }
}
