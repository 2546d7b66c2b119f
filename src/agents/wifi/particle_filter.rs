//! Particle filter rate adaptation for IEEE 802.11ax
//!
//! Krotov, Kiryanov & Khorov (2020), *Rate Control With Spatial Reuse for
//! Wi-Fi 6 Dense Deployments*.
//!
//! The latent state tracked by the particles is the channel condition
//! `θ = γ − P_tx` (in dB), where `γ` is the SINR and `P_tx` the transmission
//! power. After transmitting `n_s + n_f` frames with MCS `a` at power `P`,
//! particle `i` is reweighted by
//!
//! ```text
//! log w_i += n_s · ln(p_i) + n_f · ln(1 − p_i),   p_i = P(1 | a, θ_i + P) · (1 − 1/cw)
//! ```
//!
//! with `P(1 | a, γ) = Φ((γ − thr_a) · √8)` and `1/cw` the collision estimate.
//! The next MCS maximises `P(1 | i, θ + P) · rate_i` for a `θ` drawn from
//! the particles.

use super::{MCS_SNR_THRESHOLDS, N_MCS};
use crate::agents::{param_f64, param_usize, required_f64, Agent, AgentFromParams};
use crate::error::{Result, RlibError};
use crate::logs::LogValue;
use crate::persistence::{read_json, write_json};
use crate::spaces::{Observation, Params, Space, Value, ValueMap};
use crate::utils::math::{argmax, normal_cdf};
use crate::utils::{ParticleFilter as Filter, ParticleFilterState};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

const STATE_FILE: &str = "particles.json";

/// Keeps `ln(p)` and `ln(1 − p)` finite
const PROBABILITY_EPS: f64 = 1e-12;

/// Parameters of [`ParticleFilter`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleFilterConfig {
    /// Default transmission power [dBm]
    pub default_power: f64,

    /// Lower bound of the initial SINR distribution [dB]
    pub min_snr_init: f64,

    /// Upper bound of the initial SINR distribution [dB]
    pub max_snr_init: f64,

    /// Number of particles (default: 1000)
    pub particles_num: usize,

    /// Velocity of the random walk of the particles (default: 10)
    pub scale: f64,
}

impl ParticleFilterConfig {
    pub fn new(default_power: f64) -> Self {
        Self {
            default_power,
            min_snr_init: 0.0,
            max_snr_init: 40.0,
            particles_num: 1000,
            scale: 10.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.particles_num == 0 {
            return Err(RlibError::invalid_parameter("particles_num", "must be at least 1"));
        }
        if !(self.scale > 0.0 && self.scale.is_finite()) {
            return Err(RlibError::invalid_parameter(
                "scale",
                format!("must be positive, got {}", self.scale),
            ));
        }
        for (name, value) in [
            ("default_power", self.default_power),
            ("min_snr_init", self.min_snr_init),
            ("max_snr_init", self.max_snr_init),
        ] {
            if !value.is_finite() {
                return Err(RlibError::invalid_parameter(
                    name,
                    format!("must be finite, got {}", value),
                ));
            }
        }
        if self.min_snr_init > self.max_snr_init {
            return Err(RlibError::invalid_parameter(
                "min_snr_init",
                format!("must not exceed max_snr_init ({})", self.max_snr_init),
            ));
        }
        Ok(())
    }

    pub fn from_params(params: &Params) -> Result<Self> {
        let defaults = Self::new(0.0);
        let config = Self {
            default_power: required_f64(params, "default_power")?,
            min_snr_init: param_f64(params, "min_snr_init", defaults.min_snr_init)?,
            max_snr_init: param_f64(params, "max_snr_init", defaults.max_snr_init)?,
            particles_num: param_usize(params, "particles_num", defaults.particles_num)?,
            scale: param_f64(params, "scale", defaults.scale)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("default_power".into(), Value::Float(self.default_power));
        params.insert("min_snr_init".into(), Value::Float(self.min_snr_init));
        params.insert("max_snr_init".into(), Value::Float(self.max_snr_init));
        params.insert("particles_num".into(), Value::from(self.particles_num));
        params.insert("scale".into(), Value::Float(self.scale));
        params
    }
}

/// Particle filter agent selecting one of the 12 802.11ax MCS values
pub struct ParticleFilter {
    config: ParticleFilterConfig,
    filter: Filter,
}

impl ParticleFilter {
    pub fn new(config: ParticleFilterConfig) -> Result<Self> {
        config.validate()?;
        let filter = Filter::new(config.scale);
        Ok(Self { config, filter })
    }

    pub fn config(&self) -> &ParticleFilterConfig {
        &self.config
    }

    /// Probability of a successful transmission for every MCS at SINR `snr`
    pub fn success_probability(snr: f64) -> [f64; N_MCS] {
        let scale = 8f64.sqrt();
        MCS_SNR_THRESHOLDS.map(|threshold| normal_cdf((snr - threshold) * scale))
    }

    fn observe(
        state: &mut ParticleFilterState,
        action: usize,
        n_successful: u64,
        n_failed: u64,
        power: f64,
        cw: f64,
    ) {
        let no_collision = 1.0 - 1.0 / cw;

        for (position, weight) in state.positions.iter().zip(state.logit_weights.iter_mut()) {
            let p = (Self::success_probability(position + power)[action] * no_collision)
                .clamp(PROBABILITY_EPS, 1.0 - PROBABILITY_EPS);

            if n_successful > 0 {
                *weight += n_successful as f64 * p.ln();
            }
            if n_failed > 0 {
                *weight += n_failed as f64 * (1.0 - p).ln();
            }
        }

        state.normalize_logits();
    }
}

impl Agent for ParticleFilter {
    type State = ParticleFilterState;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn update_observation_space(&self) -> Space {
        Space::dict([
            ("action", Space::Discrete(N_MCS)),
            ("n_successful", Space::scalar_int(0.0, f64::INFINITY)),
            ("n_failed", Space::scalar_int(0.0, f64::INFINITY)),
            ("delta_time", Space::scalar(0.0, f64::INFINITY)),
            ("power", Space::scalar(f64::NEG_INFINITY, f64::INFINITY)),
            ("cw", Space::Discrete(32767)),
        ])
    }

    fn sample_observation_space(&self) -> Space {
        Space::dict([
            ("power", Space::scalar(f64::NEG_INFINITY, f64::INFINITY)),
            ("rates", Space::float_box(0.0, f64::INFINITY, &[N_MCS])),
        ])
    }

    fn action_space(&self) -> Space {
        Space::Discrete(N_MCS)
    }

    /// Positions drawn from `U(min_snr_init, max_snr_init) − default_power`
    fn init(&self, rng: &mut StdRng) -> ParticleFilterState {
        ParticleFilterState::uniform(
            self.config.particles_num,
            self.config.min_snr_init - self.config.default_power,
            self.config.max_snr_init - self.config.default_power,
            rng,
        )
    }

    fn update(
        &self,
        state: &mut ParticleFilterState,
        rng: &mut StdRng,
        observation: &Observation,
    ) -> Result<()> {
        let action = observation.get_usize("action")?;
        if action >= N_MCS {
            return Err(RlibError::invalid_observation(
                "action",
                format!("MCS {} is outside of 0..{}", action, N_MCS),
            ));
        }

        let n_successful = observation.get_usize("n_successful")? as u64;
        let n_failed = observation.get_usize("n_failed")? as u64;
        let delta_time = observation.get_f64("delta_time")?;
        let power = observation.get_f64("power")?;

        let cw = observation.get_usize("cw")?;
        if cw == 0 {
            return Err(RlibError::invalid_observation(
                "cw",
                "contention window must be at least 1",
            ));
        }

        self.filter.update(state, rng, delta_time, |state| {
            Self::observe(state, action, n_successful, n_failed, power, cw as f64)
        });
        Ok(())
    }

    fn sample(
        &self,
        state: &ParticleFilterState,
        rng: &mut StdRng,
        observation: &Observation,
    ) -> Result<usize> {
        let power = observation.get_f64("power")?;
        let rates = observation.get_array("rates")?;
        if rates.len() != N_MCS {
            return Err(RlibError::invalid_observation(
                "rates",
                format!("expected {} rates, got {}", N_MCS, rates.len()),
            ));
        }

        let theta = self.filter.sample(state, rng);
        let expected_rates: Vec<f64> = Self::success_probability(theta + power)
            .iter()
            .zip(&rates)
            .map(|(p, r)| p * r)
            .collect();
        Ok(argmax(&expected_rates))
    }

    fn state_value(&self, state: &ParticleFilterState, name: &str) -> Option<LogValue> {
        match name {
            "positions" => Some(LogValue::Array(state.positions.clone())),
            "logit_weights" => Some(LogValue::Array(state.logit_weights.clone())),
            "effective_sample_size" => Some(LogValue::Scalar(state.effective_sample_size())),
            _ => None,
        }
    }

    fn params(&self) -> Params {
        self.config.to_params()
    }

    fn save_state(&self, state: &ParticleFilterState, dir: &Path) -> Result<()> {
        write_json(&dir.join(STATE_FILE), state)
    }

    fn load_state(&self, dir: &Path) -> Result<ParticleFilterState> {
        let state: ParticleFilterState = read_json(&dir.join(STATE_FILE))?;
        if state.positions.len() != state.logit_weights.len() {
            return Err(RlibError::invalid_parameter(
                "particles_num",
                "saved positions and weights differ in length",
            ));
        }
        Ok(state)
    }
}

impl AgentFromParams for ParticleFilter {
    const NAME: &'static str = "ParticleFilter";

    fn parameter_space() -> Space {
        Space::dict([
            ("default_power", Space::scalar(f64::NEG_INFINITY, f64::INFINITY)),
            ("min_snr_init", Space::scalar(f64::NEG_INFINITY, f64::INFINITY)),
            ("max_snr_init", Space::scalar(f64::NEG_INFINITY, f64::INFINITY)),
            ("particles_num", Space::scalar_int(1.0, f64::INFINITY)),
            ("scale", Space::scalar(0.0, f64::INFINITY)),
        ])
    }

    fn required_parameters() -> &'static [&'static str] {
        &["default_power"]
    }

    fn from_params(params: &Params) -> Result<Self> {
        Self::new(ParticleFilterConfig::from_params(params)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use tempfile::TempDir;

    const RATES: [f64; N_MCS] = [
        7.3, 14.6, 21.9, 29.3, 43.9, 58.5, 65.8, 73.1, 87.8, 97.5, 109.7, 121.9,
    ];

    fn agent(particles_num: usize) -> ParticleFilter {
        ParticleFilter::new(ParticleFilterConfig {
            particles_num,
            ..ParticleFilterConfig::new(16.0206)
        })
        .unwrap()
    }

    fn update_obs(action: i64, n_successful: i64, n_failed: i64, delta_time: f64) -> Observation {
        let mut obs = Observation::new();
        obs.insert("action".into(), Value::Int(action));
        obs.insert("n_successful".into(), Value::Int(n_successful));
        obs.insert("n_failed".into(), Value::Int(n_failed));
        obs.insert("delta_time".into(), Value::Float(delta_time));
        obs.insert("power".into(), Value::Float(16.0206));
        obs.insert("cw".into(), Value::Int(15));
        obs
    }

    fn sample_obs() -> Observation {
        let mut obs = Observation::new();
        obs.insert("power".into(), Value::Float(16.0206));
        obs.insert("rates".into(), Value::Array(RATES.to_vec()));
        obs
    }

    #[test]
    fn test_success_probability() {
        let p = ParticleFilter::success_probability(MCS_SNR_THRESHOLDS[5]);
        assert!((p[5] - 0.5).abs() < 1e-6);
        assert!(p[0] > 0.999);
        assert!(p[11] < 1e-6);
        assert!(p.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_init_range() {
        let agent = agent(500);
        let mut rng = StdRng::seed_from_u64(42);
        let state = agent.init(&mut rng);

        assert_eq!(state.len(), 500);
        assert!(state
            .positions
            .iter()
            .all(|&p| (-16.0206..=40.0 - 16.0206).contains(&p)));
        assert!(state.logit_weights.iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_successes_move_choice_up() {
        let agent = agent(1000);
        let mut rng = StdRng::seed_from_u64(42);
        let mut state = agent.init(&mut rng);

        // Repeated successes at the highest MCS concentrate mass on good channels
        for _ in 0..20 {
            agent.update(&mut state, &mut rng, &update_obs(11, 10, 0, 0.01)).unwrap();
        }
        let high = agent.sample(&state, &mut rng, &sample_obs()).unwrap();

        let mut state = agent.init(&mut rng);
        for _ in 0..20 {
            agent.update(&mut state, &mut rng, &update_obs(0, 0, 10, 0.01)).unwrap();
        }
        let low = agent.sample(&state, &mut rng, &sample_obs()).unwrap();

        assert!(high >= 10, "expected a high MCS, got {}", high);
        assert!(low <= 1, "expected a low MCS, got {}", low);
    }

    #[test]
    fn test_weights_stay_finite_with_cw_one() {
        let agent = agent(100);
        let mut rng = StdRng::seed_from_u64(0);
        let mut state = agent.init(&mut rng);

        let mut obs = update_obs(3, 5, 0, 0.1);
        obs.insert("cw".into(), Value::Int(1));
        agent.update(&mut state, &mut rng, &obs).unwrap();

        assert!(state.logit_weights.iter().all(|w| w.is_finite()));
    }

    #[test]
    fn test_invalid_observations() {
        let agent = agent(10);
        let mut rng = StdRng::seed_from_u64(0);
        let mut state = agent.init(&mut rng);

        let mut obs = update_obs(0, 1, 0, 0.1);
        obs.insert("cw".into(), Value::Int(0));
        assert!(agent.update(&mut state, &mut rng, &obs).is_err());

        let obs = update_obs(12, 1, 0, 0.1);
        assert!(agent.update(&mut state, &mut rng, &obs).is_err());

        let mut obs = sample_obs();
        obs.insert("rates".into(), Value::Array(vec![1.0, 2.0]));
        assert!(agent.sample(&state, &mut rng, &obs).is_err());
    }

    #[test]
    fn test_state_values() {
        let agent = agent(10);
        let mut rng = StdRng::seed_from_u64(0);
        let state = agent.init(&mut rng);

        match agent.state_value(&state, "effective_sample_size") {
            Some(LogValue::Scalar(ess)) => assert!((ess - 10.0).abs() < 1e-9),
            other => panic!("unexpected value {:?}", other),
        }
        assert!(matches!(
            agent.state_value(&state, "positions"),
            Some(LogValue::Array(p)) if p.len() == 10
        ));
        assert_eq!(agent.state_value(&state, "epsilon"), None);
    }

    #[test]
    fn test_save_and_load_state() {
        let temp_dir = TempDir::new().unwrap();
        let agent = agent(50);
        let mut rng = StdRng::seed_from_u64(5);
        let mut state = agent.init(&mut rng);
        agent.update(&mut state, &mut rng, &update_obs(4, 3, 1, 0.2)).unwrap();

        agent.save_state(&state, temp_dir.path()).unwrap();
        assert_eq!(agent.load_state(temp_dir.path()).unwrap(), state);
    }

    #[test]
    fn test_from_params() {
        let mut params = Params::new();
        params.insert("default_power".into(), Value::Float(20.0));
        params.insert("particles_num".into(), Value::Int(10));

        let agent = ParticleFilter::from_params(&params).unwrap();
        assert_eq!(agent.config().particles_num, 10);
        assert_eq!(agent.config().scale, 10.0);

        params.insert("scale".into(), Value::Float(0.0));
        assert!(ParticleFilter::from_params(&params).is_err());

        params.remove("default_power");
        assert!(ParticleFilter::from_params(&params).is_err());
    }

    #[test]
    fn test_nan_parameters_rejected() {
        let config = ParticleFilterConfig {
            scale: f64::NAN,
            ..ParticleFilterConfig::new(16.0206)
        };
        assert!(matches!(config.validate(), Err(RlibError::InvalidParameter { .. })));

        let config = ParticleFilterConfig {
            max_snr_init: f64::NAN,
            ..ParticleFilterConfig::new(16.0206)
        };
        assert!(config.validate().is_err());

        assert!(ParticleFilterConfig::new(f64::NAN).validate().is_err());
    }
}
