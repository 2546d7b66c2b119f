//! Deep Q-learning with ε-greedy exploration
//!
//! Mnih et al. (2013), *Playing Atari with Deep Reinforcement Learning*.
//!
//! Every update appends `(s, a, r, terminal, s')` to the replay buffer and,
//! once the buffer holds a full batch, takes `experience_replay_steps` Adam
//! steps on the loss
//!
//! ```text
//! L = 0.5 · mean((r + (1 − terminal)·γ·max_a' Q_target(s', a') − Q(s, a))²)
//! ```
//!
//! where `Q_target` is the network as it was when the update started. ε then
//! decays towards `epsilon_min`.

use super::{
    env_state, sample_observation_space, update_observation_space, Bootstrap, DqnConfig, QState,
    Transition,
};
use crate::agents::{Agent, AgentFromParams};
use crate::error::Result;
use crate::logs::LogValue;
use crate::persistence::{read_json, write_json};
use crate::spaces::{Observation, Params, Space};
use crate::utils::math::sample_categorical;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

const EPSILON_FILE: &str = "epsilon.json";

/// Deep Q-learning agent
pub struct Dqn {
    config: DqnConfig,
}

/// Instance state of [`Dqn`]
pub struct DqnState {
    pub q: QState,
    pub epsilon: f64,
}

#[derive(Serialize, Deserialize)]
struct EpsilonRecord {
    epsilon: f64,
}

impl Dqn {
    pub fn new(config: DqnConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    /// ε-greedy action probabilities; ties between maximal Q-values share the greedy mass
    pub fn action_probabilities(q_values: &[f32], epsilon: f64) -> Vec<f32> {
        let max = q_values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let greedy: Vec<bool> = q_values.iter().map(|&q| q == max).collect();
        let n_greedy = greedy.iter().filter(|&&g| g).count().max(1) as f32;
        let epsilon = epsilon as f32;
        let uniform = epsilon / q_values.len() as f32;

        greedy
            .into_iter()
            .map(|g| if g { (1.0 - epsilon) / n_greedy + uniform } else { uniform })
            .collect()
    }
}

impl Agent for Dqn {
    type State = DqnState;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn update_observation_space(&self) -> Space {
        update_observation_space(&self.config.q_learning)
    }

    fn sample_observation_space(&self) -> Space {
        sample_observation_space(&self.config.q_learning)
    }

    fn action_space(&self) -> Space {
        Space::Discrete(self.config.q_learning.act_space_size)
    }

    fn init(&self, _rng: &mut StdRng) -> DqnState {
        DqnState {
            q: QState::new(&self.config.q_learning),
            epsilon: self.config.epsilon,
        }
    }

    fn update(
        &self,
        state: &mut DqnState,
        rng: &mut StdRng,
        observation: &Observation,
    ) -> Result<()> {
        let transition = Transition::from_observation(observation, &self.config.q_learning)?;
        state
            .q
            .learn(&self.config.q_learning, rng, transition, Bootstrap::Greedy, 0.5)?;
        state.epsilon = (state.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        Ok(())
    }

    fn sample(
        &self,
        state: &DqnState,
        rng: &mut StdRng,
        observation: &Observation,
    ) -> Result<usize> {
        let env_state = env_state(observation, &self.config.q_learning)?;
        let q_values = state.q.q_values(&env_state)?;
        let probs = Self::action_probabilities(&q_values, state.epsilon);
        Ok(sample_categorical(&probs, rng))
    }

    fn state_value(&self, state: &DqnState, name: &str) -> Option<LogValue> {
        match name {
            "epsilon" => Some(LogValue::Scalar(state.epsilon)),
            "loss" => state.q.loss().map(|l| LogValue::Scalar(l as f64)),
            "replay_size" => Some(LogValue::Scalar(state.q.replay_buffer().len() as f64)),
            _ => None,
        }
    }

    fn params(&self) -> Params {
        self.config.to_params()
    }

    fn save_state(&self, state: &DqnState, dir: &Path) -> Result<()> {
        state.q.save(dir)?;
        write_json(&dir.join(EPSILON_FILE), &EpsilonRecord { epsilon: state.epsilon })
    }

    fn load_state(&self, dir: &Path) -> Result<DqnState> {
        let record: EpsilonRecord = read_json(&dir.join(EPSILON_FILE))?;
        Ok(DqnState {
            q: QState::load(&self.config.q_learning, dir)?,
            epsilon: record.epsilon,
        })
    }
}

impl AgentFromParams for Dqn {
    const NAME: &'static str = "Dqn";

    fn parameter_space() -> Space {
        DqnConfig::parameter_space()
    }

    fn required_parameters() -> &'static [&'static str] {
        &["obs_space_shape", "act_space_size"]
    }

    fn from_params(params: &Params) -> Result<Self> {
        Self::new(DqnConfig::from_params(params)?)
    }
}
