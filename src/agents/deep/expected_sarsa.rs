//! Deep expected SARSA
//!
//! On-policy counterpart of [`super::Dqn`]: the behaviour policy is a softmax
//! over Q-values with temperature `tau`, and the bootstrap target is the
//! expectation of the next Q-value under that policy.

use super::{
    env_state, sample_observation_space, update_observation_space, Bootstrap, ExpectedSarsaConfig,
    QState, Transition,
};
use crate::agents::{Agent, AgentFromParams};
use crate::error::Result;
use crate::logs::LogValue;
use crate::spaces::{Observation, Params, Space};
use crate::utils::math::{sample_categorical, softmax};
use rand::rngs::StdRng;
use std::path::Path;

/// Deep expected SARSA agent
pub struct ExpectedSarsa {
    config: ExpectedSarsaConfig,
}

impl ExpectedSarsa {
    pub fn new(config: ExpectedSarsaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExpectedSarsaConfig {
        &self.config
    }
}

impl Agent for ExpectedSarsa {
    type State = QState;

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

    fn init(&self, _rng: &mut StdRng) -> QState {
        QState::new(&self.config.q_learning)
    }

    fn update(
        &self,
        state: &mut QState,
        rng: &mut StdRng,
        observation: &Observation,
    ) -> Result<()> {
        let transition = Transition::from_observation(observation, &self.config.q_learning)?;
        state.learn(
            &self.config.q_learning,
            rng,
            transition,
            Bootstrap::Expected { tau: self.config.tau },
            1.0,
        )
    }

    fn sample(&self, state: &QState, rng: &mut StdRng, observation: &Observation) -> Result<usize> {
        let env_state = env_state(observation, &self.config.q_learning)?;
        let q_values = state.q_values(&env_state)?;
        Ok(sample_categorical(&softmax(&q_values, self.config.tau), rng))
    }

    fn state_value(&self, state: &QState, name: &str) -> Option<LogValue> {
        match name {
            "loss" => state.loss().map(|l| LogValue::Scalar(l as f64)),
            "replay_size" => Some(LogValue::Scalar(state.replay_buffer().len() as f64)),
            _ => None,
        }
    }

    fn params(&self) -> Params {
        self.config.to_params()
    }

    fn save_state(&self, state: &QState, dir: &Path) -> Result<()> {
        state.save(dir)
    }

    fn load_state(&self, dir: &Path) -> Result<QState> {
        QState::load(&self.config.q_learning, dir)
    }
}

impl AgentFromParams for ExpectedSarsa {
    const NAME: &'static str = "ExpectedSarsa";

    fn parameter_space() -> Space {
        ExpectedSarsaConfig::parameter_space()
    }

    fn required_parameters() -> &'static [&'static str] {
        &["obs_space_shape", "act_space_size"]
    }

    fn from_params(params: &Params) -> Result<Self> {
        Self::new(ExpectedSarsaConfig::from_params(params)?)
    }
}
