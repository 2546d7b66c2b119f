//! Reinforcement learning agents
//!
//! An [`Agent`] is a stateless description of an algorithm: its
//! hyperparameters and the spaces it consumes. Everything that changes during
//! learning lives in the associated `State`, so one agent can drive many
//! independent instances.
//!
//! - [`Dqn`]: deep Q-learning with ε-greedy exploration
//! - [`ExpectedSarsa`]: deep expected SARSA with a softmax policy
//! - [`ParticleFilter`]: IEEE 802.11ax rate adaptation

pub mod deep;
pub mod wifi;

pub use deep::{Dqn, DqnConfig, ExpectedSarsa, ExpectedSarsaConfig, QNetwork, QNetworkConfig};
pub use wifi::{ParticleFilter, ParticleFilterConfig};

use crate::error::{Result, RlibError};
use crate::logs::LogValue;
use crate::spaces::{Observation, Params, Space, Value, ValueMap};
use rand::rngs::StdRng;
use std::path::Path;

/// Common interface of every agent
pub trait Agent {
    /// Mutable per-instance state
    type State;

    /// Type name, stored in checkpoints
    fn name(&self) -> &'static str;

    /// Observations required by [`Agent::update`]
    fn update_observation_space(&self) -> Space;

    /// Observations required by [`Agent::sample`]
    fn sample_observation_space(&self) -> Space;

    fn action_space(&self) -> Space;

    /// Create a fresh instance state
    fn init(&self, rng: &mut StdRng) -> Self::State;

    /// Learn from the outcome of the previous action
    fn update(
        &self,
        state: &mut Self::State,
        rng: &mut StdRng,
        observation: &Observation,
    ) -> Result<()>;

    /// Choose the next action
    fn sample(
        &self,
        state: &Self::State,
        rng: &mut StdRng,
        observation: &Observation,
    ) -> Result<usize>;

    /// Named value of the state for logging, `None` if the agent has no such value
    fn state_value(&self, state: &Self::State, name: &str) -> Option<LogValue>;

    /// Parameters this agent was built from
    fn params(&self) -> Params;

    /// Write the instance state into `dir`
    fn save_state(&self, state: &Self::State, dir: &Path) -> Result<()>;

    /// Read an instance state previously written by [`Agent::save_state`]
    fn load_state(&self, dir: &Path) -> Result<Self::State>;
}

/// Agents that can be built from a parameter map
pub trait AgentFromParams: Agent + Sized {
    /// Type name returned by [`Agent::name`]
    const NAME: &'static str;

    /// Parameters accepted by [`AgentFromParams::from_params`]
    fn parameter_space() -> Space;

    /// Names without a default value
    fn required_parameters() -> &'static [&'static str];

    fn from_params(params: &Params) -> Result<Self>;
}

/// Turn lookup errors on a parameter map into parameter errors
fn as_parameter_error(err: RlibError) -> RlibError {
    match err {
        RlibError::MissingObservation(name) => {
            RlibError::invalid_parameter(&name, "missing required parameter")
        }
        RlibError::InvalidObservation { name, reason } => {
            RlibError::InvalidParameter { name, reason }
        }
        other => other,
    }
}

pub(crate) fn param_f64(params: &Params, name: &str, default: f64) -> Result<f64> {
    if params.contains_key(name) {
        params.get_f64(name).map_err(as_parameter_error)
    } else {
        Ok(default)
    }
}

pub(crate) fn param_usize(params: &Params, name: &str, default: usize) -> Result<usize> {
    if params.contains_key(name) {
        params.get_usize(name).map_err(as_parameter_error)
    } else {
        Ok(default)
    }
}

pub(crate) fn required_f64(params: &Params, name: &str) -> Result<f64> {
    params.get_f64(name).map_err(as_parameter_error)
}

pub(crate) fn required_usize(params: &Params, name: &str) -> Result<usize> {
    params.get_usize(name).map_err(as_parameter_error)
}

/// A list of positive integers, such as a shape or layer sizes
pub(crate) fn param_sizes(
    params: &Params,
    name: &str,
    default: Option<&[usize]>,
) -> Result<Vec<usize>> {
    let values = match (params.get(name), default) {
        (Some(value), _) => value
            .as_array()
            .ok_or_else(|| RlibError::invalid_parameter(name, "expected a list of sizes"))?,
        (None, Some(default)) => return Ok(default.to_vec()),
        (None, None) => {
            return Err(RlibError::invalid_parameter(name, "missing required parameter"))
        }
    };

    values
        .into_iter()
        .map(|x| {
            // `usize::MAX as f64` rounds up to 2^64, so anything below it fits
            if x >= 1.0 && x.fract() == 0.0 && x < usize::MAX as f64 {
                Ok(x as usize)
            } else {
                Err(RlibError::invalid_parameter(
                    name,
                    format!("{} is not a positive integer that fits in usize", x),
                ))
            }
        })
        .collect()
}

pub(crate) fn sizes_value(sizes: &[usize]) -> Value {
    Value::Array(sizes.iter().map(|&s| s as f64).collect())
}
