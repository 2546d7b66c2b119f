//! Hyperparameters of the deep Q-learning agents

use crate::agents::{param_f64, param_sizes, param_usize, required_usize, sizes_value};
use crate::error::{Result, RlibError};
use crate::spaces::{Params, Space, Value};
use serde::{Deserialize, Serialize};

/// Settings shared by [`super::Dqn`] and [`super::ExpectedSarsa`]
///
/// # Example
///
/// ```rust
/// use reinforced_lib::agents::deep::QLearningConfig;
///
/// let config = QLearningConfig {
///     discount: 0.9,
///     ..QLearningConfig::new(vec![4], 2)
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QLearningConfig {
    /// Shape of the environment state
    pub obs_space_shape: Vec<usize>,

    /// Number of discrete actions
    pub act_space_size: usize,

    /// Widths of the hidden layers of the Q-network
    ///
    /// Default: [64, 64]
    pub hidden_sizes: Vec<usize>,

    /// Learning rate of the Adam optimizer
    ///
    /// Default: 1e-3
    pub learning_rate: f64,

    /// Capacity of the experience replay buffer
    ///
    /// Default: 10000
    pub experience_replay_buffer_size: usize,

    /// Transitions per gradient step
    ///
    /// Default: 64
    pub experience_replay_batch_size: usize,

    /// Gradient steps per update
    ///
    /// Default: 5
    pub experience_replay_steps: usize,

    /// Discount factor (gamma)
    ///
    /// Default: 0.99
    pub discount: f32,
}

impl QLearningConfig {
    pub fn new(obs_space_shape: Vec<usize>, act_space_size: usize) -> Self {
        Self {
            obs_space_shape,
            act_space_size,
            hidden_sizes: vec![64, 64],
            learning_rate: 1e-3,
            experience_replay_buffer_size: 10000,
            experience_replay_batch_size: 64,
            experience_replay_steps: 5,
            discount: 0.99,
        }
    }

    /// Flattened length of the environment state, `None` if it overflows `usize`
    pub fn checked_obs_dim(&self) -> Option<usize> {
        self.obs_space_shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Flattened length of the environment state
    ///
    /// Saturates at `usize::MAX`; [`QLearningConfig::validate`] rejects such shapes.
    pub fn obs_dim(&self) -> usize {
        self.checked_obs_dim().unwrap_or(usize::MAX)
    }

    pub fn validate(&self) -> Result<()> {
        if self.obs_space_shape.is_empty() || self.checked_obs_dim() == Some(0) {
            return Err(RlibError::invalid_parameter("obs_space_shape", "must be non-empty"));
        }

        if self.checked_obs_dim().is_none() {
            return Err(RlibError::invalid_parameter(
                "obs_space_shape",
                format!("{:?} has more elements than fit in usize", self.obs_space_shape),
            ));
        }

        if self.act_space_size == 0 {
            return Err(RlibError::invalid_parameter("act_space_size", "must be at least 1"));
        }

        if !(self.learning_rate > 0.0) {
            return Err(RlibError::invalid_parameter(
                "learning_rate",
                format!("must be positive, got {}", self.learning_rate),
            ));
        }

        if self.experience_replay_batch_size == 0 {
            return Err(RlibError::invalid_parameter(
                "experience_replay_batch_size",
                "must be at least 1",
            ));
        }

        if self.experience_replay_buffer_size <= self.experience_replay_batch_size {
            return Err(RlibError::invalid_parameter(
                "experience_replay_buffer_size",
                format!(
                    "must exceed experience_replay_batch_size ({}), got {}",
                    self.experience_replay_batch_size, self.experience_replay_buffer_size
                ),
            ));
        }

        if !(0.0..=1.0).contains(&self.discount) {
            return Err(RlibError::invalid_parameter(
                "discount",
                format!("must be in [0, 1], got {}", self.discount),
            ));
        }

        Ok(())
    }

    fn from_params(params: &Params) -> Result<Self> {
        let defaults = Self::new(Vec::new(), 0);
        Ok(Self {
            obs_space_shape: param_sizes(params, "obs_space_shape", None)?,
            act_space_size: required_usize(params, "act_space_size")?,
            hidden_sizes: param_sizes(params, "hidden_sizes", Some(&defaults.hidden_sizes))?,
            learning_rate: param_f64(params, "learning_rate", defaults.learning_rate)?,
            experience_replay_buffer_size: param_usize(
                params,
                "experience_replay_buffer_size",
                defaults.experience_replay_buffer_size,
            )?,
            experience_replay_batch_size: param_usize(
                params,
                "experience_replay_batch_size",
                defaults.experience_replay_batch_size,
            )?,
            experience_replay_steps: param_usize(
                params,
                "experience_replay_steps",
                defaults.experience_replay_steps,
            )?,
            discount: param_f64(params, "discount", defaults.discount as f64)? as f32,
        })
    }

    fn to_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("obs_space_shape".into(), sizes_value(&self.obs_space_shape));
        params.insert("act_space_size".into(), Value::from(self.act_space_size));
        params.insert("hidden_sizes".into(), sizes_value(&self.hidden_sizes));
        params.insert("learning_rate".into(), Value::Float(self.learning_rate));
        params.insert(
            "experience_replay_buffer_size".into(),
            Value::from(self.experience_replay_buffer_size),
        );
        params.insert(
            "experience_replay_batch_size".into(),
            Value::from(self.experience_replay_batch_size),
        );
        params.insert(
            "experience_replay_steps".into(),
            Value::from(self.experience_replay_steps),
        );
        params.insert("discount".into(), Value::Float(self.discount as f64));
        params
    }

    fn parameter_space() -> Vec<(&'static str, Space)> {
        let positive_int = || Space::scalar_int(1.0, f64::INFINITY);
        vec![
            ("obs_space_shape", Space::Sequence(Box::new(positive_int()))),
            ("act_space_size", positive_int()),
            ("hidden_sizes", Space::Sequence(Box::new(positive_int()))),
            ("learning_rate", Space::scalar(0.0, f64::INFINITY)),
            ("experience_replay_buffer_size", positive_int()),
            ("experience_replay_batch_size", positive_int()),
            ("experience_replay_steps", positive_int()),
            ("discount", Space::scalar(0.0, 1.0)),
        ]
    }
}

/// Hyperparameters of [`super::Dqn`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqnConfig {
    #[serde(flatten)]
    pub q_learning: QLearningConfig,

    /// Initial exploration rate
    ///
    /// Default: 1.0
    pub epsilon: f64,

    /// Multiplicative decay of epsilon applied after every update
    ///
    /// Default: 0.999
    pub epsilon_decay: f64,

    /// Lower bound of epsilon
    ///
    /// Default: 0.001
    pub epsilon_min: f64,
}

impl DqnConfig {
    pub fn new(obs_space_shape: Vec<usize>, act_space_size: usize) -> Self {
        Self {
            q_learning: QLearningConfig::new(obs_space_shape, act_space_size),
            epsilon: 1.0,
            epsilon_decay: 0.999,
            epsilon_min: 0.001,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.q_learning.validate()?;

        for (name, value) in [("epsilon", self.epsilon), ("epsilon_decay", self.epsilon_decay)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RlibError::invalid_parameter(
                    name,
                    format!("must be in [0, 1], got {}", value),
                ));
            }
        }

        if !(0.0..=self.epsilon).contains(&self.epsilon_min) {
            return Err(RlibError::invalid_parameter(
                "epsilon_min",
                format!("must be in [0, epsilon], got {}", self.epsilon_min),
            ));
        }

        Ok(())
    }

    pub fn from_params(params: &Params) -> Result<Self> {
        let defaults = Self::new(Vec::new(), 0);
        let config = Self {
            q_learning: QLearningConfig::from_params(params)?,
            epsilon: param_f64(params, "epsilon", defaults.epsilon)?,
            epsilon_decay: param_f64(params, "epsilon_decay", defaults.epsilon_decay)?,
            epsilon_min: param_f64(params, "epsilon_min", defaults.epsilon_min)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_params(&self) -> Params {
        let mut params = self.q_learning.to_params();
        params.insert("epsilon".into(), Value::Float(self.epsilon));
        params.insert("epsilon_decay".into(), Value::Float(self.epsilon_decay));
        params.insert("epsilon_min".into(), Value::Float(self.epsilon_min));
        params
    }

    pub fn parameter_space() -> Space {
        let mut entries = QLearningConfig::parameter_space();
        entries.push(("epsilon", Space::scalar(0.0, 1.0)));
        entries.push(("epsilon_decay", Space::scalar(0.0, 1.0)));
        entries.push(("epsilon_min", Space::scalar(0.0, 1.0)));
        Space::dict(entries)
    }
}

/// Hyperparameters of [`super::ExpectedSarsa`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedSarsaConfig {
    #[serde(flatten)]
    pub q_learning: QLearningConfig,

    /// Softmax temperature of the policy
    ///
    /// Default: 1.0
    pub tau: f32,
}

impl ExpectedSarsaConfig {
    pub fn new(obs_space_shape: Vec<usize>, act_space_size: usize) -> Self {
        Self {
            q_learning: QLearningConfig::new(obs_space_shape, act_space_size),
            tau: 1.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.q_learning.validate()?;

        if !(self.tau > 0.0 && self.tau.is_finite()) {
            return Err(RlibError::invalid_parameter(
                "tau",
                format!("must be positive, got {}", self.tau),
            ));
        }

        Ok(())
    }

    pub fn from_params(params: &Params) -> Result<Self> {
        let config = Self {
            q_learning: QLearningConfig::from_params(params)?,
            tau: param_f64(params, "tau", 1.0)? as f32,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_params(&self) -> Params {
        let mut params = self.q_learning.to_params();
        params.insert("tau".into(), Value::Float(self.tau as f64));
        params
    }

    pub fn parameter_space() -> Space {
        let mut entries = QLearningConfig::parameter_space();
        entries.push(("tau", Space::scalar(0.0, f64::INFINITY)));
        Space::dict(entries)
    }
}
