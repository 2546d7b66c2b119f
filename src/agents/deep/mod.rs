//! Deep value-based agents built on burn
//!
//! [`Dqn`] and [`ExpectedSarsa`] share everything but the bootstrap target
//! and the behaviour policy: a [`QNetwork`] trained with Adam on minibatches
//! drawn from a [`ReplayBuffer`], against a gradient-free snapshot of the
//! network taken at the start of each update.

pub mod config;
pub mod dqn;
pub mod expected_sarsa;
pub mod network;

pub use config::{DqnConfig, ExpectedSarsaConfig, QLearningConfig};
pub use dqn::{Dqn, DqnState};
pub use expected_sarsa::ExpectedSarsa;
pub use network::{QNetwork, QNetworkConfig};

use crate::backend::{default_device, InferenceBackend, TrainingBackend};
use crate::error::{Result, RlibError};
use crate::persistence::{load_module, read_json, save_module, write_json};
use crate::spaces::{Observation, Space, ValueMap};
use crate::utils::ReplayBuffer;
use burn::{
    module::AutodiffModule,
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    tensor::{activation::softmax, ElementConversion, Int, Tensor, TensorData},
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

type Network = QNetwork<TrainingBackend>;
type NetworkOptimizer = OptimizerAdaptor<Adam, Network, TrainingBackend>;

const NETWORK_FILE: &str = "network";
const STATE_FILE: &str = "state.json";

/// How the value of the next state is estimated from target Q-values
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Bootstrap {
    /// `max_a' Q(s', a')`
    Greedy,
    /// `Σ_a' softmax(Q(s')/τ)_a' · Q(s', a')`
    Expected { tau: f32 },
}

/// A transition read from an update observation
pub(crate) struct Transition {
    pub env_state: Vec<f32>,
    pub action: usize,
    pub reward: f32,
    pub terminal: bool,
}

impl Transition {
    pub fn from_observation(observation: &Observation, config: &QLearningConfig) -> Result<Self> {
        let action = observation.get_usize("action")?;
        if action >= config.act_space_size {
            return Err(RlibError::invalid_observation(
                "action",
                format!("{} is outside of {} actions", action, config.act_space_size),
            ));
        }

        Ok(Self {
            env_state: env_state(observation, config)?,
            action,
            reward: observation.get_f64("reward")? as f32,
            terminal: observation.get_bool("terminal")?,
        })
    }
}

/// Read and check the `env_state` observation
pub(crate) fn env_state(observation: &Observation, config: &QLearningConfig) -> Result<Vec<f32>> {
    let values = observation.get_array("env_state")?;
    if values.len() != config.obs_dim() {
        return Err(RlibError::invalid_observation(
            "env_state",
            format!("expected {} elements, got {}", config.obs_dim(), values.len()),
        ));
    }
    Ok(values.into_iter().map(|x| x as f32).collect())
}

pub(crate) fn update_observation_space(config: &QLearningConfig) -> Space {
    Space::dict([
        (
            "env_state",
            Space::float_box(f64::NEG_INFINITY, f64::INFINITY, &config.obs_space_shape),
        ),
        ("action", Space::Discrete(config.act_space_size)),
        ("reward", Space::scalar(f64::NEG_INFINITY, f64::INFINITY)),
        ("terminal", Space::MultiBinary(1)),
    ])
}

pub(crate) fn sample_observation_space(config: &QLearningConfig) -> Space {
    Space::dict([(
        "env_state",
        Space::float_box(f64::NEG_INFINITY, f64::INFINITY, &config.obs_space_shape),
    )])
}

/// Learning state of one Q-learning instance
pub struct QState {
    network: Network,
    optimizer: NetworkOptimizer,
    replay_buffer: ReplayBuffer,
    prev_env_state: Vec<f32>,
    loss: Option<f32>,
    updates: usize,
}

/// Part of [`QState`] stored next to the network weights
#[derive(Serialize, Deserialize)]
struct QStateRecord {
    replay_buffer: ReplayBuffer,
    prev_env_state: Vec<f32>,
    loss: Option<f32>,
    updates: usize,
}

impl QState {
    /// Fresh network and optimizer, empty buffer, all-zero previous state
    pub(crate) fn new(config: &QLearningConfig) -> Self {
        let network = QNetworkConfig::new(config.obs_dim(), config.act_space_size)
            .with_hidden_sizes(config.hidden_sizes.clone())
            .init::<TrainingBackend>(&default_device());

        Self {
            network,
            optimizer: AdamConfig::new().init(),
            replay_buffer: ReplayBuffer::new(
                config.experience_replay_buffer_size,
                config.obs_dim(),
            ),
            prev_env_state: vec![0.0; config.obs_dim()],
            loss: None,
            updates: 0,
        }
    }

    pub fn network(&self) -> &QNetwork<TrainingBackend> {
        &self.network
    }

    pub fn replay_buffer(&self) -> &ReplayBuffer {
        &self.replay_buffer
    }

    pub fn prev_env_state(&self) -> &[f32] {
        &self.prev_env_state
    }

    /// Loss of the last gradient step, if any was taken
    pub fn loss(&self) -> Option<f32> {
        self.loss
    }

    /// Number of updates performed
    pub fn updates(&self) -> usize {
        self.updates
    }

    /// Drop everything only needed for training
    pub fn strip_training_state(&mut self) {
        self.replay_buffer.clear();
        self.optimizer = AdamConfig::new().init();
        self.loss = None;
    }

    /// Q-values of a single state, computed without gradient tracking
    pub(crate) fn q_values(&self, env_state: &[f32]) -> Result<Vec<f32>> {
        let device = default_device();
        let input = Tensor::<InferenceBackend, 2>::from_data(
            TensorData::new(env_state.to_vec(), [1, env_state.len()]),
            &device,
        );

        self.network
            .clone()
            .valid()
            .forward(input)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| RlibError::Tensor(format!("{:?}", e)))
    }

    /// Store the transition and run the configured number of gradient steps
    pub(crate) fn learn<R: Rng + ?Sized>(
        &mut self,
        config: &QLearningConfig,
        rng: &mut R,
        transition: Transition,
        bootstrap: Bootstrap,
        loss_scale: f32,
    ) -> Result<()> {
        self.replay_buffer.push(
            &self.prev_env_state,
            transition.action,
            transition.reward,
            transition.terminal,
            &transition.env_state,
        );

        if self.replay_buffer.is_ready(config.experience_replay_batch_size) {
            let target_network = self.network.clone().valid();
            for _ in 0..config.experience_replay_steps {
                self.gradient_step(config, rng, &target_network, bootstrap, loss_scale);
            }
        }

        self.prev_env_state = transition.env_state;
        self.updates += 1;
        Ok(())
    }

    fn gradient_step<R: Rng + ?Sized>(
        &mut self,
        config: &QLearningConfig,
        rng: &mut R,
        target_network: &QNetwork<InferenceBackend>,
        bootstrap: Bootstrap,
        loss_scale: f32,
    ) {
        let device = default_device();
        let batch = self
            .replay_buffer
            .sample(config.experience_replay_batch_size, rng)
            .into_data();

        // Bootstrap targets, computed on the inner backend so no gradient flows into them
        let next_states = Tensor::<InferenceBackend, 2>::from_data(batch.next_states, &device);
        let rewards = Tensor::<InferenceBackend, 2>::from_data(batch.rewards, &device);
        let terminals = Tensor::<InferenceBackend, 2>::from_data(batch.terminals, &device);

        let q_next = target_network.forward(next_states);
        let next_values = match bootstrap {
            Bootstrap::Greedy => q_next.max_dim(1),
            Bootstrap::Expected { tau } => {
                (softmax(q_next.clone().div_scalar(tau), 1) * q_next).sum_dim(1)
            }
        };
        let not_terminal = terminals.neg().add_scalar(1.0);
        let targets = rewards + not_terminal * next_values.mul_scalar(config.discount);
        let targets = Tensor::<TrainingBackend, 2>::from_data(targets.into_data(), &device);

        let states = Tensor::<TrainingBackend, 2>::from_data(batch.states, &device);
        let actions = Tensor::<TrainingBackend, 2, Int>::from_data(batch.actions, &device);

        let q_values = self.network.forward(states).gather(1, actions);
        let diff = q_values - targets;
        let loss = (diff.clone() * diff).mean().mul_scalar(loss_scale);

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.network);
        self.network = self
            .optimizer
            .step(config.learning_rate, self.network.clone(), grads);

        self.loss = Some(loss.into_scalar().elem::<f32>());
    }

    pub(crate) fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        save_module(&self.network, &dir.join(NETWORK_FILE))?;
        write_json(
            &dir.join(STATE_FILE),
            &QStateRecord {
                replay_buffer: self.replay_buffer.clone(),
                prev_env_state: self.prev_env_state.clone(),
                loss: self.loss,
                updates: self.updates,
            },
        )
    }

    /// Restore a saved instance; the optimizer starts fresh
    pub(crate) fn load(config: &QLearningConfig, dir: &Path) -> Result<Self> {
        let mut state = Self::new(config);
        state.network = load_module(state.network, &dir.join(NETWORK_FILE), &default_device())?;

        let record: QStateRecord = read_json(&dir.join(STATE_FILE))?;
        state.replay_buffer = record.replay_buffer;
        state.prev_env_state = record.prev_env_state;
        state.loss = record.loss;
        state.updates = record.updates;
        Ok(state)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::spaces::Value;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    pub(crate) fn small_config() -> QLearningConfig {
        QLearningConfig {
            hidden_sizes: vec![8],
            experience_replay_buffer_size: 16,
            experience_replay_batch_size: 4,
            experience_replay_steps: 2,
            ..QLearningConfig::new(vec![2], 3)
        }
    }

    /// One gradient step per update, taken once four transitions are stored
    pub(crate) fn single_step_config() -> QLearningConfig {
        QLearningConfig {
            experience_replay_steps: 1,
            ..small_config()
        }
    }

    pub(crate) fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() <= 1e-4 * expected.abs().max(1.0),
            "{} != {}",
            actual,
            expected
        );
    }

    pub(crate) fn update_observation(
        env_state: [f64; 2],
        action: i64,
        reward: f64,
        terminal: bool,
    ) -> Observation {
        let mut obs = Observation::new();
        obs.insert("env_state".into(), Value::Array(env_state.to_vec()));
        obs.insert("action".into(), Value::Int(action));
        obs.insert("reward".into(), Value::Float(reward));
        obs.insert("terminal".into(), Value::Bool(terminal));
        obs
    }

    #[test]
    fn test_learn_waits_for_full_batch() {
        let config = small_config();
        let mut state = QState::new(&config);
        let mut rng = StdRng::seed_from_u64(0);

        for i in 0..3 {
            let obs = update_observation([i as f64, 0.0], 1, 1.0, false);
            let transition = Transition::from_observation(&obs, &config).unwrap();
            state.learn(&config, &mut rng, transition, Bootstrap::Greedy, 0.5).unwrap();
            assert!(state.loss().is_none());
        }

        let obs = update_observation([3.0, 0.0], 1, 1.0, true);
        let transition = Transition::from_observation(&obs, &config).unwrap();
        state.learn(&config, &mut rng, transition, Bootstrap::Expected { tau: 1.0 }, 1.0).unwrap();

        let loss = state.loss().expect("a gradient step was taken");
        assert!(loss.is_finite() && loss >= 0.0);
        assert_eq!(state.replay_buffer().len(), 4);
        assert_eq!(state.prev_env_state(), &[3.0, 0.0]);
        assert_eq!(state.updates(), 4);
    }

    #[test]
    fn test_terminal_transitions_drop_bootstrap() {
        // Same state before and after, so every stored transition is identical
        let config = single_step_config();
        let obs = update_observation([0.0, 0.0], 2, -1.5, true);

        let mut state = QState::new(&config);
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..3 {
            let transition = Transition::from_observation(&obs, &config).unwrap();
            state.learn(&config, &mut rng, transition, Bootstrap::Greedy, 1.0).unwrap();
        }

        let q = state.q_values(&[0.0, 0.0]).unwrap();
        let transition = Transition::from_observation(&obs, &config).unwrap();
        state.learn(&config, &mut rng, transition, Bootstrap::Greedy, 1.0).unwrap();

        assert_close(state.loss().unwrap(), (q[2] + 1.5).powi(2));
    }

    #[test]
    fn test_transition_validation() {
        let config = small_config();

        let obs = update_observation([0.0, 0.0], 3, 0.0, false);
        assert!(matches!(
            Transition::from_observation(&obs, &config),
            Err(RlibError::InvalidObservation { .. })
        ));

        let mut obs = update_observation([0.0, 0.0], 0, 0.0, false);
        obs.insert("env_state".into(), Value::Array(vec![1.0, 2.0, 3.0]));
        assert!(Transition::from_observation(&obs, &config).is_err());

        let mut obs = update_observation([0.0, 0.0], 0, 0.0, false);
        obs.remove("reward");
        assert!(matches!(
            Transition::from_observation(&obs, &config),
            Err(RlibError::MissingObservation(_))
        ));
    }

    #[test]
    fn test_q_values_shape() {
        let config = small_config();
        let state = QState::new(&config);
        let q = state.q_values(&[0.5, -0.5]).unwrap();
        assert_eq!(q.len(), 3);
        assert!(q.iter().all(|v| v.is_finite()));
    }
}
