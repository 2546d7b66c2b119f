//! Training mode for deep agents on CartPole
//!
//! Runs episodes through [`RLib`] with the Gymnasium extension, so the agent
//! only ever sees `env_state`, `reward` and `terminal`. Progress is printed
//! every `log_frequency` episodes and the library is checkpointed every
//! `checkpoint_frequency` episodes and at the end.
//!
//! # Example
//!
//! ```rust,ignore
//! use reinforced_lib::agents::Dqn;
//! use reinforced_lib::modes::{TrainConfig, TrainMode};
//!
//! let config = TrainConfig::new(300, "checkpoints/dqn".into());
//! let mut train_mode = TrainMode::<Dqn>::new(config)?;
//! train_mode.run()?;
//! ```

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::agents::AgentFromParams;
use crate::envs::CartPole;
use crate::exts::Gymnasium;
use crate::logs::{LogValue, LoggerConfig, LoggerKind, Source, SourceType};
use crate::metrics::TrainingStats;
use crate::spaces::{Observation, Params, Value};
use crate::RLib;

/// Contents of a `--config` TOML file
///
/// ```toml
/// [agent]
/// learning_rate = 0.0005
/// hidden_sizes = [128, 128]
///
/// [logger]
/// csv_path = "runs/dqn.csv"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainFileConfig {
    /// Agent parameter overrides
    pub agent: Params,
    pub logger: LoggerConfig,
}

impl TrainFileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse config file {:?}", path))
    }
}

/// Configuration for training mode
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub num_episodes: usize,

    /// Checkpoint directory of the final library
    pub save_path: PathBuf,

    /// Save a checkpoint every N episodes
    pub checkpoint_frequency: usize,

    /// Print progress every N episodes
    pub log_frequency: usize,

    pub seed: u64,

    /// Record per-step reward and loss to the CSV logger
    pub csv_log: bool,

    pub agent_params: Params,
    pub logger_config: LoggerConfig,
}

impl TrainConfig {
    pub fn new(num_episodes: usize, save_path: PathBuf) -> Self {
        Self {
            num_episodes,
            save_path,
            checkpoint_frequency: 100,
            log_frequency: 10,
            seed: 42,
            csv_log: false,
            agent_params: Params::new(),
            logger_config: LoggerConfig::default(),
        }
    }

    /// Apply a TOML file on top of this configuration
    pub fn with_file_config(mut self, file: TrainFileConfig) -> Self {
        self.agent_params.extend(file.agent);
        self.logger_config = file.logger;
        self
    }
}

/// Training loop of one agent instance on CartPole
pub struct TrainMode<A: AgentFromParams> {
    rlib: RLib<A>,
    env: CartPole,
    rng: StdRng,
    agent_id: usize,
    stats: TrainingStats,
    config: TrainConfig,
    current_episode: usize,
}

fn gym_observation(env_state: &[f64], reward: f64, terminal: bool) -> Observation {
    let mut obs = Observation::new();
    obs.insert("env_state".into(), Value::Array(env_state.to_vec()));
    obs.insert("reward".into(), Value::Float(reward));
    obs.insert("terminal".into(), Value::Bool(terminal));
    obs
}

impl<A: AgentFromParams> TrainMode<A> {
    pub fn new(config: TrainConfig) -> Result<Self> {
        let mut builder = RLib::<A>::builder()
            .agent_params(config.agent_params.clone())
            .ext(Box::new(Gymnasium::new(
                vec![CartPole::OBSERVATION_SIZE],
                CartPole::NUM_ACTIONS,
            )))
            .logger_config(config.logger_config.clone());

        if config.csv_log {
            builder = builder
                .logger(Source::named("reward", SourceType::Metric), LoggerKind::Csv)
                .logger(Source::named("loss", SourceType::State), LoggerKind::Csv);
        }

        let mut rlib = builder
            .build()
            .with_context(|| format!("Failed to build {} agent", A::NAME))?;
        let agent_id = rlib.init(Some(config.seed));

        Ok(Self {
            rlib,
            env: CartPole::new(),
            rng: StdRng::seed_from_u64(config.seed),
            agent_id,
            stats: TrainingStats::new(100),
            config,
            current_episode: 0,
        })
    }

    pub fn rlib(&self) -> &RLib<A> {
        &self.rlib
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub fn run(&mut self) -> Result<()> {
        self.print_header();

        for episode in 0..self.config.num_episodes {
            self.current_episode = episode;

            let (reward, length) = self.run_episode()?;
            self.stats.record_episode(reward, length);
            if let Some(LogValue::Scalar(loss)) = self
                .rlib
                .state(self.agent_id)
                .and_then(|state| self.rlib.agent().state_value(state, "loss"))
            {
                self.stats.record_loss(loss as f32);
            }

            if (episode + 1) % self.config.log_frequency.max(1) == 0 {
                self.print_progress(episode + 1);
            }

            if (episode + 1) % self.config.checkpoint_frequency.max(1) == 0 {
                self.save_checkpoint()?;
            }
        }

        self.rlib
            .save(&self.config.save_path, None)
            .with_context(|| {
                format!("Failed to save final checkpoint to {:?}", self.config.save_path)
            })?;
        self.rlib.finish().context("Failed to finish loggers")?;

        println!("\nTraining complete!");
        println!("Final checkpoint saved to: {:?}", self.config.save_path);
        println!("\nFinal Statistics:");
        println!("{}", self.stats.format_summary());

        Ok(())
    }

    /// Run a single episode, returning its total reward and length
    ///
    /// The first call of an episode reports the reset state with zero reward;
    /// the last one reports the terminal transition so the agent learns from it.
    fn run_episode(&mut self) -> Result<(f64, usize)> {
        let env_state = self.env.reset(&mut self.rng);
        let mut obs = gym_observation(&env_state, 0.0, false);
        let mut episode_reward = 0.0;
        let mut episode_steps = 0;

        loop {
            let action = self.rlib.sample(&obs, self.agent_id, true)?;
            let result = self.env.step(action);

            episode_reward += result.reward;
            episode_steps += 1;
            obs = gym_observation(&result.observation, result.reward, result.terminated);

            if result.done() {
                self.rlib.sample(&obs, self.agent_id, true)?;
                break;
            }
        }

        Ok((episode_reward, episode_steps))
    }

    fn save_checkpoint(&self) -> Result<()> {
        let checkpoint_path = self
            .config
            .save_path
            .join(format!("checkpoint_ep{}", self.current_episode + 1));

        self.rlib
            .save(&checkpoint_path, None)
            .with_context(|| format!("Failed to save checkpoint to {:?}", checkpoint_path))?;

        println!("  Checkpoint saved: {:?}", checkpoint_path);
        Ok(())
    }

    fn print_header(&self) {
        println!("{}", "=".repeat(70));
        println!("{} Training - CartPole", A::NAME);
        println!("{}", "=".repeat(70));
        println!("Episodes: {}", self.config.num_episodes);
        println!("Seed: {}", self.config.seed);
        println!("Agent parameters:");
        for (name, value) in self.rlib.agent().params() {
            println!("  {}: {:?}", name, value);
        }
        println!("Checkpoints: Every {} episodes", self.config.checkpoint_frequency);
        println!("Logging: Every {} episodes", self.config.log_frequency);
        println!("Save path: {:?}", self.config.save_path);
        println!("{}", "=".repeat(70));
        println!();
    }

    fn print_progress(&self, episode: usize) {
        println!(
            "[Episode {}/{}] {}",
            episode,
            self.config.num_episodes,
            self.stats.format_summary()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Dqn, ExpectedSarsa};
    use tempfile::TempDir;

    fn small_config(episodes: usize, save_path: PathBuf) -> TrainConfig {
        let mut config = TrainConfig::new(episodes, save_path);
        config.agent_params.insert("hidden_sizes".into(), Value::Array(vec![8.0]));
        config.agent_params.insert("experience_replay_batch_size".into(), Value::Int(8));
        config.agent_params.insert("experience_replay_steps".into(), Value::Int(1));
        config.checkpoint_frequency = 1000;
        config
    }

    #[test]
    fn test_file_config_overrides() {
        let file: TrainFileConfig = toml::from_str(
            r#"
            [agent]
            learning_rate = 0.01
            hidden_sizes = [16, 16]

            [logger]
            csv_path = "out.csv"
            "#,
        )
        .unwrap();

        let config = TrainConfig::new(1, PathBuf::from("x")).with_file_config(file);
        assert_eq!(config.agent_params.get("learning_rate"), Some(&Value::Float(0.01)));
        assert_eq!(
            config.agent_params.get("hidden_sizes"),
            Some(&Value::Array(vec![16.0, 16.0]))
        );
        assert_eq!(config.logger_config.csv_path, PathBuf::from("out.csv"));
    }

    #[test]
    fn test_run_single_episode() {
        let temp_dir = TempDir::new().unwrap();
        let mut train_mode =
            TrainMode::<Dqn>::new(small_config(1, temp_dir.path().join("dqn"))).unwrap();

        let (reward, steps) = train_mode.run_episode().unwrap();
        assert!(steps > 0);
        assert_eq!(reward, steps as f64);
    }

    #[test]
    fn test_run_saves_checkpoint_and_csv() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = small_config(2, temp_dir.path().join("sarsa"));
        config.csv_log = true;
        config.logger_config.csv_path = temp_dir.path().join("train.csv");

        let mut train_mode = TrainMode::<ExpectedSarsa>::new(config).unwrap();
        train_mode.run().unwrap();

        assert_eq!(train_mode.stats().total_episodes(), 2);
        assert!(temp_dir.path().join("sarsa").join("rlib.json").exists());

        let csv = std::fs::read_to_string(temp_dir.path().join("train.csv")).unwrap();
        assert!(csv.starts_with("source,step,value"));
        assert!(csv.contains("reward-metric"));
    }
}
