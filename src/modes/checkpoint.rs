//! Inference-only checkpoints
//!
//! Loads a checkpoint written during training, drops everything only needed
//! to keep learning (replay buffer, optimizer moments, exploration) and saves
//! the result. An agent restored from the stripped checkpoint always acts
//! according to its network.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::agents::{AgentFromParams, Dqn, ExpectedSarsa};
use crate::exts::{Extension, Gymnasium};
use crate::persistence::RlibMetadata;
use crate::spaces::{Params, ValueMap};
use crate::RLib;

/// Agents whose state can be reduced to what inference needs
pub trait InferenceState: AgentFromParams {
    fn strip_training_state(state: &mut Self::State);
}

impl InferenceState for Dqn {
    fn strip_training_state(state: &mut Self::State) {
        state.q.strip_training_state();
        state.epsilon = 0.0;
    }
}

impl InferenceState for ExpectedSarsa {
    fn strip_training_state(state: &mut Self::State) {
        state.strip_training_state();
    }
}

pub struct CheckpointMode {
    load_path: PathBuf,
    save_path: PathBuf,
}

impl CheckpointMode {
    pub fn new(load_path: PathBuf, save_path: PathBuf) -> Self {
        Self {
            load_path,
            save_path,
        }
    }

    /// Strip the checkpoint and return the ids of the saved instances
    pub fn run<A: InferenceState>(&self) -> Result<Vec<usize>> {
        let metadata = RlibMetadata::load(&self.load_path)
            .with_context(|| format!("Failed to read checkpoint {:?}", self.load_path))?;
        let ext = extension_for(&metadata)?;

        let mut rlib = RLib::<A>::load(&self.load_path, ext)
            .with_context(|| {
                format!("Failed to load {} checkpoint {:?}", A::NAME, self.load_path)
            })?;

        let ids = rlib.agent_ids();
        for &agent_id in &ids {
            if let Some(state) = rlib.state_mut(agent_id) {
                A::strip_training_state(state);
            }
        }

        rlib.save(&self.save_path, None)
            .with_context(|| format!("Failed to save checkpoint to {:?}", self.save_path))?;

        println!(
            "Inference checkpoint with {} instance(s) saved to {:?}",
            ids.len(),
            self.save_path
        );
        Ok(ids)
    }

    pub fn load_path(&self) -> &Path {
        &self.load_path
    }
}

/// Recreate the extension a checkpoint was saved with
fn extension_for(metadata: &RlibMetadata) -> Result<Option<Box<dyn Extension>>> {
    match metadata.extension.as_deref() {
        None => Ok(None),
        Some("Gymnasium") => {
            let params: &Params = &metadata.params;
            let shape = params
                .get_array("obs_space_shape")?
                .into_iter()
                .map(|d| d as usize)
                .collect();
            let act_space_size = params.get_usize("act_space_size")?;
            Ok(Some(Box::new(Gymnasium::new(shape, act_space_size))))
        }
        Some(other) => {
            anyhow::bail!("Checkpoints saved with the {} extension are not supported", other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Agent;
    use crate::modes::train::{TrainConfig, TrainMode};
    use crate::spaces::Value;
    use tempfile::TempDir;

    #[test]
    fn test_strips_dqn_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let trained = temp_dir.path().join("trained");
        let stripped = temp_dir.path().join("stripped");

        let mut config = TrainConfig::new(1, trained.clone());
        config.agent_params.insert("hidden_sizes".into(), Value::Array(vec![8.0]));
        config.agent_params.insert("experience_replay_batch_size".into(), Value::Int(4));
        TrainMode::<Dqn>::new(config).unwrap().run().unwrap();

        let ids = CheckpointMode::new(trained.clone(), stripped.clone())
            .run::<Dqn>()
            .unwrap();
        assert_eq!(ids, vec![0]);

        let load = |path: &Path| {
            let ext = extension_for(&RlibMetadata::load(path).unwrap()).unwrap();
            RLib::<Dqn>::load(path, ext).unwrap()
        };
        let original = load(&trained);
        let loaded = load(&stripped);

        let state = loaded.state(0).unwrap();
        assert_eq!(state.epsilon, 0.0);
        assert!(state.q.replay_buffer().is_empty());
        assert!(original.state(0).unwrap().q.replay_buffer().len() > 0);
        assert_eq!(
            state.q.q_values(&[0.1, 0.0, -0.1, 0.0]).unwrap(),
            original.state(0).unwrap().q.q_values(&[0.1, 0.0, -0.1, 0.0]).unwrap()
        );
        assert_eq!(loaded.agent().params(), original.agent().params());
    }

    #[test]
    fn test_strips_expected_sarsa_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let trained = temp_dir.path().join("trained");
        let stripped = temp_dir.path().join("stripped");

        let mut config = TrainConfig::new(1, trained.clone());
        config.agent_params.insert("hidden_sizes".into(), Value::Array(vec![8.0]));
        config.agent_params.insert("experience_replay_batch_size".into(), Value::Int(4));
        TrainMode::<ExpectedSarsa>::new(config).unwrap().run().unwrap();

        let ids = CheckpointMode::new(trained.clone(), stripped.clone())
            .run::<ExpectedSarsa>()
            .unwrap();
        assert_eq!(ids, vec![0]);

        let load = |path: &Path| {
            let ext = extension_for(&RlibMetadata::load(path).unwrap()).unwrap();
            RLib::<ExpectedSarsa>::load(path, ext).unwrap()
        };
        let original = load(&trained);
        let loaded = load(&stripped);

        let state = loaded.state(0).unwrap();
        assert!(state.replay_buffer().is_empty());
        assert!(state.loss().is_none());
        assert!(!original.state(0).unwrap().replay_buffer().is_empty());
        assert_eq!(
            state.q_values(&[0.0, 0.1, 0.0, -0.1]).unwrap(),
            original.state(0).unwrap().q_values(&[0.0, 0.1, 0.0, -0.1]).unwrap()
        );
        assert_eq!(loaded.agent().params(), original.agent().params());
    }

    #[test]
    fn test_rejects_wrong_agent_type() {
        let temp_dir = TempDir::new().unwrap();
        let trained = temp_dir.path().join("trained");

        let mut config = TrainConfig::new(1, trained.clone());
        config.agent_params.insert("hidden_sizes".into(), Value::Array(vec![8.0]));
        TrainMode::<ExpectedSarsa>::new(config).unwrap().run().unwrap();

        let mode = CheckpointMode::new(trained, temp_dir.path().join("out"));
        assert!(mode.run::<Dqn>().is_err());
    }
}
