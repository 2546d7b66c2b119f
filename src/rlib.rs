//! The library facade
//!
//! [`RLib`] ties one agent type, one environment [`Extension`] and a set of
//! loggers together. It owns every agent instance (state plus RNG), turns raw
//! environment observations into what the agent needs and runs the
//! update/sample cycle:
//!
//! ```text
//! env ──raw obs──▶ Extension::transform ──▶ Agent::update (training, not on the first step)
//!                                        └─▶ Agent::sample ──action──▶ env
//!                                        └─▶ Extension::advance
//! ```
//!
//! # Example
//!
//! ```no_run
//! use reinforced_lib::agents::ParticleFilter;
//! use reinforced_lib::exts::Ieee80211axRa;
//! use reinforced_lib::RLib;
//!
//! let mut rlib = RLib::<ParticleFilter>::builder()
//!     .ext(Box::new(Ieee80211axRa::new()))
//!     .build()?;
//! let agent_id = rlib.init(Some(7));
//! # let observation = Default::default();
//! let mcs = rlib.sample(&observation, agent_id, true)?;
//! # Ok::<(), reinforced_lib::error::RlibError>(())
//! ```

use crate::agents::{Agent, AgentFromParams};
use crate::error::{Result, RlibError};
use crate::exts::{Extension, StepContext};
use crate::logs::{LogValue, LoggerConfig, LoggerKind, LogsObserver, Source};
use crate::persistence::{instance_dir, read_json, write_json, RlibMetadata};
use crate::spaces::{Observation, Params, Space, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::path::Path;

/// Seed used by [`RLib::init`] when none is given
pub const DEFAULT_SEED: u64 = 42;

const INSTANCE_FILE: &str = "instance.json";

/// One agent instance
struct Instance<S> {
    state: S,
    rng: StdRng,
    seed: u64,
    steps: u64,
    last_action: Option<usize>,
    cumulative_reward: f64,
}

/// Bookkeeping of an [`Instance`] stored next to the agent state
#[derive(Debug, Serialize, Deserialize)]
struct InstanceRecord {
    seed: u64,
    steps: u64,
    last_action: Option<usize>,
    cumulative_reward: f64,
}

/// Reinforcement learning library handle for agents of type `A`
pub struct RLib<A: AgentFromParams> {
    agent: A,
    ext: Option<Box<dyn Extension>>,
    /// Every observation name the agent's update and sample spaces mention
    required_names: BTreeSet<String>,
    instances: BTreeMap<usize, Instance<A::State>>,
    next_id: usize,
    observer: LogsObserver,
    logger_config: LoggerConfig,
    first_step_made: bool,
}

/// Builder for [`RLib`]
pub struct RLibBuilder<A: AgentFromParams> {
    params: Params,
    ext: Option<Box<dyn Extension>>,
    no_ext_mode: bool,
    loggers: Vec<(Source, LoggerKind)>,
    logger_config: LoggerConfig,
    _agent: PhantomData<A>,
}

impl<A: AgentFromParams> Default for RLibBuilder<A> {
    fn default() -> Self {
        Self {
            params: Params::new(),
            ext: None,
            no_ext_mode: false,
            loggers: Vec::new(),
            logger_config: LoggerConfig::default(),
            _agent: PhantomData,
        }
    }
}

impl<A: AgentFromParams> RLibBuilder<A> {
    /// Agent parameters; anything missing is filled in from the extension
    pub fn agent_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Set a single agent parameter
    pub fn agent_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn ext(mut self, ext: Box<dyn Extension>) -> Self {
        self.ext = Some(ext);
        self
    }

    /// Feed observations to the agent unchanged, without an extension
    pub fn no_ext_mode(mut self, enabled: bool) -> Self {
        self.no_ext_mode = enabled;
        self
    }

    pub fn logger(mut self, source: Source, kind: LoggerKind) -> Self {
        self.loggers.push((source, kind));
        self
    }

    pub fn logger_config(mut self, config: LoggerConfig) -> Self {
        self.logger_config = config;
        self
    }

    pub fn build(self) -> Result<RLib<A>> {
        let ext = match (self.ext, self.no_ext_mode) {
            (Some(_), true) => return Err(RlibError::ForbiddenExtensionSet),
            (None, false) => return Err(RlibError::NoExtension),
            (ext, _) => ext,
        };

        let params = merge_params::<A>(self.params, ext.as_deref())?;
        let agent = A::from_params(&params)?;

        if let Some(ext) = ext.as_deref() {
            let provided = ext.provided_space();
            check_compatibility(&provided, &agent.update_observation_space())?;
            check_compatibility(&provided, &agent.sample_observation_space())?;
        }

        let required_names = agent
            .update_observation_space()
            .entries()
            .chain(agent.sample_observation_space().entries())
            .map(|(name, _)| name.clone())
            .collect();

        let mut observer = LogsObserver::new();
        for (source, kind) in self.loggers {
            observer.add_logger(source, kind, &self.logger_config);
        }

        tracing::debug!(
            agent = A::NAME,
            extension = ext.as_ref().map(|e| e.name()).unwrap_or("none"),
            "RLib built"
        );

        Ok(RLib {
            agent,
            ext,
            required_names,
            instances: BTreeMap::new(),
            next_id: 0,
            observer,
            logger_config: self.logger_config,
            first_step_made: false,
        })
    }
}

/// Fill in parameters the user did not give from the extension's defaults
fn merge_params<A: AgentFromParams>(
    mut params: Params,
    ext: Option<&dyn Extension>,
) -> Result<Params> {
    let parameter_space = A::parameter_space();

    if let Some(ext) = ext {
        for (name, _) in parameter_space.entries() {
            if params.contains_key(name) {
                continue;
            }
            if let Some(value) = ext.default_parameter(name) {
                params.insert(name.clone(), value);
            }
        }
    }

    for name in A::required_parameters() {
        if !params.contains_key(*name) {
            let space = parameter_space
                .entries()
                .find(|(n, _)| n.as_str() == *name)
                .map(|(_, s)| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());

            return Err(RlibError::NoDefaultParameter {
                extension: ext.map(|e| e.name()).unwrap_or("none").to_string(),
                name: name.to_string(),
                space,
            });
        }
    }

    Ok(params)
}

fn check_compatibility(provided: &Space, required: &Space) -> Result<()> {
    let provided: BTreeMap<&String, &Space> = provided.entries().collect();

    for (name, space) in required.entries() {
        match provided.get(name) {
            Some(p) if p.is_compatible_with(space) => {}
            other => {
                return Err(RlibError::IncompatibleSpaces {
                    ext_space: other.map(|p| p.to_string()).unwrap_or_else(|| "None".to_string()),
                    agent_space: format!("{} ({})", space, name),
                })
            }
        }
    }
    Ok(())
}

impl<A: AgentFromParams> RLib<A> {
    pub fn builder() -> RLibBuilder<A> {
        RLibBuilder::default()
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn is_no_ext_mode(&self) -> bool {
        self.ext.is_none()
    }

    /// Create a new agent instance and return its id
    pub fn init(&mut self, seed: Option<u64>) -> usize {
        let seed = seed.unwrap_or(DEFAULT_SEED);
        let mut rng = StdRng::seed_from_u64(seed);
        let state = self.agent.init(&mut rng);

        let agent_id = self.next_id;
        self.next_id += 1;
        self.instances.insert(
            agent_id,
            Instance {
                state,
                rng,
                seed,
                steps: 0,
                last_action: None,
                cumulative_reward: 0.0,
            },
        );

        tracing::debug!(agent_id, seed, "Agent instance created");
        agent_id
    }

    pub fn agents_count(&self) -> usize {
        self.instances.len()
    }

    pub fn agent_ids(&self) -> Vec<usize> {
        self.instances.keys().copied().collect()
    }

    pub fn state(&self, agent_id: usize) -> Option<&A::State> {
        self.instances.get(&agent_id).map(|i| &i.state)
    }

    pub fn state_mut(&mut self, agent_id: usize) -> Option<&mut A::State> {
        self.instances.get_mut(&agent_id).map(|i| &mut i.state)
    }

    /// Sum of rewards observed by an instance so far
    pub fn cumulative_reward(&self, agent_id: usize) -> Option<f64> {
        self.instances.get(&agent_id).map(|i| i.cumulative_reward)
    }

    /// Process one environment observation and return the next action
    ///
    /// When `is_training` is set and the instance has acted before, the agent
    /// first learns from the outcome of its previous action. Instance 0 is
    /// created on first use if no instance exists yet.
    pub fn sample(
        &mut self,
        observation: &Observation,
        agent_id: usize,
        is_training: bool,
    ) -> Result<usize> {
        if self.instances.is_empty() && agent_id == 0 {
            self.init(None);
        }

        if !self.first_step_made {
            self.observer.init_loggers()?;
            self.first_step_made = true;
        }

        let instance = self
            .instances
            .get_mut(&agent_id)
            .ok_or(RlibError::UnknownAgent(agent_id))?;

        let context = StepContext {
            agent_id,
            last_action: instance.last_action,
        };
        let transformed = match self.ext.as_deref() {
            Some(ext) => ext.transform(observation, &self.required_names, context)?,
            None => observation.clone(),
        };

        if is_training && instance.last_action.is_some() {
            self.agent
                .update(&mut instance.state, &mut instance.rng, &transformed)?;
        }

        let action = self
            .agent
            .sample(&instance.state, &mut instance.rng, &transformed)?;

        if let Some(ext) = self.ext.as_mut() {
            ext.advance(observation, context);
        }

        let mut all_observations = observation.clone();
        all_observations.extend(transformed);

        let reward = match (&self.ext, instance.last_action) {
            (_, None) => None,
            (Some(ext), Some(_)) => ext.reward(&all_observations),
            (None, Some(_)) => all_observations.get("reward").and_then(Value::as_f64),
        };
        if let Some(reward) = reward {
            instance.cumulative_reward += reward;
        }

        instance.last_action = Some(action);
        instance.steps += 1;

        tracing::trace!(agent_id, action, step = instance.steps, "Sampled action");

        if !self.observer.is_empty() {
            let mut metrics = BTreeMap::new();
            metrics.insert("action".to_string(), LogValue::Scalar(action as f64));
            if let Some(reward) = reward {
                metrics.insert("reward".to_string(), LogValue::Scalar(reward));
            }
            metrics.insert("cumulative".to_string(), LogValue::Scalar(instance.cumulative_reward));

            let agent = &self.agent;
            let state = &instance.state;
            self.observer.update_observations(&all_observations)?;
            self.observer
                .update_agent_state(|name| agent.state_value(state, name))?;
            self.observer.update_metrics(&metrics)?;
        }

        Ok(action)
    }

    /// Register a logger; only possible before the first step
    pub fn add_logger(&mut self, source: Source, kind: LoggerKind) -> Result<()> {
        if self.first_step_made {
            return Err(RlibError::ForbiddenLoggerSet);
        }
        self.observer.add_logger(source, kind, &self.logger_config);
        Ok(())
    }

    /// Log a user-provided value to loggers with a source of that name
    pub fn log(&mut self, name: &str, value: impl Into<LogValue>) -> Result<()> {
        self.observer.log_custom(name, &value.into())
    }

    /// Flush and close all loggers
    pub fn finish(&mut self) -> Result<()> {
        self.observer.finish_loggers()
    }

    /// Raw observations expected from the environment
    pub fn observation_space(&self) -> Space {
        match &self.ext {
            Some(ext) => ext.observation_space(),
            None => {
                let mut entries: BTreeMap<String, Space> = BTreeMap::new();
                for (name, space) in self
                    .agent
                    .update_observation_space()
                    .entries()
                    .chain(self.agent.sample_observation_space().entries())
                {
                    entries.entry(name.clone()).or_insert_with(|| space.clone());
                }
                Space::Dict(entries)
            }
        }
    }

    pub fn action_space(&self) -> Space {
        self.agent.action_space()
    }

    /// Write a checkpoint of the given instances, or all of them, into `dir`
    pub fn save(&self, dir: &Path, agent_ids: Option<&[usize]>) -> Result<()> {
        let ids: Vec<usize> = match agent_ids {
            Some(ids) => ids.to_vec(),
            None => self.instances.keys().copied().collect(),
        };

        for &agent_id in &ids {
            let instance = self
                .instances
                .get(&agent_id)
                .ok_or(RlibError::UnknownAgent(agent_id))?;

            let path = instance_dir(dir, agent_id);
            std::fs::create_dir_all(&path)?;
            self.agent.save_state(&instance.state, &path)?;
            write_json(
                &path.join(INSTANCE_FILE),
                &InstanceRecord {
                    seed: instance.seed,
                    steps: instance.steps,
                    last_action: instance.last_action,
                    cumulative_reward: instance.cumulative_reward,
                },
            )?;
        }

        let metadata = RlibMetadata::new(
            A::NAME,
            self.agent.params(),
            self.ext.as_ref().map(|e| e.name()),
            ids,
        );
        metadata.save(dir)?;

        tracing::info!(
            path = %dir.display(),
            instances = metadata.instances.len(),
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Rebuild a library from a checkpoint written by [`RLib::save`]
    ///
    /// `ext` must be of the same type as the extension the checkpoint was
    /// saved with, and `None` exactly when it was saved in no-extension mode.
    pub fn load(dir: &Path, ext: Option<Box<dyn Extension>>) -> Result<Self> {
        let metadata = RlibMetadata::load(dir)?;
        check_agent_type::<A>(&metadata)?;

        let no_ext_mode = match (&metadata.extension, &ext) {
            (Some(saved), Some(ext)) if saved != ext.name() => {
                return Err(RlibError::IncorrectExtensionType {
                    provided: ext.name().to_string(),
                    expected: saved.clone(),
                })
            }
            (Some(_), None) => return Err(RlibError::NoExtension),
            (None, Some(_)) => return Err(RlibError::ForbiddenExtensionSet),
            (saved, _) => saved.is_none(),
        };

        let mut builder = Self::builder()
            .agent_params(metadata.params.clone())
            .no_ext_mode(no_ext_mode);
        if let Some(ext) = ext {
            builder = builder.ext(ext);
        }

        let mut rlib = builder.build()?;
        rlib.restore_instances(dir, &metadata)?;
        Ok(rlib)
    }

    /// Add the instances of a checkpoint to this library
    ///
    /// Instances with an id already in use are replaced. The checkpoint must
    /// have been saved by an agent of the same type and parameters.
    pub fn load_instances(&mut self, dir: &Path) -> Result<()> {
        let metadata = RlibMetadata::load(dir)?;
        check_agent_type::<A>(&metadata)?;

        if metadata.params != self.agent.params() {
            let agent_id = metadata.instances.first().copied().unwrap_or(0);
            return Err(RlibError::IncorrectAgentParameters { agent_id });
        }

        self.restore_instances(dir, &metadata)
    }

    fn restore_instances(&mut self, dir: &Path, metadata: &RlibMetadata) -> Result<()> {
        for &agent_id in &metadata.instances {
            let path = instance_dir(dir, agent_id);
            let state = self.agent.load_state(&path)?;
            let record: InstanceRecord = read_json(&path.join(INSTANCE_FILE))?;

            // The generator cannot be serialized; continue from a seed derived from its progress
            let rng = StdRng::seed_from_u64(record.seed.wrapping_add(record.steps));

            self.instances.insert(
                agent_id,
                Instance {
                    state,
                    rng,
                    seed: record.seed,
                    steps: record.steps,
                    last_action: record.last_action,
                    cumulative_reward: record.cumulative_reward,
                },
            );
            self.next_id = self.next_id.max(agent_id + 1);
        }

        tracing::info!(
            path = %dir.display(),
            instances = metadata.instances.len(),
            "Checkpoint loaded"
        );
        Ok(())
    }
}

fn check_agent_type<A: AgentFromParams>(metadata: &RlibMetadata) -> Result<()> {
    if metadata.agent != A::NAME {
        return Err(RlibError::IncorrectAgentType {
            provided: metadata.agent.clone(),
            expected: A::NAME.to_string(),
        });
    }
    Ok(())
}
