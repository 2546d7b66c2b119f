//! Extension for Gymnasium-style environments
//!
//! The environment reports `env_state`, `reward` and `terminal` after each
//! step. The action that led there is the one the agent sampled previously.

use super::{pass_through, Extension, StepContext};
use crate::agents::sizes_value;
use crate::error::{Result, RlibError};
use crate::spaces::{Observation, Space, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct Gymnasium {
    obs_space_shape: Vec<usize>,
    act_space_size: usize,
}

impl Gymnasium {
    pub fn new(obs_space_shape: Vec<usize>, act_space_size: usize) -> Self {
        Self {
            obs_space_shape,
            act_space_size,
        }
    }
}

impl Extension for Gymnasium {
    fn name(&self) -> &'static str {
        "Gymnasium"
    }

    fn observation_space(&self) -> Space {
        Space::dict([
            (
                "env_state",
                Space::float_box(f64::NEG_INFINITY, f64::INFINITY, &self.obs_space_shape),
            ),
            ("reward", Space::scalar(f64::NEG_INFINITY, f64::INFINITY)),
            ("terminal", Space::MultiBinary(1)),
        ])
    }

    fn provided_space(&self) -> Space {
        let mut space = self.observation_space();
        if let Space::Dict(entries) = &mut space {
            entries.insert("action".into(), Space::Discrete(self.act_space_size));
        }
        space
    }

    fn default_parameter(&self, name: &str) -> Option<Value> {
        match name {
            "obs_space_shape" => Some(sizes_value(&self.obs_space_shape)),
            "act_space_size" => Some(Value::from(self.act_space_size)),
            _ => None,
        }
    }

    fn transform(
        &self,
        raw: &Observation,
        names: &BTreeSet<String>,
        context: StepContext,
    ) -> Result<Observation> {
        let mut out = Observation::new();
        for name in names {
            if name == "action" {
                let action = context
                    .last_action
                    .ok_or_else(|| RlibError::MissingObservation("action".into()))?;
                out.insert("action".into(), Value::from(action));
            } else {
                pass_through(raw, name, &mut out)?;
            }
        }
        Ok(out)
    }
}
