//! Environment extensions
//!
//! An [`Extension`] sits between an environment and an agent. It knows the
//! raw observations an environment reports, derives the values agents need
//! (e.g. elapsed time or the data rate of each MCS) and supplies default
//! agent parameters for its environment.

pub mod gymnasium;
pub mod wifi;

pub use gymnasium::Gymnasium;
pub use wifi::Ieee80211axRa;

use crate::error::{Result, RlibError};
use crate::spaces::{Observation, Space, Value};
use std::collections::BTreeSet;

/// Per-call information an extension may use when deriving values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepContext {
    /// Instance the observation belongs to
    pub agent_id: usize,

    /// Action sampled by that instance on its previous step
    pub last_action: Option<usize>,
}

/// Adapter between one environment and the generic agent interface
pub trait Extension {
    /// Type name, stored in checkpoints
    fn name(&self) -> &'static str;

    /// Raw observations reported by the environment
    fn observation_space(&self) -> Space;

    /// Every observation this extension can supply, raw or derived
    fn provided_space(&self) -> Space;

    /// Default value for an agent parameter, if this environment has one
    fn default_parameter(&self, name: &str) -> Option<Value>;

    /// Compute `names` from a raw observation
    ///
    /// Called once per step with every name any agent space needs. Does not
    /// change the extension; a failed step can be retried with the same input.
    fn transform(
        &self,
        raw: &Observation,
        names: &BTreeSet<String>,
        context: StepContext,
    ) -> Result<Observation>;

    /// Record a step whose update and sample succeeded
    ///
    /// Stateful derived values (e.g. the time of the previous report) move
    /// forward here and nowhere else.
    fn advance(&mut self, _raw: &Observation, _context: StepContext) {}

    /// Reward of the last action, used for metrics
    fn reward(&self, observation: &Observation) -> Option<f64> {
        observation.get("reward").and_then(Value::as_f64)
    }
}

/// Copy a raw value into `out`, failing if the environment did not report it
pub(crate) fn pass_through(raw: &Observation, name: &str, out: &mut Observation) -> Result<()> {
    let value = raw
        .get(name)
        .ok_or_else(|| RlibError::MissingObservation(name.to_string()))?;
    out.insert(name.to_string(), value.clone());
    Ok(())
}
