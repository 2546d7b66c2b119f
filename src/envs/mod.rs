//! Environments driven by the `rlib` binary
//!
//! - [`CartPole`]: the classic control task, used to train deep agents
//! - [`WifiSimulation`]: an IEEE 802.11ax channel model speaking the
//!   [`crate::bridge`] record protocol, used for rate adaptation

pub mod cartpole;
pub mod wifi;

pub use cartpole::CartPole;
pub use wifi::{MobilityModel, WifiConfig, WifiSimulation};

/// Result of one environment step
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Observation after the step
    pub observation: Vec<f64>,
    /// Reward for this step
    pub reward: f64,
    /// The episode reached a terminal state
    pub terminated: bool,
    /// The episode was cut off by the step limit
    pub truncated: bool,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}
