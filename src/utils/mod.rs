//! Building blocks shared by the agents
//!
//! - Experience replay ring buffer for off-policy deep agents
//! - Generic scalar particle filter
//! - Numeric helpers (normal CDF, softmax, categorical sampling)

pub mod experience_replay;
pub mod math;
pub mod particle_filter;

pub use experience_replay::{BatchData, ReplayBatch, ReplayBuffer};
pub use particle_filter::{ParticleFilter, ParticleFilterState};
