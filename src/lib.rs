//! reinforced_lib - reinforcement learning agents for simulated environments
//!
//! This library provides:
//! - Agents: deep Q-learning, deep expected SARSA and a particle filter for
//!   Wi-Fi rate adaptation (agents module)
//! - Extensions adapting environment observations to agents (exts module)
//! - Pluggable loggers (logs module)
//! - The [`RLib`] facade tying them together, with checkpointing
//! - Environments and the simulator record codec used by the `rlib` binary
//!   (envs, bridge and modes modules)

pub mod agents;
pub mod backend;
pub mod bridge;
pub mod envs;
pub mod error;
pub mod exts;
pub mod logs;
pub mod metrics;
pub mod modes;
pub mod persistence;
pub mod rlib;
pub mod spaces;
pub mod utils;

pub use error::{Result, RlibError};
pub use rlib::{RLib, RLibBuilder};
