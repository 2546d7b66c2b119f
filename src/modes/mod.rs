pub mod checkpoint;
pub mod ra;
pub mod train;

pub use checkpoint::{CheckpointMode, InferenceState};
pub use ra::{RaConfig, RaMode, RaSummary};
pub use train::{TrainConfig, TrainFileConfig, TrainMode};
