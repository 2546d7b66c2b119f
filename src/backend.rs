//! Backend type aliases and device management
//!
//! - **TrainingBackend**: autodiff-enabled NdArray backend used by the deep agents
//! - **InferenceBackend**: plain NdArray backend, used for gradient-free forward passes
//!
//! The networks involved are small multilayer perceptrons, so the CPU backend
//! is sufficient.

use burn::backend::{
    ndarray::{NdArray, NdArrayDevice},
    Autodiff,
};

/// Backend with automatic differentiation, used to train Q-networks
pub type TrainingBackend = Autodiff<NdArray<f32>>;

/// Backend without gradient tracking
pub type InferenceBackend = NdArray<f32>;

/// Get the default device for computation
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}
