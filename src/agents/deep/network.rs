//! Q-network for the deep agents
//!
//! A multilayer perceptron estimating one Q-value per discrete action.
//!
//! # Architecture
//!
//! ```text
//! Input: [batch, obs_dim]
//!   ↓ Linear(obs_dim → h1) + ReLU
//!   ↓ ...
//!   ↓ Linear(h_{n-1} → h_n) + ReLU
//!   ↓ Linear(h_n → num_actions)
//! Output: [batch, num_actions]
//! ```
//!
//! # Example
//!
//! ```rust
//! use reinforced_lib::agents::QNetworkConfig;
//! use burn::backend::ndarray::NdArrayDevice;
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//!
//! type Backend = NdArray<f32>;
//!
//! let device = NdArrayDevice::default();
//! let network = QNetworkConfig::new(4, 2).init::<Backend>(&device);
//!
//! let q_values = network.forward(Tensor::zeros([8, 4], &device));
//! assert_eq!(q_values.dims(), [8, 2]);
//! ```

use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{activation::relu, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

/// Shape of a [`QNetwork`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QNetworkConfig {
    /// Flattened observation length
    pub obs_dim: usize,

    /// Number of discrete actions
    pub num_actions: usize,

    /// Width of each hidden layer (default: [64, 64])
    pub hidden_sizes: Vec<usize>,
}

impl QNetworkConfig {
    pub fn new(obs_dim: usize, num_actions: usize) -> Self {
        Self {
            obs_dim,
            num_actions,
            hidden_sizes: vec![64, 64],
        }
    }

    pub fn with_hidden_sizes(mut self, hidden_sizes: Vec<usize>) -> Self {
        self.hidden_sizes = hidden_sizes;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> QNetwork<B> {
        let mut layers = Vec::with_capacity(self.hidden_sizes.len());
        let mut input = self.obs_dim;
        for &width in &self.hidden_sizes {
            layers.push(LinearConfig::new(input, width).init(device));
            input = width;
        }

        QNetwork {
            layers,
            head: LinearConfig::new(input, self.num_actions).init(device),
        }
    }
}

/// Multilayer perceptron mapping states to per-action Q-values
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    layers: Vec<Linear<B>>,
    head: Linear<B>,
}

impl<B: Backend> QNetwork<B> {
    /// `[batch, obs_dim]` → `[batch, num_actions]`
    pub fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = states;
        for layer in &self.layers {
            x = relu(layer.forward(x));
        }
        self.head.forward(x)
    }
}
