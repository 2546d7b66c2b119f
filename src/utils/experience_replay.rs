//! Experience replay buffer for off-policy deep agents
//!
//! A fixed-capacity ring buffer of transitions `(s, a, r, terminal, s')`.
//! Once full, new transitions overwrite the oldest ones. Batches are drawn
//! uniformly with replacement.

use burn::tensor::TensorData;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Ring buffer of transitions with flattened state storage
///
/// # Example
///
/// ```rust
/// use reinforced_lib::utils::ReplayBuffer;
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let mut buffer = ReplayBuffer::new(100, 2);
/// buffer.push(&[0.0, 0.0], 1, 1.0, false, &[0.5, 0.5]);
///
/// assert_eq!(buffer.len(), 1);
/// assert!(buffer.is_ready(1));
///
/// let mut rng = StdRng::seed_from_u64(42);
/// let batch = buffer.sample(4, &mut rng);
/// assert_eq!(batch.len(), 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayBuffer {
    /// States before the transition [capacity * obs_dim]
    states: Vec<f32>,

    /// Action indices taken [capacity]
    actions: Vec<usize>,

    /// Rewards received [capacity]
    rewards: Vec<f32>,

    /// Episode termination flags [capacity]
    terminals: Vec<bool>,

    /// States after the transition [capacity * obs_dim]
    next_states: Vec<f32>,

    /// Next write position
    ptr: usize,

    /// Number of valid transitions
    size: usize,

    /// Maximum number of transitions
    capacity: usize,

    /// Flattened state length
    obs_dim: usize,
}

impl ReplayBuffer {
    /// Create an empty buffer
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of transitions kept
    /// * `obs_dim` - Number of elements in a flattened state
    pub fn new(capacity: usize, obs_dim: usize) -> Self {
        Self {
            states: vec![0.0; capacity * obs_dim],
            actions: vec![0; capacity],
            rewards: vec![0.0; capacity],
            terminals: vec![false; capacity],
            next_states: vec![0.0; capacity * obs_dim],
            ptr: 0,
            size: 0,
            capacity,
            obs_dim,
        }
    }

    /// Append a transition, overwriting the oldest one when full
    ///
    /// States shorter or longer than `obs_dim` are zero-padded or truncated.
    pub fn push(
        &mut self,
        state: &[f32],
        action: usize,
        reward: f32,
        terminal: bool,
        next_state: &[f32],
    ) {
        if self.capacity == 0 {
            return;
        }

        let offset = self.ptr * self.obs_dim;
        Self::write_state(&mut self.states[offset..offset + self.obs_dim], state);
        Self::write_state(&mut self.next_states[offset..offset + self.obs_dim], next_state);
        self.actions[self.ptr] = action;
        self.rewards[self.ptr] = reward;
        self.terminals[self.ptr] = terminal;

        self.ptr = (self.ptr + 1) % self.capacity;
        self.size = (self.size + 1).min(self.capacity);
    }

    /// Number of stored transitions
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    /// Whether at least one full batch can be drawn
    pub fn is_ready(&self, batch_size: usize) -> bool {
        self.size >= batch_size && self.size > 0
    }

    /// Draw `batch_size` transitions uniformly with replacement
    ///
    /// Returns an empty batch when the buffer holds no transitions.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> ReplayBatch {
        let mut batch = ReplayBatch::with_capacity(batch_size, self.obs_dim);
        if self.size == 0 {
            return batch;
        }

        for _ in 0..batch_size {
            let i = rng.gen_range(0..self.size);
            let range = i * self.obs_dim..(i + 1) * self.obs_dim;
            batch.states.extend_from_slice(&self.states[range.clone()]);
            batch.next_states.extend_from_slice(&self.next_states[range]);
            batch.actions.push(self.actions[i] as i64);
            batch.rewards.push(self.rewards[i]);
            batch.terminals.push(if self.terminals[i] { 1.0 } else { 0.0 });
        }

        batch
    }

    /// Drop every stored transition
    pub fn clear(&mut self) {
        self.states.iter_mut().for_each(|x| *x = 0.0);
        self.next_states.iter_mut().for_each(|x| *x = 0.0);
        self.ptr = 0;
        self.size = 0;
    }

    fn write_state(dst: &mut [f32], src: &[f32]) {
        for (i, slot) in dst.iter_mut().enumerate() {
            *slot = src.get(i).copied().unwrap_or(0.0);
        }
    }
}

/// A batch of transitions in flattened, row-major form
#[derive(Debug, Clone)]
pub struct ReplayBatch {
    pub states: Vec<f32>,
    pub actions: Vec<i64>,
    pub rewards: Vec<f32>,
    pub terminals: Vec<f32>,
    pub next_states: Vec<f32>,
    obs_dim: usize,
}

/// Tensor-ready batch, to be materialised on whichever backend needs it
pub struct BatchData {
    /// States [batch, obs_dim]
    pub states: TensorData,
    /// Actions [batch, 1] (Int)
    pub actions: TensorData,
    /// Rewards [batch, 1]
    pub rewards: TensorData,
    /// Terminal flags as 0.0 / 1.0 [batch, 1]
    pub terminals: TensorData,
    /// Next states [batch, obs_dim]
    pub next_states: TensorData,
}

impl ReplayBatch {
    fn with_capacity(batch_size: usize, obs_dim: usize) -> Self {
        Self {
            states: Vec::with_capacity(batch_size * obs_dim),
            actions: Vec::with_capacity(batch_size),
            rewards: Vec::with_capacity(batch_size),
            terminals: Vec::with_capacity(batch_size),
            next_states: Vec::with_capacity(batch_size * obs_dim),
            obs_dim,
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Convert the batch into shaped [`TensorData`]
    pub fn into_data(self) -> BatchData {
        let n = self.len();
        let d = self.obs_dim;
        BatchData {
            states: TensorData::new(self.states, [n, d]),
            actions: TensorData::new(self.actions, [n, 1]),
            rewards: TensorData::new(self.rewards, [n, 1]),
            terminals: TensorData::new(self.terminals, [n, 1]),
            next_states: TensorData::new(self.next_states, [n, d]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn filled_buffer(capacity: usize, n: usize) -> ReplayBuffer {
        let mut buffer = ReplayBuffer::new(capacity, 2);
        for i in 0..n {
            let s = [i as f32, 0.0];
            let s_next = [i as f32 + 1.0, 0.0];
            buffer.push(&s, i % 3, i as f32, i % 5 == 4, &s_next);
        }
        buffer
    }

    #[test]
    fn test_buffer_new() {
        let buffer = ReplayBuffer::new(10, 4);
        assert_eq!(buffer.capacity(), 10);
        assert_eq!(buffer.obs_dim(), 4);
        assert!(buffer.is_empty());
        assert!(!buffer.is_ready(1));
    }

    #[test]
    fn test_buffer_push() {
        let buffer = filled_buffer(10, 3);
        assert_eq!(buffer.len(), 3);
        assert!(buffer.is_ready(3));
        assert!(!buffer.is_ready(4));
    }

    #[test]
    fn test_ring_overwrites_oldest() {
        let buffer = filled_buffer(4, 6);
        assert_eq!(buffer.len(), 4);

        // Slots 0 and 1 now hold transitions 4 and 5
        assert_eq!(buffer.states[0], 4.0);
        assert_eq!(buffer.states[2], 5.0);
        assert_eq!(buffer.states[4], 2.0);
        assert_eq!(buffer.ptr, 2);
    }

    #[test]
    fn test_sample_shapes_and_membership() {
        let buffer = filled_buffer(16, 8);
        let mut rng = StdRng::seed_from_u64(3);
        let batch = buffer.sample(32, &mut rng);

        assert_eq!(batch.len(), 32);
        assert_eq!(batch.states.len(), 64);
        assert_eq!(batch.next_states.len(), 64);

        for i in 0..batch.len() {
            let s = batch.states[2 * i];
            let s_next = batch.next_states[2 * i];
            // Each sampled row stays a consistent transition
            assert_eq!(s_next, s + 1.0);
            assert_eq!(batch.rewards[i], s);
            assert!(s < 8.0);
        }
    }

    #[test]
    fn test_sample_empty_buffer() {
        let buffer = ReplayBuffer::new(8, 2);
        let mut rng = StdRng::seed_from_u64(0);
        let batch = buffer.sample(4, &mut rng);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_state_padding() {
        let mut buffer = ReplayBuffer::new(2, 3);
        buffer.push(&[1.0], 0, 0.0, false, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(&buffer.states[0..3], &[1.0, 0.0, 0.0]);
        assert_eq!(&buffer.next_states[0..3], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_into_data_shapes() {
        let buffer = filled_buffer(16, 8);
        let mut rng = StdRng::seed_from_u64(5);
        let data = buffer.sample(6, &mut rng).into_data();

        assert_eq!(data.states.shape, vec![6, 2]);
        assert_eq!(data.actions.shape, vec![6, 1]);
        assert_eq!(data.rewards.shape, vec![6, 1]);
        assert_eq!(data.terminals.shape, vec![6, 1]);
        assert_eq!(data.next_states.shape, vec![6, 2]);
    }

    #[test]
    fn test_clear() {
        let mut buffer = filled_buffer(8, 5);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.ptr, 0);
    }

    #[test]
    fn test_serde_roundtrip_preserves_contents() {
        let buffer = filled_buffer(4, 3);
        let json = serde_json::to_string(&buffer).unwrap();
        let restored: ReplayBuffer = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.states, buffer.states);
    }
}
