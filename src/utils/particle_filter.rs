//! Generic particle filter over a scalar latent variable
//!
//! Each step applies an observation model to the log-weights, resamples when
//! the effective sample size drops below `resample_threshold * N`, then moves
//! every particle with a Gaussian random walk whose spread grows with the time
//! elapsed since the previous step.

use super::math::sample_logits;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

/// Particle positions with unnormalised log-weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleFilterState {
    pub positions: Vec<f64>,
    pub logit_weights: Vec<f64>,
}

impl ParticleFilterState {
    /// Particles drawn uniformly from `[low, high)` with equal weights
    pub fn uniform<R: Rng + ?Sized>(n: usize, low: f64, high: f64, rng: &mut R) -> Self {
        let positions = if high > low {
            let dist = Uniform::new(low, high);
            (0..n).map(|_| dist.sample(rng)).collect()
        } else {
            vec![low; n]
        };

        Self {
            positions,
            logit_weights: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Normalised weights, `softmax(logit_weights)`
    pub fn weights(&self) -> Vec<f64> {
        let max = self
            .logit_weights
            .iter()
            .copied()
            .filter(|w| w.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            let n = self.len().max(1) as f64;
            return vec![1.0 / n; self.len()];
        }
        let exps: Vec<f64> = self
            .logit_weights
            .iter()
            .map(|w| if w.is_finite() { (w - max).exp() } else { 0.0 })
            .collect();
        let sum: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / sum).collect()
    }

    /// Effective sample size `1 / Σ w_i²`
    pub fn effective_sample_size(&self) -> f64 {
        let sum_sq: f64 = self.weights().iter().map(|w| w * w).sum();
        if sum_sq > 0.0 {
            1.0 / sum_sq
        } else {
            0.0
        }
    }

    /// Shift log-weights so that the largest finite one is zero
    pub fn normalize_logits(&mut self) {
        let max = self
            .logit_weights
            .iter()
            .copied()
            .filter(|w| w.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        if max.is_finite() {
            self.logit_weights.iter_mut().for_each(|w| *w -= max);
        }
    }
}

/// Filter configuration shared by every instance of an agent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleFilter {
    /// Velocity of the random walk of the particles
    pub scale: f64,

    /// Resample when ESS falls below this fraction of the particle count
    pub resample_threshold: f64,
}

impl ParticleFilter {
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            resample_threshold: 0.5,
        }
    }

    /// Run one filter step
    ///
    /// # Arguments
    ///
    /// * `state` - Particles to update in place
    /// * `rng` - Random source for resampling and transition
    /// * `delta_time` - Time elapsed since the previous step
    /// * `observe` - Observation model applied to the log-weights
    pub fn update<R, F>(
        &self,
        state: &mut ParticleFilterState,
        rng: &mut R,
        delta_time: f64,
        observe: F,
    ) where
        R: Rng + ?Sized,
        F: FnOnce(&mut ParticleFilterState),
    {
        observe(state);

        if self.needs_resampling(state) {
            simple_resample(state, rng);
        }

        linear_transition(state, rng, self.scale * delta_time.max(0.0));
    }

    pub fn needs_resampling(&self, state: &ParticleFilterState) -> bool {
        state.effective_sample_size() < self.resample_threshold * state.len() as f64
    }

    /// Draw a single position according to the particle weights
    pub fn sample<R: Rng + ?Sized>(&self, state: &ParticleFilterState, rng: &mut R) -> f64 {
        if state.is_empty() {
            return 0.0;
        }
        state.positions[sample_logits(&state.logit_weights, rng)]
    }
}

/// Multinomial resampling; weights are reset to uniform
pub fn simple_resample<R: Rng + ?Sized>(state: &mut ParticleFilterState, rng: &mut R) {
    let positions = (0..state.len())
        .map(|_| state.positions[sample_logits(&state.logit_weights, rng)])
        .collect();
    state.positions = positions;
    state.logit_weights.iter_mut().for_each(|w| *w = 0.0);
}

/// Gaussian random walk `x ← x + scale · N(0, 1)`
pub fn linear_transition<R: Rng + ?Sized>(
    state: &mut ParticleFilterState,
    rng: &mut R,
    scale: f64,
) {
    if scale <= 0.0 || !scale.is_finite() {
        return;
    }
    let Ok(noise) = Normal::new(0.0, scale) else {
        return;
    };
    state
        .positions
        .iter_mut()
        .for_each(|x| *x += noise.sample(rng));
}
