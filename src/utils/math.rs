//! Small numeric helpers shared by the agents

use rand::Rng;

/// Standard normal cumulative distribution function
///
/// Uses the Abramowitz & Stegun 7.1.26 approximation of `erfc`, evaluated on
/// the tail so that probabilities far below the mean keep relative precision.
/// Absolute error is below 1.5e-7.
pub fn normal_cdf(x: f64) -> f64 {
    const P: f64 = 0.327_591_1;
    const A: [f64; 5] = [
        0.254_829_592,
        -0.284_496_736,
        1.421_413_741,
        -1.453_152_027,
        1.061_405_429,
    ];

    let z = x.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + P * z);
    let poly = t * (A[0] + t * (A[1] + t * (A[2] + t * (A[3] + t * A[4]))));
    let tail = 0.5 * poly * (-z * z).exp();

    if x >= 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Softmax with temperature, numerically stabilised by the maximum logit
pub fn softmax(logits: &[f32], temperature: f32) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits
        .iter()
        .map(|l| ((l - max) / temperature).exp())
        .collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest element; the first one wins ties
pub fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best, best_v)
            }
        })
        .0
}

/// Sample an index from a categorical distribution given its probabilities
pub fn sample_categorical<R: Rng + ?Sized>(probs: &[f32], rng: &mut R) -> usize {
    let random_val: f32 = rng.gen();
    let mut cumsum = 0.0;

    for (idx, &prob) in probs.iter().enumerate() {
        cumsum += prob;
        if random_val < cumsum {
            return idx;
        }
    }

    // Rounding can leave the cumulative sum just below one
    probs.len().saturating_sub(1)
}

/// Sample an index from unnormalised log-weights
pub fn sample_logits<R: Rng + ?Sized>(logits: &[f64], rng: &mut R) -> usize {
    let max = logits
        .iter()
        .copied()
        .filter(|l| l.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = logits
        .iter()
        .map(|l| if l.is_finite() { (l - max).exp() } else { 0.0 })
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return rng.gen_range(0..logits.len().max(1));
    }

    let target = rng.gen::<f64>() * total;
    let mut cumsum = 0.0;
    for (idx, w) in weights.iter().enumerate() {
        cumsum += w;
        if target < cumsum {
            return idx;
        }
    }
    weights.len() - 1
}
