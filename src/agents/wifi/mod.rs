//! Agents for IEEE 802.11ax link adaptation

pub mod particle_filter;

pub use particle_filter::{ParticleFilter, ParticleFilterConfig};

/// Minimal SNR [dB] at which each 802.11ax MCS (0..=11) becomes usable
pub const MCS_SNR_THRESHOLDS: [f64; 12] = [
    4.12, 7.15, 10.05, 13.66, 16.81, 21.58, 22.80, 23.96, 28.66, 29.82, 33.82, 35.30,
];

/// Number of modulation and coding schemes
pub const N_MCS: usize = MCS_SNR_THRESHOLDS.len();
