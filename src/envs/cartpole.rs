use super::StepResult;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

const GRAVITY: f64 = 9.8;
const MASS_CART: f64 = 1.0;
const MASS_POLE: f64 = 0.1;
const TOTAL_MASS: f64 = MASS_CART + MASS_POLE;
/// Half the pole length
const LENGTH: f64 = 0.5;
const POLE_MASS_LENGTH: f64 = MASS_POLE * LENGTH;
const FORCE_MAG: f64 = 10.0;
/// Seconds between state updates
const TAU: f64 = 0.02;

const THETA_THRESHOLD: f64 = 12.0 * 2.0 * std::f64::consts::PI / 360.0;
const X_THRESHOLD: f64 = 2.4;

/// Episode length limit
pub const MAX_STEPS: usize = 500;

/// Cart-pole balancing task
///
/// State is `[x, x_dot, theta, theta_dot]`. Action 0 pushes the cart left,
/// action 1 pushes it right. Every step yields reward 1; the episode ends when
/// the pole tilts more than 12° or the cart leaves `[-2.4, 2.4]`.
#[derive(Debug, Clone, Default)]
pub struct CartPole {
    state: [f64; 4],
    steps: usize,
}

impl CartPole {
    pub const OBSERVATION_SIZE: usize = 4;
    pub const NUM_ACTIONS: usize = 2;

    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new episode from a state drawn uniformly from `[-0.05, 0.05]`
    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<f64> {
        let dist = Uniform::new_inclusive(-0.05, 0.05);
        for x in self.state.iter_mut() {
            *x = dist.sample(rng);
        }
        self.steps = 0;
        self.state.to_vec()
    }

    /// Advance the simulation by one tick
    pub fn step(&mut self, action: usize) -> StepResult {
        let [x, x_dot, theta, theta_dot] = self.state;
        let force = if action == 1 { FORCE_MAG } else { -FORCE_MAG };

        let (sin_theta, cos_theta) = theta.sin_cos();
        let temp = (force + POLE_MASS_LENGTH * theta_dot * theta_dot * sin_theta) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (LENGTH * (4.0 / 3.0 - MASS_POLE * cos_theta * cos_theta / TOTAL_MASS));
        let x_acc = temp - POLE_MASS_LENGTH * theta_acc * cos_theta / TOTAL_MASS;

        // Explicit Euler
        self.state = [
            x + TAU * x_dot,
            x_dot + TAU * x_acc,
            theta + TAU * theta_dot,
            theta_dot + TAU * theta_acc,
        ];
        self.steps += 1;

        let [x, _, theta, _] = self.state;
        let terminated = !(-X_THRESHOLD..=X_THRESHOLD).contains(&x)
            || !(-THETA_THRESHOLD..=THETA_THRESHOLD).contains(&theta);

        StepResult {
            observation: self.state.to_vec(),
            reward: 1.0,
            terminated,
            truncated: !terminated && self.steps >= MAX_STEPS,
        }
    }

    pub fn state(&self) -> &[f64; 4] {
        &self.state
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}
