//! Rolling statistics of an episodic training run
//!
//! Tracks per-episode return and length together with the latest loss
//! reported by the agent, and renders them as a one-line progress summary.

use std::collections::VecDeque;

/// Training statistics tracker with rolling averages
///
/// Episode values and losses are kept in separate windows of the same size,
/// so a summary reflects the most recent `window_size` episodes and losses.
///
/// # Example
///
/// ```rust
/// use reinforced_lib::metrics::TrainingStats;
///
/// let mut stats = TrainingStats::new(100);
/// stats.record_episode(21.0, 21);
/// stats.record_loss(0.35);
///
/// assert_eq!(stats.best_episode_reward(), Some(21.0));
/// println!("{}", stats.format_summary());
/// ```
#[derive(Debug, Clone)]
pub struct TrainingStats {
    /// Episode returns (rolling window)
    episode_rewards: VecDeque<f64>,

    /// Episode lengths in steps (rolling window)
    episode_lengths: VecDeque<usize>,

    /// Agent losses (rolling window)
    losses: VecDeque<f32>,

    /// Highest return over the whole run
    best_reward: Option<f64>,

    total_episodes: usize,
    total_steps: usize,
    window_size: usize,
}

impl TrainingStats {
    /// Create a tracker keeping the last `window_size` values of each series
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            episode_rewards: VecDeque::with_capacity(window_size),
            episode_lengths: VecDeque::with_capacity(window_size),
            losses: VecDeque::with_capacity(window_size),
            best_reward: None,
            total_episodes: 0,
            total_steps: 0,
            window_size,
        }
    }

    /// Record the return and length of a finished episode
    pub fn record_episode(&mut self, reward: f64, length: usize) {
        push_bounded(&mut self.episode_rewards, reward, self.window_size);
        push_bounded(&mut self.episode_lengths, length, self.window_size);
        self.best_reward = Some(self.best_reward.map_or(reward, |best| best.max(reward)));
        self.total_episodes += 1;
        self.total_steps += length;
    }

    /// Record a loss reported by the agent
    ///
    /// Non-finite values are ignored so that one diverged step does not
    /// poison the average.
    pub fn record_loss(&mut self, loss: f32) {
        if loss.is_finite() {
            push_bounded(&mut self.losses, loss, self.window_size);
        }
    }

    /// Mean episode return over the window, 0 if nothing was recorded
    pub fn mean_episode_reward(&self) -> f64 {
        if self.episode_rewards.is_empty() {
            0.0
        } else {
            self.episode_rewards.iter().sum::<f64>() / self.episode_rewards.len() as f64
        }
    }

    pub fn mean_episode_length(&self) -> f64 {
        if self.episode_lengths.is_empty() {
            0.0
        } else {
            self.episode_lengths.iter().sum::<usize>() as f64 / self.episode_lengths.len() as f64
        }
    }

    /// Mean loss over the window, `None` before the first loss
    pub fn mean_loss(&self) -> Option<f32> {
        if self.losses.is_empty() {
            None
        } else {
            Some(self.losses.iter().sum::<f32>() / self.losses.len() as f32)
        }
    }

    pub fn best_episode_reward(&self) -> Option<f64> {
        self.best_reward
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// One-line summary, e.g.
    /// `Episodes: 10 | Steps: 230 | Reward: 23.00 | Best: 41.00 | Len: 23.0 | Loss: 0.1200`
    pub fn format_summary(&self) -> String {
        let loss = match self.mean_loss() {
            Some(loss) => format!("{:.4}", loss),
            None => "-".to_string(),
        };

        format!(
            "Episodes: {} | Steps: {} | Reward: {:.2} | Best: {:.2} | Len: {:.1} | Loss: {}",
            self.total_episodes,
            self.total_steps,
            self.mean_episode_reward(),
            self.best_reward.unwrap_or(0.0),
            self.mean_episode_length(),
            loss,
        )
    }
}

fn push_bounded<T>(deque: &mut VecDeque<T>, value: T, window_size: usize) {
    if deque.len() >= window_size {
        deque.pop_front();
    }
    deque.push_back(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let stats = TrainingStats::new(100);
        assert_eq!(stats.window_size(), 100);
        assert_eq!(stats.total_episodes(), 0);
        assert_eq!(stats.mean_loss(), None);
        assert_eq!(TrainingStats::new(0).window_size(), 1);
    }

    #[test]
    fn test_rolling_average() {
        let mut stats = TrainingStats::new(3);
        stats.record_episode(1.0, 10);
        stats.record_episode(2.0, 20);
        stats.record_episode(3.0, 30);
        assert!((stats.mean_episode_reward() - 2.0).abs() < 1e-9);

        // Evicts the first episode
        stats.record_episode(4.0, 40);
        assert!((stats.mean_episode_reward() - 3.0).abs() < 1e-9);
        assert!((stats.mean_episode_length() - 30.0).abs() < 1e-9);
        assert_eq!(stats.total_episodes(), 4);
        assert_eq!(stats.total_steps(), 100);
    }

    #[test]
    fn test_best_reward_outlives_window() {
        let mut stats = TrainingStats::new(1);
        stats.record_episode(50.0, 50);
        stats.record_episode(10.0, 10);
        assert_eq!(stats.best_episode_reward(), Some(50.0));
        assert!((stats.mean_episode_reward() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_losses_skip_non_finite() {
        let mut stats = TrainingStats::new(2);
        stats.record_loss(0.1);
        stats.record_loss(f32::NAN);
        stats.record_loss(0.3);
        assert!((stats.mean_loss().unwrap() - 0.2).abs() < 1e-6);

        stats.record_loss(0.5);
        assert!((stats.mean_loss().unwrap() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_format_summary() {
        let mut stats = TrainingStats::new(100);
        assert!(stats.format_summary().contains("Loss: -"));

        stats.record_episode(15.5, 150);
        stats.record_loss(0.02);
        let summary = stats.format_summary();
        assert!(summary.contains("Episodes: 1"));
        assert!(summary.contains("Steps: 150"));
        assert!(summary.contains("Reward: 15.50"));
        assert!(summary.contains("Best: 15.50"));
        assert!(summary.contains("Len: 150.0"));
        assert!(summary.contains("Loss: 0.0200"));
    }
}
