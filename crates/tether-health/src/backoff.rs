// ABOUTME: Exponential backoff policy for health-check stream retries.
// ABOUTME: Grows the delay by a multiplier with jitter, capped at a maximum, resettable on success.

use std::time::Duration;

use rand::Rng;

/// Backoff configuration for restarting a failed health-check stream.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied to the base delay after each failure.
    pub multiplier: f64,
    /// Jitter fraction applied to each computed delay (0.2 = ±20%).
    pub jitter: f64,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 1.6,
            jitter: 0.2,
            max_delay: Duration::from_secs(120),
        }
    }
}

impl BackoffConfig {
    /// Disable jitter (useful when delays must be exact, e.g. in tests).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }
}

/// Tracks the escalating retry delay across consecutive failures.
#[derive(Debug)]
pub struct BackoffState {
    config: BackoffConfig,
    current: Duration,
    attempts: u32,
}

impl BackoffState {
    /// Create a backoff state at the initial delay.
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial_delay;
        Self {
            config,
            current,
            attempts: 0,
        }
    }

    /// Compute the delay to wait before the next retry and escalate the
    /// base for the one after it. The returned delay carries the configured
    /// jitter and never exceeds `max_delay`.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts += 1;
        let base = self.current.min(self.config.max_delay);
        self.current = base.mul_f64(self.config.multiplier).min(self.config.max_delay);

        if self.config.jitter > 0.0 {
            let low = (1.0 - self.config.jitter).max(0.0);
            let high = 1.0 + self.config.jitter;
            let factor = rand::thread_rng().gen_range(low..=high);
            base.mul_f64(factor).min(self.config.max_delay)
        } else {
            base
        }
    }

    /// Reset to the initial parameters after the peer proved itself healthy.
    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Number of delays handed out since creation or the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The base delay the next `next_delay` call will start from.
    pub fn current_delay(&self) -> Duration {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BackoffConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.multiplier, 1.6);
        assert_eq!(config.jitter, 0.2);
        assert_eq!(config.max_delay, Duration::from_secs(120));
    }

    #[test]
    fn test_exponential_sequence_without_jitter() {
        let config = BackoffConfig {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.0,
            max_delay: Duration::from_secs(10),
        };
        let mut state = BackoffState::new(config);

        assert_eq!(state.next_delay(), Duration::from_secs(1));
        assert_eq!(state.next_delay(), Duration::from_secs(2));
        assert_eq!(state.next_delay(), Duration::from_secs(4));
        assert_eq!(state.next_delay(), Duration::from_secs(8));
        // Capped from here on.
        assert_eq!(state.next_delay(), Duration::from_secs(10));
        assert_eq!(state.next_delay(), Duration::from_secs(10));
        assert_eq!(state.attempts(), 6);
    }

    #[test]
    fn test_reset_restores_initial_delay() {
        let config = BackoffConfig {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.0,
            max_delay: Duration::from_secs(60),
        };
        let mut state = BackoffState::new(config);

        state.next_delay();
        state.next_delay();
        state.next_delay();
        assert_eq!(state.attempts(), 3);

        state.reset();
        assert_eq!(state.attempts(), 0);
        assert_eq!(state.current_delay(), Duration::from_secs(1));
        assert_eq!(state.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_jittered_delays_stay_within_policy_bounds() {
        let config = BackoffConfig::default();
        let jitter = config.jitter;
        let multiplier = config.multiplier;
        let max = config.max_delay;
        let mut state = BackoffState::new(config);

        let mut base = Duration::from_secs(1);
        for _ in 0..20 {
            let delay = state.next_delay();
            let low = base.mul_f64(1.0 - jitter);
            let high = base.mul_f64(1.0 + jitter).min(max);
            assert!(
                delay >= low && delay <= high,
                "delay {:?} outside [{:?}, {:?}]",
                delay,
                low,
                high
            );
            assert!(delay <= max);
            base = base.mul_f64(multiplier).min(max);
        }
    }

    #[test]
    fn test_delays_grow_monotonically_without_jitter() {
        let config = BackoffConfig::default().without_jitter();
        let mut state = BackoffState::new(config);

        let d1 = state.next_delay();
        let d2 = state.next_delay();
        let d3 = state.next_delay();
        assert!(d1 < d2 && d2 < d3, "{:?} {:?} {:?}", d1, d2, d3);
        assert!(d3 <= Duration::from_secs(120));
    }

    #[test]
    fn test_without_jitter_builder() {
        let config = BackoffConfig::default().without_jitter();
        assert_eq!(config.jitter, 0.0);
    }
}
