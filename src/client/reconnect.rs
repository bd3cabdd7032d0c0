//! Delay policy between a dropped connection and the next handshake attempt

use std::time::Duration;

use rand::Rng;

/// Parameters of a jittered exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first attempt after a drop. Default: 1 s.
    pub initial_delay: Duration,
    /// Multiplier applied after every failed attempt. Default: 2.0.
    pub multiplier: f64,
    /// Upper bound for any single delay. Default: 30 s.
    pub max_delay: Duration,
    /// Fraction (0.0 to 1.0) applied as ± random spread to each delay. Default: 0.25.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

/// How long the lifecycle manager waits before reconnecting
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectPolicy {
    /// The same delay after every drop
    Fixed(Duration),
    /// Growing, randomly spread delays so a fleet of clients does not reconnect in lockstep
    Backoff(BackoffConfig),
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Backoff(BackoffConfig::default())
    }
}

/// Tracks consecutive failed attempts and yields the next delay
///
/// Attempts are never exhausted: reconnection only stops when the owning client is torn
/// down.
#[derive(Debug)]
pub struct ReconnectSchedule {
    policy: ReconnectPolicy,
    attempts: u32,
    current_delay: Duration,
}

impl ReconnectSchedule {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let current_delay = match &policy {
            ReconnectPolicy::Fixed(delay) => *delay,
            ReconnectPolicy::Backoff(config) => config.initial_delay,
        };
        Self {
            policy,
            attempts: 0,
            current_delay,
        }
    }

    /// Computes the delay before the next attempt and advances the schedule
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        match &self.policy {
            ReconnectPolicy::Fixed(delay) => *delay,
            ReconnectPolicy::Backoff(config) => {
                let base = self.current_delay;
                let jitter = config.jitter.clamp(0.0, 1.0);
                let jittered = if jitter > 0.0 {
                    let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
                    base.mul_f64(factor)
                } else {
                    base
                };

                self.current_delay = base.mul_f64(config.multiplier.max(1.0)).min(config.max_delay);
                jittered.min(config.max_delay)
            }
        }
    }

    /// Starts over after a successful handshake
    pub fn reset(&mut self) {
        *self = Self::new(self.policy.clone());
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod next_delay {
    use super::*;

    fn backoff_without_jitter() -> ReconnectPolicy {
        ReconnectPolicy::Backoff(BackoffConfig {
            jitter: 0.0,
            ..Default::default()
        })
    }

    #[test]
    fn fixed_policy_repeats_the_same_delay() {
        let mut schedule = ReconnectSchedule::new(ReconnectPolicy::Fixed(Duration::from_millis(500)));
        for _ in 0..5 {
            assert_eq!(schedule.next_delay(), Duration::from_millis(500));
        }
        assert_eq!(schedule.attempts(), 5);
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let mut schedule = ReconnectSchedule::new(backoff_without_jitter());
        let delays: Vec<_> = (0..4).map(|_| schedule.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[test]
    fn backoff_is_capped() {
        let mut schedule = ReconnectSchedule::new(ReconnectPolicy::Backoff(BackoffConfig::default()));
        for _ in 0..50 {
            assert!(schedule.next_delay() <= Duration::from_secs(30));
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..20 {
            let mut schedule =
                ReconnectSchedule::new(ReconnectPolicy::Backoff(BackoffConfig::default()));
            let delay = schedule.next_delay();
            assert!(delay >= Duration::from_millis(750), "{delay:?}");
            assert!(delay <= Duration::from_millis(1250), "{delay:?}");
        }
    }

    #[test]
    fn reset_restores_the_initial_delay() {
        let mut schedule = ReconnectSchedule::new(backoff_without_jitter());
        schedule.next_delay();
        schedule.next_delay();
        schedule.reset();
        assert_eq!(schedule.attempts(), 0);
        assert_eq!(schedule.next_delay(), Duration::from_secs(1));
    }
}
