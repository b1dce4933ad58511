//! Retry timing for broker connections

use std::time::Duration;

pub const INITIAL_BASE_DELAY: Duration = Duration::from_secs(2);
pub const INITIAL_MAX_DELAY: Duration = Duration::from_secs(60);
pub const INITIAL_ATTEMPTS: u32 = 10;

pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
pub const RECONNECT_MAX_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    /// Exponential backoff, limited number of attempts
    Bounded,
    /// Fixed delay at the ceiling, forever
    Unbounded,
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    Wait(Duration),
    /// The bounded budget is spent; retry immediately in the unbounded phase
    Exhausted,
}

/// Backoff state for the initial connection
///
/// Starts at `base`, doubles after each failure up to `ceiling` for
/// `bounded_attempts` attempts, then keeps retrying every `ceiling`.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    base: Duration,
    ceiling: Duration,
    bounded_attempts: u32,
    delay: Duration,
    attempt: u32,
    phase: RetryPhase,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(INITIAL_BASE_DELAY, INITIAL_MAX_DELAY, INITIAL_ATTEMPTS)
    }
}

impl RetryBudget {
    pub fn new(base: Duration, ceiling: Duration, bounded_attempts: u32) -> Self {
        Self {
            base,
            ceiling,
            bounded_attempts,
            delay: base,
            attempt: 0,
            phase: RetryPhase::Bounded,
        }
    }

    /// Marks the start of an attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn bounded_attempts(&self) -> u32 {
        self.bounded_attempts
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    pub fn on_failure(&mut self) -> RetryStep {
        match self.phase {
            RetryPhase::Unbounded => RetryStep::Wait(self.ceiling),
            RetryPhase::Bounded if self.attempt >= self.bounded_attempts => {
                self.phase = RetryPhase::Unbounded;
                RetryStep::Exhausted
            }
            RetryPhase::Bounded => {
                let wait = self.delay;
                self.delay = (self.delay * 2).min(self.ceiling);
                RetryStep::Wait(wait)
            }
        }
    }

    pub fn reset(&mut self) {
        self.delay = self.base;
        self.attempt = 0;
        self.phase = RetryPhase::Bounded;
    }
}

/// Reconnect pacing once a session has been established
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    interval: Duration,
    max_interval: Duration,
    current: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(RECONNECT_INTERVAL, RECONNECT_MAX_INTERVAL)
    }
}

impl ReconnectPolicy {
    pub fn new(interval: Duration, max_interval: Duration) -> Self {
        Self {
            interval,
            max_interval,
            current: interval,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let wait = self.current;
        self.current = (self.current * 2).min(self.max_interval);
        wait
    }

    pub fn reset(&mut self) {
        self.current = self.interval;
    }
}
