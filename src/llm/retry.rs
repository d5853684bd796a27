//! Retry policy for transient analysis failures

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Factor applied to the delay after every retry
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound for any single delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            multiplier: default_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            multiplier: 1.0,
            max_backoff_ms: 0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, initial_ms: u64, multiplier: f64, max_ms: u64) -> Self {
        self.initial_backoff_ms = initial_ms;
        self.multiplier = multiplier;
        self.max_backoff_ms = max_ms;
        self
    }

    /// Start tracking a fresh request
    pub fn start(&self) -> RetryState {
        RetryState {
            attempt: 0,
            next_delay: Duration::from_millis(self.initial_backoff_ms.min(self.max_backoff_ms)),
            policy: self.clone(),
        }
    }
}

/// What to do after a transient failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Retry progress of one request
#[derive(Debug, Clone)]
pub struct RetryState {
    attempt: u32,
    next_delay: Duration,
    policy: RetryPolicy,
}

impl RetryState {
    /// Attempts started so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay that would precede the next retry
    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }

    /// Begin a new attempt and return its 1-based number
    pub fn start_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Decide whether the attempt that just failed transiently gets a successor
    pub fn on_transient_failure(&mut self) -> RetryDecision {
        if self.attempt >= self.policy.max_attempts.max(1) {
            return RetryDecision::GiveUp;
        }
        let delay = self.next_delay;
        let grown = self.next_delay.as_millis() as f64 * self.policy.multiplier.max(1.0);
        let capped = grown.min(self.policy.max_backoff_ms as f64);
        self.next_delay = Duration::from_millis(capped as u64);
        RetryDecision::RetryAfter(delay)
    }
}
