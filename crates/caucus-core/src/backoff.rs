//! Reconnect backoff for the session channel.
//!
//! Pure state machine: it hands out pre-jitter delays and never touches a
//! clock. The runtime caller samples randomness and applies
//! [`jittered_ms`] before sleeping.

use serde::{Deserialize, Serialize};

/// Exponential, capped reconnect policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// First delay after a drop, in milliseconds (default 500).
    pub initial_backoff_ms: u64,
    /// Growth factor per consecutive failure (default 2.0).
    pub multiplier: f64,
    /// Upper bound for any delay, in milliseconds (default 15000).
    pub max_backoff_ms: u64,
    /// Jitter fraction applied by the caller (default 0.20 = +/-20%).
    pub jitter_pct: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            multiplier: 2.0,
            max_backoff_ms: 15_000,
            jitter_pct: 0.20,
        }
    }
}

/// Tracks consecutive reconnect attempts for one channel.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt, then advance the attempt counter.
    pub fn next_delay_ms(&mut self) -> u64 {
        let raw = (self.policy.initial_backoff_ms as f64)
            * self.policy.multiplier.max(1.0).powi(self.attempt.min(63) as i32);
        let delay = if raw.is_finite() {
            (raw as u64).min(self.policy.max_backoff_ms)
        } else {
            self.policy.max_backoff_ms
        };
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// A connection was established: start over from the initial delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}

/// Spread `base_ms` by +/-`jitter_pct` using `sample` in `[0, 1)`.
pub fn jittered_ms(base_ms: u64, jitter_pct: f64, sample: f64) -> u64 {
    let pct = jitter_pct.clamp(0.0, 1.0);
    let sample = sample.clamp(0.0, 1.0);
    let spread = base_ms as f64 * pct;
    let offset = (sample * 2.0 - 1.0) * spread;
    (base_ms as f64 + offset).max(0.0).round() as u64
}
