// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconnect backoff schedule for the live subscription.
//!
//! The schedule is pure: [`BackoffPolicy::delay_with`] takes the jitter
//! sample as a function so the arithmetic can be tested without timers or
//! randomness.

use std::time::Duration;

use rand::Rng;
use vigil_config::model::ReconnectConfig;

/// Exponential backoff with a retry cap and optional additive jitter.
///
/// Retry `n` (1-based) waits `base_delay * 2^(n-1)`. Once `n` exceeds
/// `max_attempts` the policy yields `None` and the caller gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_attempts: u32,
    max_jitter: Option<Duration>,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            max_jitter: None,
        }
    }

    /// Add up to `max_jitter` of random delay to every retry.
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = Some(max_jitter);
        self
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        let policy = Self::new(
            Duration::from_millis(config.base_delay_ms),
            config.max_attempts,
        );
        if config.jitter {
            policy.with_jitter(Duration::from_millis(config.max_jitter_ms))
        } else {
            policy
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_jitter(&self) -> Option<Duration> {
        self.max_jitter
    }

    /// Deterministic part of the delay before retry `retry`.
    pub fn exponential_delay(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(retry - 1)?;
        self.base_delay.checked_mul(factor)
    }

    /// Delay before retry `retry`, adding `jitter(max_jitter)` when jitter
    /// is enabled. The sample is clamped to `max_jitter`.
    pub fn delay_with<F>(&self, retry: u32, jitter: F) -> Option<Duration>
    where
        F: FnOnce(Duration) -> Duration,
    {
        let delay = self.exponential_delay(retry)?;
        match self.max_jitter {
            Some(max) => Some(delay.saturating_add(jitter(max).min(max))),
            None => Some(delay),
        }
    }

    /// Delay before retry `retry` using a uniform random jitter sample.
    pub fn delay(&self, retry: u32) -> Option<Duration> {
        self.delay_with(retry, |max| {
            let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
        })
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}
