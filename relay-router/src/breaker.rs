//! Per-channel circuit breakers.
//!
//! A channel's entry is created on its first failure and removed on any
//! success. The breaker is open while `failure_count >= threshold` and the
//! last failure is younger than the cooldown. Once the cooldown has passed the
//! channel is treated as closed again; the stale entry stays until the next
//! success or failure touches it. There is no half-open probe state.

use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;

/// Failure bookkeeping for one channel.
#[derive(Debug, Clone, Copy)]
struct BreakerEntry {
    failure_count: u32,
    last_failure: Instant,
}

/// Read-only view of a channel's breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub failure_count: u32,
    pub since_last_failure: Duration,
    pub open: bool,
}

#[derive(Debug, Clone, Copy)]
struct BreakerLimits {
    failure_threshold: u32,
    cooldown: Duration,
}

/// Registry of circuit breakers keyed by channel name.
///
/// Shared between concurrent sends; entries live in a `DashMap` so updates to
/// the same channel are serialized per shard.
pub struct CircuitBreakerRegistry {
    entries: DashMap<String, BreakerEntry>,
    limits: RwLock<BreakerLimits>,
}

impl CircuitBreakerRegistry {
    /// Create a registry.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            limits: RwLock::new(BreakerLimits {
                failure_threshold: failure_threshold.max(1),
                cooldown,
            }),
        }
    }

    /// Create a registry from the `circuit_breaker` config section.
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.failure_threshold, config.cooldown())
    }

    /// Replace threshold and cooldown. Existing counters are kept.
    pub fn set_limits(&self, failure_threshold: u32, cooldown: Duration) {
        *self.limits.write() = BreakerLimits {
            failure_threshold: failure_threshold.max(1),
            cooldown,
        };
        debug!(failure_threshold, ?cooldown, "Circuit breaker limits updated");
    }

    /// Whether the channel is currently excluded from selection.
    pub fn is_open(&self, channel: &str) -> bool {
        let limits = *self.limits.read();
        self.entries
            .get(channel)
            .map(|entry| Self::entry_is_open(&entry, &limits, Instant::now()))
            .unwrap_or(false)
    }

    /// Count a failure and refresh the failure timestamp.
    pub fn record_failure(&self, channel: &str) {
        let now = Instant::now();
        let threshold = self.limits.read().failure_threshold;

        let failures = {
            let mut entry = self
                .entries
                .entry(channel.to_string())
                .or_insert(BreakerEntry {
                    failure_count: 0,
                    last_failure: now,
                });
            entry.failure_count = entry.failure_count.saturating_add(1);
            entry.last_failure = now;
            entry.failure_count
        };

        if failures == threshold {
            warn!(
                channel = %channel,
                failures,
                "Circuit breaker opened"
            );
        } else {
            debug!(channel = %channel, failures, threshold, "Recorded channel failure");
        }
    }

    /// Forget every failure of the channel.
    pub fn record_success(&self, channel: &str) {
        if let Some((_, entry)) = self.entries.remove(channel) {
            if entry.failure_count >= self.limits.read().failure_threshold {
                info!(channel = %channel, "Circuit breaker reset after successful send");
            }
        }
    }

    /// Current state of a channel's breaker, if it has one.
    pub fn snapshot(&self, channel: &str) -> Option<BreakerSnapshot> {
        let limits = *self.limits.read();
        let now = Instant::now();
        self.entries.get(channel).map(|entry| BreakerSnapshot {
            failure_count: entry.failure_count,
            since_last_failure: now.saturating_duration_since(entry.last_failure),
            open: Self::entry_is_open(&entry, &limits, now),
        })
    }

    /// Names of all channels whose breaker is currently open.
    pub fn open_channels(&self) -> Vec<String> {
        let limits = *self.limits.read();
        let now = Instant::now();
        let mut open: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| Self::entry_is_open(entry.value(), &limits, now))
            .map(|entry| entry.key().clone())
            .collect();
        open.sort();
        open
    }

    fn entry_is_open(entry: &BreakerEntry, limits: &BreakerLimits, now: Instant) -> bool {
        entry.failure_count >= limits.failure_threshold
            && now.saturating_duration_since(entry.last_failure) < limits.cooldown
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::from_config(&CircuitBreakerConfig::default())
    }
}
