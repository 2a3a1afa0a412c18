//! Routing configuration.
//!
//! The routing document is a hierarchical file (YAML, TOML or JSON) with
//! three top level sections: `routing`, `retry` and `circuit_breaker`.
//! Every field is defaulted, so a partial document only overrides what it
//! names. A missing or broken document falls back to [`RouterConfig::default`].

mod loader;

pub use loader::{
    CONFIG_PATH_ENV, ConfigFormat, DEFAULT_CONFIG_PATH, LoadedConfig, resolve_config_path,
    resolve_config_path_with,
};

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Channel names used by the built-in adapters.
pub const TELEGRAM: &str = "telegram";
pub const EMAIL: &str = "email";
pub const WEBHOOK: &str = "webhook";

/// Full router configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub routing: RoutingSection,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl RouterConfig {
    /// Check the invariants the router relies on.
    pub fn validate(&self) -> Result<()> {
        if self.routing.default.priority.is_empty() {
            return Err(Error::config("routing.default.priority must not be empty"));
        }
        if self.retry.backoff_ms.is_empty() {
            return Err(Error::config("retry.backoff_ms must not be empty"));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(Error::config(
                "circuit_breaker.failure_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

/// An ordered list of channel names, most preferred first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriorityList {
    #[serde(default)]
    pub priority: Vec<String>,
}

impl PriorityList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            priority: names.into_iter().map(Into::into).collect(),
        }
    }
}

/// The `routing` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    pub default: PriorityList,
    pub by_tenant: HashMap<String, PriorityList>,
    pub by_usecase: HashMap<String, PriorityList>,
    pub rules: Vec<RoutingRule>,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            default: PriorityList::new([TELEGRAM, EMAIL, WEBHOOK]),
            by_tenant: HashMap::new(),
            by_usecase: HashMap::new(),
            rules: Vec::new(),
        }
    }
}

/// A conditional rule: when every predicate in `condition` holds, use `then`.
///
/// Predicates are kept as raw values so that unknown keys survive parsing and
/// make the rule fail to match instead of being silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    #[serde(rename = "if", default)]
    pub condition: BTreeMap<String, serde_json::Value>,
    pub then: PriorityList,
}

impl RoutingRule {
    pub fn new(then: PriorityList) -> Self {
        Self {
            condition: BTreeMap::new(),
            then,
        }
    }

    pub fn when(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.condition.insert(key.into(), value.into());
        self
    }
}

/// The `retry` section. The router never retries by itself; these values are
/// handed to the caller as a hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: vec![1000, 2000, 5000],
        }
    }
}

impl RetryPolicy {
    /// First backoff step rounded up to whole seconds.
    pub fn retry_after_seconds(&self) -> u64 {
        self.backoff_ms
            .first()
            .map(|ms| ms.div_ceil(1000))
            .unwrap_or(1)
    }
}

/// The `circuit_breaker` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cool_down_sec: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down_sec: 60,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cool_down_sec)
    }
}
