//! Channel priority resolution.
//!
//! Maps message metadata to an ordered list of channel names. Resolution is a
//! pure function of the configuration and the metadata; first match wins:
//!
//! 1. tenant override (`routing.by_tenant`)
//! 2. usecase override (`routing.by_usecase`)
//! 3. first rule whose predicates all hold (`routing.rules`)
//! 4. `routing.default`
//!
//! Overrides or rules with an empty priority list are skipped, so the result
//! is never empty as long as the default is not.

use std::fmt;

use serde_json::Value;

use crate::config::{PriorityList, RouterConfig, RoutingRule};
use crate::message::Metadata;

/// Which part of the configuration produced a priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityOrigin {
    Tenant,
    Usecase,
    Rule(usize),
    Default,
}

impl fmt::Display for PriorityOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tenant => f.write_str("tenant"),
            Self::Usecase => f.write_str("usecase"),
            Self::Rule(index) => write!(f, "rule[{}]", index),
            Self::Default => f.write_str("default"),
        }
    }
}

/// A resolved priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityResolution {
    pub channels: Vec<String>,
    pub origin: PriorityOrigin,
}

/// Resolve the channel order for a message.
pub fn resolve_priority(config: &RouterConfig, metadata: &Metadata) -> PriorityResolution {
    let routing = &config.routing;

    if let Some(list) = usable(routing.by_tenant.get(&metadata.tenant_id)) {
        return resolution(list, PriorityOrigin::Tenant);
    }

    if let Some(list) = usable(routing.by_usecase.get(&metadata.usecase)) {
        return resolution(list, PriorityOrigin::Usecase);
    }

    for (index, rule) in routing.rules.iter().enumerate() {
        if !rule.then.priority.is_empty() && rule_matches(rule, metadata) {
            return resolution(&rule.then, PriorityOrigin::Rule(index));
        }
    }

    resolution(&routing.default, PriorityOrigin::Default)
}

/// Resolve the channel order, dropping the origin.
pub fn resolve_priority_list(config: &RouterConfig, metadata: &Metadata) -> Vec<String> {
    resolve_priority(config, metadata).channels
}

fn usable(list: Option<&PriorityList>) -> Option<&PriorityList> {
    list.filter(|l| !l.priority.is_empty())
}

fn resolution(list: &PriorityList, origin: PriorityOrigin) -> PriorityResolution {
    PriorityResolution {
        channels: list.priority.clone(),
        origin,
    }
}

/// Whether every predicate of a rule holds for the metadata.
pub fn rule_matches(rule: &RoutingRule, metadata: &Metadata) -> bool {
    rule.condition
        .iter()
        .all(|(key, expected)| predicate_holds(key, expected, metadata))
}

fn predicate_holds(key: &str, expected: &Value, metadata: &Metadata) -> bool {
    match key {
        "sensitivity" => expected.as_str() == Some(metadata.sensitivity.as_str()),
        "data_size_mb" => expected
            .as_str()
            .and_then(SizeThreshold::parse)
            .is_some_and(|threshold| threshold.holds(metadata.size_mb())),
        _ => false,
    }
}

/// Comparison operator of a size predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeOp {
    AtLeast,
    AtMost,
}

/// A parsed `data_size_mb` predicate such as `">=10"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeThreshold {
    pub op: SizeOp,
    pub megabytes: f64,
}

impl SizeThreshold {
    /// Parse `<op><threshold>`; only `>=` and `<=` are understood.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (op, rest) = if let Some(rest) = raw.strip_prefix(">=") {
            (SizeOp::AtLeast, rest)
        } else if let Some(rest) = raw.strip_prefix("<=") {
            (SizeOp::AtMost, rest)
        } else {
            return None;
        };

        let megabytes: f64 = rest.trim().parse().ok()?;
        if !megabytes.is_finite() {
            return None;
        }
        Some(Self { op, megabytes })
    }

    pub fn holds(&self, size_mb: f64) -> bool {
        match self.op {
            SizeOp::AtLeast => size_mb >= self.megabytes,
            SizeOp::AtMost => size_mb <= self.megabytes,
        }
    }
}
