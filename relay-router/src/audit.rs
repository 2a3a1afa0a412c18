//! Audit trail of routing decisions.
//!
//! The router emits one [`AuditRecord`] per skip, per send attempt and per
//! exhaustion. Where the records end up is the sink's business; the router
//! only needs `emit` to return.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::message::Metadata;

/// Why a channel was passed over without a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AdapterNotFound,
    CircuitBreakerOpen,
    HealthCheckFailed,
    HealthCheckError,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdapterNotFound => "adapter_not_found",
            Self::CircuitBreakerOpen => "circuit_breaker_open",
            Self::HealthCheckFailed => "health_check_failed",
            Self::HealthCheckError => "health_check_error",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routing decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    SendSkipped {
        channel: String,
        reason: SkipReason,
    },
    SendAttempt {
        channel: String,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SendQueued {
        attempted_channels: Vec<String>,
    },
}

impl AuditEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SendSkipped { .. } => "send_skipped",
            Self::SendAttempt { .. } => "send_attempt",
            Self::SendQueued { .. } => "send_queued",
        }
    }

    /// The channel the event is about, if it is about a single one.
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::SendSkipped { channel, .. } | Self::SendAttempt { channel, .. } => {
                Some(channel.as_str())
            }
            Self::SendQueued { .. } => None,
        }
    }
}

/// An audit event with the identifying fields of the send it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub tenant_id: String,
    pub usecase: String,
    pub idempotency_key: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditRecord {
    pub fn new(metadata: &Metadata, event: AuditEvent) -> Self {
        Self {
            tenant_id: metadata.tenant_id.clone(),
            usecase: metadata.usecase.clone(),
            idempotency_key: metadata.idempotency_key.clone(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Receiver of audit records.
///
/// Implementations must not block for long and must swallow their own
/// failures; a broken sink never aborts a send.
pub trait AuditSink: Send + Sync {
    fn emit(&self, record: AuditRecord);
}

/// Writes audit records as structured `tracing` events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, record: AuditRecord) {
        let AuditRecord {
            tenant_id,
            usecase,
            idempotency_key,
            timestamp,
            event,
        } = record;

        match event {
            AuditEvent::SendSkipped { channel, reason } => info!(
                target: "audit",
                event = "send_skipped",
                %tenant_id, %usecase, %idempotency_key, %timestamp,
                %channel, %reason
            ),
            AuditEvent::SendAttempt { channel, ok, error } => info!(
                target: "audit",
                event = "send_attempt",
                %tenant_id, %usecase, %idempotency_key, %timestamp,
                %channel, ok,
                error = error.as_deref().unwrap_or("")
            ),
            AuditEvent::SendQueued { attempted_channels } => info!(
                target: "audit",
                event = "send_queued",
                %tenant_id, %usecase, %idempotency_key, %timestamp,
                attempted_channels = %attempted_channels.join(",")
            ),
        }
    }
}

/// Fans audit records out to live subscribers.
pub struct BroadcastAuditSink {
    tx: broadcast::Sender<AuditRecord>,
}

impl BroadcastAuditSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditRecord> {
        self.tx.subscribe()
    }
}

impl AuditSink for BroadcastAuditSink {
    fn emit(&self, record: AuditRecord) {
        // No subscribers is fine.
        let _ = self.tx.send(record);
    }
}

/// Keeps every record in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.records.lock().iter().map(|r| r.event.clone()).collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}

/// Forwards every record to several sinks in order.
#[derive(Default, Clone)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl AuditSink for FanoutAuditSink {
    fn emit(&self, record: AuditRecord) {
        match self.sinks.split_last() {
            Some((last, rest)) => {
                for sink in rest {
                    sink.emit(record.clone());
                }
                last.emit(record);
            }
            None => warn!(target: "audit", "Audit record dropped: no sinks configured"),
        }
    }
}
