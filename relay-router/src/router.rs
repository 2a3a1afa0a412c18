//! Failover router.
//!
//! Walks the resolved priority order one channel at a time and stops at the
//! first successful send. Channels are never raced: at most one attempt is in
//! flight per logical send, so a message is never delivered twice by this
//! router and breaker updates stay unambiguous.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditEvent, AuditRecord, AuditSink, SkipReason};
use crate::breaker::CircuitBreakerRegistry;
use crate::channels::{ChannelRegistry, DeliveryChannel};
use crate::config::RouterConfig;
use crate::message::{SendInput, SendReceipt, SendResult};
use crate::policy::resolve_priority;
use crate::{Error, Result};

/// Routes messages over the configured channels with failover.
pub struct FailoverRouter {
    config: RwLock<Arc<RouterConfig>>,
    channels: ChannelRegistry,
    breakers: Arc<CircuitBreakerRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl FailoverRouter {
    /// Create a router with its own breaker registry.
    pub fn new(config: RouterConfig, channels: ChannelRegistry, audit: Arc<dyn AuditSink>) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::from_config(&config.circuit_breaker));
        Self::with_breakers(config, channels, audit, breakers)
    }

    /// Create a router sharing an existing breaker registry.
    pub fn with_breakers(
        config: RouterConfig,
        channels: ChannelRegistry,
        audit: Arc<dyn AuditSink>,
        breakers: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            channels,
            breakers,
            audit,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<RouterConfig> {
        self.config.read().clone()
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Swap in a new configuration. Sends already running keep the old one.
    pub fn reload_config(&self, config: RouterConfig) -> Result<()> {
        config.validate()?;
        self.breakers.set_limits(
            config.circuit_breaker.failure_threshold,
            config.circuit_breaker.cooldown(),
        );
        *self.config.write() = Arc::new(config);
        info!("Routing configuration reloaded");
        Ok(())
    }

    /// Deliver a message over the first channel that accepts it.
    ///
    /// Never fails: when every channel has been skipped or has failed the
    /// result is `QUEUED_FOR_RETRY` with a retry hint for the caller.
    #[instrument(
        skip_all,
        fields(
            tenant_id = %input.metadata.tenant_id,
            usecase = %input.metadata.usecase,
            idempotency_key = %input.metadata.idempotency_key
        )
    )]
    pub async fn send_with_failover(&self, input: &SendInput) -> SendResult {
        let config = self.config();
        let resolution = resolve_priority(&config, &input.metadata);
        debug!(
            priority = ?resolution.channels,
            origin = %resolution.origin,
            "Resolved channel priority"
        );

        for name in &resolution.channels {
            let channel = match self.channels.require(name) {
                Ok(channel) => channel,
                Err(e) => {
                    debug!(error = %e, "Skipping channel");
                    self.skip(input, name, SkipReason::AdapterNotFound);
                    continue;
                }
            };

            if self.breakers.is_open(name) {
                debug!(channel = %name, "Circuit breaker open, skipping");
                self.skip(input, name, SkipReason::CircuitBreakerOpen);
                continue;
            }

            match check_health(channel.as_ref()).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(channel = %name, "Channel unhealthy, skipping");
                    self.skip(input, name, SkipReason::HealthCheckFailed);
                    continue;
                }
                Err(e) => {
                    warn!(channel = %name, error = %e, "Health check errored, skipping");
                    self.skip(input, name, SkipReason::HealthCheckError);
                    continue;
                }
            }

            match attempt_send(channel.as_ref(), input).await {
                Ok(receipt) => {
                    self.emit(
                        input,
                        AuditEvent::SendAttempt {
                            channel: name.clone(),
                            ok: true,
                            error: None,
                        },
                    );
                    self.breakers.record_success(name);
                    info!(channel = %name, id = %receipt.id, "Message delivered");
                    return SendResult::delivered(receipt, name.clone());
                }
                Err(e) => {
                    warn!(channel = %name, error = %e, "Send failed, trying next channel");
                    self.emit(
                        input,
                        AuditEvent::SendAttempt {
                            channel: name.clone(),
                            ok: false,
                            error: Some(e.to_string()),
                        },
                    );
                    self.breakers.record_failure(name);
                }
            }
        }

        let retry_after = config.retry.retry_after_seconds();
        warn!(
            attempted = ?resolution.channels,
            retry_after_seconds = retry_after,
            "{}",
            Error::AllChannelsExhausted {
                attempted: resolution.channels.clone()
            }
        );
        self.emit(
            input,
            AuditEvent::SendQueued {
                attempted_channels: resolution.channels,
            },
        );
        SendResult::queued(retry_after)
    }

    fn skip(&self, input: &SendInput, channel: &str, reason: SkipReason) {
        self.emit(
            input,
            AuditEvent::SendSkipped {
                channel: channel.to_string(),
                reason,
            },
        );
    }

    fn emit(&self, input: &SendInput, event: AuditEvent) {
        let record = AuditRecord::new(&input.metadata, event);
        let audit = &self.audit;
        if std::panic::catch_unwind(AssertUnwindSafe(|| audit.emit(record))).is_err() {
            warn!("Audit sink panicked, record dropped");
        }
    }
}

async fn check_health(channel: &dyn DeliveryChannel) -> Result<bool> {
    AssertUnwindSafe(channel.health())
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(panicked(channel.name(), "health check", panic)))
}

async fn attempt_send(channel: &dyn DeliveryChannel, input: &SendInput) -> Result<SendReceipt> {
    AssertUnwindSafe(channel.send(input))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(panicked(channel.name(), "send", panic)))
}

fn panicked(channel: &str, stage: &str, panic: Box<dyn Any + Send>) -> Error {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    Error::send(channel, format!("{} panicked: {}", stage, detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::config::{PriorityList, RoutingRule};
    use crate::message::{Metadata, QUEUED_FOR_RETRY};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone, Copy)]
    enum Health {
        Up,
        Down,
        Errors,
        Panics,
    }

    #[derive(Clone, Copy)]
    enum Outcome {
        Succeed,
        Fail,
        Panic,
    }

    struct TestChannel {
        name: &'static str,
        health: Health,
        outcome: Outcome,
        attempts: Arc<AtomicU32>,
    }

    impl TestChannel {
        fn new(name: &'static str, health: Health, outcome: Outcome) -> (Arc<Self>, Arc<AtomicU32>) {
            let attempts = Arc::new(AtomicU32::new(0));
            let channel = Arc::new(Self {
                name,
                health,
                outcome,
                attempts: attempts.clone(),
            });
            (channel, attempts)
        }
    }

    #[async_trait]
    impl DeliveryChannel for TestChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn health(&self) -> Result<bool> {
            match self.health {
                Health::Up => Ok(true),
                Health::Down => Ok(false),
                Health::Errors => Err(Error::unhealthy(self.name, "health check failed")),
                Health::Panics => panic!("health check exploded"),
            }
        }

        async fn send(&self, _input: &SendInput) -> Result<SendReceipt> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match self.outcome {
                Outcome::Succeed => Ok(SendReceipt::new(format!("{}:{}", self.name, attempt))),
                Outcome::Fail => Err(Error::send(self.name, format!("forced failure {}", attempt))),
                Outcome::Panic => panic!("send exploded"),
            }
        }
    }

    fn input() -> SendInput {
        SendInput::new(
            "dest",
            b"ciphertext".to_vec(),
            Metadata {
                tenant_id: "acme".to_string(),
                usecase: "reports".to_string(),
                idempotency_key: "idem-1".to_string(),
                ..Default::default()
            },
        )
    }

    fn router(
        config: RouterConfig,
        channels: Vec<Arc<TestChannel>>,
    ) -> (FailoverRouter, Arc<MemoryAuditSink>) {
        let mut registry = ChannelRegistry::new();
        for channel in channels {
            registry.register(channel).unwrap();
        }
        let audit = Arc::new(MemoryAuditSink::new());
        (FailoverRouter::new(config, registry, audit.clone()), audit)
    }

    #[tokio::test]
    async fn test_first_success_stops_the_walk() {
        let (telegram, telegram_attempts) = TestChannel::new("telegram", Health::Up, Outcome::Succeed);
        let (email, email_attempts) = TestChannel::new("email", Health::Up, Outcome::Succeed);
        let (router, audit) = router(RouterConfig::default(), vec![telegram, email]);

        let result = router.send_with_failover(&input()).await;
        assert!(result.ok);
        assert_eq!(result.transport_used.as_deref(), Some("telegram"));
        assert_eq!(result.id.as_deref(), Some("telegram:1"));
        assert_eq!(telegram_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(email_attempts.load(Ordering::SeqCst), 0);
        assert_eq!(audit.events().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_falls_through_and_records_breaker() {
        let (telegram, _) = TestChannel::new("telegram", Health::Up, Outcome::Fail);
        let (email, _) = TestChannel::new("email", Health::Up, Outcome::Succeed);
        let (router, audit) = router(RouterConfig::default(), vec![telegram, email]);

        let result = router.send_with_failover(&input()).await;
        assert_eq!(result.transport_used.as_deref(), Some("email"));
        assert_eq!(router.breakers().snapshot("telegram").unwrap().failure_count, 1);
        assert!(router.breakers().snapshot("email").is_none());

        let events = audit.events();
        assert!(matches!(
            &events[0],
            AuditEvent::SendAttempt { channel, ok: false, error: Some(_) } if channel == "telegram"
        ));
        assert!(matches!(
            &events[1],
            AuditEvent::SendAttempt { channel, ok: true, .. } if channel == "email"
        ));
    }

    #[tokio::test]
    async fn test_health_outcomes_are_skips() {
        let (telegram, telegram_attempts) = TestChannel::new("telegram", Health::Down, Outcome::Succeed);
        let (email, email_attempts) = TestChannel::new("email", Health::Errors, Outcome::Succeed);
        let (webhook, _) = TestChannel::new("webhook", Health::Panics, Outcome::Succeed);
        let (router, audit) = router(RouterConfig::default(), vec![telegram, email, webhook]);

        let result = router.send_with_failover(&input()).await;
        assert!(result.is_queued());
        assert_eq!(telegram_attempts.load(Ordering::SeqCst), 0);
        assert_eq!(email_attempts.load(Ordering::SeqCst), 0);

        let reasons: Vec<SkipReason> = audit
            .events()
            .into_iter()
            .filter_map(|e| match e {
                AuditEvent::SendSkipped { reason, .. } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::HealthCheckFailed,
                SkipReason::HealthCheckError,
                SkipReason::HealthCheckError
            ]
        );
        // Skips are not failures.
        assert!(router.breakers().open_channels().is_empty());
        assert!(router.breakers().snapshot("telegram").is_none());
    }

    #[tokio::test]
    async fn test_panicking_send_is_a_failure() {
        let (telegram, _) = TestChannel::new("telegram", Health::Up, Outcome::Panic);
        let (email, _) = TestChannel::new("email", Health::Up, Outcome::Succeed);
        let (router, audit) = router(RouterConfig::default(), vec![telegram, email]);

        let result = router.send_with_failover(&input()).await;
        assert_eq!(result.transport_used.as_deref(), Some("email"));
        assert_eq!(router.breakers().snapshot("telegram").unwrap().failure_count, 1);
        match &audit.events()[0] {
            AuditEvent::SendAttempt { error: Some(error), .. } => {
                assert!(error.contains("send panicked: send exploded"))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    struct PanickingSink;

    impl AuditSink for PanickingSink {
        fn emit(&self, _record: AuditRecord) {
            panic!("audit store unavailable");
        }
    }

    #[tokio::test]
    async fn test_panicking_audit_sink_does_not_abort_send() {
        assert!(cfg!(panic = "unwind"));

        let (telegram, _) = TestChannel::new("telegram", Health::Up, Outcome::Fail);
        let (email, _) = TestChannel::new("email", Health::Up, Outcome::Succeed);
        let registry = ChannelRegistry::new()
            .with(telegram)
            .unwrap()
            .with(email)
            .unwrap();
        let router = FailoverRouter::new(RouterConfig::default(), registry, Arc::new(PanickingSink));

        let result = router.send_with_failover(&input()).await;
        assert_eq!(result.transport_used.as_deref(), Some("email"));
        assert_eq!(router.breakers().snapshot("telegram").unwrap().failure_count, 1);
    }

    #[tokio::test]
    async fn test_exhaustion_queues_with_retry_hint() {
        let mut config = RouterConfig::default();
        config.retry.backoff_ms = vec![2500, 5000];
        let (telegram, _) = TestChannel::new("telegram", Health::Up, Outcome::Fail);
        let (router, audit) = router(config, vec![telegram]);

        let result = router.send_with_failover(&input()).await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some(QUEUED_FOR_RETRY));
        assert_eq!(result.retry_after_seconds, Some(3));

        let events = audit.events();
        assert_eq!(
            events.last(),
            Some(&AuditEvent::SendQueued {
                attempted_channels: vec![
                    "telegram".to_string(),
                    "email".to_string(),
                    "webhook".to_string()
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_audit_records_carry_metadata() {
        let (router, audit) = router(RouterConfig::default(), vec![]);
        router.send_with_failover(&input()).await;

        let records = audit.records();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.tenant_id == "acme"
            && r.usecase == "reports"
            && r.idempotency_key == "idem-1"));
    }

    #[tokio::test]
    async fn test_reload_config_changes_routing() {
        let (telegram, _) = TestChannel::new("telegram", Health::Up, Outcome::Succeed);
        let (webhook, _) = TestChannel::new("webhook", Health::Up, Outcome::Succeed);
        let (router, _) = router(RouterConfig::default(), vec![telegram, webhook]);

        let mut config = RouterConfig::default();
        config
            .routing
            .rules
            .push(RoutingRule::new(PriorityList::new(["webhook"])));
        router.reload_config(config).unwrap();

        let result = router.send_with_failover(&input()).await;
        assert_eq!(result.transport_used.as_deref(), Some("webhook"));

        let mut invalid = RouterConfig::default();
        invalid.routing.default = PriorityList::default();
        assert!(router.reload_config(invalid).is_err());
        assert_eq!(router.config().routing.rules.len(), 1);
    }

    #[tokio::test]
    async fn test_reload_updates_breaker_limits() {
        let (telegram, _) = TestChannel::new("telegram", Health::Up, Outcome::Fail);
        let (router, _) = router(RouterConfig::default(), vec![telegram]);

        router.send_with_failover(&input()).await;
        assert!(!router.breakers().is_open("telegram"));

        let mut config = RouterConfig::default();
        config.circuit_breaker.failure_threshold = 1;
        router.reload_config(config).unwrap();
        assert!(router.breakers().is_open("telegram"));
    }
}
