//! Policy-driven failover router for encrypted message delivery.
//!
//! A [`FailoverRouter`] resolves an ordered list of channels for each message
//! from its metadata, then tries them one by one, skipping channels that are
//! unregistered, unhealthy or behind an open circuit breaker. Every decision is
//! reported to an [`audit::AuditSink`]. When nothing accepts the message the
//! caller gets `QUEUED_FOR_RETRY` and a retry hint.

// Channel and audit sink panics are caught at the router boundary, which
// needs unwinding.
#[cfg(panic = "abort")]
compile_error!("relay-router must be built with panic = \"unwind\"");

pub mod audit;
pub mod breaker;
pub mod channels;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod policy;
pub mod router;
pub mod utils;

pub use error::{Error, Result};
pub use message::{Metadata, SendInput, SendReceipt, SendResult, Sensitivity};
pub use router::FailoverRouter;
