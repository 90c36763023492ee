//! Publish client contract
//!
//! A publish client is a synchronous, callback-driven producer: `produce`
//! only enqueues, and delivery outcomes are reported by invoking the
//! message's callback from inside `poll`. The delivery bridge owns the thread
//! that calls `poll`.

use crate::core::{ProducerConfig, Result};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one delivery attempt as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub topic: String,
    /// `Err` carries the transport's cause
    pub outcome: std::result::Result<(), String>,
}

impl DeliveryReport {
    pub fn delivered(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            outcome: Ok(()),
        }
    }

    pub fn failed(topic: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            outcome: Err(cause.into()),
        }
    }
}

/// Per-message delivery callback; consumed by its single invocation
pub type DeliveryCallback = Box<dyn FnOnce(DeliveryReport) + Send + 'static>;

/// Builds the underlying client from the merged producer configuration
pub type Connector = Box<dyn Fn(&ProducerConfig) -> Result<Arc<dyn PublishClient>> + Send + Sync>;

pub trait PublishClient: Send + Sync {
    /// Enqueue a payload. Must not block on the network.
    fn produce(&self, topic: &str, payload: Vec<u8>, on_delivery: DeliveryCallback) -> Result<()>;

    /// Serve delivery callbacks, waiting up to `timeout` for work.
    /// Returns the number of callbacks invoked.
    fn poll(&self, timeout: Duration) -> usize;

    /// Payloads enqueued but not yet reported
    fn in_flight(&self) -> usize;

    fn name(&self) -> &str;
}
