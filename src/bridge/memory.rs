//! In-process publish client
//!
//! `MemoryBroker` stands in for a real message bus: it records accepted
//! payloads and can be told to reject them, which makes delivery outcomes
//! observable without a network.

use super::client::{Connector, DeliveryCallback, DeliveryReport, PublishClient};
use crate::core::{ProducerConfig, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A payload the broker accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BrokerMessage {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

/// How the broker answers delivery attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    Accept,
    Reject(String),
    /// Reject the next `remaining` attempts, then accept
    RejectFirst { remaining: usize, cause: String },
}

#[derive(Debug)]
struct BrokerState {
    behavior: Mutex<Behavior>,
    messages: Mutex<Vec<BrokerMessage>>,
    attempts: AtomicUsize,
    paused: AtomicBool,
    connected_config: Mutex<Option<ProducerConfig>>,
}

impl BrokerState {
    fn attempt(&self, topic: &str, payload: &[u8]) -> std::result::Result<(), String> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let mut behavior = self.behavior.lock();
        let verdict = match &mut *behavior {
            Behavior::Accept => Ok(()),
            Behavior::Reject(cause) => Err(cause.clone()),
            Behavior::RejectFirst { remaining, cause } => {
                if *remaining > 0 {
                    *remaining -= 1;
                    Err(cause.clone())
                } else {
                    Ok(())
                }
            }
        };
        drop(behavior);

        if verdict.is_ok() {
            self.messages.lock().push(BrokerMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            });
        }
        verdict
    }
}

/// Shared handle to an in-memory broker. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::with_behavior(Behavior::Accept)
    }
}

impl MemoryBroker {
    /// A broker that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker that rejects every attempt with `cause`
    pub fn failing(cause: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Reject(cause.into()))
    }

    pub fn with_behavior(behavior: Behavior) -> Self {
        Self {
            state: Arc::new(BrokerState {
                behavior: Mutex::new(behavior),
                messages: Mutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
                paused: AtomicBool::new(false),
                connected_config: Mutex::new(None),
            }),
        }
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.state.behavior.lock() = behavior;
    }

    /// Stop answering: queued payloads stay in flight until `resume`
    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<BrokerMessage> {
        self.state.messages.lock().clone()
    }

    /// Delivery attempts made, including retries
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::Relaxed)
    }

    /// Configuration the most recent client was built from
    pub fn connected_config(&self) -> Option<ProducerConfig> {
        self.state.connected_config.lock().clone()
    }

    pub fn connect(&self, config: &ProducerConfig) -> Result<MemoryClient> {
        let retries = config.retries()?;
        *self.state.connected_config.lock() = Some(config.clone());
        Ok(MemoryClient {
            broker: Arc::clone(&self.state),
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            retries,
        })
    }

    /// Connector for [`DeliveryBridge::new`](super::DeliveryBridge::new)
    pub fn connector(&self) -> Connector {
        let broker = self.clone();
        Box::new(move |config: &ProducerConfig| {
            let client: Arc<dyn PublishClient> = Arc::new(broker.connect(config)?);
            Ok(client)
        })
    }
}

struct Queued {
    topic: String,
    payload: Vec<u8>,
    on_delivery: DeliveryCallback,
}

/// Client half of [`MemoryBroker`]
pub struct MemoryClient {
    broker: Arc<BrokerState>,
    queue: Mutex<VecDeque<Queued>>,
    ready: Condvar,
    retries: u32,
}

impl MemoryClient {
    fn deliver(&self, message: Queued) {
        let mut outcome = self.broker.attempt(&message.topic, &message.payload);
        let mut retries_left = self.retries;
        while outcome.is_err() && retries_left > 0 {
            retries_left -= 1;
            outcome = self.broker.attempt(&message.topic, &message.payload);
        }
        let report = match outcome {
            Ok(()) => DeliveryReport::delivered(message.topic),
            Err(cause) => DeliveryReport::failed(message.topic, cause),
        };
        (message.on_delivery)(report);
    }
}

impl PublishClient for MemoryClient {
    fn produce(&self, topic: &str, payload: Vec<u8>, on_delivery: DeliveryCallback) -> Result<()> {
        self.queue.lock().push_back(Queued {
            topic: topic.to_string(),
            payload,
            on_delivery,
        });
        self.ready.notify_one();
        Ok(())
    }

    fn poll(&self, timeout: Duration) -> usize {
        let batch: Vec<Queued> = {
            let mut queue = self.queue.lock();
            if queue.is_empty() && !timeout.is_zero() {
                self.ready.wait_for(&mut queue, timeout);
            }
            if self.broker.paused.load(Ordering::SeqCst) {
                drop(queue);
                // avoid spinning while held
                std::thread::sleep(timeout.min(Duration::from_millis(10)));
                return 0;
            }
            queue.drain(..).collect()
        };

        let served = batch.len();
        for message in batch {
            self.deliver(message);
        }
        served
    }

    fn in_flight(&self) -> usize {
        self.queue.lock().len()
    }

    fn name(&self) -> &str {
        "memory"
    }
}
