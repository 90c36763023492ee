//! Delivery bridge
//!
//! Adapts a thread/callback-driven [`PublishClient`] to await-style delivery
//! confirmation. The bridge owns one polling thread per instance; callbacks
//! raised on that thread are handed to a coordinator task on the caller's
//! tokio runtime, which resolves the matching [`DeliveryHandle`].
//!
//! Lifecycle: `Uninitialized -> Initialized -> Running -> Closed`.
//!
//! # Example
//!
//! ```
//! use rust_bus_logger::bridge::{DeliveryBridge, MemoryBroker};
//! use rust_bus_logger::ClientSettings;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> rust_bus_logger::Result<()> {
//! let broker = MemoryBroker::new();
//! let mut bridge = DeliveryBridge::new(broker.connector());
//! bridge.initialize(&ClientSettings::new())?;
//! bridge.start(tokio::runtime::Handle::current())?;
//!
//! bridge.publish("logs", br#"{"level":"INFO","message":"ok"}"#.to_vec())?.await?;
//! bridge.close()?;
//! assert_eq!(broker.messages().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod handle;
pub mod memory;
#[cfg(feature = "network")]
pub mod tcp;

pub use client::{Connector, DeliveryCallback, DeliveryReport, PublishClient};
pub use handle::DeliveryHandle;
pub use memory::{Behavior, BrokerMessage, MemoryBroker, MemoryClient};
#[cfg(feature = "network")]
pub use tcp::TcpClient;

use crate::core::{ClientSettings, DeliveryMetrics, LoggerError, ProducerConfig, Result};
use crossbeam_channel::TryRecvError;
use handle::{run_coordinator, Completion};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

/// Interval the polling thread waits on the client per iteration
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on how long `close` waits for the polling thread
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const COMPONENT: &str = "DeliveryBridge";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Initialized,
    Running,
    Closed,
}

pub struct DeliveryBridge {
    connect: Connector,
    state: BridgeState,
    config: Option<ProducerConfig>,
    client: Option<Arc<dyn PublishClient>>,
    scheduler: Option<Handle>,
    /// Dropping this sender tells the polling thread to exit
    stop_signal: Option<crossbeam_channel::Sender<()>>,
    poll_handle: Option<thread::JoinHandle<()>>,
    completions: Option<mpsc::UnboundedSender<Completion>>,
    next_id: AtomicU64,
    metrics: Arc<DeliveryMetrics>,
    poll_interval: Duration,
    close_timeout: Duration,
}

impl DeliveryBridge {
    pub fn new(connect: Connector) -> Self {
        Self {
            connect,
            state: BridgeState::Uninitialized,
            config: None,
            client: None,
            scheduler: None,
            stop_signal: None,
            poll_handle: None,
            completions: None,
            next_id: AtomicU64::new(0),
            metrics: Arc::new(DeliveryMetrics::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn metrics(&self) -> &DeliveryMetrics {
        &self.metrics
    }

    /// The merged configuration, once initialized
    pub fn config(&self) -> Option<&ProducerConfig> {
        self.config.as_ref()
    }

    /// Merge `settings` over the producer defaults and construct the client.
    ///
    /// Calling this more than once is the caller's responsibility; a second
    /// call replaces the client of a bridge that has not started yet.
    pub fn initialize(&mut self, settings: &ClientSettings) -> Result<()> {
        let config = ProducerConfig::merged(settings);
        config.validate()?;
        let client = (self.connect)(&config)?;

        self.config = Some(config);
        self.client = Some(client);
        self.state = BridgeState::Initialized;
        Ok(())
    }

    /// Spawn the coordinator on `scheduler` and the polling thread.
    pub fn start(&mut self, scheduler: Handle) -> Result<()> {
        match self.state {
            BridgeState::Uninitialized => {
                return Err(LoggerError::config(
                    COMPONENT,
                    "producer is not initialized; call initialize() first",
                ))
            }
            BridgeState::Running => {
                return Err(LoggerError::config(COMPONENT, "already running"));
            }
            BridgeState::Closed => return Err(LoggerError::closed(COMPONENT)),
            BridgeState::Initialized => {}
        }
        let client = self
            .client
            .clone()
            .ok_or_else(|| LoggerError::config(COMPONENT, "client missing after initialize"))?;

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let interval = self.poll_interval;
        let poll_handle = thread::Builder::new()
            .name("delivery-poller".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.try_recv() {
                        Err(TryRecvError::Empty) => {
                            client.poll(interval);
                        }
                        Ok(()) | Err(TryRecvError::Disconnected) => break,
                    }
                }
                // serve whatever completed while we were stopping
                client.poll(Duration::ZERO);
            })
            .map_err(|e| LoggerError::io_operation("spawning delivery poller", "thread spawn failed", e))?;

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        scheduler.spawn(run_coordinator(completions_rx, Arc::clone(&self.metrics)));

        self.scheduler = Some(scheduler);
        self.stop_signal = Some(stop_tx);
        self.poll_handle = Some(poll_handle);
        self.completions = Some(completions_tx);
        self.state = BridgeState::Running;
        Ok(())
    }

    /// Hand `payload` to the client and return a handle for its outcome.
    /// Never waits for the transport.
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<DeliveryHandle> {
        let (completions, client) = match (self.state, &self.completions, &self.client) {
            (BridgeState::Running, Some(completions), Some(client)) => (completions, client),
            (BridgeState::Closed, _, _) => return Err(LoggerError::closed(COMPONENT)),
            _ => {
                return Err(LoggerError::config(
                    COMPONENT,
                    "publish requires a started bridge; call start() first",
                ))
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (cell, receiver) = oneshot::channel();
        completions
            .send(Completion::Register {
                id,
                topic: topic.to_string(),
                cell,
            })
            .map_err(|_| LoggerError::closed(COMPONENT))?;
        self.metrics.record_published();

        let report_to = completions.clone();
        let on_delivery = Box::new(move |report: DeliveryReport| {
            // the coordinator may already be gone during shutdown
            let _ = report_to.send(Completion::Resolve {
                id,
                outcome: report.outcome,
            });
        });

        if let Err(e) = client.produce(topic, payload, on_delivery) {
            let _ = completions.send(Completion::Resolve {
                id,
                outcome: Err(e.to_string()),
            });
        }

        Ok(DeliveryHandle::new(id, topic.to_string(), receiver))
    }

    /// Stop the polling thread and wait (bounded) for it to exit.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            BridgeState::Running => {}
            BridgeState::Closed => return Err(LoggerError::closed(COMPONENT)),
            _ => return Err(LoggerError::config(COMPONENT, "close requires a running bridge")),
        }
        self.state = BridgeState::Closed;

        drop(self.stop_signal.take());
        let joined = match self.poll_handle.take() {
            Some(handle) => Self::join_with_timeout(handle, self.close_timeout),
            None => true,
        };

        // the coordinator exits once the client's pending callbacks are gone
        self.completions = None;
        self.client = None;
        self.scheduler = None;

        if joined {
            Ok(())
        } else {
            Err(LoggerError::transport(format!(
                "delivery poller did not stop within {:?}",
                self.close_timeout
            )))
        }
    }

    fn join_with_timeout(handle: thread::JoinHandle<()>, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if handle.is_finished() {
                if let Err(e) = handle.join() {
                    eprintln!("[LOGGER ERROR] Delivery poller panicked: {:?}", e);
                }
                return true;
            }
            if start.elapsed() >= timeout {
                eprintln!(
                    "[LOGGER WARNING] Delivery poller did not finish within {:?}. \
                     Pending deliveries may be lost.",
                    timeout
                );
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Drop for DeliveryBridge {
    fn drop(&mut self) {
        if self.state == BridgeState::Running {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn running_bridge(broker: &MemoryBroker) -> DeliveryBridge {
        let mut bridge = DeliveryBridge::new(broker.connector());
        bridge.initialize(&ClientSettings::new()).unwrap();
        bridge.start(Handle::current()).unwrap();
        bridge
    }

    #[tokio::test]
    async fn test_start_before_initialize_fails() {
        let mut bridge = DeliveryBridge::new(MemoryBroker::new().connector());
        let err = bridge.start(Handle::current()).unwrap_err();
        assert!(matches!(err, LoggerError::Configuration { .. }));
        assert_eq!(bridge.state(), BridgeState::Uninitialized);
    }

    #[test]
    fn test_publish_before_start_fails() {
        let mut bridge = DeliveryBridge::new(MemoryBroker::new().connector());
        assert!(matches!(
            bridge.publish("t", vec![]),
            Err(LoggerError::Configuration { .. })
        ));
        bridge.initialize(&ClientSettings::new()).unwrap();
        assert!(matches!(
            bridge.publish("t", vec![]),
            Err(LoggerError::Configuration { .. })
        ));
        assert!(matches!(bridge.close(), Err(LoggerError::Configuration { .. })));
    }

    #[test]
    fn test_initialize_merges_settings_over_defaults() {
        let broker = MemoryBroker::new();
        let mut bridge = DeliveryBridge::new(broker.connector());
        let mut settings = ClientSettings::new();
        settings.insert("acks".into(), json!(0));
        bridge.initialize(&settings).unwrap();

        let config = bridge.config().unwrap();
        assert_eq!(config.get("acks"), Some(&json!(0)));
        assert_eq!(config.get("compression"), Some(&json!("lz4")));
        assert_eq!(broker.connected_config().unwrap(), *config);
        assert_eq!(bridge.state(), BridgeState::Initialized);
    }

    #[test]
    fn test_initialize_rejects_invalid_tuning() {
        let mut bridge = DeliveryBridge::new(MemoryBroker::new().connector());
        let mut settings = ClientSettings::new();
        settings.insert("compression".into(), json!("brotli"));
        assert!(bridge.initialize(&settings).is_err());
        assert_eq!(bridge.state(), BridgeState::Uninitialized);
    }

    #[tokio::test]
    async fn test_publish_resolves_success() {
        let broker = MemoryBroker::new();
        let mut bridge = running_bridge(&broker);

        let handle = bridge
            .publish("t", br#"{"level":"INFO","message":"ok"}"#.to_vec())
            .unwrap();
        assert_eq!(handle.topic(), "t");
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("delivery should be confirmed promptly")
            .unwrap();

        assert_eq!(broker.messages()[0].topic, "t");
        assert_eq!(bridge.metrics().delivered(), 1);
        bridge.close().unwrap();
    }

    #[tokio::test]
    async fn test_publish_resolves_failure_with_cause() {
        let broker = MemoryBroker::failing("broker down");
        let mut bridge = running_bridge(&broker);

        let err = bridge.publish("t", b"{}".to_vec()).unwrap().await.unwrap_err();
        assert_eq!(err.delivery_cause(), Some("broker down"));
        assert_eq!(bridge.metrics().failed(), 1);
        bridge.close().unwrap();
    }

    #[tokio::test]
    async fn test_close_stops_worker_and_rejects_publish() {
        let broker = MemoryBroker::new();
        let mut bridge = running_bridge(&broker);
        bridge.close().unwrap();

        assert_eq!(bridge.state(), BridgeState::Closed);
        assert!(bridge.poll_handle.is_none());
        assert!(matches!(
            bridge.publish("t", vec![]),
            Err(LoggerError::ResourceClosed { .. })
        ));
        assert!(matches!(bridge.close(), Err(LoggerError::ResourceClosed { .. })));
        assert!(matches!(
            bridge.start(Handle::current()),
            Err(LoggerError::ResourceClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let broker = MemoryBroker::new();
        let mut bridge = running_bridge(&broker);
        assert!(matches!(
            bridge.start(Handle::current()),
            Err(LoggerError::Configuration { .. })
        ));
        bridge.close().unwrap();
    }
}
