//! Message-bus sink
//!
//! Serializes records and hands them to a [`DeliveryBridge`]. As a plain
//! [`Sink`] it publishes fire-and-forget; as an [`AsyncSink`], or through the
//! level-named emitters, the caller gets the delivery outcome.

use crate::bridge::{BridgeState, Connector, DeliveryBridge, DeliveryHandle};
use crate::core::{
    AsyncSink, BusSinkConfig, DeliveryMetrics, Fields, LogLevel, LogRecord, LoggerError, Result,
    Sink,
};
use crate::serializer::serialize;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::runtime::Handle;

/// Sink publishing to one topic of a message bus
///
/// # Example
///
/// ```
/// use rust_bus_logger::bridge::MemoryBroker;
/// use rust_bus_logger::sinks::BusSink;
/// use rust_bus_logger::{BusSinkConfig, Fields, Sink};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> rust_bus_logger::Result<()> {
/// let broker = MemoryBroker::new();
/// let mut sink = BusSink::new(
///     BusSinkConfig::new("service-logs"),
///     broker.connector(),
///     tokio::runtime::Handle::current(),
/// );
/// sink.start()?;
///
/// sink.info("order placed", Fields::new().with("order_id", 42))?.await?;
/// sink.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct BusSink {
    config: BusSinkConfig,
    bridge: DeliveryBridge,
    scheduler: Handle,
}

impl BusSink {
    pub fn new(config: BusSinkConfig, connector: Connector, scheduler: Handle) -> Self {
        Self {
            config,
            bridge: DeliveryBridge::new(connector),
            scheduler,
        }
    }

    /// Use a pre-configured bridge (custom poll interval or close timeout)
    pub fn with_bridge(config: BusSinkConfig, bridge: DeliveryBridge, scheduler: Handle) -> Self {
        Self {
            config,
            bridge,
            scheduler,
        }
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    pub fn config(&self) -> &BusSinkConfig {
        &self.config
    }

    pub fn state(&self) -> BridgeState {
        self.bridge.state()
    }

    pub fn metrics(&self) -> &DeliveryMetrics {
        self.bridge.metrics()
    }

    /// Serialize `record` and publish it to the sink's topic
    pub fn publish_record(&self, record: &LogRecord) -> Result<DeliveryHandle> {
        self.bridge.publish(&self.config.topic, serialize(record))
    }

    /// Publish an arbitrary JSON value to the sink's topic
    pub fn send(&self, value: &Value) -> Result<DeliveryHandle> {
        let payload = serde_json::to_vec(value)?;
        self.bridge.publish(&self.config.topic, payload)
    }

    /// Publish `{level, message, ...fields}`. `level` and `message` win over
    /// fields of the same name.
    pub fn emit_fields(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        fields: Fields,
    ) -> Result<DeliveryHandle> {
        let mut payload: Map<String, Value> = fields
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json_value()))
            .collect();
        payload.insert("level".to_string(), Value::from(level.to_str()));
        payload.insert("message".to_string(), Value::String(message.into()));
        self.send(&Value::Object(payload))
    }

    pub fn debug(&self, message: impl Into<String>, fields: Fields) -> Result<DeliveryHandle> {
        self.emit_fields(LogLevel::Debug, message, fields)
    }

    pub fn info(&self, message: impl Into<String>, fields: Fields) -> Result<DeliveryHandle> {
        self.emit_fields(LogLevel::Info, message, fields)
    }

    pub fn warning(&self, message: impl Into<String>, fields: Fields) -> Result<DeliveryHandle> {
        self.emit_fields(LogLevel::Warning, message, fields)
    }

    pub fn error(&self, message: impl Into<String>, fields: Fields) -> Result<DeliveryHandle> {
        self.emit_fields(LogLevel::Error, message, fields)
    }

    pub fn critical(&self, message: impl Into<String>, fields: Fields) -> Result<DeliveryHandle> {
        self.emit_fields(LogLevel::Critical, message, fields)
    }
}

impl Sink for BusSink {
    fn start(&mut self) -> Result<()> {
        match self.bridge.state() {
            BridgeState::Running => Ok(()),
            BridgeState::Closed => Err(LoggerError::closed(format!("BusSink '{}'", self.config.topic))),
            BridgeState::Uninitialized => {
                self.bridge.initialize(&self.config.producer)?;
                self.bridge.start(self.scheduler.clone())
            }
            BridgeState::Initialized => self.bridge.start(self.scheduler.clone()),
        }
    }

    fn stop(&mut self) -> Result<()> {
        if self.bridge.state() == BridgeState::Running {
            self.bridge.close()?;
        }
        Ok(())
    }

    fn write(&mut self, record: &LogRecord) -> Result<()> {
        if !self.accepts(record.effective_level()) {
            return Ok(());
        }
        // fire-and-forget: failures surface as [LOGGER ERROR] diagnostics
        drop(self.publish_record(record)?);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "bus"
    }

    fn level(&self) -> LogLevel {
        self.config.level
    }
}

#[async_trait]
impl AsyncSink for BusSink {
    async fn deliver(&self, record: &LogRecord) -> Result<()> {
        if record.effective_level() < self.config.level {
            return Ok(());
        }
        self.publish_record(record)?.await
    }

    fn name(&self) -> &str {
        "bus"
    }
}
