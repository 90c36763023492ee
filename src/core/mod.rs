//! Core logger types and traits

pub mod async_sink;
pub mod config;
pub mod error;
pub mod fields;
pub mod log_level;
pub mod log_record;
pub mod logger;
pub mod metrics;
pub mod sink;

pub use async_sink::AsyncSink;
pub use config::{Acks, BusSinkConfig, ClientSettings, Compression, ProducerConfig};
pub use error::{LoggerError, Result};
pub use fields::{FieldValue, Fields};
pub use log_level::LogLevel;
pub use log_record::{
    current_process_name, current_thread_name, LogRecord, RecordMessage, SourceLocation,
    StructuredMessage,
};
pub use logger::{Logger, LoggerBuilder};
pub use metrics::DeliveryMetrics;
pub use sink::Sink;
