//! # Rust Bus Logger
//!
//! Structured multi-sink logging with console, rotating file and
//! message-bus sinks.
//!
//! ## Features
//!
//! - **Total serialization**: every record becomes a well-formed JSON payload
//!   with fixed keys, whatever its message or exception contains
//! - **Delivery bridge**: callback-driven publish clients become awaitable
//!   [`DeliveryHandle`](bridge::DeliveryHandle)s
//! - **Multiple sinks**: console, hourly-rotated compressed files, message bus
//! - **Exception traces**: errors and panics rendered with frames, source
//!   statements and cause chains

pub mod bridge;
pub mod core;
pub mod macros;
pub mod serializer;
pub mod sinks;

pub mod prelude {
    pub use crate::bridge::{BridgeState, DeliveryBridge, DeliveryHandle, PublishClient};
    pub use crate::core::{
        AsyncSink, BusSinkConfig, ClientSettings, FieldValue, Fields, LogLevel, LogRecord, Logger,
        LoggerBuilder, LoggerError, ProducerConfig, RecordMessage, Result, Sink, SourceLocation,
    };
    pub use crate::serializer::{serialize, CaptureOrigin, ExceptionTrace, SerializedEvent};
    pub use crate::sinks::BusSink;
    #[cfg(feature = "console")]
    pub use crate::sinks::{ConsoleFormat, ConsoleSink};
    #[cfg(feature = "file")]
    pub use crate::sinks::FileSink;
}

pub use bridge::{BridgeState, DeliveryBridge, DeliveryHandle};
pub use self::core::{
    Acks, AsyncSink, BusSinkConfig, ClientSettings, Compression, DeliveryMetrics, FieldValue,
    Fields, LogLevel, LogRecord, Logger, LoggerBuilder, LoggerError, ProducerConfig,
    RecordMessage, Result, Sink, SourceLocation,
};
pub use serializer::{serialize, CaptureOrigin, ExceptionTrace, SerializedEvent, TraceFrame};
