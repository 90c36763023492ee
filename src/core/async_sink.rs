//! Async sink trait for sinks whose writes complete later

use super::{error::Result, log_record::LogRecord};
use async_trait::async_trait;

/// Sink whose delivery can be awaited
///
/// # Example
///
/// ```no_run
/// use rust_bus_logger::core::{AsyncSink, LogRecord, Result};
/// use async_trait::async_trait;
///
/// struct Discard;
///
/// #[async_trait]
/// impl AsyncSink for Discard {
///     async fn deliver(&self, _record: &LogRecord) -> Result<()> {
///         Ok(())
///     }
///
///     fn name(&self) -> &str {
///         "discard"
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncSink: Send + Sync {
    /// Write one record and wait until its destination confirmed it
    async fn deliver(&self, record: &LogRecord) -> Result<()>;

    fn name(&self) -> &str;
}
