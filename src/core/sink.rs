//! Sink trait for log output destinations

use super::{error::Result, log_level::LogLevel, log_record::LogRecord};

/// A logging backend.
///
/// `start` acquires the sink's underlying resource (stream, file, producer)
/// and `stop` releases it. `stop` must be idempotent; writing to a sink that
/// is not started is an error.
pub trait Sink: Send + Sync {
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn write(&mut self, record: &LogRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn name(&self) -> &str;

    /// Records below this level are dropped before serialization
    fn level(&self) -> LogLevel;

    fn accepts(&self, level: LogLevel) -> bool {
        level >= self.level()
    }

    /// Build a record at `level` and write it if the threshold allows
    fn emit(&mut self, level: LogLevel, message: &str) -> Result<()>
    where
        Self: Sized,
    {
        if !self.accepts(level) {
            return Ok(());
        }
        self.write(&LogRecord::new(level, message))
    }
}
