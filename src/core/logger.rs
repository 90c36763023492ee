//! Main logger implementation
//!
//! The logger owns its sinks. A sink is started when it is added and
//! stopped when the logger shuts down or is dropped, so every acquired
//! resource has exactly one release.
//!
//! The level methods locate the call through `#[track_caller]`, which sees
//! the file and line but not the enclosing function; their `place` reports
//! the module instead. The [macros](crate::macros) record the function too.

use super::{
    error::Result,
    log_level::LogLevel,
    log_record::{LogRecord, RecordMessage, SourceLocation},
    sink::Sink,
};
use crate::serializer::{panic_message, CaptureOrigin, ExceptionTrace};
use parking_lot::{Mutex, RwLock};
use std::error::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub struct Logger {
    min_level: RwLock<LogLevel>,
    sinks: Mutex<Vec<Box<dyn Sink>>>,
}

impl Logger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_level: RwLock::new(LogLevel::Debug),
            sinks: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::new()
    }

    /// Start `sink` and take ownership of it. A sink that fails to start
    /// is not added.
    pub fn add_sink(&self, mut sink: Box<dyn Sink>) -> Result<()> {
        sink.start()?;
        self.sinks.lock().push(sink);
        Ok(())
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn set_min_level(&self, level: LogLevel) {
        *self.min_level.write() = level;
    }

    pub fn min_level(&self) -> LogLevel {
        *self.min_level.read()
    }

    /// Dispatch a fully built record to every sink whose threshold allows it
    pub fn log(&self, record: LogRecord) {
        if record.effective_level() < self.min_level() {
            return;
        }
        let mut sinks = self.sinks.lock();
        Self::dispatch(&mut sinks, &record);
    }

    /// Per-sink panic isolation: one failing sink never stops the others
    fn dispatch(sinks: &mut [Box<dyn Sink>], record: &LogRecord) {
        let level = record.effective_level();
        for sink in sinks.iter_mut().filter(|sink| sink.accepts(level)) {
            match catch_unwind(AssertUnwindSafe(|| sink.write(record))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    eprintln!("[LOGGER ERROR] Sink '{}' failed: {}", sink.name(), e);
                }
                Err(panic) => {
                    eprintln!(
                        "[LOGGER CRITICAL] Sink '{}' panicked: {}. \
                         Other sinks continue to function.",
                        sink.name(),
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
    }

    #[track_caller]
    pub fn log_at(&self, level: LogLevel, message: impl Into<RecordMessage>) {
        let location = caller_location();
        self.log(LogRecord::new(level, message).with_location(location));
    }

    #[track_caller]
    #[inline]
    pub fn debug(&self, message: impl Into<RecordMessage>) {
        self.log_at(LogLevel::Debug, message);
    }

    #[track_caller]
    #[inline]
    pub fn info(&self, message: impl Into<RecordMessage>) {
        self.log_at(LogLevel::Info, message);
    }

    #[track_caller]
    #[inline]
    pub fn warning(&self, message: impl Into<RecordMessage>) {
        self.log_at(LogLevel::Warning, message);
    }

    #[track_caller]
    #[inline]
    pub fn error(&self, message: impl Into<RecordMessage>) {
        self.log_at(LogLevel::Error, message);
    }

    #[track_caller]
    #[inline]
    pub fn critical(&self, message: impl Into<RecordMessage>) {
        self.log_at(LogLevel::Critical, message);
    }

    /// Log `err` with its rendered trace; the record's level becomes EXCEPTION.
    ///
    /// Only the file and line are known here; use
    /// [`exception!`](crate::exception) to also record the enclosing function.
    #[track_caller]
    pub fn exception<E: Error + 'static>(&self, err: &E, origin: CaptureOrigin) {
        self.exception_at(err, origin, caller_location());
    }

    pub fn exception_at<E: Error + 'static>(
        &self,
        err: &E,
        origin: CaptureOrigin,
        location: SourceLocation,
    ) {
        let record = LogRecord::new(LogLevel::Error, err.to_string())
            .with_location(location)
            .with_exception(ExceptionTrace::from_error(err, origin));
        self.log(record);
    }

    /// Run `f`, logging a returned error or a panic as an exception captured
    /// at a wrapping call site. Returns `None` when something was logged.
    #[track_caller]
    pub fn catch<T, E, F>(&self, f: F) -> Option<T>
    where
        E: Error + 'static,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        self.catch_at(caller_location(), f)
    }

    pub fn catch_at<T, E, F>(&self, location: SourceLocation, f: F) -> Option<T>
    where
        E: Error + 'static,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let trace = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(err)) => ExceptionTrace::from_error(&err, CaptureOrigin::Wrapped),
            Err(payload) => ExceptionTrace::from_panic(payload.as_ref(), CaptureOrigin::Wrapped),
        };
        let record = LogRecord::new(LogLevel::Error, trace.value.clone())
            .with_location(location)
            .with_exception(trace);
        self.log(record);
        None
    }

    pub fn flush(&self) -> Result<()> {
        let mut sinks = self.sinks.lock();
        for sink in sinks.iter_mut() {
            sink.flush()?;
        }
        Ok(())
    }

    /// Flush and stop every sink, releasing their resources.
    ///
    /// Returns `false` if any sink failed to stop cleanly. Sinks are removed
    /// either way.
    pub fn shutdown(&self) -> bool {
        let sinks: Vec<Box<dyn Sink>> = std::mem::take(&mut *self.sinks.lock());
        let mut clean = true;
        for mut sink in sinks {
            if let Err(e) = sink.flush() {
                eprintln!("[LOGGER ERROR] Failed to flush '{}' during shutdown: {}", sink.name(), e);
            }
            if let Err(e) = sink.stop() {
                eprintln!("[LOGGER ERROR] Failed to stop '{}': {}", sink.name(), e);
                clean = false;
            }
        }
        clean
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[track_caller]
fn caller_location() -> SourceLocation {
    let caller = std::panic::Location::caller();
    SourceLocation::at(caller.file(), caller.line())
}

/// Builder for constructing Logger with a fluent API
///
/// # Example
/// ```
/// use rust_bus_logger::prelude::*;
///
/// let logger = Logger::builder()
///     .min_level(LogLevel::Info)
///     .sink(ConsoleSink::new())
///     .build()
///     .expect("console sink starts");
/// logger.info("ready");
/// ```
pub struct LoggerBuilder {
    min_level: LogLevel,
    sinks: Vec<Box<dyn Sink>>,
}

impl LoggerBuilder {
    pub fn new() -> Self {
        Self {
            min_level: LogLevel::Debug,
            sinks: Vec::new(),
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn sink<S: Sink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Start every sink; the first start failure aborts the build and stops
    /// the sinks already started
    pub fn build(self) -> Result<Logger> {
        let logger = Logger::new();
        logger.set_min_level(self.min_level);
        for sink in self.sinks {
            logger.add_sink(sink)?;
        }
        Ok(logger)
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LoggerError;
    use std::sync::Arc;

    #[derive(Default)]
    struct Journal {
        written: Mutex<Vec<(LogLevel, String)>>,
        started: Mutex<u32>,
        stopped: Mutex<u32>,
    }

    struct RecordingSink {
        level: LogLevel,
        journal: Arc<Journal>,
        panic_on_write: bool,
    }

    impl RecordingSink {
        fn new(level: LogLevel, journal: &Arc<Journal>) -> Self {
            Self {
                level,
                journal: Arc::clone(journal),
                panic_on_write: false,
            }
        }
    }

    impl Sink for RecordingSink {
        fn start(&mut self) -> Result<()> {
            *self.journal.started.lock() += 1;
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            *self.journal.stopped.lock() += 1;
            Ok(())
        }

        fn write(&mut self, record: &LogRecord) -> Result<()> {
            if self.panic_on_write {
                panic!("sink exploded");
            }
            self.journal
                .written
                .lock()
                .push((record.effective_level(), record.message.to_text()));
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }

        fn level(&self) -> LogLevel {
            self.level
        }
    }

    struct Unstartable;

    impl Sink for Unstartable {
        fn start(&mut self) -> Result<()> {
            Err(LoggerError::config("Unstartable", "no resource"))
        }
        fn stop(&mut self) -> Result<()> {
            Ok(())
        }
        fn write(&mut self, _record: &LogRecord) -> Result<()> {
            Ok(())
        }
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
        fn name(&self) -> &str {
            "unstartable"
        }
        fn level(&self) -> LogLevel {
            LogLevel::Debug
        }
    }

    #[test]
    fn test_add_sink_starts_and_shutdown_stops() {
        let journal = Arc::new(Journal::default());
        let logger = Logger::new();
        logger
            .add_sink(Box::new(RecordingSink::new(LogLevel::Debug, &journal)))
            .unwrap();
        assert_eq!(*journal.started.lock(), 1);

        assert!(logger.shutdown());
        assert_eq!(*journal.stopped.lock(), 1);
        assert_eq!(logger.sink_count(), 0);

        drop(logger);
        assert_eq!(*journal.stopped.lock(), 1, "drop after shutdown releases nothing twice");
    }

    #[test]
    fn test_drop_stops_sinks() {
        let journal = Arc::new(Journal::default());
        {
            let logger = Logger::new();
            logger
                .add_sink(Box::new(RecordingSink::new(LogLevel::Debug, &journal)))
                .unwrap();
        }
        assert_eq!(*journal.stopped.lock(), 1);
    }

    #[test]
    fn test_failed_start_is_not_added() {
        let logger = Logger::new();
        assert!(logger.add_sink(Box::new(Unstartable)).is_err());
        assert_eq!(logger.sink_count(), 0);
    }

    #[test]
    fn test_per_sink_threshold() {
        let journal = Arc::new(Journal::default());
        let logger = Logger::new();
        logger
            .add_sink(Box::new(RecordingSink::new(LogLevel::Warning, &journal)))
            .unwrap();

        logger.debug("hidden");
        logger.info("hidden");
        logger.warning("shown");
        logger.critical("shown too");

        let written = journal.written.lock();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], (LogLevel::Warning, "shown".to_string()));
    }

    #[test]
    fn test_global_min_level() {
        let journal = Arc::new(Journal::default());
        let logger = Logger::builder()
            .min_level(LogLevel::Error)
            .sink(RecordingSink::new(LogLevel::Debug, &journal))
            .build()
            .unwrap();

        logger.warning("hidden");
        logger.error("shown");
        assert_eq!(journal.written.lock().len(), 1);
    }

    #[test]
    fn test_panicking_sink_is_isolated() {
        let journal = Arc::new(Journal::default());
        let logger = Logger::new();
        let mut bad = RecordingSink::new(LogLevel::Debug, &Arc::new(Journal::default()));
        bad.panic_on_write = true;
        logger.add_sink(Box::new(bad)).unwrap();
        logger
            .add_sink(Box::new(RecordingSink::new(LogLevel::Debug, &journal)))
            .unwrap();

        logger.info("still delivered");
        assert_eq!(journal.written.lock().len(), 1);
    }

    #[test]
    fn test_catch_logs_error_as_exception() {
        let journal = Arc::new(Journal::default());
        let logger = Logger::new();
        logger
            .add_sink(Box::new(RecordingSink::new(LogLevel::Error, &journal)))
            .unwrap();

        let parsed: Option<i32> = logger.catch(|| "x".parse::<i32>());
        assert!(parsed.is_none());
        let ok = logger.catch(|| "5".parse::<i32>());
        assert_eq!(ok, Some(5));

        let written = journal.written.lock();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, LogLevel::Exception);
    }

    #[test]
    fn test_catch_logs_panics() {
        let journal = Arc::new(Journal::default());
        let logger = Logger::new();
        logger
            .add_sink(Box::new(RecordingSink::new(LogLevel::Debug, &journal)))
            .unwrap();

        let result: Option<()> = logger.catch(|| -> std::result::Result<(), std::io::Error> {
            panic!("division by zero")
        });
        assert!(result.is_none());
        let written = journal.written.lock();
        assert_eq!(written[0], (LogLevel::Exception, "division by zero".to_string()));
    }

    #[test]
    fn test_caller_location_points_here() {
        let location = caller_location();
        assert!(location.file.ends_with("logger.rs"));
        assert_eq!(location.module, "logger");
    }
}
