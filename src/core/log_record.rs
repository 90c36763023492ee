//! Raw log record produced at the call site

use super::log_level::LogLevel;
use crate::serializer::ExceptionTrace;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

// Thread-local cache so repeated records on one thread don't re-format the id
thread_local! {
    static THREAD_NAME_CACHE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PROCESS_NAME: OnceLock<String> = OnceLock::new();

/// Name of the current thread, falling back to its id for unnamed threads
pub fn current_thread_name() -> String {
    THREAD_NAME_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| {
                let thread = std::thread::current();
                match thread.name() {
                    Some(name) => name.to_string(),
                    None => format!("{:?}", thread.id()),
                }
            })
            .clone()
    })
}

/// Executable stem of the running process, or `process-<pid>`
pub fn current_process_name() -> String {
    PROCESS_NAME
        .get_or_init(|| {
            std::env::current_exe()
                .ok()
                .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .unwrap_or_else(|| format!("process-{}", std::process::id()))
        })
        .clone()
}

/// Where a log call was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub module: String,
    /// Enclosing function; `None` for module-level code
    pub function: Option<String>,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32, module: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            module: module.into(),
            function: None,
        }
    }

    /// Location whose module is named after the source file: the file stem,
    /// or the directory name for a `mod.rs`
    pub fn at(file: impl Into<String>, line: u32) -> Self {
        let file = file.into();
        let module = module_of(&file);
        Self::new(file, line, module)
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }
}

fn module_of(file: &str) -> String {
    let path = Path::new(file);
    let named = match path.file_stem() {
        Some(stem) if stem == "mod" => path.parent().and_then(Path::file_name),
        stem => stem,
    };
    named
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "<unknown>".to_string())
}

/// A message value that may or may not encode cleanly as JSON.
///
/// Implemented for every `Serialize + Debug` type, so arbitrary caller data
/// can be logged; the serializer falls back to the `Debug` text when the
/// JSON encoding is rejected.
pub trait StructuredMessage: Send + Sync {
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;
    fn to_text(&self) -> String;
}

impl<T> StructuredMessage for T
where
    T: Serialize + fmt::Debug + Send + Sync,
{
    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn to_text(&self) -> String {
        format!("{:?}", self)
    }
}

/// The raw message of a record
#[derive(Clone)]
pub enum RecordMessage {
    /// Plain text; parsed as a structured literal during serialization
    Text(String),
    /// Already-structured JSON value
    Value(serde_json::Value),
    /// Arbitrary caller value encoded lazily
    Object(Arc<dyn StructuredMessage>),
}

impl RecordMessage {
    pub fn object<T: StructuredMessage + 'static>(value: T) -> Self {
        RecordMessage::Object(Arc::new(value))
    }

    /// Text representation used when structured encoding is not possible
    pub fn to_text(&self) -> String {
        match self {
            RecordMessage::Text(s) => s.clone(),
            RecordMessage::Value(v) => v.to_string(),
            RecordMessage::Object(o) => o.to_text(),
        }
    }
}

impl fmt::Debug for RecordMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordMessage::Text(s) => f.debug_tuple("Text").field(s).finish(),
            RecordMessage::Value(v) => f.debug_tuple("Value").field(v).finish(),
            RecordMessage::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl From<String> for RecordMessage {
    fn from(s: String) -> Self {
        RecordMessage::Text(s)
    }
}

impl From<&str> for RecordMessage {
    fn from(s: &str) -> Self {
        RecordMessage::Text(s.to_string())
    }
}

impl From<serde_json::Value> for RecordMessage {
    fn from(v: serde_json::Value) -> Self {
        RecordMessage::Value(v)
    }
}

/// One log event as captured at the call site
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: RecordMessage,
    pub location: Option<SourceLocation>,
    pub thread_name: String,
    pub process_name: String,
    pub exception: Option<ExceptionTrace>,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<RecordMessage>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            location: None,
            thread_name: current_thread_name(),
            process_name: current_process_name(),
            exception: None,
        }
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_exception(mut self, exception: ExceptionTrace) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Level used for threshold checks: EXCEPTION whenever an exception is attached
    pub fn effective_level(&self) -> LogLevel {
        if self.exception.is_some() {
            LogLevel::Exception
        } else {
            self.level
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_named_after_file() {
        assert_eq!(SourceLocation::at("src/sinks/file.rs", 3).module, "file");
        assert_eq!(SourceLocation::at("src/bridge/mod.rs", 3).module, "bridge");
        assert_eq!(SourceLocation::at("main.rs", 1).module, "main");
        assert!(SourceLocation::at("src/x.rs", 1).function.is_none());
    }

    #[test]
    fn test_thread_name_of_named_thread() {
        let name = std::thread::Builder::new()
            .name("worker-7".into())
            .spawn(current_thread_name)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(name, "worker-7");
    }

    #[test]
    fn test_unnamed_thread_falls_back_to_id() {
        let name = std::thread::spawn(current_thread_name).join().unwrap();
        assert!(name.starts_with("ThreadId("));
    }

    #[test]
    fn test_process_name_is_stable() {
        assert!(!current_process_name().is_empty());
        assert_eq!(current_process_name(), current_process_name());
    }

    #[test]
    fn test_effective_level_with_exception() {
        let record = LogRecord::new(LogLevel::Info, "boom");
        assert_eq!(record.effective_level(), LogLevel::Info);
        let record = record.with_exception(ExceptionTrace::new("IoError", "boom"));
        assert_eq!(record.effective_level(), LogLevel::Exception);
    }

    #[test]
    fn test_object_message_text() {
        let message = RecordMessage::object(vec![1, 2]);
        assert_eq!(message.to_text(), "[1, 2]");
        assert!(format!("{:?}", message).contains("Object"));
    }
}
