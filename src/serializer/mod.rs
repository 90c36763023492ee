//! Record serialization
//!
//! [`serialize`] turns one [`LogRecord`] into the canonical wire payload:
//! a UTF-8 JSON object with exactly the keys `timestamp`, `level`,
//! `message`, `place`, `thread_name` and `process_name`.
//!
//! Serialization is total. A message that cannot be encoded as JSON is sent
//! as its text form; if encoding still fails (or a caller's `Serialize`
//! impl panics) a last-resort payload with the same keys carries the
//! failure description in `message`.

pub mod exception;
pub mod literal;

pub use exception::{panic_message, CaptureOrigin, ExceptionTrace, TraceFrame};

use crate::core::{LogLevel, LogRecord, RecordMessage, Result, SourceLocation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

/// Canonical structured form of one log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub level: LogLevel,
    /// Structured value, plain text, or a rendered exception trace
    pub message: Value,
    /// `path:function:line`
    pub place: String,
    pub thread_name: String,
    pub process_name: String,
}

impl SerializedEvent {
    /// Decode a wire payload
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Serialize a record to its wire payload. Never panics, never fails.
pub fn serialize(record: &LogRecord) -> Vec<u8> {
    let failure = match catch_unwind(AssertUnwindSafe(|| encode(record))) {
        Ok(Ok(payload)) => return payload,
        Ok(Err(e)) => e.to_string(),
        Err(payload) => format!("panic while serializing: {}", panic_message(payload.as_ref())),
    };
    eprintln!("[LOGGER ERROR] Record serialization failed, sending fallback payload: {}", failure);
    last_resort(record, &failure)
}

/// [`serialize`] as a `String`, for line-oriented sinks
pub fn serialize_to_string(record: &LogRecord) -> String {
    String::from_utf8_lossy(&serialize(record)).into_owned()
}

/// `relative/path.rs:function:line`; module-level code reports the module name
pub fn place(location: Option<&SourceLocation>) -> String {
    let Some(location) = location else {
        return "unknown:unknown:0".to_string();
    };
    let path = Path::new(&location.file);
    let relative = std::env::current_dir()
        .ok()
        .filter(|_| path.is_absolute())
        .and_then(|cwd| pathdiff::diff_paths(path, cwd))
        .unwrap_or_else(|| path.to_path_buf());
    let function = location
        .function
        .as_deref()
        .filter(|f| !f.is_empty() && *f != "<module>")
        .unwrap_or(&location.module);
    format!("{}:{}:{}", relative.display(), function, location.line)
}

fn encode(record: &LogRecord) -> serde_json::Result<Vec<u8>> {
    let (level, message) = match &record.exception {
        Some(trace) => (LogLevel::Exception, Ok(Value::String(trace.render()))),
        None => (record.level, structured_message(&record.message)),
    };

    let mut event = SerializedEvent {
        timestamp: epoch_seconds(record),
        level,
        message: Value::Null,
        place: place(record.location.as_ref()),
        thread_name: record.thread_name.clone(),
        process_name: record.process_name.clone(),
    };

    match message {
        Ok(value) => event.message = value,
        Err(Degraded { reason, text }) => {
            eprintln!("[LOGGER WARNING] Message is not JSON-encodable ({}); sending it as text", reason);
            event.message = Value::String(text);
        }
    }
    serde_json::to_vec(&event)
}

struct Degraded {
    reason: String,
    text: String,
}

/// Resolve the message into JSON, or report the text it should degrade to
fn structured_message(message: &RecordMessage) -> std::result::Result<Value, Degraded> {
    match message {
        RecordMessage::Text(text) => match literal::parse_structured(text) {
            Some(parsed) => parsed.to_json().map_err(|e| Degraded {
                reason: e.to_string(),
                text: parsed.to_string(),
            }),
            None => Ok(Value::String(text.clone())),
        },
        RecordMessage::Value(value) => Ok(value.clone()),
        RecordMessage::Object(object) => object.to_json().map_err(|e| Degraded {
            reason: e.to_string(),
            text: object.to_text(),
        }),
    }
}

fn epoch_seconds(record: &LogRecord) -> f64 {
    record.timestamp.timestamp_micros() as f64 / 1_000_000.0
}

/// Payload built only from plain record data plus the failure description
fn last_resort(record: &LogRecord, failure: &str) -> Vec<u8> {
    let mut message = failure.to_string();
    if let Some(trace) = &record.exception {
        message.push('\n');
        message.push_str(&trace.render());
    }
    let level = if record.exception.is_some() {
        LogLevel::Exception
    } else {
        record.level
    };
    let payload = serde_json::json!({
        "timestamp": epoch_seconds(record),
        "level": level.to_str(),
        "message": message,
        "place": place(record.location.as_ref()),
        "thread_name": record.thread_name,
        "process_name": record.process_name,
    });
    serde_json::to_vec(&payload).unwrap_or_else(|_| {
        br#"{"timestamp":0.0,"level":"ERROR","message":"serialization failed","place":"unknown:unknown:0","thread_name":"","process_name":""}"#.to_vec()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SourceLocation;
    use serde::Serializer;
    use serde_json::json;
    use std::collections::HashMap;

    fn decode(payload: &[u8]) -> SerializedEvent {
        SerializedEvent::from_slice(payload).expect("payload should decode")
    }

    fn fixed_keys(payload: &[u8]) -> Vec<String> {
        let value: Value = serde_json::from_slice(payload).unwrap();
        let mut keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    const KEYS: [&str; 6] = ["level", "message", "place", "process_name", "thread_name", "timestamp"];

    #[test]
    fn test_tuple_text_becomes_array() {
        let record = LogRecord::new(LogLevel::Info, "(1, 2, 3)");
        let event = decode(&serialize(&record));
        assert_eq!(event.message, json!([1, 2, 3]));
        assert_eq!(event.level, LogLevel::Info);
    }

    #[test]
    fn test_plain_text_stays_text() {
        let event = decode(&serialize(&LogRecord::new(LogLevel::Debug, "user logged in")));
        assert_eq!(event.message, json!("user logged in"));

        let event = decode(&serialize(&LogRecord::new(LogLevel::Debug, "42")));
        assert_eq!(event.message, json!("42"));
    }

    #[test]
    fn test_exact_wire_keys() {
        let payload = serialize(&LogRecord::new(LogLevel::Warning, "{'a': 1}"));
        assert_eq!(fixed_keys(&payload), KEYS);
        assert!(std::str::from_utf8(&payload).is_ok());
    }

    #[test]
    fn test_exception_overrides_level_and_message() {
        let record = LogRecord::new(LogLevel::Debug, "ignored")
            .with_exception(ExceptionTrace::new("ValueError", "bad input"));
        let event = decode(&serialize(&record));
        assert_eq!(event.level, LogLevel::Exception);
        let message = event.message.as_str().unwrap();
        assert!(message.starts_with("Traceback (most recent call last):"));
        assert!(message.ends_with("ValueError: bad input"));
    }

    #[test]
    fn test_unencodable_literal_degrades_to_text() {
        let record = LogRecord::new(LogLevel::Info, "{(1, 2): 'pair'}");
        let event = decode(&serialize(&record));
        assert_eq!(event.message, json!("{(1, 2): 'pair'}"));
    }

    #[test]
    fn test_unencodable_object_degrades_to_debug_text() {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");
        let record = LogRecord::new(LogLevel::Info, RecordMessage::object(map));
        let event = decode(&serialize(&record));
        assert_eq!(event.message, json!("{(1, 2): \"pair\"}"));
    }

    #[derive(Debug)]
    struct Exploding;

    impl Serialize for Exploding {
        fn serialize<S: Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
            panic!("exploding serializer")
        }
    }

    #[test]
    fn test_panicking_message_uses_last_resort_payload() {
        let record = LogRecord::new(LogLevel::Error, RecordMessage::object(Exploding))
            .with_location(SourceLocation::new("src/x.rs", 9, "x"));
        let payload = serialize(&record);
        assert_eq!(fixed_keys(&payload), KEYS);

        let event = decode(&payload);
        assert_eq!(event.level, LogLevel::Error);
        assert_eq!(event.place, "src/x.rs:x:9");
        assert!(event.message.as_str().unwrap().contains("exploding serializer"));
    }

    #[test]
    fn test_last_resort_carries_exception_chain() {
        let record = LogRecord::new(LogLevel::Info, "x")
            .with_exception(ExceptionTrace::new("IoError", "disk gone").with_cause("EIO"));
        let event = decode(&last_resort(&record, "encoder failed"));
        assert_eq!(event.level, LogLevel::Exception);
        let message = event.message.as_str().unwrap();
        assert!(message.starts_with("encoder failed\n"));
        assert!(message.contains("EIO"));
        assert!(message.ends_with("IoError: disk gone"));
    }

    #[test]
    fn test_place_uses_module_for_top_level_code() {
        let location = SourceLocation::new("src/main.rs", 12, "app");
        assert_eq!(place(Some(&location)), "src/main.rs:app:12");

        let location = SourceLocation::new("src/main.rs", 12, "app").with_function("<module>");
        assert_eq!(place(Some(&location)), "src/main.rs:app:12");

        let location = SourceLocation::new("src/main.rs", 12, "app").with_function("run");
        assert_eq!(place(Some(&location)), "src/main.rs:run:12");

        assert_eq!(place(None), "unknown:unknown:0");
    }

    #[test]
    fn test_place_is_relative_to_working_directory() {
        let cwd = std::env::current_dir().unwrap();
        let absolute = cwd.join("src").join("lib.rs");
        let location = SourceLocation::new(absolute.to_string_lossy(), 1, "lib").with_function("f");
        let expected = format!("{}:f:1", Path::new("src").join("lib.rs").display());
        assert_eq!(place(Some(&location)), expected);
    }

    #[test]
    fn test_place_outside_working_directory_walks_up() {
        let cwd = std::env::current_dir().unwrap();
        let Some(parent) = cwd.parent() else { return };
        let sibling = parent.join("vendored").join("lib.rs");
        let location = SourceLocation::new(sibling.to_string_lossy(), 4, "lib").with_function("g");
        let expected = format!("{}:g:4", Path::new("..").join("vendored").join("lib.rs").display());
        assert_eq!(place(Some(&location)), expected);
    }

    #[test]
    fn test_timestamp_is_epoch_seconds() {
        let ts = chrono::DateTime::from_timestamp(1_700_000_000, 500_000_000).unwrap();
        let record = LogRecord::new(LogLevel::Info, "t").with_timestamp(ts);
        let event = decode(&serialize(&record));
        assert!((event.timestamp - 1_700_000_000.5).abs() < 1e-6);
    }
}
