//! Exception capture and deterministic trace rendering
//!
//! An [`ExceptionTrace`] holds the error's type name, its display value, the
//! frame chain (outermost first) and any `source()` causes. Rendering
//! produces a multi-line block in the familiar "most recent call last" shape:
//!
//! ```text
//! Traceback (most recent call last):
//!
//!   File "src/orders.rs", line 96, in orders::apply
//!     let total = order.items[0].price * qty;
//!     -> total = <unresolved>
//!     -> order = {"items":[{"price":3}]}
//!     -> order.items = [{"price":3}]
//!     -> order.items[0] = {"price":3}
//!     -> order.items[0].price = 3
//!     -> qty = <unresolved>
//!
//! ParseError: quantity missing
//! ```

use serde_json::Value;
use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Write as _;
use std::panic::{catch_unwind, AssertUnwindSafe};

const MAX_REPR_CHARS: usize = 80;
const UNRESOLVED: &str = "<unresolved>";

/// Prefixes of symbols that belong to the runtime rather than to user code
const RUNTIME_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "backtrace::",
    "__rust",
    "rust_begin_unwind",
    "<std::",
    "<core::",
    "<alloc::",
];

const CAPTURE_MODULE: &str = "rust_bus_logger::serializer::exception";
const LOGGER_MODULE: &str = "rust_bus_logger::core::logger";
const CRATE_PREFIX: &str = "rust_bus_logger::";

/// How an exception reached the capture entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureOrigin {
    /// Captured where the error surfaced
    #[default]
    Direct,
    /// Captured by a wrapping call site (e.g. [`Logger::catch`](crate::Logger::catch));
    /// the wrapper's own frame is left out of the chain
    Wrapped,
}

/// One frame of the call chain
#[derive(Debug, Clone, PartialEq)]
pub struct TraceFrame {
    pub file: String,
    pub line: u32,
    pub function: String,
    /// Source statement executing in this frame
    pub statement: Option<String>,
    /// Snapshot of local values; `None` when no snapshot was taken
    pub locals: Option<BTreeMap<String, Value>>,
}

impl TraceFrame {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
            statement: None,
            locals: None,
        }
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    /// Record a local variable's value
    pub fn with_local(mut self, name: impl Into<String>, value: Value) -> Self {
        self.locals
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value);
        self
    }
}

/// Captured exception context
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionTrace {
    pub type_name: String,
    pub value: String,
    /// Call chain, outermost first
    pub frames: Vec<TraceFrame>,
    /// `source()` chain, nearest cause first
    pub causes: Vec<String>,
    pub origin: CaptureOrigin,
}

impl ExceptionTrace {
    pub fn new(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value: value.into(),
            frames: Vec::new(),
            causes: Vec::new(),
            origin: CaptureOrigin::Direct,
        }
    }

    /// Build a trace from an explicit frame chain. With [`CaptureOrigin::Wrapped`]
    /// the first frame is the wrapper's and is dropped.
    pub fn capture(
        type_name: impl Into<String>,
        value: impl Into<String>,
        frames: Vec<TraceFrame>,
        origin: CaptureOrigin,
    ) -> Self {
        let skip = usize::from(origin == CaptureOrigin::Wrapped);
        Self {
            frames: frames.into_iter().skip(skip).collect(),
            origin,
            ..Self::new(type_name, value)
        }
    }

    pub fn with_frame(mut self, frame: TraceFrame) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Capture a Rust error together with its source chain and a best-effort
    /// backtrace of the current thread.
    pub fn from_error<E: Error + 'static>(err: &E, origin: CaptureOrigin) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            type_name: short_type_name(std::any::type_name::<E>()),
            value: err.to_string(),
            frames: backtrace_frames(&Backtrace::force_capture().to_string(), origin),
            causes,
            origin,
        }
    }

    /// Capture a panic payload as returned by `catch_unwind`
    pub fn from_panic(payload: &(dyn Any + Send), origin: CaptureOrigin) -> Self {
        Self {
            frames: backtrace_frames(&Backtrace::force_capture().to_string(), origin),
            origin,
            ..Self::new("panic", panic_message(payload))
        }
    }

    /// Render the trace. Never panics; an internal failure yields a short
    /// description that still names the original exception.
    pub fn render(&self) -> String {
        match catch_unwind(AssertUnwindSafe(|| self.render_inner())) {
            Ok(text) => text,
            Err(payload) => format!(
                "can't render exception: {}, main_exception: {}: {}",
                panic_message(payload.as_ref()),
                self.type_name,
                self.value
            ),
        }
    }

    fn render_inner(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        for frame in &self.frames {
            let _ = write!(
                out,
                "\n  File \"{}\", line {}, in {}\n",
                frame.file, frame.line, frame.function
            );
            if let Some(statement) = &frame.statement {
                let _ = writeln!(out, "    {}", statement.trim());
                if let Some(locals) = &frame.locals {
                    for (path, repr) in annotate(statement, locals) {
                        let _ = writeln!(out, "    -> {} = {}", path, repr);
                    }
                }
            }
        }
        if !self.causes.is_empty() {
            out.push_str("\nCaused by:\n");
            for (i, cause) in self.causes.iter().enumerate() {
                let _ = writeln!(out, "  {}: {}", i, cause);
            }
        }
        let _ = write!(out, "\n{}: {}", self.type_name, self.value);
        out
    }
}

/// Message carried by a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// `my_crate::errors::ParseError<T>` -> `ParseError`
fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Strip the trailing `::h0123456789abcdef` symbol hash
fn strip_hash(symbol: &str) -> &str {
    match symbol.rsplit_once("::h") {
        Some((head, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            head
        }
        _ => symbol,
    }
}

fn is_runtime_frame(function: &str) -> bool {
    RUNTIME_PREFIXES.iter().any(|p| function.starts_with(p))
}

/// Parse a rendered `std::backtrace::Backtrace` into frames, outermost first.
/// Runtime frames, the capture machinery and the logger entry points are
/// dropped; for wrapped captures every frame of this crate (the wrapper) is
/// dropped as well.
fn backtrace_frames(rendered: &str, origin: CaptureOrigin) -> Vec<TraceFrame> {
    let mut parsed: Vec<(String, Option<(String, u32)>)> = Vec::new();
    for line in rendered.lines() {
        let trimmed = line.trim_start();
        if let Some(location) = trimmed.strip_prefix("at ") {
            if let Some((_, slot)) = parsed.last_mut().filter(|(_, slot)| slot.is_none()) {
                let mut parts = location.rsplitn(3, ':');
                let _column = parts.next();
                let line_no = parts.next().and_then(|l| l.parse::<u32>().ok());
                if let (Some(line_no), Some(file)) = (line_no, parts.next()) {
                    *slot = Some((file.to_string(), line_no));
                }
            }
        } else if let Some((index, symbol)) = trimmed.split_once(": ") {
            if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                parsed.push((strip_hash(symbol).to_string(), None));
            }
        }
    }

    let mut frames: Vec<TraceFrame> = parsed
        .into_iter()
        .filter_map(|(function, location)| {
            let (file, line) = location?;
            if is_runtime_frame(&function)
                || function.starts_with(CAPTURE_MODULE)
                || function.starts_with(LOGGER_MODULE)
            {
                return None;
            }
            if origin == CaptureOrigin::Wrapped && function.starts_with(CRATE_PREFIX) {
                return None;
            }
            let mut frame = TraceFrame::new(file, line, function);
            frame.statement = source_line(&frame.file, line);
            Some(frame)
        })
        .collect();
    frames.reverse();
    frames
}

fn source_line(file: &str, line: u32) -> Option<String> {
    let index = usize::try_from(line).ok()?.checked_sub(1)?;
    let text = std::fs::read_to_string(file).ok()?;
    text.lines()
        .nth(index)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn short_repr(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= MAX_REPR_CHARS {
        text
    } else {
        let head: String = text.chars().take(MAX_REPR_CHARS - 3).collect();
        format!("{}...", head)
    }
}

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "else", "enum", "false",
    "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "static", "struct", "super", "trait", "true", "type", "unsafe", "use", "where",
    "while", "None", "True", "False", "and", "or", "not", "is",
];

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Field(String),
    Index(String),
}

/// Access chains referenced by a statement, e.g. `order.items[0].price`
fn access_chains(statement: &str) -> Vec<(String, Vec<Segment>)> {
    let chars: Vec<char> = statement.chars().collect();
    let mut chains = Vec::new();
    let mut i = 0;

    let ident_at = |start: usize| -> usize {
        let mut end = start;
        while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        end
    };

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i += 1;
            continue;
        }
        let starts_ident = (c.is_alphabetic() || c == '_')
            && (i == 0 || !(chars[i - 1].is_alphanumeric() || chars[i - 1] == '_' || chars[i - 1] == '.'));
        if !starts_ident {
            i += 1;
            continue;
        }

        let end = ident_at(i);
        let root: String = chars[i..end].iter().collect();
        let preceded_by_path = i >= 2 && chars[i - 1] == ':' && chars[i - 2] == ':';
        i = end;

        let next = chars.get(i).copied();
        let is_path = next == Some(':') && chars.get(i + 1) == Some(&':');
        let is_call = matches!(next, Some('(' | '!'));
        if KEYWORDS.contains(&root.as_str()) || preceded_by_path || is_path || is_call {
            continue;
        }

        let mut segments = Vec::new();
        loop {
            match chars.get(i) {
                Some('.') if chars.get(i + 1).is_some_and(|c| c.is_alphanumeric() || *c == '_') => {
                    let end = ident_at(i + 1);
                    if chars.get(end) == Some(&'(') {
                        break;
                    }
                    segments.push(Segment::Field(chars[i + 1..end].iter().collect()));
                    i = end;
                }
                Some('[') => {
                    let Some(close) = chars[i..].iter().position(|c| *c == ']') else {
                        break;
                    };
                    let raw: String = chars[i + 1..i + close].iter().collect();
                    let key = raw.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
                    segments.push(Segment::Index(key));
                    i += close + 1;
                }
                _ => break,
            }
        }
        chains.push((root, segments));
    }
    chains
}

fn step<'a>(value: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match (value, segment) {
        (Value::Object(map), Segment::Field(key) | Segment::Index(key)) => map.get(key),
        (Value::Array(items), Segment::Index(key) | Segment::Field(key)) => {
            key.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        _ => None,
    }
}

/// `(path, repr)` pairs for every prefix of every access chain, resolved
/// segment by segment against the snapshot
fn annotate(statement: &str, locals: &BTreeMap<String, Value>) -> Vec<(String, String)> {
    let mut seen = std::collections::BTreeSet::new();
    let mut lines = Vec::new();
    for (root, segments) in access_chains(statement) {
        let mut path = root.clone();
        let mut current = locals.get(&root);
        if seen.insert(path.clone()) {
            lines.push((path.clone(), current.map_or_else(|| UNRESOLVED.to_string(), short_repr)));
        }
        for segment in &segments {
            match segment {
                Segment::Field(name) => {
                    let _ = write!(path, ".{}", name);
                }
                Segment::Index(key) => {
                    let _ = write!(path, "[{}]", key);
                }
            }
            current = current.and_then(|value| step(value, segment));
            if seen.insert(path.clone()) {
                lines.push((path.clone(), current.map_or_else(|| UNRESOLVED.to_string(), short_repr)));
            }
            if current.is_none() {
                break;
            }
        }
    }
    lines
}
