//! Console sink implementation

use crate::core::{LogLevel, LogRecord, LoggerError, Result, Sink};
use crate::serializer::{place, serialize_to_string};
use colored::Colorize;
use std::io::{self, Write};

/// Line format written by [`ConsoleSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleFormat {
    /// The serialized wire payload, one JSON object per line
    #[default]
    Json,
    /// `timestamp | LEVEL | place - message`, optionally colored
    Text,
}

pub struct ConsoleSink {
    level: LogLevel,
    format: ConsoleFormat,
    use_colors: bool,
    streams: Option<(io::Stdout, io::Stderr)>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            level: LogLevel::Debug,
            format: ConsoleFormat::default(),
            use_colors: true,
            streams: None,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set the line format
    ///
    /// # Example
    ///
    /// ```
    /// use rust_bus_logger::sinks::{ConsoleFormat, ConsoleSink};
    ///
    /// let sink = ConsoleSink::new()
    ///     .with_format(ConsoleFormat::Text)
    ///     .with_colors(false);
    /// ```
    #[must_use]
    pub fn with_format(mut self, format: ConsoleFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    pub fn is_started(&self) -> bool {
        self.streams.is_some()
    }

    /// Render one record the way it is printed
    pub fn format_record(&self, record: &LogRecord) -> String {
        match self.format {
            ConsoleFormat::Json => serialize_to_string(record),
            ConsoleFormat::Text => self.format_text(record),
        }
    }

    fn format_text(&self, record: &LogRecord) -> String {
        let level = record.effective_level();
        let level_str = if self.use_colors {
            format!("{:9}", level.to_str())
                .color(level.color_code())
                .to_string()
        } else {
            format!("{:9}", level.to_str())
        };

        let mut line = format!(
            "{} | {} | {} - {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            level_str,
            place(record.location.as_ref()),
            record.message.to_text()
        );
        if let Some(trace) = &record.exception {
            line.push('\n');
            line.push_str(&trace.render());
        }
        line
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for ConsoleSink {
    fn start(&mut self) -> Result<()> {
        if self.streams.is_none() {
            self.streams = Some((io::stdout(), io::stderr()));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.streams.is_some() {
            self.flush()?;
            self.streams = None;
        }
        Ok(())
    }

    fn write(&mut self, record: &LogRecord) -> Result<()> {
        if !self.accepts(record.effective_level()) {
            return Ok(());
        }
        let line = self.format_record(record);
        let (stdout, stderr) = self
            .streams
            .as_ref()
            .ok_or_else(|| LoggerError::config("ConsoleSink", "sink is not started"))?;

        // ERROR and above go to stderr
        if record.effective_level().is_error() {
            writeln!(stderr.lock(), "{}", line)?;
        } else {
            writeln!(stdout.lock(), "{}", line)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some((stdout, stderr)) = self.streams.as_ref() {
            stdout.lock().flush()?;
            stderr.lock().flush()?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }

    fn level(&self) -> LogLevel {
        self.level
    }
}
