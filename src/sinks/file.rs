//! File sink with optional hourly rotation
//!
//! Without rotation records go to `{base}/{date}-{name}.log`, where the date
//! is computed once, the first time the path is needed. With hourly rotation
//! each hour gets its own directory, `{base}/{YYYY-MM-DD HH}/{name}.log`;
//! when the hour changes the finished file is gzip-compressed to
//! `{name}.log.gz` and the next hour's file is opened.

use crate::core::{LogLevel, LogRecord, LoggerError, Result, Sink};
use crate::serializer::serialize;
use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DEFAULT_LOG_DIR: &str = "logs";

const DATE_FORMAT: &str = "%Y-%m-%d";
const HOUR_FORMAT: &str = "%Y-%m-%d %H";
const CHUNK_SIZE: usize = 64 * 1024;

struct OpenLog {
    path: PathBuf,
    /// Hour directory this file belongs to; `None` without rotation
    hour: Option<String>,
    writer: BufWriter<File>,
}

pub struct FileSink {
    name: String,
    base_dir: PathBuf,
    level: LogLevel,
    hourly: bool,
    compress: bool,
    date_tag: OnceLock<String>,
    current: Option<OpenLog>,
}

impl FileSink {
    /// A non-rotating sink writing to `logs/{date}-{name}.log`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_dir: PathBuf::from(DEFAULT_LOG_DIR),
            level: LogLevel::Debug,
            hourly: false,
            compress: true,
            date_tag: OnceLock::new(),
            current: None,
        }
    }

    /// Rotate every hour, compressing finished files
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rust_bus_logger::sinks::FileSink;
    /// use rust_bus_logger::{LogLevel, Logger};
    ///
    /// let logger = Logger::new();
    /// logger
    ///     .add_sink(Box::new(FileSink::hourly("api").with_level(LogLevel::Info)))
    ///     .expect("log directory is writable");
    /// ```
    pub fn hourly(name: impl Into<String>) -> Self {
        let mut sink = Self::new(name);
        sink.hourly = true;
        sink
    }

    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Whether rotated-out hourly files are gzip-compressed (default: yes)
    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    pub fn is_hourly(&self) -> bool {
        self.hourly
    }

    /// Date used in the non-rotating file name, fixed on first use
    pub fn date_tag(&self) -> &str {
        self.date_tag
            .get_or_init(|| Local::now().format(DATE_FORMAT).to_string())
    }

    /// Path the sink writes to at `now`
    pub fn path_at(&self, now: DateTime<Local>) -> PathBuf {
        if self.hourly {
            self.base_dir
                .join(now.format(HOUR_FORMAT).to_string())
                .join(format!("{}.log", self.name))
        } else {
            self.base_dir
                .join(format!("{}-{}.log", self.date_tag(), self.name))
        }
    }

    /// Path of the file currently open, if started
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|log| log.path.as_path())
    }

    fn open_at(&self, now: DateTime<Local>) -> Result<OpenLog> {
        let path = self.path_at(now);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LoggerError::io_operation(
                    "create log directory",
                    format!("Failed to create directory '{}'", parent.display()),
                    e,
                )
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                LoggerError::io_operation(
                    "open log file",
                    format!("Failed to open '{}'", path.display()),
                    e,
                )
            })?;

        Ok(OpenLog {
            hour: self.hourly.then(|| now.format(HOUR_FORMAT).to_string()),
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Write `record` as if the wall clock read `now`; rotates on hour change
    pub fn write_at(&mut self, record: &LogRecord, now: DateTime<Local>) -> Result<()> {
        if !self.accepts(record.effective_level()) {
            return Ok(());
        }
        if self.current.is_none() {
            return Err(LoggerError::config("FileSink", "sink is not started"));
        }
        if self.hourly {
            self.rotate_if_needed(now)?;
        }

        let log = self
            .current
            .as_mut()
            .ok_or_else(|| LoggerError::config("FileSink", "sink is not started"))?;
        let mut line = serialize(record);
        line.push(b'\n');
        log.writer.write_all(&line)?;
        Ok(())
    }

    fn rotate_if_needed(&mut self, now: DateTime<Local>) -> Result<()> {
        let hour = now.format(HOUR_FORMAT).to_string();
        if self.current.as_ref().and_then(|log| log.hour.as_deref()) == Some(hour.as_str()) {
            return Ok(());
        }

        let next = self.open_at(now)?;
        if let Some(mut finished) = self.current.replace(next) {
            finished.writer.flush().map_err(|e| {
                LoggerError::file_rotation(finished.path.display().to_string(), e.to_string())
            })?;
            drop(finished.writer);
            if self.compress {
                if let Err(e) = compress_file(&finished.path) {
                    eprintln!("[LOGGER ERROR] Rotation compression failed: {}", e);
                }
            }
        }
        Ok(())
    }
}

/// Gzip `path` into `{path}.gz` through a temporary file, removing the
/// original only once the archive is complete
pub fn compress_file(path: &Path) -> Result<PathBuf> {
    let gz_path = path.with_extension("log.gz");
    let temp_gz_path = path.with_extension("log.gz.tmp");

    let input = File::open(path).map_err(|e| {
        LoggerError::io_operation(
            "compress log file",
            format!("Failed to open file for compression: {}", path.display()),
            e,
        )
    })?;
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, input);

    let output = File::create(&temp_gz_path).map_err(|e| {
        LoggerError::io_operation(
            "compress log file",
            format!("Failed to create temporary compressed file: {}", temp_gz_path.display()),
            e,
        )
    })?;
    let mut encoder = flate2::write::GzEncoder::new(
        BufWriter::with_capacity(CHUNK_SIZE, output),
        flate2::Compression::default(),
    );

    let streamed = (|| -> std::io::Result<()> {
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            encoder.write_all(&buffer[..read])?;
        }
        encoder.finish()?.flush()
    })();
    if let Err(e) = streamed {
        let _ = fs::remove_file(&temp_gz_path);
        return Err(LoggerError::io_operation(
            "compress log file",
            format!("Failed to compress {}", path.display()),
            e,
        ));
    }

    fs::rename(&temp_gz_path, &gz_path).map_err(|e| {
        let _ = fs::remove_file(&temp_gz_path);
        LoggerError::io_operation(
            "compress log file",
            format!("Failed to rename compressed file to: {}", gz_path.display()),
            e,
        )
    })?;

    if let Err(e) = fs::remove_file(path) {
        eprintln!(
            "[LOGGER WARNING] Compressed {} but could not remove the original: {}",
            path.display(),
            e
        );
    }
    Ok(gz_path)
}

impl Sink for FileSink {
    fn start(&mut self) -> Result<()> {
        if self.current.is_none() {
            self.current = Some(self.open_at(Local::now())?);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(mut log) = self.current.take() {
            log.writer.flush()?;
        }
        Ok(())
    }

    fn write(&mut self, record: &LogRecord) -> Result<()> {
        self.write_at(record, Local::now())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(log) = self.current.as_mut() {
            log.writer.flush()?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> LogLevel {
        self.level
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn at(hour: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 9, hour, 15, 0)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn test_plain_path_uses_date_tag() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileSink::new("api").with_base_dir(dir.path());
        sink.start().unwrap();

        let expected = dir.path().join(format!("{}-api.log", sink.date_tag()));
        assert_eq!(sink.current_path(), Some(expected.as_path()));

        sink.write(&LogRecord::new(LogLevel::Info, "hello")).unwrap();
        sink.stop().unwrap();

        let content = fs::read_to_string(&expected).unwrap();
        let value: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(value["message"], "hello");
        assert_eq!(value["level"], "INFO");
    }

    #[test]
    fn test_date_tag_is_computed_once() {
        let sink = FileSink::new("api");
        let first = sink.date_tag().to_string();
        assert_eq!(sink.date_tag(), first);
        assert_eq!(first.len(), "2024-03-09".len());
    }

    #[test]
    fn test_hourly_path_layout() {
        let sink = FileSink::hourly("worker").with_base_dir("/var/log/app");
        assert_eq!(
            sink.path_at(at(7)),
            PathBuf::from("/var/log/app/2024-03-09 07/worker.log")
        );
    }

    #[test]
    fn test_hour_change_rotates_and_compresses() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileSink::hourly("worker").with_base_dir(dir.path());
        sink.start().unwrap();

        sink.write_at(&LogRecord::new(LogLevel::Info, "first"), at(7)).unwrap();
        sink.write_at(&LogRecord::new(LogLevel::Info, "second"), at(7)).unwrap();
        sink.write_at(&LogRecord::new(LogLevel::Info, "third"), at(8)).unwrap();
        sink.stop().unwrap();

        let hour7 = dir.path().join("2024-03-09 07");
        assert!(!hour7.join("worker.log").exists());
        let mut decoded = String::new();
        GzDecoder::new(File::open(hour7.join("worker.log.gz")).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded.lines().count(), 2);
        assert!(decoded.contains("\"first\""));

        let hour8 = fs::read_to_string(dir.path().join("2024-03-09 08").join("worker.log")).unwrap();
        assert!(hour8.contains("\"third\""));
    }

    #[test]
    fn test_rotation_without_compression_keeps_file() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileSink::hourly("w")
            .with_base_dir(dir.path())
            .with_compression(false);
        sink.start().unwrap();
        sink.write_at(&LogRecord::new(LogLevel::Info, "a"), at(1)).unwrap();
        sink.write_at(&LogRecord::new(LogLevel::Info, "b"), at(2)).unwrap();
        sink.stop().unwrap();

        assert!(dir.path().join("2024-03-09 01").join("w.log").exists());
        assert!(!dir.path().join("2024-03-09 01").join("w.log.gz").exists());
    }

    #[test]
    fn test_threshold_and_lifecycle() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileSink::new("t")
            .with_base_dir(dir.path())
            .with_level(LogLevel::Warning);
        assert!(sink.write(&LogRecord::new(LogLevel::Error, "x")).is_err());

        sink.start().unwrap();
        sink.write(&LogRecord::new(LogLevel::Info, "dropped")).unwrap();
        sink.write(&LogRecord::new(LogLevel::Error, "kept")).unwrap();
        sink.stop().unwrap();
        sink.stop().unwrap();

        let path = dir.path().join(format!("{}-t.log", sink.date_tag()));
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("kept"));
    }
}
