//! Sink implementations

pub mod bus;
#[cfg(feature = "console")]
pub mod console;
#[cfg(feature = "file")]
pub mod file;

pub use bus::BusSink;
#[cfg(feature = "console")]
pub use console::{ConsoleFormat, ConsoleSink};
#[cfg(feature = "file")]
pub use file::FileSink;

pub use crate::core::{AsyncSink, Sink};
