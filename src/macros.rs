//! Logging macros for ergonomic log message formatting.
//!
//! Unlike the [`Logger`](crate::Logger) methods, the macros also record the
//! enclosing function, so `place` reads `src/server.rs:accept:42` instead of
//! falling back to the module.
//!
//! # Examples
//!
//! ```
//! use rust_bus_logger::prelude::*;
//! use rust_bus_logger::info;
//!
//! let logger = Logger::new();
//!
//! info!(logger, "Server started");
//!
//! let port = 8080;
//! info!(logger, "Server listening on port {}", port);
//! ```

/// Log a message with automatic formatting.
///
/// # Examples
///
/// ```
/// # use rust_bus_logger::prelude::*;
/// # let logger = Logger::new();
/// use rust_bus_logger::log;
/// log!(logger, LogLevel::Info, "Simple message");
/// log!(logger, LogLevel::Error, "Error code: {}", 500);
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log(
            $crate::LogRecord::new($level, format!($($arg)+))
                .with_location($crate::__location!()),
        )
    };
}

/// Log an error with its rendered trace at EXCEPTION level.
///
/// The capture origin defaults to [`CaptureOrigin::Direct`](crate::serializer::CaptureOrigin).
///
/// # Examples
///
/// ```
/// # use rust_bus_logger::prelude::*;
/// # let logger = Logger::new();
/// use rust_bus_logger::exception;
/// if let Err(e) = "x".parse::<u16>() {
///     exception!(logger, &e);
/// }
/// ```
#[macro_export]
macro_rules! exception {
    ($logger:expr, $err:expr) => {
        $crate::exception!($logger, $err, $crate::serializer::CaptureOrigin::Direct)
    };
    ($logger:expr, $err:expr, $origin:expr) => {
        $logger.exception_at($err, $origin, $crate::__location!())
    };
}

/// Run a closure returning `Result`, logging an error or panic as an
/// exception. Evaluates to `Option` of the success value.
///
/// # Examples
///
/// ```
/// # use rust_bus_logger::prelude::*;
/// # let logger = Logger::new();
/// use rust_bus_logger::catch;
/// let port: Option<u16> = catch!(logger, || "8080".parse::<u16>());
/// assert_eq!(port, Some(8080));
/// ```
#[macro_export]
macro_rules! catch {
    ($logger:expr, $f:expr) => {
        $logger.catch_at($crate::__location!(), $f)
    };
}

/// Call-site location including the enclosing function
#[doc(hidden)]
#[macro_export]
macro_rules! __location {
    () => {
        $crate::SourceLocation::at(file!(), line!()).with_function($crate::__function_name!())
    };
}

/// Name of the function the macro is expanded in
#[doc(hidden)]
#[macro_export]
macro_rules! __function_name {
    () => {{
        fn __here() {}
        fn __type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::macros::enclosing_function(__type_name_of(__here))
    }};
}

/// `app::server::accept::{{closure}}::__here` -> `accept`
#[doc(hidden)]
pub fn enclosing_function(type_name: &'static str) -> &'static str {
    let mut path = type_name.strip_suffix("::__here").unwrap_or(type_name);
    while let Some(outer) = path.strip_suffix("::{{closure}}") {
        path = outer;
    }
    path.rsplit("::").next().unwrap_or(path)
}

/// Log a debug-level message.
///
/// # Examples
///
/// ```
/// # use rust_bus_logger::prelude::*;
/// # let logger = Logger::new();
/// use rust_bus_logger::debug;
/// debug!(logger, "Counter value: {}", 10);
/// ```
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Debug, $($arg)+)
    };
}

/// Log an info-level message.
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Info, $($arg)+)
    };
}

/// Log a warning-level message.
///
/// # Examples
///
/// ```
/// # use rust_bus_logger::prelude::*;
/// # let logger = Logger::new();
/// use rust_bus_logger::warning;
/// warning!(logger, "Memory usage: {}%", 85);
/// ```
#[macro_export]
macro_rules! warning {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Warning, $($arg)+)
    };
}

/// Log an error-level message.
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Error, $($arg)+)
    };
}

/// Log a critical-level message.
#[macro_export]
macro_rules! critical {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Critical, $($arg)+)
    };
}
