//! Error types for the logger system

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// Component used before it was configured, or in the wrong lifecycle state
    #[error("Invalid configuration for {component}: {message}")]
    Configuration { component: String, message: String },

    /// The transport rejected or failed to deliver a payload
    #[error("Delivery to topic '{topic}' failed: {cause}")]
    DeliveryFailure { topic: String, cause: String },

    /// Operation attempted after the resource was closed
    #[error("{resource} is closed")]
    ResourceClosed { resource: String },

    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File rotation error
    #[error("File rotation failed for '{path}': {message}")]
    FileRotation { path: String, message: String },

    /// Transport-level error raised synchronously by a publish client
    #[error("Transport error: {0}")]
    Transport(String),
}

impl LoggerError {
    /// Create a configuration (lifecycle misuse) error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a delivery failure carrying the transport's cause
    pub fn delivery(topic: impl Into<String>, cause: impl Into<String>) -> Self {
        LoggerError::DeliveryFailure {
            topic: topic.into(),
            cause: cause.into(),
        }
    }

    /// Create a closed-resource error
    pub fn closed(resource: impl Into<String>) -> Self {
        LoggerError::ResourceClosed {
            resource: resource.into(),
        }
    }

    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LoggerError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create a file rotation error
    pub fn file_rotation(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::FileRotation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        LoggerError::Transport(msg.into())
    }

    /// The transport cause if this is a delivery failure
    pub fn delivery_cause(&self) -> Option<&str> {
        match self {
            LoggerError::DeliveryFailure { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LoggerError::config("DeliveryBridge", "not initialized");
        assert!(matches!(err, LoggerError::Configuration { .. }));

        let err = LoggerError::delivery("logs", "broker down");
        assert_eq!(err.delivery_cause(), Some("broker down"));

        let err = LoggerError::closed("DeliveryBridge");
        assert!(matches!(err, LoggerError::ResourceClosed { .. }));
        assert_eq!(err.delivery_cause(), None);
    }

    #[test]
    fn test_error_display() {
        let err = LoggerError::delivery("t", "broker down");
        assert_eq!(err.to_string(), "Delivery to topic 't' failed: broker down");

        let err = LoggerError::file_rotation("logs/app.log", "Disk full");
        assert_eq!(
            err.to_string(),
            "File rotation failed for 'logs/app.log': Disk full"
        );

        let err = LoggerError::closed("DeliveryBridge");
        assert_eq!(err.to_string(), "DeliveryBridge is closed");
    }

    #[test]
    fn test_io_operation_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = LoggerError::io_operation("opening log file", "cannot open", io_err);

        assert!(matches!(err, LoggerError::IoOperation { .. }));
        assert!(err.to_string().contains("opening log file"));
    }
}
