use thiserror::Error;

/// Unified error type for the dining simulation
#[derive(Debug, Error)]
pub enum DiningError {
    /// Rejected at startup, before any actor or lock is created
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
        field: Option<String>,
    },

    /// An actor or broadcaster task ended abnormally
    #[error("Task {task} failed: {message}")]
    TaskFailed {
        task: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An observer could not deliver a snapshot or the termination marker
    #[error("Observer {observer} failed: {operation}")]
    Observer {
        observer: String,
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// IO errors
    #[error("IO operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Timeout errors
    #[error("Operation timed out: {operation} (timeout: {timeout_ms}ms)")]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },
}

impl DiningError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error naming the offending field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a task failure error
    pub fn task_failed<S: Into<String>, M: Into<String>>(task: S, message: M) -> Self {
        Self::TaskFailed {
            task: task.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create an observer error with source
    pub fn observer<S: Into<String>, O: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        observer: S,
        operation: O,
        source: E,
    ) -> Self {
        Self::Observer {
            observer: observer.into(),
            operation: operation.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a task failure from a task that panicked or was aborted
    pub fn task_join<S: Into<String>>(task: S, err: tokio::task::JoinError) -> Self {
        let message = if err.is_panic() {
            "task panicked"
        } else {
            "task was cancelled"
        };
        Self::TaskFailed {
            task: task.into(),
            message: message.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration { .. } => "configuration",
            Self::TaskFailed { .. } => "task",
            Self::Observer { .. } => "observer",
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, DiningError>;

impl From<std::io::Error> for DiningError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", err)
    }
}

impl From<serde_json::Error> for DiningError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<serde_yaml::Error> for DiningError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = DiningError::configuration("actors must be at least 1");
        assert!(matches!(err, DiningError::InvalidConfiguration { .. }));
        assert_eq!(err.category(), "configuration");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: actors must be at least 1"
        );
    }

    #[test]
    fn test_configuration_field() {
        let err = DiningError::configuration_field("must be positive", "actors");
        if let DiningError::InvalidConfiguration { field, .. } = err {
            assert_eq!(field.as_deref(), Some("actors"));
        } else {
            panic!("Expected configuration error");
        }
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(DiningError::task_failed("philosopher-0", "panicked").category(), "task");
        assert_eq!(DiningError::timeout("shutdown", 1000).category(), "timeout");
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        assert_eq!(DiningError::observer("console", "publish", io).category(), "observer");
    }

    #[tokio::test]
    async fn test_task_join_names_the_task() {
        let join_err = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
        let err = DiningError::task_join("philosopher-3", join_err);
        match &err {
            DiningError::TaskFailed { task, message, source } => {
                assert_eq!(task, "philosopher-3");
                assert_eq!(message, "task panicked");
                assert!(source.is_some());
            }
            other => panic!("unexpected error {}", other),
        }
        assert_eq!(err.to_string(), "Task philosopher-3 failed: task panicked");
    }
}
