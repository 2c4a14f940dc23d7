use thiserror::Error;

/// Error type shared by the publisher, the consumer and the HTTP surface.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Error originating from the underlying `lapin` library.
    #[error("RabbitMQ communication error: {0}")]
    Lapin(#[from] lapin::Error),

    /// Payload could not be (de)serialized as JSON.
    #[error("Failed to deserialize message: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Payload parsed but carries values no order can have.
    #[error("Invalid order event: {0}")]
    Validation(String),

    /// Custom messaging-related error.
    #[error("Messaging setup or configuration error: {message}")]
    MessagingError {
        message: String,
    },

    /// Error from the order processing step.
    #[error("Order processing failed: {0}")]
    HandlerError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<String> for WorkerError {
    fn from(s: String) -> Self {
        WorkerError::MessagingError { message: s }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_conversions_become_messaging_errors() {
        let err = WorkerError::from("boom".to_string());
        assert_eq!(err.to_string(), "Messaging setup or configuration error: boom");

        let err = WorkerError::from(format!("bad {}", 42));
        assert!(matches!(err, WorkerError::MessagingError { ref message } if message == "bad 42"));
    }

    #[test]
    fn validation_error_message() {
        let err = WorkerError::Validation("amount must be positive".into());
        assert_eq!(err.to_string(), "Invalid order event: amount must be positive");
    }
}
