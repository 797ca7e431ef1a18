//! Ledger Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment and ledger errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Another record already holds this idempotency key
    #[error("Duplicate payment identifier: {0}")]
    DuplicateIdentifier(String),

    /// Admin key missing or wrong
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller supplied unusable input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// User does not exist in the store
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Get user-friendly message
    pub const fn user_message(&self) -> &str {
        match self {
            Self::DuplicateIdentifier(_) => "This payment has already been recorded.",
            Self::Unauthorized(_) => "Invalid admin credentials.",
            Self::InvalidInput(_) => "The request contained invalid data.",
            Self::UserNotFound(_) => "User not found.",
            Self::WebhookParse(_) => "Webhook payload could not be understood.",
            Self::Config(_) => "Service configuration error.",
            Self::Storage(_) => "Storage temporarily unavailable. Please retry.",
        }
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        Self::WebhookParse(err.to_string())
    }
}
