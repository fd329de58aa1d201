use rust_decimal::Decimal;
use thiserror::Error;

use crate::extensions::ExtensionType;

// ============================================================================
// Error Classification
// ============================================================================

/// Coarse classification driving the retry and reporting policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network, RPC, rate limit or remote failures; eligible for retry
    Transient,
    /// Bad configuration, addresses or amounts; never retried
    Validation,
    /// Trade guard rejections; never retried
    PolicyViolation,
    /// Malformed payloads from the chain or the aggregator; never retried
    DecodeFailure,
    /// The operation observed the shutdown signal
    Cancelled,
}

// ============================================================================
// Main Error Enum
// ============================================================================

/// Error enum shared by every refill bot component
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefillError {
    // ========================================================================
    // Extension Decoding Errors
    // ========================================================================

    /// The record after the base layout carries a different tag
    #[error("Not a {expected} extension: found tag {found}")]
    NotThisExtension { expected: ExtensionType, found: u16 },

    /// The account data is too short to hold the requested record
    #[error("Buffer too short for {context}: {len} bytes, need {required}")]
    BufferTooShort { context: String, len: usize, required: usize },

    // ========================================================================
    // Aggregator Errors
    // ========================================================================

    /// The quote endpoint answered with a non-success status
    #[error("Quote unavailable (status {status}): {body}")]
    QuoteUnavailable { status: u16, body: String },

    /// A response body could not be decoded
    #[error("Failed to decode {context}: {reason}")]
    DecodeError { context: String, reason: String },

    /// Waiting for a rate limiter slot was aborted
    #[error("Rate limiter wait aborted: {reason}")]
    RateLimited { reason: String },

    /// Building the swap transaction remotely failed
    #[error("Failed to build swap transaction: {reason}")]
    BuildRequestError { reason: String },

    /// The returned swap transaction could not be decoded
    #[error("Failed to decode swap transaction: {reason}")]
    TransactionDecodeError { reason: String },

    /// The transaction requires a signer other than the configured wallet
    #[error("Transaction requires signer {required}, which is not the configured wallet")]
    SigningKeyMismatch { required: String },

    /// Submitting the signed transaction failed
    #[error("Failed to submit transaction: {reason}")]
    SubmissionError { reason: String },

    // ========================================================================
    // Trade Policy Errors
    // ========================================================================

    /// The spendable balance cannot cover the configured swap
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Decimal, required: Decimal },

    /// The quoted price impact is not a decimal number
    #[error("Invalid price impact value '{value}'")]
    PriceImpactParseError { value: String },

    /// The quoted price impact exceeds the slippage budget
    #[error("Price impact too high: {impact_pct}% (max {max_pct}%)")]
    PriceImpactTooHigh { impact_pct: Decimal, max_pct: Decimal },

    /// Every attempt of a retried operation failed
    #[error("Operation failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<RefillError>,
    },

    // ========================================================================
    // Network Errors
    // ========================================================================

    /// RPC call failed
    #[error("RPC error: {message} (code: {code:?})")]
    RpcError { message: String, code: Option<i64> },

    /// HTTP call failed before a response was received
    #[error("HTTP error: {message}")]
    HttpError { message: String },

    /// The shutdown signal fired while the operation was in flight
    #[error("Operation '{operation}' cancelled")]
    Cancelled { operation: String },

    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Address is not a valid base58 public key
    #[error("Invalid address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },

    /// Amount cannot be represented
    #[error("Invalid amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: String },

    /// Invalid configuration
    #[error("Invalid configuration for '{component}': {reason}")]
    InvalidConfiguration { component: String, reason: String },

    /// Missing configuration
    #[error("Missing configuration for '{component}': {reason}")]
    MissingConfiguration { component: String, reason: String },

    // ========================================================================
    // General Errors
    // ========================================================================

    /// Local file access failed
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    /// Local (de)serialization failed
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Generic error with optional context
    #[error("Error: {message}")]
    Generic { message: String, context: Option<String> },
}

impl RefillError {
    /// Classify the error for the retry policy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::QuoteUnavailable { .. }
            | Self::BuildRequestError { .. }
            | Self::SubmissionError { .. }
            | Self::RpcError { .. }
            | Self::HttpError { .. }
            | Self::Io { .. }
            | Self::Generic { .. } => ErrorKind::Transient,

            Self::RetriesExhausted { source, .. } => source.kind(),

            Self::InsufficientBalance { .. } | Self::PriceImpactTooHigh { .. } => {
                ErrorKind::PolicyViolation
            }

            Self::NotThisExtension { .. }
            | Self::BufferTooShort { .. }
            | Self::DecodeError { .. }
            | Self::TransactionDecodeError { .. }
            | Self::PriceImpactParseError { .. }
            | Self::Serialization { .. } => ErrorKind::DecodeFailure,

            Self::SigningKeyMismatch { .. }
            | Self::InvalidAddress { .. }
            | Self::InvalidAmount { .. }
            | Self::InvalidConfiguration { .. }
            | Self::MissingConfiguration { .. } => ErrorKind::Validation,

            Self::Cancelled { .. } | Self::RateLimited { .. } => ErrorKind::Cancelled,
        }
    }

    /// Whether another attempt could succeed
    pub fn is_retriable(&self) -> bool {
        !matches!(self, Self::RetriesExhausted { .. }) && self.kind() == ErrorKind::Transient
    }

    /// Whether the error came from the shutdown signal
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Create a buffer too short error
    pub fn buffer_too_short(context: &str, len: usize, required: usize) -> Self {
        Self::BufferTooShort {
            context: context.to_string(),
            len,
            required,
        }
    }

    /// Create an RPC error
    pub fn rpc_error(message: &str, code: Option<i64>) -> Self {
        Self::RpcError {
            message: message.to_string(),
            code,
        }
    }

    /// Create an HTTP error
    pub fn http_error(message: &str) -> Self {
        Self::HttpError {
            message: message.to_string(),
        }
    }

    /// Create a decode error
    pub fn decode_error(context: &str, reason: &str) -> Self {
        Self::DecodeError {
            context: context.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: &str) -> Self {
        Self::Cancelled {
            operation: operation.to_string(),
        }
    }

    /// Create an invalid address error
    pub fn invalid_address(value: &str, reason: &str) -> Self {
        Self::InvalidAddress {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid amount error
    pub fn invalid_amount(value: &str, reason: &str) -> Self {
        Self::InvalidAmount {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(component: &str, reason: &str) -> Self {
        Self::InvalidConfiguration {
            component: component.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a missing configuration error
    pub fn missing_config(component: &str, reason: &str) -> Self {
        Self::MissingConfiguration {
            component: component.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an I/O error
    pub fn io_error(path: &str, reason: &str) -> Self {
        Self::Io {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a generic error
    pub fn generic(message: &str) -> Self {
        Self::Generic {
            message: message.to_string(),
            context: None,
        }
    }

    /// Create a generic error with context
    pub fn generic_with_context(message: &str, context: &str) -> Self {
        Self::Generic {
            message: message.to_string(),
            context: Some(context.to_string()),
        }
    }
}

impl From<serde_json::Error> for RefillError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retriable() {
        assert!(RefillError::rpc_error("timeout", None).is_retriable());
        assert!(RefillError::QuoteUnavailable { status: 503, body: String::new() }.is_retriable());
        assert!(RefillError::SubmissionError { reason: "blockhash".into() }.is_retriable());
    }

    #[test]
    fn test_policy_and_validation_errors_are_not_retriable() {
        let impact = RefillError::PriceImpactTooHigh {
            impact_pct: Decimal::new(300, 2),
            max_pct: Decimal::new(250, 2),
        };
        assert_eq!(impact.kind(), ErrorKind::PolicyViolation);
        assert!(!impact.is_retriable());

        let mismatch = RefillError::SigningKeyMismatch { required: "abc".into() };
        assert_eq!(mismatch.kind(), ErrorKind::Validation);
        assert!(!mismatch.is_retriable());

        assert!(!RefillError::cancelled("quote").is_retriable());
    }

    #[test]
    fn test_exhausted_retries_keep_cause() {
        let err = RefillError::RetriesExhausted {
            attempts: 4,
            source: Box::new(RefillError::rpc_error("down", Some(-32005))),
        };
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(!err.is_retriable());
        assert!(err.to_string().contains("after 4 attempts"));
        assert!(err.to_string().contains("down"));
    }
}
