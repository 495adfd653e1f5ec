//! Supplier error types

use thiserror::Error;

/// Supplier error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SupplierError {
    pub kind: SupplierErrorKind,
    pub message: String,
}

impl SupplierError {
    pub fn new(kind: SupplierErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SupplierErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(SupplierErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(SupplierErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(SupplierErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(SupplierErrorKind::InvalidRequest, message)
    }

    pub fn unusable_content(message: impl Into<String>) -> Self {
        Self::new(SupplierErrorKind::UnusableContent, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(SupplierErrorKind::Unknown, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplierErrorKind {
    /// Network issues, timeouts - retryable
    Network,
    /// Rate limited (429) - retryable with backoff
    RateLimit,
    /// Server error (5xx) - retryable
    ServerError,
    /// Authentication failed (401, 403) - not retryable
    Auth,
    /// Bad request (400) - not retryable
    InvalidRequest,
    /// The generator responded but the content was unparseable or empty -
    /// retryable, a fresh generation may succeed
    UnusableContent,
    /// Unknown error
    Unknown,
}

impl SupplierErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::RateLimit | Self::ServerError | Self::UnusableContent
        )
    }
}
