use crate::core::retry::Retryable;
use std::time::Duration;
use thiserror::Error;

/// Why a single retrieval attempt did not produce a usable artifact.
///
/// Every variant drives the fallback controller to the next candidate; only
/// ladder exhaustion turns the last one into a user-facing error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptFailure {
    /// The artifact (or the size the source announced) is over the byte ceiling
    #[error("file exceeds the {ceiling} byte limit")]
    QuotaExceeded { ceiling: u64, actual: Option<u64> },

    /// Format missing, access restricted, removed
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Timeouts, connection resets and other conditions worth another try
    #[error("transient error: {0}")]
    Transient(String),
}

impl AttemptFailure {
    /// Returns subcategory for metrics
    pub fn category(&self) -> &'static str {
        match self {
            AttemptFailure::QuotaExceeded { .. } => "quota_exceeded",
            AttemptFailure::SourceUnavailable(_) => "source_unavailable",
            AttemptFailure::Transient(_) => "transient",
        }
    }

    pub fn reason(&self) -> String {
        match self {
            AttemptFailure::QuotaExceeded { .. } => self.to_string(),
            AttemptFailure::SourceUnavailable(reason) | AttemptFailure::Transient(reason) => reason.clone(),
        }
    }
}

/// Error reported by a destination channel for one send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel refused the payload because of its size
    #[error("payload rejected as too large: {0}")]
    TooLarge(String),

    /// Network hiccup, timeout, flood control
    #[error("transient channel error: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Anything a retry cannot fix (bad chat, revoked token, ...)
    #[error("permanent channel error: {0}")]
    Permanent(String),

    /// The request was cancelled before this send started
    #[error("delivery cancelled")]
    Cancelled,
}

impl ChannelError {
    pub fn transient(message: impl Into<String>) -> Self {
        ChannelError::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ChannelError::Transient { .. })
    }

    /// Label for the delivery attempts metric.
    pub fn category(&self) -> &'static str {
        match self {
            ChannelError::TooLarge(_) => "too_large",
            ChannelError::Transient { .. } => "transient",
            ChannelError::Permanent(_) => "permanent",
            ChannelError::Cancelled => "cancelled",
        }
    }
}

impl Retryable for ChannelError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ChannelError::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Terminal delivery failure handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    /// The artifact passed the ceiling but the channel's real limit is lower
    #[error("channel rejected a {size} byte upload: {reason}")]
    ConfigurationMismatch { size: u64, reason: String },

    #[error("channel rejected the upload: {0}")]
    Permanent(String),

    /// Every allowed attempt failed with a transient error
    #[error("upload failed after retries: {0}")]
    RetriesExhausted(String),

    #[error("delivery cancelled")]
    Cancelled,
}

impl DeliveryFailure {
    pub fn category(&self) -> &'static str {
        match self {
            DeliveryFailure::ConfigurationMismatch { .. } => "configuration_mismatch",
            DeliveryFailure::Permanent(_) => "permanent",
            DeliveryFailure::RetriesExhausted(_) => "retries_exhausted",
            DeliveryFailure::Cancelled => "cancelled",
        }
    }

    /// True when trying again later could help; false when the caller should
    /// pick a shorter or lower-quality source instead.
    pub fn is_temporary(&self) -> bool {
        matches!(self, DeliveryFailure::RetriesExhausted(_))
    }
}
