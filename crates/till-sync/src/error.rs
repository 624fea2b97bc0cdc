//! # Sync Error Types
//!
//! Errors raised while configuring or delivering loyalty-cloud
//! notifications. None of them ever reaches a sale: the dispatcher logs
//! delivery failures and moves on.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Delivery     │  │       Queue             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  ConnectionFail │  │  QueueFull              │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  ChannelError           │ │
//! │  │  ConfigLoad/Save│  │  ExternalSync   │  │  ShuttingDown           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid loyalty-cloud endpoint.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Delivery Errors
    // =========================================================================
    /// Could not reach the loyalty cloud.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The request did not complete in time.
    #[error("Loyalty cloud request timed out")]
    Timeout,

    /// The loyalty cloud answered with a non-success status.
    #[error("Loyalty cloud rejected voucher {voucher_id}: HTTP {status}")]
    ExternalSyncFailure { voucher_id: String, status: u16 },

    /// Any other HTTP client failure.
    #[error("HTTP error: {0}")]
    Http(String),

    // =========================================================================
    // Queue Errors
    // =========================================================================
    /// Notification queue is at capacity.
    #[error("Notification queue is full")]
    QueueFull,

    /// Notifier is shutting down.
    #[error("Notifier is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Reading the endpoint setting failed.
    #[error("Database error: {0}")]
    DatabaseError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<till_db::DbError> for SyncError {
    fn from(err: till_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else if err.is_connect() {
            SyncError::ConnectionFailed(err.to_string())
        } else {
            SyncError::Http(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if sending the same notification again could succeed.
    ///
    /// 5xx and 429 answers count as transient; other statuses do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionFailed(_) | SyncError::Timeout | SyncError::QueueFull => true,
            SyncError::ExternalSyncFailure { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ConnectionFailed("refused".into()).is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::ExternalSyncFailure { voucher_id: "v".into(), status: 503 }.is_retryable());
        assert!(SyncError::ExternalSyncFailure { voucher_id: "v".into(), status: 429 }.is_retryable());

        assert!(!SyncError::ExternalSyncFailure { voucher_id: "v".into(), status: 404 }.is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::ShuttingDown.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::ExternalSyncFailure {
            voucher_id: "v-123".into(),
            status: 502,
        };
        assert!(err.to_string().contains("v-123"));
        assert!(err.to_string().contains("502"));
        assert!(SyncError::InvalidUrl("x".into()).is_config_error());
    }
}
