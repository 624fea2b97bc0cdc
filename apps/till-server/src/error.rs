//! # Error Types
//!
//! [`SettlementError`] is what a settlement attempt fails with; [`ApiError`]
//! is what the checkout UI receives.
//!
//! ## HTTP Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SettlementError                 ApiError code            HTTP          │
//! │  ───────────────                 ─────────────            ────          │
//! │  Validation                 ──►  VALIDATION_ERROR         400           │
//! │  InsufficientPoints         ──►  VALIDATION_ERROR         400           │
//! │  VoucherIneligible          ──►  VOUCHER_INELIGIBLE       422           │
//! │  InsufficientStock          ──►  INSUFFICIENT_STOCK       422           │
//! │  ConcurrencyConflict        ──►  CONCURRENCY_CONFLICT     409           │
//! │  Persistence                ──►  DATABASE_ERROR           500           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every settlement error happens before COMMIT, so the caller can rely on
//! nothing having been written.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use till_core::voucher::IneligibleReason;
use till_core::{CoreError, ValidationError};
use till_db::DbError;

/// Result alias for settlement operations.
pub type SettlementResult<T> = Result<T, SettlementError>;

// =============================================================================
// Settlement Error
// =============================================================================

#[derive(Debug, Error)]
pub enum SettlementError {
    /// The request is malformed or refers to something that does not exist.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A declared voucher cannot be applied to this sale.
    #[error("Voucher {voucher_id} is not eligible: {reason}")]
    VoucherIneligible {
        voucher_id: String,
        reason: IneligibleReason,
    },

    /// Not enough sellable stock at the sale's location.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Redeeming more points than the member holds after this sale.
    #[error("Insufficient loyalty points: available {available}, requested {requested}")]
    InsufficientPoints { available: i64, requested: i64 },

    /// Another settlement changed the same rows, the database stayed
    /// locked, or the unit of work ran out of time.
    ///
    /// ## When This Occurs
    /// - A voucher balance or status changed between read and update
    /// - A customer's points or visit count changed between read and update
    /// - SQLite reported busy/locked after `busy_timeout`
    /// - `settlement_timeout` elapsed
    #[error("Concurrency conflict: {reason}")]
    ConcurrencyConflict { reason: String, retryable: bool },

    /// Any other storage failure.
    #[error("Persistence error: {0}")]
    Persistence(DbError),
}

impl SettlementError {
    pub fn conflict(reason: impl Into<String>) -> Self {
        SettlementError::ConcurrencyConflict {
            reason: reason.into(),
            retryable: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementError::ConcurrencyConflict { retryable: true, .. })
    }
}

impl From<CoreError> for SettlementError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::VoucherIneligible { voucher_id, reason } => {
                SettlementError::VoucherIneligible { voucher_id, reason }
            }
            CoreError::InsufficientPoints {
                available,
                requested,
            } => SettlementError::InsufficientPoints {
                available,
                requested,
            },
            CoreError::CartTooLarge { max } => SettlementError::Validation(ValidationError::OutOfRange {
                field: "items".to_string(),
                min: 1,
                max: max as i64,
            }),
            CoreError::InvalidPaymentAmount { reason } => {
                SettlementError::Validation(ValidationError::not_allowed("amount_received", reason))
            }
            CoreError::Validation(v) => SettlementError::Validation(v),
        }
    }
}

impl From<DbError> for SettlementError {
    fn from(err: DbError) -> Self {
        if err.is_retryable() {
            SettlementError::ConcurrencyConflict {
                reason: err.to_string(),
                retryable: true,
            }
        } else {
            SettlementError::Persistence(err)
        }
    }
}

// =============================================================================
// API Error
// =============================================================================

/// Error body returned by the HTTP API.
///
/// ```json
/// {
///   "code": "CONCURRENCY_CONFLICT",
///   "message": "Concurrency conflict: voucher v-1 was redeemed concurrently",
///   "retryable": true
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// 400
    ValidationError,
    /// 404
    NotFound,
    /// 422
    VoucherIneligible,
    /// 422
    InsufficientStock,
    /// 409
    ConcurrencyConflict,
    /// 500
    DatabaseError,
    /// 500
    Internal,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::VoucherIneligible | ErrorCode::InsufficientStock => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorCode::ConcurrencyConflict => StatusCode::CONFLICT,
            ErrorCode::DatabaseError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        let code = match &err {
            SettlementError::Validation(_) | SettlementError::InsufficientPoints { .. } => {
                ErrorCode::ValidationError
            }
            SettlementError::VoucherIneligible { .. } => ErrorCode::VoucherIneligible,
            SettlementError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            SettlementError::ConcurrencyConflict { .. } => ErrorCode::ConcurrencyConflict,
            SettlementError::Persistence(_) => ErrorCode::DatabaseError,
        };

        ApiError {
            code,
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            other => SettlementError::from(other).into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (SettlementError::Validation(ValidationError::required("items")), StatusCode::BAD_REQUEST),
            (
                SettlementError::InsufficientPoints {
                    available: 5,
                    requested: 10,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                SettlementError::VoucherIneligible {
                    voucher_id: "v-1".into(),
                    reason: IneligibleReason::Inactive,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                SettlementError::InsufficientStock {
                    product_id: "p-1".into(),
                    available: 0,
                    requested: 1,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (SettlementError::conflict("stale"), StatusCode::CONFLICT),
            (
                SettlementError::Persistence(DbError::Internal("disk".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).code.status(), status);
        }
    }

    #[test]
    fn test_busy_database_is_retryable_conflict() {
        let err = SettlementError::from(DbError::Busy("database is locked".into()));
        assert!(err.is_retryable());

        let api = ApiError::from(err);
        assert_eq!(api.code, ErrorCode::ConcurrencyConflict);
        assert!(api.retryable);
    }

    #[test]
    fn test_driver_errors_surface_through_db_error() {
        // same path a failed COMMIT takes
        let err = SettlementError::from(DbError::from(sqlx::Error::PoolTimedOut));
        assert!(err.is_retryable());

        let err = SettlementError::from(DbError::from(sqlx::Error::Protocol("closed".into())));
        assert!(matches!(err, SettlementError::Persistence(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_missing_row_is_not_found() {
        let api = ApiError::from(DbError::not_found("Customer", "c-9"));
        assert_eq!(api.code.status(), StatusCode::NOT_FOUND);
        assert!(api.message.contains("c-9"));
    }

    #[test]
    fn test_core_errors_map_to_settlement_errors() {
        let err = SettlementError::from(CoreError::InsufficientPoints {
            available: 1,
            requested: 2,
        });
        assert!(matches!(err, SettlementError::InsufficientPoints { .. }));

        let err = SettlementError::from(CoreError::InvalidPaymentAmount {
            reason: "short".into(),
        });
        assert!(matches!(err, SettlementError::Validation(_)));
    }
}
