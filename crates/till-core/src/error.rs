//! # Error Types
//!
//! Domain-specific error types for till-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  till-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  till-db errors                                                        │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  till-server errors                                                    │
//! │  ├── SettlementError  - One aggregated failure per settlement          │
//! │  └── ApiError         - What the checkout client sees (JSON)           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SettlementError → ApiError        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::voucher::IneligibleReason;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the pure settlement calculations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A declared voucher cannot be applied to this sale.
    ///
    /// ## When This Occurs
    /// - Voucher already redeemed, cancelled or expired
    /// - Voucher belongs to a different customer
    /// - Product-specific voucher with no matching line in the cart
    ///
    /// The whole settlement aborts; no voucher is partially applied.
    #[error("Voucher {voucher_id} is not eligible: {reason}")]
    VoucherIneligible {
        voucher_id: String,
        reason: IneligibleReason,
    },

    /// Customer tried to redeem more points than the balance allows.
    #[error("Insufficient loyalty points: available {available}, requested {requested}")]
    InsufficientPoints { available: i64, requested: i64 },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Tendered amount does not cover the sale.
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before any write happens.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not allowed in this context.
    #[error("{field} is not allowed: {reason}")]
    NotAllowed { field: String, reason: String },

    /// Same value supplied twice (e.g., a voucher applied twice).
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn not_allowed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::NotAllowed {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voucher_ineligible_names_the_voucher() {
        let err = CoreError::VoucherIneligible {
            voucher_id: "v-1".to_string(),
            reason: IneligibleReason::Inactive,
        };
        assert_eq!(err.to_string(), "Voucher v-1 is not eligible: voucher is inactive");
    }

    #[test]
    fn test_validation_error_messages() {
        assert_eq!(
            ValidationError::required("location_id").to_string(),
            "location_id is required"
        );
        let dup = ValidationError::Duplicate {
            field: "voucher_id".to_string(),
            value: "v-1".to_string(),
        };
        assert_eq!(dup.to_string(), "voucher_id 'v-1' appears more than once");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("items").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
