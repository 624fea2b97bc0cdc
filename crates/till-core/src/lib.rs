//! # till-core: Pure Settlement Logic
//!
//! Everything about settling a sale that can be decided without I/O:
//! pricing, voucher eligibility and pricing, loyalty accrual and tier scoring.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Till Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          till-server (POST /api/transactions)                   │   │
//! │  │          settlement state machine, one SQLite transaction       │   │
//! │  └──────────────┬───────────────────────────────┬──────────────────┘   │
//! │                 │                               │                       │
//! │  ┌──────────────▼──────────────────┐  ┌────────▼──────────────────┐    │
//! │  │ ★ till-core (THIS CRATE) ★      │  │ till-db                   │    │
//! │  │                                 │  │ repositories, migrations  │    │
//! │  │  money · pricing · voucher      │  └───────────────────────────┘    │
//! │  │  loyalty · validation · types   │  ┌───────────────────────────┐    │
//! │  │                                 │  │ till-sync                 │    │
//! │  │  NO I/O • NO DATABASE           │  │ loyalty-cloud notifier    │    │
//! │  └─────────────────────────────────┘  └───────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer cents, half-up percentages
//! - [`pricing`] - Subtotal, manual discount, tax, total
//! - [`voucher`] - Voucher model, eligibility policy, voucher pricing
//! - [`loyalty`] - Points accrual, tier scoring and thresholds
//! - [`types`] - Persisted entities
//! - [`validation`] - Request validation
//! - [`error`] - Domain error types

pub mod error;
pub mod loyalty;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;
pub mod voucher;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use pricing::{CartLine, ManualDiscount, PriceBreakdown};
pub use types::*;
pub use voucher::{EligibilityPolicy, StandardEligibility, Voucher, VoucherClaim, VoucherKind, VoucherStatus};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single sale.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity on a single line.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Highest unit price accepted at the till ($1,000,000.00).
pub const MAX_UNIT_PRICE_CENTS: i64 = 100_000_000;

/// Reorder level given to inventory rows first created by a sale.
pub const DEFAULT_REORDER_LEVEL: i64 = 10;

/// `created_by` recorded on activity written during settlement.
pub const SETTLEMENT_SOURCE: &str = "pos_transaction";
