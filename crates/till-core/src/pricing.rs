//! # Pricing Calculator
//!
//! Turns cart lines plus discount inputs into the settlement totals.
//!
//! ## Order of Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  subtotal             = Σ unit_price × quantity                         │
//! │       │                                                                 │
//! │       ▼  manual discount (fixed, or % of subtotal), capped at subtotal  │
//! │  pre_voucher_subtotal = subtotal − discount                             │
//! │       │                                                                 │
//! │       ▼  voucher discounts (priced against pre_voucher_subtotal)        │
//! │  discounted_subtotal  = max(0, subtotal − discount − voucher_discount)  │
//! │       │                                                                 │
//! │       ▼  tax rate in bps, half-up                                       │
//! │  total                = discounted_subtotal + tax                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every step is integer cents; there is no floating point anywhere.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{DiscountKind, TaxRate};

// =============================================================================
// Inputs
// =============================================================================

/// A cart line as priced at the till.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
}

impl CartLine {
    #[inline]
    pub fn line_subtotal(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    /// Line subtotal, or `None` when `unit_price × quantity` overflows.
    #[inline]
    pub fn checked_line_subtotal(&self) -> Option<Money> {
        self.unit_price.checked_multiply_quantity(self.quantity)
    }
}

/// Cashier-entered discount, applied before vouchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManualDiscount {
    /// A flat amount off.
    Fixed { amount: Money },
    /// A percentage of the subtotal, in basis points.
    Percentage { bps: u32 },
}

impl ManualDiscount {
    /// Discount against `subtotal`, never more than the subtotal itself.
    pub fn amount_for(&self, subtotal: Money) -> Money {
        let raw = match self {
            ManualDiscount::Fixed { amount } => *amount,
            ManualDiscount::Percentage { bps } => subtotal.percentage(*bps),
        };
        raw.non_negative().min(subtotal.non_negative())
    }

    pub fn kind(&self) -> DiscountKind {
        match self {
            ManualDiscount::Fixed { .. } => DiscountKind::Fixed,
            ManualDiscount::Percentage { .. } => DiscountKind::Percentage,
        }
    }
}

// =============================================================================
// Output
// =============================================================================

/// Fully resolved totals for one sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PriceBreakdown {
    pub subtotal: Money,
    /// Manual discount actually taken.
    pub discount: Money,
    /// Base that percentage vouchers are priced against.
    pub pre_voucher_subtotal: Money,
    pub voucher_discount: Money,
    pub discounted_subtotal: Money,
    pub tax_rate: TaxRate,
    pub tax: Money,
    pub total: Money,
}

// =============================================================================
// Calculations
// =============================================================================

/// Σ line subtotals, saturating at the largest representable amount.
///
/// Carts that passed `validate_cart` never get near the limit.
pub fn cart_subtotal(lines: &[CartLine]) -> Money {
    checked_cart_subtotal(lines).unwrap_or(Money::from_cents(i64::MAX))
}

/// Σ line subtotals with overflow reported as `OutOfRange`.
pub fn checked_cart_subtotal(lines: &[CartLine]) -> Result<Money, ValidationError> {
    let overflow = |field: &str| ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: i64::MAX,
    };

    lines.iter().try_fold(Money::zero(), |acc, line| {
        let line_total = line
            .checked_line_subtotal()
            .ok_or_else(|| overflow("line_subtotal"))?;
        acc.checked_add(line_total).ok_or_else(|| overflow("subtotal"))
    })
}

/// Subtotal after the manual discount; the base vouchers are priced against.
pub fn pre_voucher_subtotal(lines: &[CartLine], manual: Option<&ManualDiscount>) -> Money {
    let subtotal = cart_subtotal(lines);
    let discount = manual.map_or(Money::zero(), |d| d.amount_for(subtotal));
    subtotal - discount
}

/// Computes the full price breakdown.
///
/// ## Example
/// $100.00 jacket, 10% manual discount, a 5% voucher worth $4.50, 8% tax.
/// ```rust
/// use till_core::money::Money;
/// use till_core::pricing::{calculate, CartLine, ManualDiscount};
/// use till_core::types::TaxRate;
///
/// let lines = vec![CartLine {
///     product_id: "p-1".into(),
///     name: "Jacket".into(),
///     unit_price: Money::from_cents(10_000),
///     quantity: 1,
/// }];
/// let manual = ManualDiscount::Percentage { bps: 1000 };
///
/// let totals = calculate(&lines, Some(&manual), Money::from_cents(450), TaxRate::from_bps(800));
/// assert_eq!(totals.discounted_subtotal.cents(), 8550);
/// assert_eq!(totals.tax.cents(), 684);
/// assert_eq!(totals.total.cents(), 9234);
/// ```
pub fn calculate(
    lines: &[CartLine],
    manual: Option<&ManualDiscount>,
    voucher_discount: Money,
    tax_rate: TaxRate,
) -> PriceBreakdown {
    let subtotal = cart_subtotal(lines);
    let discount = manual.map_or(Money::zero(), |d| d.amount_for(subtotal));
    let pre_voucher_subtotal = subtotal - discount;
    let voucher_discount = voucher_discount.non_negative();

    let discounted_subtotal = (subtotal - discount - voucher_discount).non_negative();
    let tax = discounted_subtotal.calculate_tax(tax_rate);

    PriceBreakdown {
        subtotal,
        discount,
        pre_voucher_subtotal,
        voucher_discount,
        discounted_subtotal,
        tax_rate,
        tax,
        total: discounted_subtotal + tax,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
