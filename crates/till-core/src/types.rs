//! # Domain Types
//!
//! Persisted entities of the settlement engine.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  Transaction    │──►│ TransactionItem │   │TransactionVoucher│      │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  subtotal       │   │  unit_price     │   │  applied_amount │       │
//! │  │  discount       │   │  quantity       │   │  discount_amount│       │
//! │  │  voucher_disc.  │   │  line_subtotal  │   └─────────────────┘       │
//! │  │  tax, total     │   └─────────────────┘                             │
//! │  └───────┬─────────┘                                                    │
//! │          │ customer_id?            location_id                          │
//! │          ▼                             ▼                                │
//! │  ┌─────────────────┐   ┌─────────────────────────────┐                 │
//! │  │    Customer     │   │ Location / LocationInventory│                 │
//! │  │  points, tier   │   │ quantity, reserved, reorder │                 │
//! │  └─────────────────┘   └─────────────────────────────┘                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Money columns are stored as `*_cents` integers; accessor methods wrap
//! them in [`Money`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (800 bps = 8%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash; change is computed from the tendered amount.
    Cash,
    /// Card on an external terminal.
    Card,
    /// Mobile wallet.
    Mobile,
}

// =============================================================================
// Manual Discount Kind
// =============================================================================

/// How the cashier's manual discount was expressed.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Fixed,
    Percentage,
}

// =============================================================================
// Transaction
// =============================================================================

/// A settled sale. Written once by the settlement unit of work.
///
/// ## Invariants
/// - `total = subtotal − discount − voucher_discount + tax`
/// - `subtotal − discount − voucher_discount ≥ 0`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Transaction {
    pub id: String,
    pub customer_id: Option<String>,
    pub location_id: String,
    pub subtotal_cents: i64,
    /// Manual (cashier) discount.
    pub discount_cents: i64,
    pub discount_kind: Option<DiscountKind>,
    pub discount_reason: Option<String>,
    pub voucher_discount_cents: i64,
    pub tax_rate_bps: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    /// Cash tendered, when paying by cash.
    pub amount_received_cents: Option<i64>,
    pub change_cents: Option<i64>,
    pub card_last_four: Option<String>,
    pub card_type: Option<String>,
    pub payment_reference: Option<String>,
    pub points_earned: i64,
    pub points_redeemed: i64,
    /// Caller-supplied key; a repeated key returns this transaction.
    pub idempotency_key: Option<String>,
    /// Set later by the order collaborator.
    pub order_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    /// Amount the tax was levied on.
    #[inline]
    pub fn discounted_subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents - self.discount_cents - self.voucher_discount_cents)
    }

    #[inline]
    pub fn tax(&self) -> Money {
        Money::from_cents(self.tax_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Transaction Item
// =============================================================================

/// A sold line. Name and unit price are frozen at settlement time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TransactionItem {
    pub id: String,
    pub transaction_id: String,
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    /// unit_price × quantity
    pub line_subtotal_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl TransactionItem {
    #[inline]
    pub fn line_subtotal(&self) -> Money {
        Money::from_cents(self.line_subtotal_cents)
    }
}

// =============================================================================
// Transaction Voucher
// =============================================================================

/// Voucher variant recorded alongside an applied voucher.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum VoucherType {
    Value,
    Discount,
    ProductSpecific,
}

/// One voucher applied to one transaction. Unique per (transaction, voucher).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TransactionVoucher {
    pub id: String,
    pub transaction_id: String,
    pub voucher_id: String,
    pub voucher_name: String,
    pub voucher_type: VoucherType,
    /// Benefit the voucher offered before capping.
    pub applied_amount_cents: i64,
    /// Discount actually taken off this sale.
    pub discount_amount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl TransactionVoucher {
    #[inline]
    pub fn discount_amount(&self) -> Money {
        Money::from_cents(self.discount_amount_cents)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// Loyalty rank, ordered from lowest to highest.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CustomerTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Default for CustomerTier {
    fn default() -> Self {
        CustomerTier::Bronze
    }
}

impl std::fmt::Display for CustomerTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CustomerTier::Bronze => "Bronze",
            CustomerTier::Silver => "Silver",
            CustomerTier::Gold => "Gold",
            CustomerTier::Platinum => "Platinum",
        };
        f.write_str(name)
    }
}

/// A loyalty member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    /// Card number printed for the member; unique.
    pub loyalty_number: String,
    pub name: String,
    pub email: Option<String>,
    pub points: i64,
    pub total_spent_cents: i64,
    pub visit_count: i64,
    pub customer_tier: CustomerTier,
    /// Weighted score in hundredths (66000 = 660.00).
    pub tier_score: i64,
    /// Administrative pin; when set the computed tier is ignored.
    pub tier_override: Option<CustomerTier>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    #[inline]
    pub fn total_spent(&self) -> Money {
        Money::from_cents(self.total_spent_cents)
    }
}

// =============================================================================
// Location
// =============================================================================

/// A store. Managed elsewhere; settlement only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Location {
    pub id: String,
    pub store_name: String,
    pub store_code: String,
    /// Default tax rate for sales at this store.
    pub tax_rate_bps: i64,
    pub is_active: bool,
}

impl Location {
    /// Tax rate, clamped into the valid 0..=100% range.
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps.clamp(0, 10_000) as u32)
    }
}

// =============================================================================
// Location Inventory
// =============================================================================

/// Stock of one product at one location. The single source of truth for
/// stock; product-wide figures are derived by summing these rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LocationInventory {
    pub id: String,
    pub location_id: String,
    pub product_id: String,
    pub quantity: i64,
    /// Units held for pending orders; not sellable.
    pub reserved_quantity: i64,
    pub reorder_level: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl LocationInventory {
    /// Sellable units (quantity − reserved).
    #[inline]
    pub fn available(&self) -> i64 {
        self.quantity - self.reserved_quantity
    }

    #[inline]
    pub fn needs_reorder(&self) -> bool {
        self.quantity <= self.reorder_level
    }

    #[inline]
    pub fn can_fulfil(&self, requested: i64) -> bool {
        self.available() >= requested
    }
}

// =============================================================================
// Customer Activity
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    PointsEarned,
    PointsRedeemed,
    TierChange,
}

/// Append-only entry in a customer's activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CustomerActivity {
    pub id: String,
    pub customer_id: String,
    pub activity_type: ActivityKind,
    pub description: String,
    pub points_change: i64,
    pub transaction_id: Option<String>,
    /// Originating component, e.g. `pos_transaction`.
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory(quantity: i64, reserved: i64, reorder: i64) -> LocationInventory {
        LocationInventory {
            id: "inv-1".to_string(),
            location_id: "loc-1".to_string(),
            product_id: "prod-1".to_string(),
            quantity,
            reserved_quantity: reserved,
            reorder_level: reorder,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_available_excludes_reserved() {
        let inv = inventory(10, 3, 2);
        assert_eq!(inv.available(), 7);
        assert!(inv.can_fulfil(7));
        assert!(!inv.can_fulfil(8));
    }

    #[test]
    fn test_needs_reorder_is_inclusive() {
        assert!(inventory(10, 0, 10).needs_reorder());
        assert!(!inventory(11, 0, 10).needs_reorder());
    }

    #[test]
    fn test_tier_ordering() {
        assert!(CustomerTier::Bronze < CustomerTier::Silver);
        assert!(CustomerTier::Gold < CustomerTier::Platinum);
        assert_eq!(CustomerTier::default(), CustomerTier::Bronze);
    }

    #[test]
    fn test_location_tax_rate_is_clamped() {
        let location = Location {
            id: "loc-1".to_string(),
            store_name: "Downtown".to_string(),
            store_code: "DT".to_string(),
            tax_rate_bps: 20_000,
            is_active: true,
        };
        assert_eq!(location.tax_rate().bps(), 10_000);
    }
}
