//! # Voucher Eligibility & Pricing
//!
//! Decides whether each declared voucher may be used and what it is worth
//! against the cart. Persistence (reading the authoritative row, consuming
//! it, writing `transaction_vouchers`) lives in till-db; this module is pure.
//!
//! ## Voucher Variants
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Value            stored balance     applied = min(remaining, requested)│
//! │                                      consumed by drawing the balance   │
//! │                                                                         │
//! │  Discount         % off the sale     applied = pre_voucher × bps       │
//! │                                      consumed by marking Redeemed      │
//! │                                                                         │
//! │  ProductSpecific  tied to a product  base = Σ matching line subtotals  │
//! │                   Percent(bps)       applied = base × bps              │
//! │                   FaceValue(amount)  applied = min(amount, base)       │
//! │                                      consumed by marking Redeemed      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each discount is capped at what is still undiscounted, so the vouchers
//! on one sale can never take off more than the pre-voucher subtotal.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::pricing::CartLine;
use crate::types::VoucherType;

// =============================================================================
// Voucher Model
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    Issued,
    Redeemed,
    Expired,
    Cancelled,
}

impl std::fmt::Display for VoucherStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VoucherStatus::Issued => "issued",
            VoucherStatus::Redeemed => "redeemed",
            VoucherStatus::Expired => "expired",
            VoucherStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What a product-specific voucher gives on its product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductBenefit {
    Percent { bps: u32 },
    FaceValue { amount: Money },
}

/// Variant payload; each variant carries only the fields it uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoucherKind {
    Value {
        face_value: Money,
        remaining_value: Money,
    },
    Discount {
        bps: u32,
    },
    ProductSpecific {
        product_id: String,
        benefit: ProductBenefit,
    },
}

impl VoucherKind {
    pub fn voucher_type(&self) -> VoucherType {
        match self {
            VoucherKind::Value { .. } => VoucherType::Value,
            VoucherKind::Discount { .. } => VoucherType::Discount,
            VoucherKind::ProductSpecific { .. } => VoucherType::ProductSpecific,
        }
    }
}

/// A redeemable voucher as held by voucher management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Voucher {
    pub id: String,
    /// Owner; `None` for bearer vouchers.
    pub customer_id: Option<String>,
    pub name: String,
    pub status: VoucherStatus,
    pub is_active: bool,
    /// Last valid day (inclusive).
    #[ts(as = "Option<String>")]
    pub expiration_date: Option<NaiveDate>,
    pub kind: VoucherKind,
}

/// A voucher the checkout client asked to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VoucherClaim {
    pub voucher_id: String,
    /// Value vouchers only: how much of the balance to use. Defaults to all of it.
    #[serde(default)]
    pub requested_amount: Option<Money>,
}

/// A claim paired with the authoritative voucher row.
#[derive(Debug, Clone)]
pub struct ResolvedClaim {
    pub voucher: Voucher,
    pub requested_amount: Option<Money>,
}

// =============================================================================
// Eligibility
// =============================================================================

/// Why a voucher cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IneligibleReason {
    #[error("voucher is {0}")]
    NotIssued(VoucherStatus),

    #[error("voucher is inactive")]
    Inactive,

    #[error("voucher expired on {0}")]
    Expired(NaiveDate),

    #[error("voucher belongs to another customer")]
    WrongCustomer,

    #[error("voucher has no remaining value")]
    Exhausted,

    #[error("no item in the cart matches product {product_id}")]
    NoMatchingItems { product_id: String },

    #[error("voucher was not found")]
    NotFound,
}

/// Eligibility decision point for a voucher on a given sale.
///
/// Implementations must be pure; they are called inside the settlement
/// unit of work.
pub trait EligibilityPolicy: Send + Sync {
    fn check(
        &self,
        voucher: &Voucher,
        customer_id: Option<&str>,
        today: NaiveDate,
    ) -> Result<(), IneligibleReason>;

    fn is_eligible(&self, voucher: &Voucher, customer_id: Option<&str>, today: NaiveDate) -> bool {
        self.check(voucher, customer_id, today).is_ok()
    }
}

/// Default policy: issued, active, unexpired, owned by the buyer (or
/// unowned), and a Value voucher must still hold a balance.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardEligibility;

impl EligibilityPolicy for StandardEligibility {
    fn check(
        &self,
        voucher: &Voucher,
        customer_id: Option<&str>,
        today: NaiveDate,
    ) -> Result<(), IneligibleReason> {
        if voucher.status != VoucherStatus::Issued {
            return Err(IneligibleReason::NotIssued(voucher.status));
        }
        if !voucher.is_active {
            return Err(IneligibleReason::Inactive);
        }
        if let Some(expires) = voucher.expiration_date {
            if expires < today {
                return Err(IneligibleReason::Expired(expires));
            }
        }
        if let Some(owner) = voucher.customer_id.as_deref() {
            if customer_id != Some(owner) {
                return Err(IneligibleReason::WrongCustomer);
            }
        }
        if let VoucherKind::Value { remaining_value, .. } = &voucher.kind {
            if !remaining_value.is_positive() {
                return Err(IneligibleReason::Exhausted);
            }
        }
        Ok(())
    }
}

// =============================================================================
// Pricing
// =============================================================================

/// How applying a voucher changes the stored voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    /// Decrease `remaining_value`; the voucher is redeemed when it reaches zero.
    DrawDown { amount: Money },
    /// Move Issued → Redeemed.
    Redeem,
}

/// One priced voucher, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherApplication {
    pub voucher_id: String,
    pub voucher_name: String,
    pub voucher_type: VoucherType,
    /// Benefit the voucher offered before capping.
    pub applied_amount: Money,
    /// Discount actually taken off this sale.
    pub discount_amount: Money,
    pub consumption: Consumption,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoucherPricing {
    pub applications: Vec<VoucherApplication>,
    pub total_discount: Money,
}

/// Rejects a claim list that names the same voucher twice.
pub fn ensure_unique_claims(claims: &[VoucherClaim]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(claims.len());
    for claim in claims {
        if claim.voucher_id.trim().is_empty() {
            return Err(ValidationError::required("voucher_id"));
        }
        if !seen.insert(claim.voucher_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "voucher_id".to_string(),
                value: claim.voucher_id.clone(),
            });
        }
        if let Some(requested) = claim.requested_amount {
            if !requested.is_positive() {
                return Err(ValidationError::MustBePositive {
                    field: "requested_amount".to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Prices the claims in order against `pre_voucher_subtotal`.
///
/// Fails with [`CoreError::VoucherIneligible`] on the first voucher the
/// policy rejects or that has nothing in the cart to apply to.
pub fn price_vouchers(
    claims: &[ResolvedClaim],
    lines: &[CartLine],
    pre_voucher_subtotal: Money,
    customer_id: Option<&str>,
    today: NaiveDate,
    policy: &dyn EligibilityPolicy,
) -> CoreResult<VoucherPricing> {
    let mut room = pre_voucher_subtotal.non_negative();
    let mut pricing = VoucherPricing::default();

    for claim in claims {
        let voucher = &claim.voucher;
        let ineligible = |reason| CoreError::VoucherIneligible {
            voucher_id: voucher.id.clone(),
            reason,
        };

        policy
            .check(voucher, customer_id, today)
            .map_err(ineligible)?;

        let applied = match &voucher.kind {
            VoucherKind::Value { remaining_value, .. } => claim
                .requested_amount
                .map_or(*remaining_value, |requested| requested.min(*remaining_value)),
            VoucherKind::Discount { bps } => pre_voucher_subtotal.percentage(*bps),
            VoucherKind::ProductSpecific {
                product_id,
                benefit,
            } => {
                let base = matching_subtotal(lines, product_id).ok_or_else(|| {
                    ineligible(IneligibleReason::NoMatchingItems {
                        product_id: product_id.clone(),
                    })
                })?;
                match benefit {
                    ProductBenefit::Percent { bps } => base.percentage(*bps),
                    ProductBenefit::FaceValue { amount } => (*amount).min(base),
                }
            }
        }
        .non_negative();

        let discount = applied.min(room);
        room -= discount;

        let consumption = match voucher.kind {
            VoucherKind::Value { .. } => Consumption::DrawDown { amount: discount },
            _ => Consumption::Redeem,
        };

        pricing.total_discount += discount;
        pricing.applications.push(VoucherApplication {
            voucher_id: voucher.id.clone(),
            voucher_name: voucher.name.clone(),
            voucher_type: voucher.kind.voucher_type(),
            applied_amount: applied,
            discount_amount: discount,
            consumption,
        });
    }

    Ok(pricing)
}

/// Subtotal of the lines selling `product_id`, or `None` when there are none.
fn matching_subtotal(lines: &[CartLine], product_id: &str) -> Option<Money> {
    let mut matched = lines.iter().filter(|l| l.product_id == product_id).peekable();
    matched.peek()?;
    Some(matched.map(CartLine::line_subtotal).sum())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    fn voucher(id: &str, kind: VoucherKind) -> Voucher {
        Voucher {
            id: id.to_string(),
            customer_id: None,
            name: format!("Voucher {id}"),
            status: VoucherStatus::Issued,
            is_active: true,
            expiration_date: None,
            kind,
        }
    }

    fn claim(voucher: Voucher) -> ResolvedClaim {
        ResolvedClaim {
            voucher,
            requested_amount: None,
        }
    }

    fn line(product_id: &str, price: i64, qty: i64) -> CartLine {
        CartLine {
            product_id: product_id.to_string(),
            name: product_id.to_string(),
            unit_price: Money::from_cents(price),
            quantity: qty,
        }
    }

    fn price(claims: &[ResolvedClaim], lines: &[CartLine], base: i64) -> CoreResult<VoucherPricing> {
        price_vouchers(
            claims,
            lines,
            Money::from_cents(base),
            Some("cust-1"),
            today(),
            &StandardEligibility,
        )
    }

    #[test]
    fn test_discount_voucher_uses_pre_voucher_base() {
        let lines = vec![line("p-1", 10_000, 1)];
        let claims = vec![claim(voucher("v-1", VoucherKind::Discount { bps: 500 }))];

        let pricing = price(&claims, &lines, 9000).unwrap();
        assert_eq!(pricing.total_discount.cents(), 450);
        assert_eq!(pricing.applications[0].consumption, Consumption::Redeem);
    }

    #[test]
    fn test_value_voucher_takes_min_of_balance_and_request() {
        let lines = vec![line("p-1", 5000, 1)];
        let mut c = claim(voucher(
            "v-1",
            VoucherKind::Value {
                face_value: Money::from_cents(2000),
                remaining_value: Money::from_cents(1500),
            },
        ));
        c.requested_amount = Some(Money::from_cents(4000));

        let pricing = price(&[c], &lines, 5000).unwrap();
        let app = &pricing.applications[0];
        assert_eq!(app.applied_amount.cents(), 1500);
        assert_eq!(app.discount_amount.cents(), 1500);
        assert_eq!(
            app.consumption,
            Consumption::DrawDown {
                amount: Money::from_cents(1500)
            }
        );
    }

    #[test]
    fn test_value_voucher_draws_only_what_is_used() {
        let lines = vec![line("p-1", 800, 1)];
        let c = claim(voucher(
            "v-1",
            VoucherKind::Value {
                face_value: Money::from_cents(2000),
                remaining_value: Money::from_cents(2000),
            },
        ));

        let pricing = price(&[c], &lines, 800).unwrap();
        let app = &pricing.applications[0];
        assert_eq!(app.applied_amount.cents(), 2000);
        assert_eq!(app.discount_amount.cents(), 800);
        assert_eq!(
            app.consumption,
            Consumption::DrawDown {
                amount: Money::from_cents(800)
            }
        );
    }

    #[test]
    fn test_product_specific_restricts_to_matching_lines() {
        let lines = vec![line("p-1", 1000, 2), line("p-2", 5000, 1)];
        let percent = claim(voucher(
            "v-1",
            VoucherKind::ProductSpecific {
                product_id: "p-1".to_string(),
                benefit: ProductBenefit::Percent { bps: 2500 },
            },
        ));
        let face = claim(voucher(
            "v-2",
            VoucherKind::ProductSpecific {
                product_id: "p-1".to_string(),
                benefit: ProductBenefit::FaceValue {
                    amount: Money::from_cents(9999),
                },
            },
        ));

        let pricing = price(&[percent, face], &lines, 7000).unwrap();
        assert_eq!(pricing.applications[0].discount_amount.cents(), 500);
        // face value capped at the p-1 subtotal
        assert_eq!(pricing.applications[1].applied_amount.cents(), 2000);
        assert_eq!(pricing.total_discount.cents(), 2500);
    }

    #[test]
    fn test_face_value_below_matching_subtotal_is_taken_whole() {
        let lines = vec![line("p-1", 1000, 3)];
        let c = claim(voucher(
            "v-1",
            VoucherKind::ProductSpecific {
                product_id: "p-1".to_string(),
                benefit: ProductBenefit::FaceValue {
                    amount: Money::from_cents(750),
                },
            },
        ));

        let pricing = price(&[c], &lines, 3000).unwrap();
        assert_eq!(pricing.applications[0].applied_amount.cents(), 750);
        assert_eq!(pricing.total_discount.cents(), 750);
        assert_eq!(pricing.applications[0].consumption, Consumption::Redeem);
    }

    #[test]
    fn test_product_specific_without_match_is_ineligible() {
        let lines = vec![line("p-2", 1000, 1)];
        let c = claim(voucher(
            "v-1",
            VoucherKind::ProductSpecific {
                product_id: "p-1".to_string(),
                benefit: ProductBenefit::Percent { bps: 1000 },
            },
        ));

        let err = price(&[c], &lines, 1000).unwrap_err();
        assert!(matches!(
            err,
            CoreError::VoucherIneligible { ref voucher_id, reason: IneligibleReason::NoMatchingItems { .. } }
                if voucher_id == "v-1"
        ));
    }

    #[test]
    fn test_total_discount_never_exceeds_base() {
        let lines = vec![line("p-1", 1000, 1)];
        let claims = vec![
            claim(voucher("v-1", VoucherKind::Discount { bps: 8000 })),
            claim(voucher("v-2", VoucherKind::Discount { bps: 8000 })),
            claim(voucher(
                "v-3",
                VoucherKind::Value {
                    face_value: Money::from_cents(500),
                    remaining_value: Money::from_cents(500),
                },
            )),
        ];

        let pricing = price(&claims, &lines, 1000).unwrap();
        assert_eq!(pricing.total_discount.cents(), 1000);
        let sum: Money = pricing.applications.iter().map(|a| a.discount_amount).sum();
        assert_eq!(sum, pricing.total_discount);
        assert_eq!(pricing.applications[1].discount_amount.cents(), 200);
        assert_eq!(pricing.applications[2].discount_amount, Money::zero());
    }

    #[test]
    fn test_standard_eligibility_rules() {
        let policy = StandardEligibility;
        let base = voucher("v-1", VoucherKind::Discount { bps: 100 });
        assert!(policy.is_eligible(&base, None, today()));

        let mut redeemed = base.clone();
        redeemed.status = VoucherStatus::Redeemed;
        assert_eq!(
            policy.check(&redeemed, None, today()),
            Err(IneligibleReason::NotIssued(VoucherStatus::Redeemed))
        );

        let mut inactive = base.clone();
        inactive.is_active = false;
        assert_eq!(policy.check(&inactive, None, today()), Err(IneligibleReason::Inactive));

        let mut expired = base.clone();
        let yesterday = today().pred_opt().unwrap();
        expired.expiration_date = Some(yesterday);
        assert_eq!(
            policy.check(&expired, None, today()),
            Err(IneligibleReason::Expired(yesterday))
        );

        let mut expires_today = base.clone();
        expires_today.expiration_date = Some(today());
        assert!(policy.is_eligible(&expires_today, None, today()));

        let mut owned = base.clone();
        owned.customer_id = Some("cust-1".to_string());
        assert!(policy.is_eligible(&owned, Some("cust-1"), today()));
        assert_eq!(
            policy.check(&owned, Some("cust-2"), today()),
            Err(IneligibleReason::WrongCustomer)
        );
        assert_eq!(policy.check(&owned, None, today()), Err(IneligibleReason::WrongCustomer));

        let empty = voucher(
            "v-2",
            VoucherKind::Value {
                face_value: Money::from_cents(100),
                remaining_value: Money::zero(),
            },
        );
        assert_eq!(policy.check(&empty, None, today()), Err(IneligibleReason::Exhausted));
    }

    #[test]
    fn test_first_ineligible_voucher_fails_the_whole_set() {
        let lines = vec![line("p-1", 1000, 1)];
        let mut bad = voucher("v-2", VoucherKind::Discount { bps: 100 });
        bad.status = VoucherStatus::Cancelled;
        let claims = vec![claim(voucher("v-1", VoucherKind::Discount { bps: 100 })), claim(bad)];

        let err = price(&claims, &lines, 1000).unwrap_err();
        assert!(matches!(err, CoreError::VoucherIneligible { ref voucher_id, .. } if voucher_id == "v-2"));
    }

    #[test]
    fn test_duplicate_claims_rejected() {
        let claims = vec![
            VoucherClaim {
                voucher_id: "v-1".to_string(),
                requested_amount: None,
            },
            VoucherClaim {
                voucher_id: "v-1".to_string(),
                requested_amount: None,
            },
        ];
        assert!(matches!(
            ensure_unique_claims(&claims),
            Err(ValidationError::Duplicate { .. })
        ));
        assert!(ensure_unique_claims(&claims[..1]).is_ok());
    }

    #[test]
    fn test_non_positive_requested_amount_rejected() {
        let claims = vec![VoucherClaim {
            voucher_id: "v-1".to_string(),
            requested_amount: Some(Money::zero()),
        }];
        assert!(matches!(
            ensure_unique_claims(&claims),
            Err(ValidationError::MustBePositive { .. })
        ));
    }
}
