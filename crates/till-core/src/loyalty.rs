//! # Loyalty Accrual & Tier Scoring
//!
//! Pure half of the loyalty engine: given a member's balances and a settled
//! total, compute the new balances, score, and tier. The database half
//! (optimistic row update, activity log) lives in till-db.
//!
//! ## Accrual Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  LoyaltySnapshot { points, total_spent, visit_count }                   │
//! │       │                                                                 │
//! │       ▼  accrue(total, points_redeemed)                                 │
//! │  points      += floor(total)  −  points_redeemed   (never below 0)     │
//! │  total_spent += total                                                   │
//! │  visit_count += 1                                                       │
//! │       │                                                                 │
//! │       ▼  TierScorer (default: spent×0.5 + visits×10 + points×0.1)       │
//! │  TierScore (hundredths)                                                 │
//! │       │                                                                 │
//! │       ▼  TierThresholds (spend 250/750/2000 with visit/point floors)   │
//! │  CustomerTier, unless tier_override pins it                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, BPS_SCALE};
use crate::types::{Customer, CustomerTier};

// =============================================================================
// Snapshot & Score
// =============================================================================

/// The inputs the tier score depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoyaltySnapshot {
    pub points: i64,
    pub total_spent: Money,
    pub visit_count: i64,
}

impl From<&Customer> for LoyaltySnapshot {
    fn from(customer: &Customer) -> Self {
        LoyaltySnapshot {
            points: customer.points,
            total_spent: customer.total_spent(),
            visit_count: customer.visit_count,
        }
    }
}

/// Tier score in fixed point hundredths (`66000` reads as `660.00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TierScore(i64);

impl TierScore {
    #[inline]
    pub const fn from_hundredths(hundredths: i64) -> Self {
        TierScore(hundredths)
    }

    /// Score for a whole number of points (`from_whole(250)` = 250.00).
    #[inline]
    pub const fn from_whole(whole: i64) -> Self {
        TierScore(whole * 100)
    }

    #[inline]
    pub const fn hundredths(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TierScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

// =============================================================================
// Scorer
// =============================================================================

/// Maps loyalty balances to a score. Must be monotonic in every input.
pub trait TierScorer: Send + Sync {
    fn score(&self, snapshot: &LoyaltySnapshot) -> TierScore;
}

/// Linear weighting of spend, visits, and points.
///
/// Weights are basis points of one score unit per input unit:
/// - `spend_weight_bps`: per currency unit spent (5000 = 0.5)
/// - `visit_weight_bps`: per visit (100000 = 10)
/// - `points_weight_bps`: per point held (1000 = 0.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedTierScorer {
    pub spend_weight_bps: u32,
    pub visit_weight_bps: u32,
    pub points_weight_bps: u32,
}

impl Default for WeightedTierScorer {
    fn default() -> Self {
        WeightedTierScorer {
            spend_weight_bps: 5_000,
            visit_weight_bps: 100_000,
            points_weight_bps: 1_000,
        }
    }
}

impl TierScorer for WeightedTierScorer {
    fn score(&self, snapshot: &LoyaltySnapshot) -> TierScore {
        // cents are already hundredths of a currency unit
        let spend = snapshot.total_spent.cents() as i128 * self.spend_weight_bps as i128;
        let visits = snapshot.visit_count as i128 * 100 * self.visit_weight_bps as i128;
        let points = snapshot.points as i128 * 100 * self.points_weight_bps as i128;

        let hundredths = (spend + visits + points).div_euclid(BPS_SCALE);
        TierScore(hundredths.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }
}

// =============================================================================
// Thresholds
// =============================================================================

/// What a member needs to reach one tier. All three minimums must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRequirement {
    pub min_spent: Money,
    pub min_visits: i64,
    pub min_points: i64,
}

impl TierRequirement {
    pub const fn new(min_spent_units: i64, min_visits: i64, min_points: i64) -> Self {
        TierRequirement {
            min_spent: Money::from_cents(min_spent_units * 100),
            min_visits,
            min_points,
        }
    }

    pub fn is_met_by(&self, snapshot: &LoyaltySnapshot) -> bool {
        snapshot.total_spent >= self.min_spent
            && snapshot.visit_count >= self.min_visits
            && snapshot.points >= self.min_points
    }
}

/// Requirements for each tier above Bronze.
///
/// The spend minimums are the tier ladder (Silver 250, Gold 750,
/// Platinum 2000); visits and points held must keep pace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub silver: TierRequirement,
    pub gold: TierRequirement,
    pub platinum: TierRequirement,
}

impl Default for TierThresholds {
    fn default() -> Self {
        TierThresholds {
            silver: TierRequirement::new(250, 5, 100),
            gold: TierRequirement::new(750, 15, 500),
            platinum: TierRequirement::new(2000, 30, 1500),
        }
    }
}

impl TierThresholds {
    /// Highest tier whose requirement the snapshot meets.
    pub fn tier_for(&self, snapshot: &LoyaltySnapshot) -> CustomerTier {
        if self.platinum.is_met_by(snapshot) {
            CustomerTier::Platinum
        } else if self.gold.is_met_by(snapshot) {
            CustomerTier::Gold
        } else if self.silver.is_met_by(snapshot) {
            CustomerTier::Silver
        } else {
            CustomerTier::Bronze
        }
    }
}

// =============================================================================
// Tier Policy
// =============================================================================

/// Result of scoring a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierAssessment {
    pub score: TierScore,
    pub tier: CustomerTier,
    /// Tier that the score alone would give, before any override.
    pub computed_tier: CustomerTier,
}

/// Scorer plus thresholds; shared across settlements.
#[derive(Clone)]
pub struct TierPolicy {
    scorer: Arc<dyn TierScorer>,
    thresholds: TierThresholds,
}

impl fmt::Debug for TierPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TierPolicy")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl Default for TierPolicy {
    fn default() -> Self {
        TierPolicy::new(Arc::new(WeightedTierScorer::default()), TierThresholds::default())
    }
}

impl TierPolicy {
    pub fn new(scorer: Arc<dyn TierScorer>, thresholds: TierThresholds) -> Self {
        TierPolicy { scorer, thresholds }
    }

    /// Scores the snapshot and resolves the tier, honouring `tier_override`.
    pub fn assess(
        &self,
        snapshot: &LoyaltySnapshot,
        tier_override: Option<CustomerTier>,
    ) -> TierAssessment {
        let score = self.scorer.score(snapshot);
        let computed_tier = self.thresholds.tier_for(snapshot);
        TierAssessment {
            score,
            tier: tier_override.unwrap_or(computed_tier),
            computed_tier,
        }
    }
}

// =============================================================================
// Accrual
// =============================================================================

/// New balances after one settled sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accrual {
    pub points_earned: i64,
    pub points_redeemed: i64,
    pub before: LoyaltySnapshot,
    pub after: LoyaltySnapshot,
}

/// Points earned for a sale total: one per whole currency unit.
#[inline]
pub fn points_for(total: Money) -> i64 {
    total.non_negative().floor_units()
}

/// Applies one sale to a member's balances.
///
/// Points earned on this sale may fund the redemption on the same sale.
pub fn accrue(before: LoyaltySnapshot, total: Money, points_redeemed: i64) -> CoreResult<Accrual> {
    let points_earned = points_for(total);
    let available = before.points + points_earned;
    if points_redeemed < 0 || points_redeemed > available {
        return Err(CoreError::InsufficientPoints {
            available,
            requested: points_redeemed,
        });
    }

    let after = LoyaltySnapshot {
        points: available - points_redeemed,
        total_spent: before.total_spent + total.non_negative(),
        visit_count: before.visit_count + 1,
    };

    Ok(Accrual {
        points_earned,
        points_redeemed,
        before,
        after,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
