//! # Transaction Writer
//!
//! Settles one cart as a single SQLite transaction: pricing, vouchers,
//! stock and loyalty either all happen or none do.
//!
//! ## Stages
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Settlement Unit of Work                          │
//! │                                                                         │
//! │  Validate ─── request shape, location, customer     (no writes yet)    │
//! │     │                                                                   │
//! │  Begin ────── BEGIN; INSERT header (zero totals)    ← write lock       │
//! │     │                                                                   │
//! │  Price ────── subtotal, manual discount                                │
//! │     │                                                                   │
//! │  ApplyVouchers  read rows, eligibility, price, consume                 │
//! │     │                                                                   │
//! │  WriteItems ─ transaction_items × N, transaction_vouchers × M          │
//! │     │                                                                   │
//! │  AdjustInventory  conditional decrement per product                    │
//! │     │                                                                   │
//! │  AccrueLoyalty    points, spend, visits, tier (customer sales only)    │
//! │     │                                                                   │
//! │  Commit ───── finalize totals; COMMIT                                  │
//! │     │                                                                   │
//! │     └──► enqueue one loyalty-cloud notification per applied voucher    │
//! │                                                                         │
//! │  Any error before COMMIT drops the transaction (ROLLBACK).             │
//! │  The whole unit is bounded by SettlementConfig::timeout.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use till_core::loyalty::{self, LoyaltySnapshot, TierPolicy};
use till_core::pricing::{self, CartLine, ManualDiscount};
use till_core::types::TaxRate;
use till_core::validation::{
    validate_bps, validate_card_last_four, validate_cart, validate_non_negative_cents,
    validate_points, validate_required,
};
use till_core::voucher::{
    ensure_unique_claims, price_vouchers, Consumption, EligibilityPolicy, IneligibleReason,
    ResolvedClaim, StandardEligibility, VoucherClaim,
};
use till_core::{
    CoreError, CustomerTier, Location, Money, PaymentMethod, Transaction, TransactionItem,
    TransactionVoucher, ValidationError, DEFAULT_REORDER_LEVEL,
};
use till_db::{
    ActivityLogRepository, CustomerRepository, Database, DbError, InventoryAdjustment,
    InventoryRepository, LoyaltyUpdate, NewActivity, StockDecrement, TransactionRepository,
    VoucherRepository,
};
use till_sync::NotificationHandle;

use crate::error::{SettlementError, SettlementResult};

// =============================================================================
// Configuration & Context
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementConfig {
    /// Upper bound on one unit of work, lock waits included.
    pub timeout: Duration,
    /// Reorder level given to inventory rows created by a sale.
    pub default_reorder_level: i64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        SettlementConfig {
            timeout: Duration::from_secs(5),
            default_reorder_level: DEFAULT_REORDER_LEVEL,
        }
    }
}

/// Everything a settlement needs besides the request and the database.
#[derive(Clone)]
pub struct SettlementContext {
    pub config: SettlementConfig,
    pub eligibility: Arc<dyn EligibilityPolicy>,
    pub tiers: TierPolicy,
    /// Business date used for voucher expiry.
    pub today: NaiveDate,
}

impl SettlementContext {
    /// Standard eligibility, default tier policy, today's UTC date.
    pub fn new(config: SettlementConfig) -> Self {
        SettlementContext {
            config,
            eligibility: Arc::new(StandardEligibility),
            tiers: TierPolicy::default(),
            today: Utc::now().date_naive(),
        }
    }

    pub fn with_eligibility(mut self, policy: Arc<dyn EligibilityPolicy>) -> Self {
        self.eligibility = policy;
        self
    }

    pub fn with_tiers(mut self, tiers: TierPolicy) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn on(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }
}

impl fmt::Debug for SettlementContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettlementContext")
            .field("config", &self.config)
            .field("tiers", &self.tiers)
            .field("today", &self.today)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStage {
    Validate,
    Begin,
    Price,
    ApplyVouchers,
    WriteItems,
    AdjustInventory,
    AccrueLoyalty,
    Commit,
}

impl fmt::Display for SettlementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SettlementStage::Validate => "validate",
            SettlementStage::Begin => "begin",
            SettlementStage::Price => "price",
            SettlementStage::ApplyVouchers => "apply_vouchers",
            SettlementStage::WriteItems => "write_items",
            SettlementStage::AdjustInventory => "adjust_inventory",
            SettlementStage::AccrueLoyalty => "accrue_loyalty",
            SettlementStage::Commit => "commit",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Request & Receipt
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SettleItem {
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
}

/// Body of `POST /api/transactions`.
///
/// Declared totals are advisory: the server recomputes everything and
/// only logs a mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SettleRequest {
    pub location_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub items: Vec<SettleItem>,
    pub payment_method: PaymentMethod,

    #[serde(default)]
    pub subtotal_cents: Option<i64>,
    #[serde(default)]
    pub tax_cents: Option<i64>,
    #[serde(default)]
    pub total_cents: Option<i64>,

    #[serde(default)]
    pub discount: Option<ManualDiscount>,
    #[serde(default)]
    pub discount_reason: Option<String>,
    /// Overrides the location's tax rate.
    #[serde(default)]
    pub tax_rate_bps: Option<u32>,

    #[serde(default)]
    pub points_redeemed: i64,
    #[serde(default)]
    pub amount_received_cents: Option<i64>,
    #[serde(default)]
    pub card_last_four: Option<String>,
    #[serde(default)]
    pub card_type: Option<String>,
    #[serde(default)]
    pub payment_reference: Option<String>,

    #[serde(default)]
    pub vouchers: Vec<VoucherClaim>,
    /// A repeated key returns the first settlement's receipt.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl SettleRequest {
    fn cart_lines(&self) -> Vec<CartLine> {
        self.items
            .iter()
            .map(|item| CartLine {
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                unit_price: Money::from_cents(item.unit_price_cents),
                quantity: item.quantity,
            })
            .collect()
    }
}

/// A persisted sale with the names a printed receipt needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransactionReceipt {
    pub transaction: Transaction,
    pub items: Vec<TransactionItem>,
    pub vouchers: Vec<TransactionVoucher>,
    pub customer_name: Option<String>,
    pub loyalty_number: Option<String>,
    pub store_name: String,
    pub store_code: String,
}

/// Result of [`TransactionWriter::settle`].
#[derive(Debug, Clone)]
pub struct Settlement {
    pub receipt: TransactionReceipt,
    /// Empty for a replayed request.
    pub adjustments: Vec<InventoryAdjustment>,
    pub tier_change: Option<(CustomerTier, CustomerTier)>,
    /// True when an earlier settlement with the same idempotency key was returned.
    pub replayed: bool,
}

/// What the unit of work hands back after COMMIT.
struct Committed {
    transaction_id: String,
    applied_vouchers: Vec<String>,
    adjustments: Vec<InventoryAdjustment>,
    tier_change: Option<(CustomerTier, CustomerTier)>,
}

// =============================================================================
// Transaction Writer
// =============================================================================

#[derive(Clone)]
pub struct TransactionWriter {
    db: Database,
    notifications: Option<NotificationHandle>,
}

impl TransactionWriter {
    pub fn new(db: Database, notifications: Option<NotificationHandle>) -> Self {
        TransactionWriter { db, notifications }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Settles `request` atomically.
    ///
    /// On error nothing has been written and no notification is sent.
    pub async fn settle(
        &self,
        ctx: &SettlementContext,
        request: SettleRequest,
    ) -> SettlementResult<Settlement> {
        let lines = validate_request(&request)?;

        if let Some(replay) = self.replay(&request).await? {
            return Ok(replay);
        }

        let location = self.check_references(&request).await?;

        let mut stage = SettlementStage::Validate;
        let unit = self.run_unit(ctx, &request, &lines, &location, &mut stage);
        let outcome = match tokio::time::timeout(ctx.config.timeout, unit).await {
            Ok(result) => result,
            Err(_) => Err(SettlementError::conflict(format!(
                "settlement did not finish within {:?}",
                ctx.config.timeout
            ))),
        };

        let committed = match outcome {
            Ok(committed) => committed,
            Err(err) => {
                warn!(
                    stage = %stage,
                    location_id = %request.location_id,
                    error = %err,
                    retryable = err.is_retryable(),
                    "Settlement aborted"
                );
                // a concurrent request with the same key may have won
                if err.is_retryable() {
                    if let Some(replay) = self.replay(&request).await? {
                        return Ok(replay);
                    }
                }
                return Err(err);
            }
        };

        if let Some(handle) = &self.notifications {
            for voucher_id in &committed.applied_vouchers {
                // a dropped notification is logged by the handle
                let _ = handle.enqueue(voucher_id);
            }
        }

        let receipt = self
            .receipt(&committed.transaction_id)
            .await?
            .ok_or_else(|| DbError::not_found("Transaction", &committed.transaction_id))?;

        Ok(Settlement {
            receipt,
            adjustments: committed.adjustments,
            tier_change: committed.tier_change,
            replayed: false,
        })
    }

    /// Reads back a persisted sale.
    pub async fn receipt(&self, transaction_id: &str) -> SettlementResult<Option<TransactionReceipt>> {
        let transactions = self.db.transactions();
        let Some(transaction) = transactions.get_by_id(transaction_id).await? else {
            return Ok(None);
        };

        let items = transactions.get_items(transaction_id).await?;
        let vouchers = transactions.get_vouchers(transaction_id).await?;

        let customer = match transaction.customer_id.as_deref() {
            Some(id) => self.db.customers().get_by_id(id).await?,
            None => None,
        };
        let location = self.db.locations().get_by_id(&transaction.location_id).await?;

        Ok(Some(TransactionReceipt {
            items,
            vouchers,
            customer_name: customer.as_ref().map(|c| c.name.clone()),
            loyalty_number: customer.map(|c| c.loyalty_number),
            store_name: location.as_ref().map(|l| l.store_name.clone()).unwrap_or_default(),
            store_code: location.map(|l| l.store_code).unwrap_or_default(),
            transaction,
        }))
    }

    async fn replay(&self, request: &SettleRequest) -> SettlementResult<Option<Settlement>> {
        let Some(key) = request.idempotency_key.as_deref() else {
            return Ok(None);
        };
        let Some(existing) = self.db.transactions().find_by_idempotency_key(key).await? else {
            return Ok(None);
        };

        info!(
            transaction_id = %existing.id,
            idempotency_key = key,
            "Replaying settled transaction"
        );

        let receipt = self
            .receipt(&existing.id)
            .await?
            .ok_or_else(|| DbError::not_found("Transaction", &existing.id))?;

        Ok(Some(Settlement {
            receipt,
            adjustments: Vec::new(),
            tier_change: None,
            replayed: true,
        }))
    }

    /// Location must exist and be active; a named customer must exist.
    async fn check_references(&self, request: &SettleRequest) -> SettlementResult<Location> {
        let location = self
            .db
            .locations()
            .get_by_id(&request.location_id)
            .await?
            .ok_or_else(|| {
                ValidationError::not_allowed("location_id", format!("unknown location {}", request.location_id))
            })?;

        if !location.is_active {
            return Err(ValidationError::not_allowed("location_id", "location is inactive").into());
        }

        if let Some(customer_id) = request.customer_id.as_deref() {
            if self.db.customers().get_by_id(customer_id).await?.is_none() {
                return Err(ValidationError::not_allowed(
                    "customer_id",
                    format!("unknown customer {customer_id}"),
                )
                .into());
            }
        }

        Ok(location)
    }

    async fn run_unit(
        &self,
        ctx: &SettlementContext,
        request: &SettleRequest,
        lines: &[CartLine],
        location: &Location,
        stage: &mut SettlementStage,
    ) -> SettlementResult<Committed> {
        let transaction_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let customer_id = request.customer_id.as_deref();
        let manual = request.discount.as_ref();
        let tax_rate = request
            .tax_rate_bps
            .map(TaxRate::from_bps)
            .unwrap_or_else(|| location.tax_rate());

        advance(stage, SettlementStage::Begin, &transaction_id);
        let mut tx = self.db.begin().await?;

        let mut header = Transaction {
            id: transaction_id.clone(),
            customer_id: request.customer_id.clone(),
            location_id: location.id.clone(),
            subtotal_cents: 0,
            discount_cents: 0,
            discount_kind: manual.map(ManualDiscount::kind),
            discount_reason: request.discount_reason.clone(),
            voucher_discount_cents: 0,
            tax_rate_bps: i64::from(tax_rate.bps()),
            tax_cents: 0,
            total_cents: 0,
            payment_method: request.payment_method,
            amount_received_cents: request.amount_received_cents,
            change_cents: None,
            card_last_four: request.card_last_four.clone(),
            card_type: request.card_type.clone(),
            payment_reference: request.payment_reference.clone(),
            points_earned: 0,
            points_redeemed: 0,
            idempotency_key: request.idempotency_key.clone(),
            order_id: None,
            created_at: now,
        };

        TransactionRepository::insert_header(&mut tx, &header)
            .await
            .map_err(|err| match err {
                DbError::UniqueViolation { ref field, .. } if field.contains("idempotency_key") => {
                    SettlementError::conflict("idempotency key already used by a concurrent settlement")
                }
                other => other.into(),
            })?;

        // ---------------------------------------------------------------------
        advance(stage, SettlementStage::Price, &transaction_id);
        let pre_voucher_subtotal = pricing::pre_voucher_subtotal(lines, manual);

        // ---------------------------------------------------------------------
        advance(stage, SettlementStage::ApplyVouchers, &transaction_id);
        let mut claims = Vec::with_capacity(request.vouchers.len());
        for claim in &request.vouchers {
            let voucher = VoucherRepository::fetch(&mut tx, &claim.voucher_id)
                .await?
                .ok_or_else(|| SettlementError::VoucherIneligible {
                    voucher_id: claim.voucher_id.clone(),
                    reason: IneligibleReason::NotFound,
                })?;
            claims.push(ResolvedClaim {
                voucher,
                requested_amount: claim.requested_amount,
            });
        }

        let vouchers = price_vouchers(
            &claims,
            lines,
            pre_voucher_subtotal,
            customer_id,
            ctx.today,
            ctx.eligibility.as_ref(),
        )?;
        let totals = pricing::calculate(lines, manual, vouchers.total_discount, tax_rate);

        header.subtotal_cents = totals.subtotal.cents();
        header.discount_cents = totals.discount.cents();
        header.voucher_discount_cents = totals.voucher_discount.cents();
        header.tax_cents = totals.tax.cents();
        header.total_cents = totals.total.cents();
        header.change_cents = cash_change(request, totals.total)?;
        check_declared_totals(request, &header);

        for application in &vouchers.applications {
            let consumed = match application.consumption {
                Consumption::DrawDown { amount } => {
                    VoucherRepository::draw_down(&mut tx, &application.voucher_id, amount).await?
                }
                Consumption::Redeem => VoucherRepository::redeem(&mut tx, &application.voucher_id).await?,
            };
            if !consumed {
                return Err(SettlementError::conflict(format!(
                    "voucher {} was redeemed concurrently",
                    application.voucher_id
                )));
            }
        }

        // ---------------------------------------------------------------------
        advance(stage, SettlementStage::WriteItems, &transaction_id);
        for (line_no, line) in lines.iter().enumerate() {
            let item = TransactionItem {
                id: Uuid::new_v4().to_string(),
                transaction_id: transaction_id.clone(),
                product_id: line.product_id.clone(),
                name: line.name.clone(),
                unit_price_cents: line.unit_price.cents(),
                quantity: line.quantity,
                line_subtotal_cents: line.line_subtotal().cents(),
                created_at: now,
            };
            TransactionRepository::insert_item(&mut tx, &item, line_no as i64).await?;
        }

        for (position, application) in vouchers.applications.iter().enumerate() {
            let row = TransactionVoucher {
                id: Uuid::new_v4().to_string(),
                transaction_id: transaction_id.clone(),
                voucher_id: application.voucher_id.clone(),
                voucher_name: application.voucher_name.clone(),
                voucher_type: application.voucher_type,
                applied_amount_cents: application.applied_amount.cents(),
                discount_amount_cents: application.discount_amount.cents(),
                created_at: now,
            };
            TransactionRepository::insert_voucher(&mut tx, &row, position as i64).await?;
        }

        // ---------------------------------------------------------------------
        advance(stage, SettlementStage::AdjustInventory, &transaction_id);
        let mut adjustments = Vec::new();
        for (product_id, quantity) in merge_quantities(lines) {
            let outcome = InventoryRepository::decrement(
                &mut tx,
                &location.id,
                product_id,
                quantity,
                ctx.config.default_reorder_level,
            )
            .await?;

            match outcome {
                StockDecrement::Applied(adjustment) => {
                    if adjustment.needs_reorder {
                        info!(
                            location_id = %adjustment.location_id,
                            product_id = %adjustment.product_id,
                            quantity = adjustment.quantity_after,
                            reorder_level = adjustment.reorder_level,
                            "Stock at or below reorder level"
                        );
                    }
                    adjustments.push(adjustment);
                }
                StockDecrement::Insufficient { available } => {
                    return Err(SettlementError::InsufficientStock {
                        product_id: product_id.to_string(),
                        available,
                        requested: quantity,
                    });
                }
            }
        }

        // ---------------------------------------------------------------------
        advance(stage, SettlementStage::AccrueLoyalty, &transaction_id);
        let mut tier_change = None;
        if let Some(customer_id) = customer_id {
            let customer = CustomerRepository::fetch(&mut tx, customer_id)
                .await?
                .ok_or_else(|| {
                    ValidationError::not_allowed("customer_id", format!("unknown customer {customer_id}"))
                })?;

            let before = LoyaltySnapshot::from(&customer);
            let accrual = loyalty::accrue(before, totals.total, request.points_redeemed)?;
            let assessment = ctx.tiers.assess(&accrual.after, customer.tier_override);

            let update = LoyaltyUpdate {
                after: accrual.after,
                tier: assessment.tier,
                tier_score: assessment.score.hundredths(),
            };
            if !CustomerRepository::apply_loyalty(&mut tx, customer_id, &before, &update).await? {
                return Err(SettlementError::conflict(format!(
                    "loyalty balance of customer {customer_id} changed concurrently"
                )));
            }

            let mut entries = Vec::new();
            if accrual.points_earned > 0 {
                entries.push(NewActivity::points_earned(customer_id, accrual.points_earned, &transaction_id));
            }
            if accrual.points_redeemed > 0 {
                entries.push(NewActivity::points_redeemed(
                    customer_id,
                    accrual.points_redeemed,
                    &transaction_id,
                ));
            }
            if assessment.tier != customer.customer_tier {
                info!(
                    customer_id,
                    from = %customer.customer_tier,
                    to = %assessment.tier,
                    "Customer tier changed"
                );
                tier_change = Some((customer.customer_tier, assessment.tier));
                entries.push(NewActivity::tier_change(
                    customer_id,
                    customer.customer_tier,
                    assessment.tier,
                    Some(&transaction_id),
                ));
            }
            ActivityLogRepository::log_best_effort(&mut tx, &entries).await;

            header.points_earned = accrual.points_earned;
            header.points_redeemed = accrual.points_redeemed;
        }

        // ---------------------------------------------------------------------
        advance(stage, SettlementStage::Commit, &transaction_id);
        TransactionRepository::finalize(&mut tx, &header).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            transaction_id = %transaction_id,
            location_id = %location.id,
            total = header.total_cents,
            items = lines.len(),
            vouchers = vouchers.applications.len(),
            points_earned = header.points_earned,
            "Transaction settled"
        );

        Ok(Committed {
            transaction_id,
            applied_vouchers: vouchers
                .applications
                .into_iter()
                .map(|application| application.voucher_id)
                .collect(),
            adjustments,
            tier_change,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn advance(stage: &mut SettlementStage, next: SettlementStage, transaction_id: &str) {
    debug!(transaction_id, from = %stage, to = %next, "Settlement stage");
    *stage = next;
}

/// Request checks that need no database.
fn validate_request(request: &SettleRequest) -> SettlementResult<Vec<CartLine>> {
    validate_required("location_id", &request.location_id)?;

    let lines = request.cart_lines();
    validate_cart(&lines)?;

    if let Some(customer_id) = request.customer_id.as_deref() {
        validate_required("customer_id", customer_id)?;
    }

    match request.discount {
        Some(ManualDiscount::Percentage { bps }) => validate_bps("discount", bps)?,
        Some(ManualDiscount::Fixed { amount }) => validate_non_negative_cents("discount", amount.cents())?,
        None => {}
    }

    if let Some(bps) = request.tax_rate_bps {
        validate_bps("tax_rate_bps", bps)?;
    }

    ensure_unique_claims(&request.vouchers)?;

    validate_points(request.points_redeemed)?;
    if request.points_redeemed > 0 && request.customer_id.is_none() {
        return Err(ValidationError::not_allowed("points_redeemed", "redeeming points requires a customer").into());
    }

    if let Some(received) = request.amount_received_cents {
        validate_non_negative_cents("amount_received", received)?;
    }

    if let Some(digits) = request.card_last_four.as_deref() {
        validate_card_last_four(digits)?;
    }

    if let Some(key) = request.idempotency_key.as_deref() {
        validate_required("idempotency_key", key)?;
    }

    Ok(lines)
}

/// Change owed on a cash sale; `None` for other tenders or when no amount
/// was recorded.
fn cash_change(request: &SettleRequest, total: Money) -> SettlementResult<Option<i64>> {
    match (request.payment_method, request.amount_received_cents) {
        (PaymentMethod::Cash, Some(received)) => {
            if received < total.cents() {
                return Err(CoreError::InvalidPaymentAmount {
                    reason: format!(
                        "received {} is less than total {}",
                        Money::from_cents(received),
                        total
                    ),
                }
                .into());
            }
            Ok(Some(received - total.cents()))
        }
        _ => Ok(None),
    }
}

fn check_declared_totals(request: &SettleRequest, computed: &Transaction) {
    let declared = [
        ("subtotal", request.subtotal_cents, computed.subtotal_cents),
        ("tax", request.tax_cents, computed.tax_cents),
        ("total", request.total_cents, computed.total_cents),
    ];

    for (field, declared, computed_cents) in declared {
        if let Some(declared) = declared {
            if declared != computed_cents {
                warn!(
                    transaction_id = %computed.id,
                    field,
                    declared,
                    computed = computed_cents,
                    "Declared amount differs from computed amount; using computed"
                );
            }
        }
    }
}

/// Total quantity per product, in first-seen order.
fn merge_quantities(lines: &[CartLine]) -> Vec<(&str, i64)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut merged: Vec<(&str, i64)> = Vec::new();

    for line in lines {
        match index.get(line.product_id.as_str()) {
            Some(&i) => merged[i].1 += line.quantity,
            None => {
                index.insert(&line.product_id, merged.len());
                merged.push((&line.product_id, line.quantity));
            }
        }
    }

    merged
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: &str, price: i64, qty: i64) -> SettleItem {
        SettleItem {
            product_id: product_id.to_string(),
            name: format!("Item {product_id}"),
            unit_price_cents: price,
            quantity: qty,
        }
    }

    fn request(items: Vec<SettleItem>) -> SettleRequest {
        SettleRequest {
            location_id: "loc-1".to_string(),
            customer_id: None,
            items,
            payment_method: PaymentMethod::Card,
            subtotal_cents: None,
            tax_cents: None,
            total_cents: None,
            discount: None,
            discount_reason: None,
            tax_rate_bps: None,
            points_redeemed: 0,
            amount_received_cents: None,
            card_last_four: None,
            card_type: None,
            payment_reference: None,
            vouchers: Vec::new(),
            idempotency_key: None,
        }
    }

    #[test]
    fn test_merge_quantities_keeps_first_seen_order() {
        let lines = request(vec![item("b", 100, 1), item("a", 100, 2), item("b", 150, 3)]).cart_lines();
        assert_eq!(merge_quantities(&lines), vec![("b", 4), ("a", 2)]);
    }

    #[test]
    fn test_validation_rejects_bad_requests() {
        assert!(validate_request(&request(vec![])).is_err());
        assert!(validate_request(&request(vec![item("p", 100, 0)])).is_err());
        assert!(validate_request(&request(vec![item("p", -1, 1)])).is_err());

        let mut r = request(vec![item("p", 100, 1)]);
        r.tax_rate_bps = Some(10_001);
        assert!(validate_request(&r).is_err());

        let mut r = request(vec![item("p", 100, 1)]);
        r.points_redeemed = 10;
        assert!(matches!(validate_request(&r), Err(SettlementError::Validation(_))));

        let mut r = request(vec![item("p", 100, 1)]);
        r.vouchers = vec![
            VoucherClaim {
                voucher_id: "v-1".to_string(),
                requested_amount: None,
            },
            VoucherClaim {
                voucher_id: "v-1".to_string(),
                requested_amount: None,
            },
        ];
        assert!(validate_request(&r).is_err());

        let mut r = request(vec![item("p", 100, 1)]);
        r.card_last_four = Some("12a4".to_string());
        assert!(validate_request(&r).is_err());

        let mut r = request(vec![item("p", 100, 1)]);
        r.discount = Some(ManualDiscount::Percentage { bps: 20_000 });
        assert!(validate_request(&r).is_err());

        assert!(validate_request(&request(vec![item("p", 100, 1)])).is_ok());
    }

    #[test]
    fn test_cash_change() {
        let mut r = request(vec![item("p", 100, 1)]);
        r.payment_method = PaymentMethod::Cash;
        r.amount_received_cents = Some(10_000);
        assert_eq!(cash_change(&r, Money::from_cents(9_234)).unwrap(), Some(766));

        r.amount_received_cents = Some(9_000);
        assert!(matches!(
            cash_change(&r, Money::from_cents(9_234)),
            Err(SettlementError::Validation(_))
        ));

        r.amount_received_cents = None;
        assert_eq!(cash_change(&r, Money::from_cents(9_234)).unwrap(), None);

        r.payment_method = PaymentMethod::Card;
        r.amount_received_cents = Some(1);
        assert_eq!(cash_change(&r, Money::from_cents(9_234)).unwrap(), None);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = r#"{
            "location_id": "loc-1",
            "items": [{"product_id": "p-1", "name": "Beans", "unit_price_cents": 1000, "quantity": 2}],
            "payment_method": "cash",
            "discount": {"type": "percentage", "bps": 1000},
            "vouchers": [{"voucher_id": "v-1"}]
        }"#;
        let parsed: SettleRequest = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.payment_method, PaymentMethod::Cash);
        assert_eq!(parsed.discount, Some(ManualDiscount::Percentage { bps: 1000 }));
        assert_eq!(parsed.points_redeemed, 0);
        assert_eq!(parsed.vouchers[0].requested_amount, None);
        assert!(parsed.idempotency_key.is_none());
    }
}
