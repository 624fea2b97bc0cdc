//! HTTP routes.
//!
//! ```text
//! POST /api/transactions                       settle a cart
//! GET  /api/transactions/{id}                  receipt
//! POST /api/transactions/{id}/order            link an online order
//! POST /api/customers/{id}/tier/recalculate    recompute tier from balances
//! GET  /api/locations/{id}/low-stock           rows at or below reorder level
//! GET  /health
//! ```

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use till_core::loyalty::TierPolicy;
use till_core::validation::{validate_required, validate_uuid};
use till_core::voucher::EligibilityPolicy;
use till_core::{CustomerTier, LocationInventory};
use till_db::Database;

use crate::error::ApiError;
use crate::settlement::{
    SettleRequest, SettlementConfig, SettlementContext, TransactionReceipt, TransactionWriter,
};

/// Shared application state.
pub struct AppState {
    pub db: Database,
    pub writer: TransactionWriter,
    pub settlement: SettlementConfig,
    pub eligibility: Arc<dyn EligibilityPolicy>,
    pub tiers: TierPolicy,
}

impl AppState {
    /// Context for one request; the business date is taken per call.
    fn context(&self) -> SettlementContext {
        SettlementContext::new(self.settlement)
            .with_eligibility(self.eligibility.clone())
            .with_tiers(self.tiers.clone())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/transactions", post(settle_transaction))
        .route("/api/transactions/{id}", get(get_transaction))
        .route("/api/transactions/{id}/order", post(link_order))
        .route("/api/customers/{id}/tier/recalculate", post(recalculate_tier))
        .route("/api/locations/{id}/low-stock", get(low_stock))
        .route("/health", get(health))
        .with_state(state)
}

// =============================================================================
// Transactions
// =============================================================================

/// 201 for a new sale, 200 when an idempotency key replays an earlier one.
async fn settle_transaction(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SettleRequest>,
) -> Result<(StatusCode, Json<TransactionReceipt>), ApiError> {
    let settlement = state.writer.settle(&state.context(), request).await?;

    let status = if settlement.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(settlement.receipt)))
}

async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TransactionReceipt>, ApiError> {
    validate_uuid("id", &id)?;

    state
        .writer
        .receipt(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Transaction", &id))
}

#[derive(Debug, Deserialize)]
struct LinkOrder {
    order_id: String,
}

async fn link_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<LinkOrder>,
) -> Result<StatusCode, ApiError> {
    validate_uuid("id", &id)?;
    validate_required("order_id", &body.order_id)?;

    state.db.transactions().link_order(&id, &body.order_id).await?;
    info!(transaction_id = %id, order_id = %body.order_id, "Order linked");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Customers & Locations
// =============================================================================

#[derive(Debug, Serialize)]
struct TierRecalculation {
    customer_id: String,
    tier: CustomerTier,
    computed_tier: CustomerTier,
    /// Hundredths of a point.
    tier_score: i64,
}

async fn recalculate_tier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TierRecalculation>, ApiError> {
    let assessment = state.db.customers().recalculate_tier(&id, &state.tiers).await?;

    Ok(Json(TierRecalculation {
        customer_id: id,
        tier: assessment.tier,
        computed_tier: assessment.computed_tier,
        tier_score: assessment.score.hundredths(),
    }))
}

async fn low_stock(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<LocationInventory>>, ApiError> {
    if state.db.locations().get_by_id(&id).await?.is_none() {
        return Err(ApiError::not_found("Location", &id));
    }
    Ok(Json(state.db.inventory().low_stock(&id).await?))
}

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    database: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Health>) {
    let database = state.db.health_check().await;
    let (status, label) = if database {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (status, Json(Health { status: label, database }))
}
