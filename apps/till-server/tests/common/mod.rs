#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use till_core::{
    Customer, CustomerTier, Location, Money, PaymentMethod, Voucher, VoucherClaim, VoucherKind,
    VoucherStatus,
};
use till_db::{Database, DbConfig};
use till_server::{SettleItem, SettleRequest};
use till_sync::{SyncError, SyncResult, VoucherRedemptionNotifier};

pub const LOCATION_ID: &str = "loc-1";
pub const CUSTOMER_ID: &str = "cust-1";

pub async fn memory_db() -> Database {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    seed(&db).await;
    db
}

/// File-backed database; needed when two settlements must hold separate connections.
pub async fn file_db(path: &Path) -> Database {
    let db = Database::new(DbConfig::new(path.join("till.db"))).await.unwrap();
    seed(&db).await;
    db
}

async fn seed(db: &Database) {
    db.locations()
        .insert(&Location {
            id: LOCATION_ID.to_string(),
            store_name: "Harbour Street".to_string(),
            store_code: "HS01".to_string(),
            tax_rate_bps: 800,
            is_active: true,
        })
        .await
        .unwrap();
    db.customers().insert(&customer(CUSTOMER_ID, 100)).await.unwrap();
}

pub fn customer(id: &str, points: i64) -> Customer {
    let now = Utc::now();
    Customer {
        id: id.to_string(),
        loyalty_number: format!("LN-{id}"),
        name: "Dana Member".to_string(),
        email: None,
        points,
        total_spent_cents: 0,
        visit_count: 0,
        customer_tier: CustomerTier::Bronze,
        tier_score: 0,
        tier_override: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn discount_voucher(id: &str, bps: u32) -> Voucher {
    Voucher {
        id: id.to_string(),
        customer_id: None,
        name: format!("{} percent off", bps / 100),
        status: VoucherStatus::Issued,
        is_active: true,
        expiration_date: None,
        kind: VoucherKind::Discount { bps },
    }
}

pub fn value_voucher(id: &str, cents: i64) -> Voucher {
    Voucher {
        name: "Gift card".to_string(),
        kind: VoucherKind::Value {
            face_value: Money::from_cents(cents),
            remaining_value: Money::from_cents(cents),
        },
        ..discount_voucher(id, 0)
    }
}

pub fn item(product_id: &str, unit_price_cents: i64, quantity: i64) -> SettleItem {
    SettleItem {
        product_id: product_id.to_string(),
        name: format!("Product {product_id}"),
        unit_price_cents,
        quantity,
    }
}

pub fn claim(voucher_id: &str) -> VoucherClaim {
    VoucherClaim {
        voucher_id: voucher_id.to_string(),
        requested_amount: None,
    }
}

pub fn sale(items: Vec<SettleItem>) -> SettleRequest {
    SettleRequest {
        location_id: LOCATION_ID.to_string(),
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
        card_last_four: Some("4242".to_string()),
        card_type: Some("visa".to_string()),
        payment_reference: None,
        vouchers: Vec::new(),
        idempotency_key: None,
    }
}

/// Records every redemption; fails all of them when `fail` is set.
#[derive(Default)]
pub struct RecordingNotifier {
    pub seen: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Arc<Self> {
        Arc::new(RecordingNotifier {
            seen: Mutex::new(Vec::new()),
            fail: true,
        })
    }
}

#[async_trait]
impl VoucherRedemptionNotifier for RecordingNotifier {
    async fn voucher_redeemed(&self, voucher_id: &str) -> SyncResult<()> {
        self.seen.lock().await.push(voucher_id.to_string());
        if self.fail {
            return Err(SyncError::ExternalSyncFailure {
                voucher_id: voucher_id.to_string(),
                status: 503,
            });
        }
        Ok(())
    }
}
