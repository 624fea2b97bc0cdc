//! # Repository Module
//!
//! Database repositories for the settlement engine.
//!
//! ## Two Kinds of Calls
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Pool reads (&self)                 In-transaction calls (conn)        │
//! │  ─────────────────────              ──────────────────────────────     │
//! │  db.transactions().get_by_id(id)    TransactionRepository::            │
//! │  db.inventory().low_stock(loc)          insert_header(&mut tx, ..)     │
//! │  db.customers().get_by_id(id)       InventoryRepository::              │
//! │                                         decrement(&mut tx, ..)         │
//! │  Each call takes its own pooled     Every statement runs on the       │
//! │  connection and sees committed      caller's connection, inside the   │
//! │  data only.                         caller's unit of work.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Conditional updates (`draw_down`, `decrement`, `apply_loyalty`) report
//! whether their guard matched instead of failing, so the caller decides
//! which domain error to raise.
//!
//! ## Available Repositories
//!
//! - [`TransactionRepository`] - Transaction header, items, vouchers
//! - [`VoucherRepository`] - Voucher rows and consumption
//! - [`InventoryRepository`] - Per-location stock
//! - [`CustomerRepository`] - Loyalty balances and tier
//! - [`ActivityLogRepository`] - Customer activity log
//! - [`LocationRepository`] - Store lookup
//! - [`SettingsRepository`] - Key/value system settings

pub mod activity;
pub mod customer;
pub mod inventory;
pub mod location;
pub mod settings;
pub mod transaction;
pub mod voucher;

pub use activity::{ActivityLogRepository, NewActivity};
pub use customer::{CustomerRepository, LoyaltyUpdate};
pub use inventory::{InventoryAdjustment, InventoryRepository, StockDecrement};
pub use location::LocationRepository;
pub use settings::SettingsRepository;
pub use transaction::TransactionRepository;
pub use voucher::VoucherRepository;

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use till_core::{Customer, CustomerTier, Location, Money, Voucher, VoucherKind, VoucherStatus};

    use crate::{Database, DbConfig};

    pub const LOCATION_ID: &str = "loc-1";
    pub const CUSTOMER_ID: &str = "cust-1";

    /// In-memory database with one location and one customer.
    pub async fn seeded_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.locations()
            .insert(&Location {
                id: LOCATION_ID.to_string(),
                store_name: "Downtown".to_string(),
                store_code: "DT".to_string(),
                tax_rate_bps: 800,
                is_active: true,
            })
            .await
            .unwrap();
        db.customers().insert(&customer(CUSTOMER_ID, 100)).await.unwrap();
        db
    }

    pub fn discount_voucher(id: &str, bps: u32) -> Voucher {
        Voucher {
            id: id.to_string(),
            customer_id: None,
            name: format!("Discount {id}"),
            status: VoucherStatus::Issued,
            is_active: true,
            expiration_date: None,
            kind: VoucherKind::Discount { bps },
        }
    }

    pub fn value_voucher(id: &str, cents: i64) -> Voucher {
        Voucher {
            kind: VoucherKind::Value {
                face_value: Money::from_cents(cents),
                remaining_value: Money::from_cents(cents),
            },
            ..discount_voucher(id, 0)
        }
    }

    pub fn customer(id: &str, points: i64) -> Customer {
        let now = Utc::now();
        Customer {
            id: id.to_string(),
            loyalty_number: format!("LN-{id}"),
            name: "Test Member".to_string(),
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
}
