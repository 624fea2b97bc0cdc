//! # Inventory Repository
//!
//! Per-location stock. Each `(location_id, product_id)` row is the only
//! record of stock; product-wide figures are sums over these rows.
//!
//! ## Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. INSERT ... ON CONFLICT DO NOTHING                                  │
//! │     (quantity 0, reorder_level = configured default)                   │
//! │                                                                         │
//! │  2. UPDATE location_inventory SET quantity = quantity - sold           │
//! │     WHERE quantity - reserved_quantity >= sold                         │
//! │     RETURNING *                                                        │
//! │          │                                                              │
//! │          ├── row returned  → StockDecrement::Applied                   │
//! │          └── no row        → StockDecrement::Insufficient { available }│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use till_core::LocationInventory;

const INVENTORY_COLUMNS: &str =
    "id, location_id, product_id, quantity, reserved_quantity, reorder_level, updated_at";

/// Stock movement for one product on one sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryAdjustment {
    pub location_id: String,
    pub product_id: String,
    pub quantity_sold: i64,
    pub quantity_after: i64,
    pub reorder_level: i64,
    /// `quantity_after <= reorder_level`
    pub needs_reorder: bool,
}

impl From<(&LocationInventory, i64)> for InventoryAdjustment {
    fn from((row, sold): (&LocationInventory, i64)) -> Self {
        InventoryAdjustment {
            location_id: row.location_id.clone(),
            product_id: row.product_id.clone(),
            quantity_sold: sold,
            quantity_after: row.quantity,
            reorder_level: row.reorder_level,
            needs_reorder: row.needs_reorder(),
        }
    }
}

/// Outcome of a conditional decrement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockDecrement {
    Applied(InventoryAdjustment),
    /// Not enough sellable stock; nothing was changed.
    Insufficient { available: i64 },
}

/// Repository for per-location inventory.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    pub async fn get(&self, location_id: &str, product_id: &str) -> DbResult<Option<LocationInventory>> {
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM location_inventory \
             WHERE location_id = ?1 AND product_id = ?2"
        );
        let row = sqlx::query_as::<_, LocationInventory>(&sql)
            .bind(location_id)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Units of `product_id` on hand across every location.
    pub async fn total_on_hand(&self, product_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM location_inventory WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    /// Rows at or below their reorder level, lowest stock first.
    pub async fn low_stock(&self, location_id: &str) -> DbResult<Vec<LocationInventory>> {
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM location_inventory \
             WHERE location_id = ?1 AND quantity <= reorder_level \
             ORDER BY quantity, product_id"
        );
        let rows = sqlx::query_as::<_, LocationInventory>(&sql)
            .bind(location_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Sets the on-hand quantity, creating the row if needed (receiving
    /// stock, seeding, tests).
    pub async fn set_stock(
        &self,
        location_id: &str,
        product_id: &str,
        quantity: i64,
        reorder_level: i64,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO location_inventory (
                id, location_id, product_id, quantity, reserved_quantity, reorder_level, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)
            ON CONFLICT (location_id, product_id) DO UPDATE SET
                quantity = excluded.quantity,
                reorder_level = excluded.reorder_level,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(location_id)
        .bind(product_id)
        .bind(quantity)
        .bind(reorder_level)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Holds units for a pending order; they stop being sellable.
    pub async fn set_reserved(&self, location_id: &str, product_id: &str, reserved: i64) -> DbResult<()> {
        sqlx::query(
            "UPDATE location_inventory SET reserved_quantity = ?3, updated_at = ?4 \
             WHERE location_id = ?1 AND product_id = ?2",
        )
        .bind(location_id)
        .bind(product_id)
        .bind(reserved)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // In-transaction calls
    // =========================================================================

    /// Creates an empty row for the pair if there is none.
    pub async fn ensure_row(
        conn: &mut SqliteConnection,
        location_id: &str,
        product_id: &str,
        default_reorder_level: i64,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO location_inventory (
                id, location_id, product_id, quantity, reserved_quantity, reorder_level, updated_at
            ) VALUES (?1, ?2, ?3, 0, 0, ?4, ?5)
            ON CONFLICT (location_id, product_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(location_id)
        .bind(product_id)
        .bind(default_reorder_level)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Takes `quantity` units off the sellable stock of one product.
    pub async fn decrement(
        conn: &mut SqliteConnection,
        location_id: &str,
        product_id: &str,
        quantity: i64,
        default_reorder_level: i64,
    ) -> DbResult<StockDecrement> {
        Self::ensure_row(conn, location_id, product_id, default_reorder_level).await?;

        let sql = format!(
            "UPDATE location_inventory SET quantity = quantity - ?3, updated_at = ?4 \
             WHERE location_id = ?1 AND product_id = ?2 \
               AND quantity - reserved_quantity >= ?3 \
             RETURNING {INVENTORY_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, LocationInventory>(&sql)
            .bind(location_id)
            .bind(product_id)
            .bind(quantity)
            .bind(Utc::now())
            .fetch_optional(&mut *conn)
            .await?;

        if let Some(row) = updated {
            debug!(
                location_id,
                product_id,
                sold = quantity,
                remaining = row.quantity,
                "Stock decremented"
            );
            return Ok(StockDecrement::Applied(InventoryAdjustment::from((&row, quantity))));
        }

        let available: i64 = sqlx::query_scalar(
            "SELECT quantity - reserved_quantity FROM location_inventory \
             WHERE location_id = ?1 AND product_id = ?2",
        )
        .bind(location_id)
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(StockDecrement::Insufficient {
            available: available.max(0),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
