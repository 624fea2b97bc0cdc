//! # Transaction Repository
//!
//! Transaction header, items and applied vouchers.
//!
//! ## Write Order Inside a Settlement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                 │
//! │    insert_header()   ← zero totals; takes SQLite's write lock first    │
//! │    insert_item()     × N   (line_no keeps cart order)                  │
//! │    insert_voucher()  × M   (position keeps claim order)                │
//! │    ... inventory, vouchers, loyalty ...                                │
//! │    finalize()        ← computed totals and points                      │
//! │  COMMIT                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Totals are written last so that the header row never carries numbers
//! that were not actually settled.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use till_core::{Transaction, TransactionItem, TransactionVoucher};

const TRANSACTION_COLUMNS: &str = r#"
    id, customer_id, location_id,
    subtotal_cents, discount_cents, discount_kind, discount_reason,
    voucher_discount_cents, tax_rate_bps, tax_cents, total_cents,
    payment_method, amount_received_cents, change_cents,
    card_last_four, card_type, payment_reference,
    points_earned, points_redeemed, idempotency_key, order_id, created_at
"#;

/// Repository for settled transactions.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Transaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1");
        let transaction = sqlx::query_as::<_, Transaction>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(transaction)
    }

    /// Finds the transaction previously settled under `key`.
    pub async fn find_by_idempotency_key(&self, key: &str) -> DbResult<Option<Transaction>> {
        let sql =
            format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE idempotency_key = ?1");
        let transaction = sqlx::query_as::<_, Transaction>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(transaction)
    }

    /// Items in cart order.
    pub async fn get_items(&self, transaction_id: &str) -> DbResult<Vec<TransactionItem>> {
        let items = sqlx::query_as::<_, TransactionItem>(
            r#"
            SELECT id, transaction_id, product_id, name,
                   unit_price_cents, quantity, line_subtotal_cents, created_at
            FROM transaction_items
            WHERE transaction_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Applied vouchers in the order they were claimed.
    pub async fn get_vouchers(&self, transaction_id: &str) -> DbResult<Vec<TransactionVoucher>> {
        let vouchers = sqlx::query_as::<_, TransactionVoucher>(
            r#"
            SELECT id, transaction_id, voucher_id, voucher_name, voucher_type,
                   applied_amount_cents, discount_amount_cents, created_at
            FROM transaction_vouchers
            WHERE transaction_id = ?1
            ORDER BY position
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(vouchers)
    }

    /// Most recent transactions for a member, newest first.
    pub async fn list_for_customer(&self, customer_id: &str, limit: u32) -> DbResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE customer_id = ?1 ORDER BY created_at DESC LIMIT ?2"
        );
        let transactions = sqlx::query_as::<_, Transaction>(&sql)
            .bind(customer_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(transactions)
    }

    /// Links a settled transaction to an order, once.
    ///
    /// Fails with `NotFound` when the transaction does not exist or is
    /// already linked to an order.
    pub async fn link_order(&self, transaction_id: &str, order_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE transactions SET order_id = ?2 WHERE id = ?1 AND order_id IS NULL",
        )
        .bind(transaction_id)
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Transaction (unlinked)", transaction_id));
        }

        debug!(transaction_id, order_id, "Linked transaction to order");
        Ok(())
    }

    // =========================================================================
    // In-transaction writes
    // =========================================================================

    /// Inserts the header row. Totals on `header` are expected to be zero
    /// and are filled in by [`finalize`](Self::finalize).
    pub async fn insert_header(conn: &mut SqliteConnection, header: &Transaction) -> DbResult<()> {
        debug!(id = %header.id, location_id = %header.location_id, "Inserting transaction header");

        let sql = format!(
            "INSERT INTO transactions ({TRANSACTION_COLUMNS}) VALUES (\
             ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, \
             ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)"
        );

        sqlx::query(&sql)
            .bind(&header.id)
            .bind(&header.customer_id)
            .bind(&header.location_id)
            .bind(header.subtotal_cents)
            .bind(header.discount_cents)
            .bind(header.discount_kind)
            .bind(&header.discount_reason)
            .bind(header.voucher_discount_cents)
            .bind(header.tax_rate_bps)
            .bind(header.tax_cents)
            .bind(header.total_cents)
            .bind(header.payment_method)
            .bind(header.amount_received_cents)
            .bind(header.change_cents)
            .bind(&header.card_last_four)
            .bind(&header.card_type)
            .bind(&header.payment_reference)
            .bind(header.points_earned)
            .bind(header.points_redeemed)
            .bind(&header.idempotency_key)
            .bind(&header.order_id)
            .bind(header.created_at)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Writes the settled totals, discount details, cash change and points.
    pub async fn finalize(conn: &mut SqliteConnection, settled: &Transaction) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions SET
                subtotal_cents = ?2,
                discount_cents = ?3,
                discount_kind = ?4,
                discount_reason = ?5,
                voucher_discount_cents = ?6,
                tax_rate_bps = ?7,
                tax_cents = ?8,
                total_cents = ?9,
                change_cents = ?10,
                points_earned = ?11,
                points_redeemed = ?12
            WHERE id = ?1
            "#,
        )
        .bind(&settled.id)
        .bind(settled.subtotal_cents)
        .bind(settled.discount_cents)
        .bind(settled.discount_kind)
        .bind(&settled.discount_reason)
        .bind(settled.voucher_discount_cents)
        .bind(settled.tax_rate_bps)
        .bind(settled.tax_cents)
        .bind(settled.total_cents)
        .bind(settled.change_cents)
        .bind(settled.points_earned)
        .bind(settled.points_redeemed)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Transaction", &settled.id));
        }

        Ok(())
    }

    pub async fn insert_item(
        conn: &mut SqliteConnection,
        item: &TransactionItem,
        line_no: i64,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transaction_items (
                id, transaction_id, product_id, name,
                unit_price_cents, quantity, line_subtotal_cents, line_no, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&item.id)
        .bind(&item.transaction_id)
        .bind(&item.product_id)
        .bind(&item.name)
        .bind(item.unit_price_cents)
        .bind(item.quantity)
        .bind(item.line_subtotal_cents)
        .bind(line_no)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_voucher(
        conn: &mut SqliteConnection,
        voucher: &TransactionVoucher,
        position: i64,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transaction_vouchers (
                id, transaction_id, voucher_id, voucher_name, voucher_type,
                applied_amount_cents, discount_amount_cents, position, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&voucher.id)
        .bind(&voucher.transaction_id)
        .bind(&voucher.voucher_id)
        .bind(&voucher.voucher_name)
        .bind(voucher.voucher_type)
        .bind(voucher.applied_amount_cents)
        .bind(voucher.discount_amount_cents)
        .bind(position)
        .bind(voucher.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{seeded_db, CUSTOMER_ID, LOCATION_ID};
    use chrono::Utc;
    use till_core::{PaymentMethod, VoucherType};

    fn header(id: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            customer_id: Some(CUSTOMER_ID.to_string()),
            location_id: LOCATION_ID.to_string(),
            subtotal_cents: 0,
            discount_cents: 0,
            discount_kind: None,
            discount_reason: None,
            voucher_discount_cents: 0,
            tax_rate_bps: 0,
            tax_cents: 0,
            total_cents: 0,
            payment_method: PaymentMethod::Card,
            amount_received_cents: None,
            change_cents: None,
            card_last_four: Some("4242".to_string()),
            card_type: Some("visa".to_string()),
            payment_reference: None,
            points_earned: 0,
            points_redeemed: 0,
            idempotency_key: Some(format!("key-{id}")),
            order_id: None,
            created_at: Utc::now(),
        }
    }

    fn item(transaction_id: &str, product_id: &str, price: i64, qty: i64) -> TransactionItem {
        TransactionItem {
            id: uuid::Uuid::new_v4().to_string(),
            transaction_id: transaction_id.to_string(),
            product_id: product_id.to_string(),
            name: product_id.to_uppercase(),
            unit_price_cents: price,
            quantity: qty,
            line_subtotal_cents: price * qty,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_header_items_and_finalize() {
        let db = seeded_db().await;
        let mut tx = db.begin().await.unwrap();

        TransactionRepository::insert_header(&mut tx, &header("t-1")).await.unwrap();
        // inserted out of id order; line_no decides the read order
        TransactionRepository::insert_item(&mut tx, &item("t-1", "p-b", 500, 2), 0)
            .await
            .unwrap();
        TransactionRepository::insert_item(&mut tx, &item("t-1", "p-a", 300, 1), 1)
            .await
            .unwrap();

        let mut settled = header("t-1");
        settled.subtotal_cents = 1300;
        settled.discount_cents = 100;
        settled.tax_rate_bps = 800;
        settled.tax_cents = 96;
        settled.total_cents = 1296;
        settled.points_earned = 12;
        TransactionRepository::finalize(&mut tx, &settled).await.unwrap();
        tx.commit().await.unwrap();

        let repo = db.transactions();
        let stored = repo.get_by_id("t-1").await.unwrap().unwrap();
        assert_eq!(stored.total_cents, 1296);
        assert_eq!(stored.points_earned, 12);
        assert_eq!(stored.card_last_four.as_deref(), Some("4242"));

        let items = repo.get_items("t-1").await.unwrap();
        let products: Vec<_> = items.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(products, vec!["p-b", "p-a"]);

        let by_key = repo.find_by_idempotency_key("key-t-1").await.unwrap().unwrap();
        assert_eq!(by_key.id, "t-1");
    }

    #[tokio::test]
    async fn test_inconsistent_totals_are_rejected() {
        let db = seeded_db().await;
        let mut tx = db.begin().await.unwrap();
        TransactionRepository::insert_header(&mut tx, &header("t-1")).await.unwrap();

        let mut settled = header("t-1");
        settled.subtotal_cents = 1000;
        settled.total_cents = 900;
        let err = TransactionRepository::finalize(&mut tx, &settled).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }

    #[tokio::test]
    async fn test_rollback_leaves_nothing() {
        let db = seeded_db().await;
        {
            let mut tx = db.begin().await.unwrap();
            TransactionRepository::insert_header(&mut tx, &header("t-1")).await.unwrap();
            TransactionRepository::insert_item(&mut tx, &item("t-1", "p-a", 300, 1), 0)
                .await
                .unwrap();
            // dropped without commit
        }

        assert!(db.transactions().get_by_id("t-1").await.unwrap().is_none());
        assert!(db.transactions().get_items("t-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_voucher_twice_on_one_transaction_fails() {
        let db = seeded_db().await;
        db.vouchers()
            .insert(&crate::repository::test_support::discount_voucher("v-1", 1000))
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        TransactionRepository::insert_header(&mut tx, &header("t-1")).await.unwrap();

        let applied = |id: &str| TransactionVoucher {
            id: id.to_string(),
            transaction_id: "t-1".to_string(),
            voucher_id: "v-1".to_string(),
            voucher_name: "Ten off".to_string(),
            voucher_type: VoucherType::Discount,
            applied_amount_cents: 100,
            discount_amount_cents: 100,
            created_at: Utc::now(),
        };
        TransactionRepository::insert_voucher(&mut tx, &applied("tv-1"), 0)
            .await
            .unwrap();
        let err = TransactionRepository::insert_voucher(&mut tx, &applied("tv-2"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_link_order_only_once() {
        let db = seeded_db().await;
        let mut tx = db.begin().await.unwrap();
        TransactionRepository::insert_header(&mut tx, &header("t-1")).await.unwrap();
        tx.commit().await.unwrap();

        let repo = db.transactions();
        repo.link_order("t-1", "order-9").await.unwrap();
        assert!(repo.link_order("t-1", "order-10").await.is_err());
        assert_eq!(
            repo.get_by_id("t-1").await.unwrap().unwrap().order_id.as_deref(),
            Some("order-9")
        );

        let listed = repo.list_for_customer(CUSTOMER_ID, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
