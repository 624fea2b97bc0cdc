//! # Voucher Repository
//!
//! Reads the authoritative voucher row and consumes it with a conditional
//! update. Eligibility itself is decided in `till_core::voucher`.
//!
//! ## Consumption
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Value voucher     draw_down(id, amount)                               │
//! │                    WHERE status = 'issued'                             │
//! │                      AND remaining_value_cents >= amount               │
//! │                    remaining hits 0  →  status = 'redeemed'            │
//! │                                                                         │
//! │  Other vouchers    redeem(id)                                          │
//! │                    WHERE status = 'issued'  →  status = 'redeemed'     │
//! │                                                                         │
//! │  0 rows affected   →  a concurrent settlement got there first          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use till_core::money::Money;
use till_core::voucher::{ProductBenefit, Voucher, VoucherKind, VoucherStatus};
use till_core::VoucherType;

const SELECT_VOUCHER: &str = r#"
    SELECT id, customer_id, name, voucher_type, status, is_active, expiration_date,
           face_value_cents, remaining_value_cents, discount_bps, product_id
    FROM customer_vouchers
    WHERE id = ?1
"#;

/// Flat `customer_vouchers` row; converted into [`Voucher`].
#[derive(Debug, Clone, sqlx::FromRow)]
struct VoucherRow {
    id: String,
    customer_id: Option<String>,
    name: String,
    voucher_type: VoucherType,
    status: VoucherStatus,
    is_active: bool,
    expiration_date: Option<NaiveDate>,
    face_value_cents: Option<i64>,
    remaining_value_cents: Option<i64>,
    discount_bps: Option<i64>,
    product_id: Option<String>,
}

fn bps_from_column(id: &str, bps: i64) -> DbResult<u32> {
    if (0..=10_000).contains(&bps) {
        Ok(bps as u32)
    } else {
        Err(DbError::corrupt("Voucher", id, format!("discount_bps {bps} out of range")))
    }
}

impl TryFrom<VoucherRow> for Voucher {
    type Error = DbError;

    fn try_from(row: VoucherRow) -> DbResult<Self> {
        let missing = |column: &str| DbError::corrupt("Voucher", &row.id, format!("{column} is NULL"));

        let kind = match row.voucher_type {
            VoucherType::Value => {
                let remaining = row
                    .remaining_value_cents
                    .ok_or_else(|| missing("remaining_value_cents"))?;
                VoucherKind::Value {
                    face_value: Money::from_cents(row.face_value_cents.unwrap_or(remaining)),
                    remaining_value: Money::from_cents(remaining),
                }
            }
            VoucherType::Discount => {
                let bps = row.discount_bps.ok_or_else(|| missing("discount_bps"))?;
                VoucherKind::Discount {
                    bps: bps_from_column(&row.id, bps)?,
                }
            }
            VoucherType::ProductSpecific => {
                let product_id = row.product_id.clone().ok_or_else(|| missing("product_id"))?;
                let benefit = match (row.discount_bps, row.face_value_cents) {
                    (Some(bps), _) => ProductBenefit::Percent {
                        bps: bps_from_column(&row.id, bps)?,
                    },
                    (None, Some(cents)) => ProductBenefit::FaceValue {
                        amount: Money::from_cents(cents),
                    },
                    (None, None) => return Err(missing("discount_bps and face_value_cents")),
                };
                VoucherKind::ProductSpecific { product_id, benefit }
            }
        };

        Ok(Voucher {
            id: row.id,
            customer_id: row.customer_id,
            name: row.name,
            status: row.status,
            is_active: row.is_active,
            expiration_date: row.expiration_date,
            kind,
        })
    }
}

/// Repository for voucher rows.
#[derive(Debug, Clone)]
pub struct VoucherRepository {
    pool: SqlitePool,
}

impl VoucherRepository {
    pub fn new(pool: SqlitePool) -> Self {
        VoucherRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Voucher>> {
        let row = sqlx::query_as::<_, VoucherRow>(SELECT_VOUCHER)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Voucher::try_from).transpose()
    }

    /// Issues a voucher (voucher management, seeding, tests).
    pub async fn insert(&self, voucher: &Voucher) -> DbResult<()> {
        let (face_value, remaining, bps, product_id) = match &voucher.kind {
            VoucherKind::Value {
                face_value,
                remaining_value,
            } => (Some(face_value.cents()), Some(remaining_value.cents()), None, None),
            VoucherKind::Discount { bps } => (None, None, Some(*bps as i64), None),
            VoucherKind::ProductSpecific { product_id, benefit } => match benefit {
                ProductBenefit::Percent { bps } => (None, None, Some(*bps as i64), Some(product_id.clone())),
                ProductBenefit::FaceValue { amount } => {
                    (Some(amount.cents()), None, None, Some(product_id.clone()))
                }
            },
        };
        let now = Utc::now();

        debug!(id = %voucher.id, voucher_type = ?voucher.kind.voucher_type(), "Inserting voucher");

        sqlx::query(
            r#"
            INSERT INTO customer_vouchers (
                id, customer_id, name, voucher_type, status, is_active, expiration_date,
                face_value_cents, remaining_value_cents, discount_bps, product_id,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            "#,
        )
        .bind(&voucher.id)
        .bind(&voucher.customer_id)
        .bind(&voucher.name)
        .bind(voucher.kind.voucher_type())
        .bind(voucher.status)
        .bind(voucher.is_active)
        .bind(voucher.expiration_date)
        .bind(face_value)
        .bind(remaining)
        .bind(bps)
        .bind(product_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // In-transaction calls
    // =========================================================================

    /// Reads the voucher inside the caller's transaction.
    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Voucher>> {
        let row = sqlx::query_as::<_, VoucherRow>(SELECT_VOUCHER)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(Voucher::try_from).transpose()
    }

    /// Draws `amount` from a Value voucher's balance, marking it redeemed
    /// when the balance reaches zero.
    ///
    /// Returns `false` when the voucher is no longer issued or no longer
    /// holds `amount`.
    pub async fn draw_down(conn: &mut SqliteConnection, id: &str, amount: Money) -> DbResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE customer_vouchers SET
                remaining_value_cents = remaining_value_cents - ?2,
                status = CASE WHEN remaining_value_cents - ?2 = 0 THEN 'redeemed' ELSE status END,
                redeemed_at = CASE WHEN remaining_value_cents - ?2 = 0 THEN ?3 ELSE redeemed_at END,
                updated_at = ?3
            WHERE id = ?1
              AND voucher_type = 'value'
              AND status = 'issued'
              AND remaining_value_cents >= ?2
            "#,
        )
        .bind(id)
        .bind(amount.cents())
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let applied = result.rows_affected() == 1;
        debug!(voucher_id = id, amount = amount.cents(), applied, "Voucher draw-down");
        Ok(applied)
    }

    /// Moves an issued voucher to redeemed. Returns `false` when it was
    /// not issued any more.
    pub async fn redeem(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE customer_vouchers SET
                status = 'redeemed',
                redeemed_at = ?2,
                updated_at = ?2
            WHERE id = ?1 AND status = 'issued'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let applied = result.rows_affected() == 1;
        debug!(voucher_id = id, applied, "Voucher redeem");
        Ok(applied)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{discount_voucher, seeded_db, value_voucher, CUSTOMER_ID};

    #[tokio::test]
    async fn test_insert_and_read_each_variant() {
        let db = seeded_db().await;
        let repo = db.vouchers();

        let mut owned = value_voucher("v-value", 2000);
        owned.customer_id = Some(CUSTOMER_ID.to_string());
        owned.expiration_date = NaiveDate::from_ymd_opt(2030, 1, 31);
        let product = Voucher {
            kind: VoucherKind::ProductSpecific {
                product_id: "p-1".to_string(),
                benefit: ProductBenefit::FaceValue {
                    amount: Money::from_cents(300),
                },
            },
            ..discount_voucher("v-product", 0)
        };

        for voucher in [owned, discount_voucher("v-discount", 1500), product] {
            repo.insert(&voucher).await.unwrap();
            let stored = repo.get_by_id(&voucher.id).await.unwrap().unwrap();
            assert_eq!(stored, voucher);
        }

        assert!(repo.get_by_id("v-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_draw_down_to_zero_redeems() {
        let db = seeded_db().await;
        db.vouchers().insert(&value_voucher("v-1", 1000)).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        assert!(VoucherRepository::draw_down(&mut tx, "v-1", Money::from_cents(400)).await.unwrap());
        let partly = VoucherRepository::fetch(&mut tx, "v-1").await.unwrap().unwrap();
        assert_eq!(partly.status, VoucherStatus::Issued);

        // more than what is left
        assert!(!VoucherRepository::draw_down(&mut tx, "v-1", Money::from_cents(700)).await.unwrap());

        assert!(VoucherRepository::draw_down(&mut tx, "v-1", Money::from_cents(600)).await.unwrap());
        tx.commit().await.unwrap();

        let spent = db.vouchers().get_by_id("v-1").await.unwrap().unwrap();
        assert_eq!(spent.status, VoucherStatus::Redeemed);
        assert!(matches!(
            spent.kind,
            VoucherKind::Value { remaining_value, .. } if remaining_value.is_zero()
        ));
    }

    #[tokio::test]
    async fn test_redeem_only_once() {
        let db = seeded_db().await;
        db.vouchers().insert(&discount_voucher("v-1", 1000)).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        assert!(VoucherRepository::redeem(&mut tx, "v-1").await.unwrap());
        assert!(!VoucherRepository::redeem(&mut tx, "v-1").await.unwrap());
        tx.commit().await.unwrap();

        let stored = db.vouchers().get_by_id("v-1").await.unwrap().unwrap();
        assert_eq!(stored.status, VoucherStatus::Redeemed);
    }
}
