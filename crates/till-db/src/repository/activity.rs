//! # Activity Log Repository
//!
//! Append-only customer activity. Entries written during settlement go
//! through a savepoint: if any insert fails, the savepoint is rolled back,
//! a warning is logged, and the enclosing sale carries on.
//!
//! ```text
//! BEGIN                          ← settlement
//!   ...
//!   SAVEPOINT                    ← log_best_effort
//!     INSERT activity × n
//!   RELEASE | ROLLBACK TO        ← failure stays inside the savepoint
//!   ...
//! COMMIT
//! ```

use chrono::Utc;
use sqlx::{Connection, SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::DbResult;
use till_core::{ActivityKind, CustomerActivity, CustomerTier, SETTLEMENT_SOURCE};

/// An activity entry before it has an id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivity {
    pub customer_id: String,
    pub kind: ActivityKind,
    pub description: String,
    pub points_change: i64,
    pub transaction_id: Option<String>,
    pub created_by: String,
}

impl NewActivity {
    pub fn points_earned(customer_id: &str, points: i64, transaction_id: &str) -> Self {
        NewActivity {
            customer_id: customer_id.to_string(),
            kind: ActivityKind::PointsEarned,
            description: format!("Earned {points} points on transaction {transaction_id}"),
            points_change: points,
            transaction_id: Some(transaction_id.to_string()),
            created_by: SETTLEMENT_SOURCE.to_string(),
        }
    }

    pub fn points_redeemed(customer_id: &str, points: i64, transaction_id: &str) -> Self {
        NewActivity {
            customer_id: customer_id.to_string(),
            kind: ActivityKind::PointsRedeemed,
            description: format!("Redeemed {points} points on transaction {transaction_id}"),
            points_change: -points,
            transaction_id: Some(transaction_id.to_string()),
            created_by: SETTLEMENT_SOURCE.to_string(),
        }
    }

    pub fn tier_change(
        customer_id: &str,
        from: CustomerTier,
        to: CustomerTier,
        transaction_id: Option<&str>,
    ) -> Self {
        let created_by = if transaction_id.is_some() {
            SETTLEMENT_SOURCE
        } else {
            "tier_recalculation"
        };
        NewActivity {
            customer_id: customer_id.to_string(),
            kind: ActivityKind::TierChange,
            description: format!("Tier changed from {from} to {to}"),
            points_change: 0,
            transaction_id: transaction_id.map(str::to_string),
            created_by: created_by.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivityLogRepository {
    pool: SqlitePool,
}

impl ActivityLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ActivityLogRepository { pool }
    }

    /// Newest entries first.
    pub async fn list_for_customer(&self, customer_id: &str, limit: u32) -> DbResult<Vec<CustomerActivity>> {
        let entries = sqlx::query_as::<_, CustomerActivity>(
            r#"
            SELECT id, customer_id, activity_type, description, points_change,
                   transaction_id, created_by, created_at
            FROM customer_activity_log
            WHERE customer_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(customer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Writes `entries` inside a savepoint; all or none are kept.
    pub async fn append(conn: &mut SqliteConnection, entries: &[NewActivity]) -> DbResult<()> {
        let mut savepoint = conn.begin().await?;

        for entry in entries {
            if let Err(err) = Self::insert(&mut savepoint, entry).await {
                savepoint.rollback().await?;
                return Err(err);
            }
        }

        savepoint.commit().await?;
        Ok(())
    }

    /// Like [`append`](Self::append), but a failure is only logged.
    pub async fn log_best_effort(conn: &mut SqliteConnection, entries: &[NewActivity]) {
        if entries.is_empty() {
            return;
        }

        match Self::append(conn, entries).await {
            Ok(()) => debug!(count = entries.len(), "Activity logged"),
            Err(err) => warn!(
                error = %err,
                customer_id = %entries[0].customer_id,
                "Activity log write failed; continuing without it"
            ),
        }
    }

    async fn insert(conn: &mut SqliteConnection, entry: &NewActivity) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customer_activity_log (
                id, customer_id, activity_type, description, points_change,
                transaction_id, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&entry.customer_id)
        .bind(entry.kind)
        .bind(&entry.description)
        .bind(entry.points_change)
        .bind(&entry.transaction_id)
        .bind(&entry.created_by)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{seeded_db, CUSTOMER_ID};

    #[tokio::test]
    async fn test_failed_batch_is_discarded_but_outer_work_survives() {
        let db = seeded_db().await;
        let mut tx = db.begin().await.unwrap();

        sqlx::query("UPDATE customers SET points = 999 WHERE id = ?1")
            .bind(CUSTOMER_ID)
            .execute(&mut *tx)
            .await
            .unwrap();

        // second entry violates the customer foreign key
        let batch = [
            NewActivity::points_earned(CUSTOMER_ID, 10, "t-1"),
            NewActivity::points_earned("ghost", 10, "t-1"),
        ];
        ActivityLogRepository::log_best_effort(&mut tx, &batch).await;

        ActivityLogRepository::log_best_effort(
            &mut tx,
            &[NewActivity::points_redeemed(CUSTOMER_ID, 5, "t-1")],
        )
        .await;
        tx.commit().await.unwrap();

        let customer = db.customers().get_by_id(CUSTOMER_ID).await.unwrap().unwrap();
        assert_eq!(customer.points, 999);

        let log = db.activity().list_for_customer(CUSTOMER_ID, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].activity_type, ActivityKind::PointsRedeemed);
        assert_eq!(log[0].points_change, -5);
        assert_eq!(log[0].created_by, SETTLEMENT_SOURCE);
    }
}
