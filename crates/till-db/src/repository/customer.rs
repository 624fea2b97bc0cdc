//! # Customer Repository
//!
//! Loyalty balances and tier. Balances are written with an optimistic
//! check against the values read earlier in the same unit of work.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::activity::{ActivityLogRepository, NewActivity};
use till_core::loyalty::{LoyaltySnapshot, TierAssessment, TierPolicy};
use till_core::{Customer, CustomerTier};

const SELECT_CUSTOMER: &str = r#"
    SELECT id, loyalty_number, name, email, points, total_spent_cents, visit_count,
           customer_tier, tier_score, tier_override, created_at, updated_at
    FROM customers
    WHERE id = ?1
"#;

/// New loyalty values for one customer row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoyaltyUpdate {
    pub after: LoyaltySnapshot,
    pub tier: CustomerTier,
    /// Hundredths.
    pub tier_score: i64,
}

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(SELECT_CUSTOMER)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(customer)
    }

    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, loyalty_number = %customer.loyalty_number, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, loyalty_number, name, email, points, total_spent_cents, visit_count,
                customer_tier, tier_score, tier_override, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.loyalty_number)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(customer.points)
        .bind(customer.total_spent_cents)
        .bind(customer.visit_count)
        .bind(customer.customer_tier)
        .bind(customer.tier_score)
        .bind(customer.tier_override)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Pins (or with `None`, unpins) the customer's tier.
    pub async fn set_tier_override(&self, id: &str, tier: Option<CustomerTier>) -> DbResult<()> {
        let result = sqlx::query("UPDATE customers SET tier_override = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(tier)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }
        Ok(())
    }

    /// Recomputes score and tier from the stored balances.
    ///
    /// Running it again on unchanged balances changes nothing.
    pub async fn recalculate_tier(&self, id: &str, policy: &TierPolicy) -> DbResult<TierAssessment> {
        let mut tx = self.pool.begin().await?;

        let customer = Self::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))?;
        let assessment = policy.assess(&LoyaltySnapshot::from(&customer), customer.tier_override);

        sqlx::query("UPDATE customers SET customer_tier = ?2, tier_score = ?3, updated_at = ?4 WHERE id = ?1")
            .bind(id)
            .bind(assessment.tier)
            .bind(assessment.score.hundredths())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        if assessment.tier != customer.customer_tier {
            info!(
                customer_id = id,
                from = %customer.customer_tier,
                to = %assessment.tier,
                "Tier recalculated"
            );
            let entry = NewActivity::tier_change(id, customer.customer_tier, assessment.tier, None);
            ActivityLogRepository::log_best_effort(&mut tx, &[entry]).await;
        }

        tx.commit().await?;
        Ok(assessment)
    }

    // =========================================================================
    // In-transaction calls
    // =========================================================================

    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(SELECT_CUSTOMER)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(customer)
    }

    /// Writes new balances if the row still holds `expected` points and
    /// visit count. Returns `false` when another writer changed them.
    pub async fn apply_loyalty(
        conn: &mut SqliteConnection,
        id: &str,
        expected: &LoyaltySnapshot,
        update: &LoyaltyUpdate,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE customers SET
                points = ?4,
                total_spent_cents = ?5,
                visit_count = ?6,
                customer_tier = ?7,
                tier_score = ?8,
                updated_at = ?9
            WHERE id = ?1 AND points = ?2 AND visit_count = ?3
            "#,
        )
        .bind(id)
        .bind(expected.points)
        .bind(expected.visit_count)
        .bind(update.after.points)
        .bind(update.after.total_spent.cents())
        .bind(update.after.visit_count)
        .bind(update.tier)
        .bind(update.tier_score)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
