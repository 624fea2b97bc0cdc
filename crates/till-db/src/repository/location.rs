//! # Location Repository
//!
//! Stores are managed outside settlement; this repository only reads them,
//! plus an insert used by seeding and tests.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use till_core::Location;

const SELECT_LOCATION: &str = r#"
    SELECT id, store_name, store_code, tax_rate_bps, is_active
    FROM locations
    WHERE id = ?1
"#;

#[derive(Debug, Clone)]
pub struct LocationRepository {
    pool: SqlitePool,
}

impl LocationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LocationRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Location>> {
        let location = sqlx::query_as::<_, Location>(SELECT_LOCATION)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(location)
    }

    /// Reads a location inside the caller's transaction.
    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Location>> {
        let location = sqlx::query_as::<_, Location>(SELECT_LOCATION)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(location)
    }

    pub async fn insert(&self, location: &Location) -> DbResult<()> {
        debug!(id = %location.id, store_code = %location.store_code, "Inserting location");

        sqlx::query(
            r#"
            INSERT INTO locations (id, store_name, store_code, tax_rate_bps, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&location.id)
        .bind(&location.store_name)
        .bind(&location.store_code)
        .bind(location.tax_rate_bps)
        .bind(location.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::test_support::{seeded_db, LOCATION_ID};

    #[tokio::test]
    async fn test_get_location() {
        let db = seeded_db().await;

        let location = db.locations().get_by_id(LOCATION_ID).await.unwrap().unwrap();
        assert_eq!(location.store_code, "DT");
        assert_eq!(location.tax_rate().bps(), 800);
        assert!(location.is_active);

        assert!(db.locations().get_by_id("nowhere").await.unwrap().is_none());
    }
}
