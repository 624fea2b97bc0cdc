//! # Settings Repository
//!
//! Key/value rows in `system_settings`. Settlement reads
//! `loyalty_sync_endpoint` from here when no endpoint is configured.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::DbResult;

/// Setting holding the loyalty cloud base URL.
pub const LOYALTY_SYNC_ENDPOINT: &str = "loyalty_sync_endpoint";

#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT setting_value FROM system_settings WHERE setting_key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    /// Inserts or replaces a setting.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO system_settings (setting_key, setting_value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (setting_key) DO UPDATE SET
                setting_value = excluded.setting_value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_set_then_overwrite() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = db.settings();

        assert!(settings.get(LOYALTY_SYNC_ENDPOINT).await.unwrap().is_none());

        settings.set(LOYALTY_SYNC_ENDPOINT, "https://a.example").await.unwrap();
        settings.set(LOYALTY_SYNC_ENDPOINT, "https://b.example").await.unwrap();

        assert_eq!(
            settings.get(LOYALTY_SYNC_ENDPOINT).await.unwrap().as_deref(),
            Some("https://b.example")
        );
    }
}
