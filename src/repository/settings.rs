//! Settings repository: the flat key/value configuration store

use std::collections::HashMap;

use sqlx::{Pool, Postgres, Row};

use crate::error::AppResult;

#[derive(Clone)]
pub struct SettingsRepository {
    pool: Pool<Postgres>,
}

impl SettingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Load all settings as a key/value map
    pub async fn get_map(&self) -> AppResult<HashMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("key"), row.get::<String, _>("value")))
            .collect())
    }

    /// Upsert a setting value
    pub async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        // Try to update existing record first
        let rows_affected = sqlx::query("UPDATE settings SET value = $2 WHERE key = $1")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?
            .rows_affected();

        // If no row was updated, insert a new one
        if rows_affected == 0 {
            sqlx::query("INSERT INTO settings (key, value) VALUES ($1, $2)")
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }
}
