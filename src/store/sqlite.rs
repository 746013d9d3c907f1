//! `SQLite` backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};
use std::{str::FromStr, time::Duration};
use tracing::{Instrument, info_span};

use super::{ClaimOutcome, SettingsStore, StoreError, VoucherStore};
use crate::voucher::{NewVoucher, Voucher};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const VOUCHER_COLUMNS: &str = "id, code, name, duration, expiration, data_limit, is_reusable, is_used, start_time, user_ip, user_mac";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `dsn`, creating the database file and schema if missing.
    ///
    /// # Errors
    /// Returns an error if the DSN is invalid, the database cannot be opened, or the
    /// schema cannot be applied.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(dsn)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Wrap an existing pool and apply the schema.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be applied.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let span = info_span!("db.migrate", db.system = "sqlite");
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&pool)
            .instrument(span)
            .await?;
        Ok(Self { pool })
    }

    async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        let query = "SELECT 1 FROM vouchers WHERE code = ?";
        let span = info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.is_some())
    }
}

fn voucher_from_row(row: &SqliteRow) -> Result<Voucher, sqlx::Error> {
    Ok(Voucher {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row
            .try_get::<Option<String>, _>("name")?
            .unwrap_or_default(),
        duration: row.try_get("duration")?,
        expiration: row.try_get("expiration")?,
        data_limit: row.try_get("data_limit")?,
        is_reusable: row.try_get("is_reusable")?,
        is_used: row.try_get("is_used")?,
        start_time: row.try_get("start_time")?,
        user_ip: row.try_get("user_ip")?,
        user_mac: row.try_get("user_mac")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl VoucherStore for SqliteStore {
    async fn create(&self, voucher: &NewVoucher) -> Result<i64, StoreError> {
        let query = r"
            INSERT INTO vouchers (code, name, duration, expiration, data_limit, is_reusable)
            VALUES (?, ?, ?, ?, ?, ?)
        ";
        let span = info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(&voucher.code)
            .bind(&voucher.name)
            .bind(voucher.duration)
            .bind(voucher.expiration)
            .bind(voucher.data_limit)
            .bind(voucher.is_reusable)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::DuplicateCode(voucher.code.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn fetch_by_code(&self, code: &str) -> Result<Voucher, StoreError> {
        let query = format!("SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE code = ?");
        let span = info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(voucher_from_row(&row)?)
    }

    async fn fetch_all(&self) -> Result<Vec<Voucher>, StoreError> {
        let query = format!("SELECT {VOUCHER_COLUMNS} FROM vouchers ORDER BY id DESC");
        let span = info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;
        rows.iter()
            .map(|row| voucher_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let query = "DELETE FROM vouchers WHERE id = ?";
        let span = info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "DELETE",
            db.statement = query
        );
        let done = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn mark_used(
        &self,
        code: &str,
        ip: &str,
        mac: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        // Conditional update: only the racer that still sees is_used = 0 gets a row.
        let query = r"
            UPDATE vouchers
            SET is_used = 1, start_time = ?, user_ip = ?, user_mac = ?
            WHERE code = ? AND is_used = 0
        ";
        let span = info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "UPDATE",
            db.statement = query
        );
        let done = sqlx::query(query)
            .bind(now)
            .bind(ip)
            .bind(mac)
            .bind(code)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        if done.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed);
        }
        if self.code_exists(code).await? {
            Ok(ClaimOutcome::AlreadyClaimed)
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let span = info_span!("db.ping", db.system = "sqlite", db.operation = "PING");
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn get_setting(&self, key: &str) -> Result<String, StoreError> {
        let query = "SELECT value FROM settings WHERE key = ?";
        let span = info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(row.try_get("value")?)
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
        ";
        let span = info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "UPSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn initialize_setting(&self, key: &str, default: &str) -> Result<bool, StoreError> {
        let query = "INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)";
        let span = info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "INSERT",
            db.statement = query
        );
        let done = sqlx::query(query)
            .bind(key)
            .bind(default)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(done.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;
    use anyhow::Result;
    use std::sync::Arc;
    use tempfile::TempDir;

    // Keep the TempDir alive for as long as the store is in use.
    async fn test_store() -> Result<(SqliteStore, TempDir)> {
        let dir = tempfile::tempdir()?;
        let dsn = format!("sqlite://{}", dir.path().join("voucher.db").display());
        let store = SqliteStore::connect(&dsn).await?;
        Ok((store, dir))
    }

    #[tokio::test]
    async fn create_and_fetch() -> Result<()> {
        let (store, _dir) = test_store().await?;
        contract::create_and_fetch(&store).await
    }

    #[tokio::test]
    async fn duplicate_code_is_rejected() -> Result<()> {
        let (store, _dir) = test_store().await?;
        contract::duplicate_code_is_rejected(&store).await
    }

    #[tokio::test]
    async fn missing_code_is_not_found() -> Result<()> {
        let (store, _dir) = test_store().await?;
        contract::missing_code_is_not_found(&store).await
    }

    #[tokio::test]
    async fn fetch_all_is_newest_first() -> Result<()> {
        let (store, _dir) = test_store().await?;
        contract::fetch_all_is_newest_first(&store).await
    }

    #[tokio::test]
    async fn ids_are_not_reused() -> Result<()> {
        let (store, _dir) = test_store().await?;
        contract::ids_are_not_reused(&store).await
    }

    #[tokio::test]
    async fn delete_missing_leaves_store_unchanged() -> Result<()> {
        let (store, _dir) = test_store().await?;
        contract::delete_missing_leaves_store_unchanged(&store).await
    }

    #[tokio::test]
    async fn mark_used_claims_once() -> Result<()> {
        let (store, _dir) = test_store().await?;
        contract::mark_used_claims_once(&store).await
    }

    #[tokio::test]
    async fn mark_used_missing_code() -> Result<()> {
        let (store, _dir) = test_store().await?;
        contract::mark_used_missing_code(&store).await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_have_one_winner() -> Result<()> {
        let (store, _dir) = test_store().await?;
        contract::concurrent_claims_have_one_winner(Arc::new(store)).await
    }

    #[tokio::test]
    async fn settings_round_trip() -> Result<()> {
        let (store, _dir) = test_store().await?;
        contract::settings_round_trip(&store).await
    }

    #[tokio::test]
    async fn null_name_reads_as_empty() -> Result<()> {
        let (store, _dir) = test_store().await?;
        sqlx::query("INSERT INTO vouchers (code, duration, is_reusable) VALUES ('noname01', 5, 0)")
            .execute(&store.pool)
            .await?;
        let voucher = store.fetch_by_code("noname01").await?;
        assert_eq!(voucher.name, "");
        assert_eq!(voucher.data_limit, None);
        Ok(())
    }

    #[tokio::test]
    async fn schema_is_idempotent() -> Result<()> {
        let (store, _dir) = test_store().await?;
        store.create(&contract::new_voucher("keep0002")).await?;
        let reopened = SqliteStore::with_pool(store.pool.clone()).await?;
        assert_eq!(reopened.fetch_all().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn ping_succeeds_on_open_pool() -> Result<()> {
        let (store, _dir) = test_store().await?;
        store.ping().await?;
        Ok(())
    }
}
