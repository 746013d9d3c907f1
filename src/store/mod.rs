//! Voucher and settings persistence.
//!
//! Two interchangeable backends implement the same contracts:
//!
//! - [`SqliteStore`]: a `SQLite` database. Claims use a conditional
//!   `UPDATE ... WHERE is_used = 0`, so the database decides which racer wins.
//! - [`FileStore`]: a single JSON document cached in memory. One async mutex is held
//!   across load, check, mark and write-back.
//!
//! The backend is chosen at startup by [`Backend::open`]; everything else only sees the
//! [`VoucherStore`] and [`SettingsStore`] traits.

mod file;
mod sqlite;

pub use file::FileStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{path::PathBuf, sync::Arc};

use crate::voucher::{NewVoucher, Voucher};

/// Settings key holding the admin password.
pub const ADMIN_PASSWORD_KEY: &str = "admin_password";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("voucher code already exists: {0}")]
    DuplicateCode(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("data file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("data file is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Result of trying to move a voucher from unused to used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This call performed the transition.
    Claimed,
    /// The voucher was already used when the claim ran.
    AlreadyClaimed,
}

#[async_trait]
pub trait VoucherStore: Send + Sync {
    /// Insert a voucher and return its store-assigned id.
    ///
    /// `voucher.code` must be non-empty; the engine fills it before calling.
    async fn create(&self, voucher: &NewVoucher) -> Result<i64, StoreError>;

    async fn fetch_by_code(&self, code: &str) -> Result<Voucher, StoreError>;

    /// All vouchers, newest (highest id) first.
    async fn fetch_all(&self) -> Result<Vec<Voucher>, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    /// Atomically mark an unused voucher as used by `ip`/`mac` at `now`.
    ///
    /// At most one concurrent caller observes `ClaimOutcome::Claimed` for a given code.
    async fn mark_used(
        &self,
        code: &str,
        ip: &str,
        mac: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Cheap liveness check used by `/health`.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<String, StoreError>;

    /// Insert or replace `key`.
    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Insert `key` only if absent. Returns `true` when the default was written.
    async fn initialize_setting(&self, key: &str, default: &str) -> Result<bool, StoreError>;
}

/// Which backend to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Sqlite { dsn: String },
    File { path: PathBuf },
}

/// Both contracts, backed by the same underlying store.
#[derive(Clone)]
pub struct Stores {
    pub vouchers: Arc<dyn VoucherStore>,
    pub settings: Arc<dyn SettingsStore>,
}

impl Backend {
    /// Open the configured backend, creating schema or data file as needed.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the data file cannot be read.
    pub async fn open(&self) -> Result<Stores, StoreError> {
        match self {
            Self::Sqlite { dsn } => {
                let store = Arc::new(SqliteStore::connect(dsn).await?);
                Ok(Stores {
                    vouchers: store.clone(),
                    settings: store,
                })
            }
            Self::File { path } => {
                let store = Arc::new(FileStore::open(path.clone()).await?);
                Ok(Stores {
                    vouchers: store.clone(),
                    settings: store,
                })
            }
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sqlite { .. } => "sqlite",
            Self::File { .. } => "file",
        }
    }
}
