//! Voucher authorization engine.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    NewVoucher, Voucher, broker::StagedAuthBroker, code::generate_code, error::DenyReason,
    error::VoucherError, validator::validate,
};
use crate::store::{ClaimOutcome, StoreError, VoucherStore};

/// A successful authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    /// Minutes of access the voucher grants; `0` means no cap.
    pub duration_minutes: i64,
    /// `true` when this call moved the voucher from unused to used.
    pub first_use: bool,
}

pub struct VoucherEngine {
    store: Arc<dyn VoucherStore>,
    broker: StagedAuthBroker,
}

impl VoucherEngine {
    #[must_use]
    pub fn new(store: Arc<dyn VoucherStore>) -> Self {
        Self::with_broker(store, StagedAuthBroker::new())
    }

    #[must_use]
    pub fn with_broker(store: Arc<dyn VoucherStore>, broker: StagedAuthBroker) -> Self {
        Self { store, broker }
    }

    #[must_use]
    pub fn broker(&self) -> &StagedAuthBroker {
        &self.broker
    }

    /// Validate and claim `code` for the client at `ip`/`mac`.
    ///
    /// # Errors
    /// Returns `VoucherError::Denied` when the voucher is refused, or
    /// `VoucherError::Store` when the store fails.
    pub async fn authorize(
        &self,
        code: &str,
        ip: &str,
        mac: &str,
    ) -> Result<Grant, VoucherError> {
        self.authorize_at(code, ip, mac, Utc::now()).await
    }

    /// [`authorize`](Self::authorize) against an explicit clock.
    ///
    /// # Errors
    /// Same as [`authorize`](Self::authorize).
    pub async fn authorize_at(
        &self,
        code: &str,
        ip: &str,
        mac: &str,
        now: DateTime<Utc>,
    ) -> Result<Grant, VoucherError> {
        if code.is_empty() {
            return Err(DenyReason::InvalidCode.into());
        }

        let voucher = match self.store.fetch_by_code(code).await {
            Ok(voucher) => voucher,
            Err(StoreError::NotFound) => return Err(DenyReason::InvalidCode.into()),
            Err(err) => return Err(VoucherError::Store(err)),
        };

        if let Err(reason) = validate(&voucher, now) {
            info!(code = %code, ip = %ip, mac = %mac, reason = %reason, "voucher denied");
            return Err(reason.into());
        }

        if voucher.is_used {
            // Reusable voucher inside its window; the first claim already recorded state.
            info!(code = %code, ip = %ip, mac = %mac, "reusable voucher used again");
            return Ok(Grant {
                duration_minutes: voucher.duration,
                first_use: false,
            });
        }

        match self.store.mark_used(code, ip, mac, now).await {
            Ok(ClaimOutcome::Claimed) => {
                info!(
                    code = %code,
                    ip = %ip,
                    mac = %mac,
                    duration = voucher.duration,
                    "voucher claimed"
                );
                Ok(Grant {
                    duration_minutes: voucher.duration,
                    first_use: true,
                })
            }
            // Someone else claimed it between our read and the claim.
            Ok(ClaimOutcome::AlreadyClaimed) if voucher.is_reusable => {
                info!(code = %code, ip = %ip, mac = %mac, "reusable voucher used again");
                Ok(Grant {
                    duration_minutes: voucher.duration,
                    first_use: false,
                })
            }
            Ok(ClaimOutcome::AlreadyClaimed) => {
                info!(code = %code, ip = %ip, mac = %mac, "voucher lost claim race");
                Err(DenyReason::AlreadyUsed.into())
            }
            Err(StoreError::NotFound) => Err(DenyReason::InvalidCode.into()),
            Err(err) => {
                warn!(code = %code, error = %err, "failed to mark voucher used");
                Err(VoucherError::Store(err))
            }
        }
    }

    /// Authorize `code` and stage the granted duration for the BinAuth check.
    ///
    /// Returns the granted duration in minutes.
    ///
    /// # Errors
    /// Returns `VoucherError::InvalidInput` if `mac` is empty, otherwise the errors of
    /// [`authorize`](Self::authorize). Nothing is staged on error.
    pub async fn stage(&self, code: &str, ip: &str, mac: &str) -> Result<i64, VoucherError> {
        if mac.is_empty() {
            return Err(VoucherError::InvalidInput("client MAC address is required"));
        }
        let grant = self.authorize(code, ip, mac).await?;
        self.broker.stage(mac, grant.duration_minutes).await;
        Ok(grant.duration_minutes)
    }

    /// Consume the grant staged for `mac`, returning its length in seconds.
    ///
    /// # Errors
    /// Returns `VoucherError::InvalidInput` if `mac` is empty and
    /// `VoucherError::NotFound` when nothing is staged for `mac`.
    pub async fn check(&self, mac: &str) -> Result<i64, VoucherError> {
        if mac.is_empty() {
            return Err(VoucherError::InvalidInput("client MAC address is required"));
        }
        Ok(self.broker.consume(mac).await?)
    }

    /// Create a voucher, generating its code and name when left blank.
    ///
    /// # Errors
    /// Returns `VoucherError::InvalidInput` for a negative duration,
    /// `VoucherError::DuplicateCode` when the code is taken, and
    /// `VoucherError::RandomnessFailure` when no code can be generated.
    pub async fn add_voucher(&self, mut request: NewVoucher) -> Result<Voucher, VoucherError> {
        if request.duration < 0 {
            return Err(VoucherError::InvalidInput("duration must not be negative"));
        }

        request.code = request.code.trim().to_string();
        if request.code.is_empty() {
            request.code = generate_code().map_err(VoucherError::RandomnessFailure)?;
        }
        if request.name.trim().is_empty() {
            request.name.clone_from(&request.code);
        }
        request.data_limit = request.data_limit.filter(|limit| *limit > 0);

        self.store.create(&request).await?;
        let voucher = self.store.fetch_by_code(&request.code).await?;
        info!(
            id = voucher.id,
            code = %voucher.code,
            duration = voucher.duration,
            "voucher created"
        );
        Ok(voucher)
    }

    /// All vouchers, newest first.
    ///
    /// # Errors
    /// Returns `VoucherError::Store` when the store fails.
    pub async fn list_vouchers(&self) -> Result<Vec<Voucher>, VoucherError> {
        Ok(self.store.fetch_all().await?)
    }

    /// # Errors
    /// Returns `VoucherError::InvalidInput` for a non-positive id and
    /// `VoucherError::NotFound` when no voucher has that id.
    pub async fn delete_voucher(&self, id: i64) -> Result<(), VoucherError> {
        if id <= 0 {
            return Err(VoucherError::InvalidInput("invalid voucher id"));
        }
        self.store.delete(id).await?;
        info!(id, "voucher deleted");
        Ok(())
    }

    /// Store liveness, for health reporting.
    ///
    /// # Errors
    /// Returns the store error when the backend is unreachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, SqliteStore};
    use anyhow::Result;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    async fn sqlite_engine() -> Result<(VoucherEngine, TempDir)> {
        let dir = tempfile::tempdir()?;
        let dsn = format!("sqlite://{}", dir.path().join("voucher.db").display());
        let store = SqliteStore::connect(&dsn).await?;
        Ok((VoucherEngine::new(Arc::new(store)), dir))
    }

    async fn file_engine() -> Result<(VoucherEngine, TempDir)> {
        let dir = tempfile::tempdir()?;
        let store = FileStore::open(dir.path().join("voucher.json")).await?;
        Ok((VoucherEngine::new(Arc::new(store)), dir))
    }

    async fn add(
        engine: &VoucherEngine,
        code: &str,
        duration: i64,
        reusable: bool,
    ) -> Result<Voucher> {
        Ok(engine
            .add_voucher(NewVoucher {
                code: code.to_string(),
                duration,
                is_reusable: reusable,
                ..NewVoucher::default()
            })
            .await?)
    }

    fn denied(result: Result<Grant, VoucherError>) -> Option<DenyReason> {
        match result {
            Err(VoucherError::Denied(reason)) => Some(reason),
            _ => None,
        }
    }

    #[tokio::test]
    async fn first_claim_records_client() -> Result<()> {
        let (engine, _dir) = sqlite_engine().await?;
        add(&engine, "a1b2c3d4", 60, false).await?;

        let grant = engine
            .authorize_at("a1b2c3d4", "192.168.1.20", "aa:bb:cc:dd:ee:01", t0())
            .await?;
        assert_eq!(
            grant,
            Grant {
                duration_minutes: 60,
                first_use: true
            }
        );

        let vouchers = engine.list_vouchers().await?;
        let voucher = &vouchers[0];
        assert!(voucher.is_used);
        assert_eq!(voucher.start_time.map(|t| t.timestamp()), Some(t0().timestamp()));
        assert_eq!(voucher.user_ip.as_deref(), Some("192.168.1.20"));
        assert_eq!(voucher.user_mac.as_deref(), Some("aa:bb:cc:dd:ee:01"));
        Ok(())
    }

    #[tokio::test]
    async fn single_use_voucher_is_refused_the_second_time() -> Result<()> {
        let (engine, _dir) = sqlite_engine().await?;
        add(&engine, "single01", 60, false).await?;

        engine.authorize_at("single01", "10.0.0.1", "m1", t0()).await?;
        let second = engine
            .authorize_at("single01", "10.0.0.2", "m2", t0() + Duration::minutes(1))
            .await;
        assert_eq!(denied(second), Some(DenyReason::AlreadyUsed));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_or_empty_code_is_invalid() -> Result<()> {
        let (engine, _dir) = file_engine().await?;
        assert_eq!(
            denied(engine.authorize("ffffffff", "10.0.0.1", "m1").await),
            Some(DenyReason::InvalidCode)
        );
        assert_eq!(
            denied(engine.authorize("", "10.0.0.1", "m1").await),
            Some(DenyReason::InvalidCode)
        );
        Ok(())
    }

    #[tokio::test]
    async fn reusable_voucher_keeps_first_claimant_and_window() -> Result<()> {
        let (engine, _dir) = file_engine().await?;
        add(&engine, "shared01", 10, true).await?;

        let first = engine
            .authorize_at("shared01", "10.0.0.1", "first", t0())
            .await?;
        assert!(first.first_use);

        let again = engine
            .authorize_at("shared01", "10.0.0.2", "second", t0() + Duration::minutes(5))
            .await?;
        assert_eq!(
            again,
            Grant {
                duration_minutes: 10,
                first_use: false
            }
        );

        let late = engine
            .authorize_at("shared01", "10.0.0.3", "third", t0() + Duration::minutes(11))
            .await;
        assert_eq!(denied(late), Some(DenyReason::AccessWindowExpired));

        let vouchers = engine.list_vouchers().await?;
        assert_eq!(vouchers[0].user_mac.as_deref(), Some("first"));
        assert_eq!(vouchers[0].start_time.map(|t| t.timestamp()), Some(t0().timestamp()));
        Ok(())
    }

    #[tokio::test]
    async fn expired_voucher_is_refused_before_use() -> Result<()> {
        let (engine, _dir) = sqlite_engine().await?;
        engine
            .add_voucher(NewVoucher {
                code: "old00001".to_string(),
                duration: 30,
                expiration: Some(t0() - Duration::hours(1)),
                ..NewVoucher::default()
            })
            .await?;

        let result = engine.authorize_at("old00001", "10.0.0.1", "m1", t0()).await;
        assert_eq!(denied(result), Some(DenyReason::Expired));

        // A refused voucher is not claimed.
        let vouchers = engine.list_vouchers().await?;
        assert!(!vouchers[0].is_used);
        Ok(())
    }

    async fn race_single_use(engine: Arc<VoucherEngine>) -> Result<()> {
        add(&engine, "race0001", 60, false).await?;

        let mut handles = Vec::new();
        for n in 0..50 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .authorize("race0001", "10.0.0.9", &format!("client-{n}"))
                    .await
            }));
        }

        let mut granted = 0;
        let mut already_used = 0;
        for handle in handles {
            match handle.await? {
                Ok(_) => granted += 1,
                Err(VoucherError::Denied(DenyReason::AlreadyUsed)) => already_used += 1,
                Err(err) => return Err(err.into()),
            }
        }
        assert_eq!(granted, 1);
        assert_eq!(already_used, 49);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_single_use_claims_sqlite() -> Result<()> {
        let (engine, _dir) = sqlite_engine().await?;
        race_single_use(Arc::new(engine)).await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_single_use_claims_file() -> Result<()> {
        let (engine, _dir) = file_engine().await?;
        race_single_use(Arc::new(engine)).await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reusable_claims_all_succeed() -> Result<()> {
        let (engine, _dir) = sqlite_engine().await?;
        add(&engine, "crowd001", 60, true).await?;
        let engine = Arc::new(engine);

        let mut handles = Vec::new();
        for n in 0..20 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .authorize("crowd001", "10.0.0.9", &format!("client-{n}"))
                    .await
            }));
        }

        let mut first_uses = 0;
        for handle in handles {
            if handle.await??.first_use {
                first_uses += 1;
            }
        }
        assert_eq!(first_uses, 1);
        Ok(())
    }

    #[tokio::test]
    async fn unbounded_reusable_voucher_stays_valid() -> Result<()> {
        let (engine, _dir) = sqlite_engine().await?;
        add(&engine, "forever1", i64::MAX, true).await?;

        let first = engine.authorize("forever1", "10.0.0.5", "m1").await?;
        assert!(first.first_use);
        let again = engine.authorize("forever1", "10.0.0.6", "m2").await?;
        assert!(!again.first_use);
        assert_eq!(again.duration_minutes, i64::MAX);

        engine.stage("forever1", "10.0.0.7", "ff:ee").await?;
        assert_eq!(engine.check("ff:ee").await?, i64::MAX);
        Ok(())
    }

    #[tokio::test]
    async fn stage_then_check_consumes_once() -> Result<()> {
        let (engine, _dir) = sqlite_engine().await?;
        add(&engine, "stage001", 5, false).await?;

        assert_eq!(engine.stage("stage001", "10.0.0.4", "aa:bb").await?, 5);
        assert_eq!(engine.check("aa:bb").await?, 300);
        assert!(matches!(
            engine.check("aa:bb").await,
            Err(VoucherError::NotFound)
        ));
        assert!(matches!(
            engine.check("").await,
            Err(VoucherError::InvalidInput(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn stage_requires_mac_and_stages_nothing_on_denial() -> Result<()> {
        let (engine, _dir) = sqlite_engine().await?;
        add(&engine, "stage002", 5, false).await?;

        assert!(matches!(
            engine.stage("stage002", "10.0.0.4", "").await,
            Err(VoucherError::InvalidInput(_))
        ));
        // The rejected request must not have claimed the voucher.
        assert_eq!(engine.stage("stage002", "10.0.0.4", "cc:dd").await?, 5);
        engine.check("cc:dd").await?;

        assert!(matches!(
            engine.stage("stage002", "10.0.0.5", "ee:ff").await,
            Err(VoucherError::Denied(DenyReason::AlreadyUsed))
        ));
        assert_eq!(engine.broker().pending().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn add_voucher_fills_blank_fields() -> Result<()> {
        let (engine, _dir) = file_engine().await?;
        let voucher = engine
            .add_voucher(NewVoucher {
                duration: 120,
                data_limit: Some(0),
                ..NewVoucher::default()
            })
            .await?;

        assert_eq!(voucher.code.len(), 8);
        assert!(voucher.code.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(voucher.name, voucher.code);
        assert_eq!(voucher.data_limit, None);
        assert!(voucher.id > 0);
        Ok(())
    }

    #[tokio::test]
    async fn add_voucher_rejects_negative_duration_and_duplicates() -> Result<()> {
        let (engine, _dir) = sqlite_engine().await?;
        let negative = engine
            .add_voucher(NewVoucher {
                code: "neg00001".to_string(),
                duration: -1,
                ..NewVoucher::default()
            })
            .await;
        assert!(matches!(negative, Err(VoucherError::InvalidInput(_))));

        add(&engine, "twice001", 10, false).await?;
        let duplicate = engine
            .add_voucher(NewVoucher {
                code: "twice001".to_string(),
                ..NewVoucher::default()
            })
            .await;
        assert!(matches!(duplicate, Err(VoucherError::DuplicateCode(code)) if code == "twice001"));
        Ok(())
    }

    #[tokio::test]
    async fn delete_voucher_validates_id() -> Result<()> {
        let (engine, _dir) = file_engine().await?;
        let voucher = add(&engine, "gone0001", 10, false).await?;

        assert!(matches!(
            engine.delete_voucher(0).await,
            Err(VoucherError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.delete_voucher(voucher.id + 100).await,
            Err(VoucherError::NotFound)
        ));

        engine.delete_voucher(voucher.id).await?;
        assert!(engine.list_vouchers().await?.is_empty());
        assert_eq!(
            denied(engine.authorize("gone0001", "10.0.0.1", "m1").await),
            Some(DenyReason::InvalidCode)
        );
        Ok(())
    }
}
