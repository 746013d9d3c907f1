//! JSON file backend.
//!
//! The whole document is kept in memory behind one async mutex. Every mutation works on
//! a copy, writes it to `<path>.tmp`, renames it over `<path>`, and only then replaces
//! the in-memory state, so a failed write leaves both the file and the cache unchanged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info};

use super::{ClaimOutcome, SettingsStore, StoreError, VoucherStore};
use crate::voucher::{NewVoucher, Voucher};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileState {
    /// Highest id ever assigned; ids are never handed out twice.
    #[serde(default)]
    last_id: i64,
    #[serde(default)]
    vouchers: Vec<Voucher>,
    #[serde(default)]
    settings: BTreeMap<String, String>,
}

impl FileState {
    fn find(&self, code: &str) -> Option<&Voucher> {
        self.vouchers.iter().find(|voucher| voucher.code == code)
    }
}

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileStore {
    /// Load `path`, or start empty if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed, or the parent
    /// directory cannot be created.
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let state = match fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => FileState::default(),
            Ok(bytes) => {
                let mut state: FileState = serde_json::from_slice(&bytes)?;
                let highest = state.vouchers.iter().map(|v| v.id).max().unwrap_or(0);
                state.last_id = state.last_id.max(highest);
                state
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "data file not found, starting empty");
                FileState::default()
            }
            Err(err) => return Err(err.into()),
        };

        debug!(
            path = %path.display(),
            vouchers = state.vouchers.len(),
            "loaded data file"
        );

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &FileState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply `change` to a copy of the state, persist it, then publish it.
    async fn update<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut FileState) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let value = change(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(value)
    }
}

#[async_trait]
impl VoucherStore for FileStore {
    async fn create(&self, voucher: &NewVoucher) -> Result<i64, StoreError> {
        self.update(|state| {
            if state.find(&voucher.code).is_some() {
                return Err(StoreError::DuplicateCode(voucher.code.clone()));
            }
            state.last_id += 1;
            let id = state.last_id;
            state.vouchers.push(Voucher {
                id,
                code: voucher.code.clone(),
                name: voucher.name.clone(),
                duration: voucher.duration,
                expiration: voucher.expiration,
                data_limit: voucher.data_limit,
                is_reusable: voucher.is_reusable,
                is_used: false,
                start_time: None,
                user_ip: None,
                user_mac: None,
            });
            Ok(id)
        })
        .await
    }

    async fn fetch_by_code(&self, code: &str) -> Result<Voucher, StoreError> {
        let state = self.state.lock().await;
        state.find(code).cloned().ok_or(StoreError::NotFound)
    }

    async fn fetch_all(&self) -> Result<Vec<Voucher>, StoreError> {
        let state = self.state.lock().await;
        let mut vouchers = state.vouchers.clone();
        vouchers.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(vouchers)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.update(|state| {
            let index = state
                .vouchers
                .iter()
                .position(|voucher| voucher.id == id)
                .ok_or(StoreError::NotFound)?;
            state.vouchers.remove(index);
            Ok(())
        })
        .await
    }

    async fn mark_used(
        &self,
        code: &str,
        ip: &str,
        mac: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let index = state
            .vouchers
            .iter()
            .position(|voucher| voucher.code == code)
            .ok_or(StoreError::NotFound)?;
        if state.vouchers[index].is_used {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        let mut next = state.clone();
        let voucher = &mut next.vouchers[index];
        voucher.is_used = true;
        voucher.start_time = Some(now);
        voucher.user_ip = Some(ip.to_string());
        voucher.user_mac = Some(mac.to_string());

        self.persist(&next).await?;
        *state = next;
        Ok(ClaimOutcome::Claimed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let _state = self.state.lock().await;
        match fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            // Nothing written yet; the directory must still be usable.
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let parent = self
                    .path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                fs::metadata(parent).await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl SettingsStore for FileStore {
    async fn get_setting(&self, key: &str) -> Result<String, StoreError> {
        let state = self.state.lock().await;
        state.settings.get(key).cloned().ok_or(StoreError::NotFound)
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|state| {
            state.settings.insert(key.to_string(), value.to_string());
            Ok(())
        })
        .await
    }

    async fn initialize_setting(&self, key: &str, default: &str) -> Result<bool, StoreError> {
        {
            let state = self.state.lock().await;
            if state.settings.contains_key(key) {
                return Ok(false);
            }
        }
        self.update(|state| {
            if state.settings.contains_key(key) {
                return Ok(false);
            }
            state.settings.insert(key.to_string(), default.to_string());
            Ok(true)
        })
        .await
    }
}
