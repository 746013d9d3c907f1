//! Voucher model, validation, and the authorization engine.
//!
//! The engine is the only component that mutates voucher state. A voucher moves from
//! unused to used exactly once, on its first successful claim; everything else is a
//! read-only validation against the clock.

pub mod broker;
pub mod code;
pub mod engine;
pub mod error;
pub mod validator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use broker::{BrokerError, STAGED_AUTH_TTL, StagedAuthBroker};
pub use code::generate_code;
pub use engine::{Grant, VoucherEngine};
pub use error::{DenyReason, VoucherError};
pub use validator::validate;

/// A stored voucher.
///
/// Optional fields are `None` until they carry a value; a stored voucher never uses a
/// zero timestamp or empty string to mean "absent".
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Voucher {
    pub id: i64,
    pub code: String,
    pub name: String,
    /// Minutes of access granted from the first claim; `0` means no cap.
    pub duration: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    /// Informational cap in MB, never enforced here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_limit: Option<i64>,
    pub is_reusable: bool,
    pub is_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_mac: Option<String>,
}

/// Fields an administrator supplies when adding a voucher.
///
/// Blank `code` and `name` are filled in by [`VoucherEngine::add_voucher`].
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct NewVoucher {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data_limit: Option<i64>,
    #[serde(default)]
    pub is_reusable: bool,
}
