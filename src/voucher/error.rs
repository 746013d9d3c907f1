//! Error taxonomy for voucher operations.

use crate::store::StoreError;

use super::broker::BrokerError;

/// Why a voucher was refused. The `Display` text is safe to show to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DenyReason {
    #[error("invalid code")]
    InvalidCode,
    #[error("already used")]
    AlreadyUsed,
    #[error("voucher expired")]
    Expired,
    #[error("access duration expired")]
    AccessWindowExpired,
}

#[derive(Debug, thiserror::Error)]
pub enum VoucherError {
    #[error(transparent)]
    Denied(#[from] DenyReason),
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("voucher code already exists: {0}")]
    DuplicateCode(String),
    #[error("not found")]
    NotFound,
    #[error("failed to generate voucher code: {0}")]
    RandomnessFailure(#[source] rand::Error),
    #[error("voucher store failure: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for VoucherError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::DuplicateCode(code) => Self::DuplicateCode(code),
            other => Self::Store(other),
        }
    }
}

impl From<BrokerError> for VoucherError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::NotFound => Self::NotFound,
        }
    }
}
