//! Voucher admission rules.

use chrono::{DateTime, Duration, Utc};

use super::{Voucher, error::DenyReason};

/// Decide whether `voucher` may be claimed at `now`.
///
/// Checks run in a fixed order and the first failure wins:
/// 1. a single-use voucher that was already claimed is refused;
/// 2. a voucher past its absolute expiration is refused, used or not;
/// 3. a claimed voucher with a duration is refused once its access window has elapsed.
///
/// Being reusable only lifts check 1. The access window of a reusable voucher starts at
/// its first claim and is not renewed by later claims.
///
/// # Errors
/// Returns the [`DenyReason`] of the first failing check.
pub fn validate(voucher: &Voucher, now: DateTime<Utc>) -> Result<(), DenyReason> {
    if !voucher.is_reusable && voucher.is_used {
        return Err(DenyReason::AlreadyUsed);
    }

    if voucher.expiration.is_some_and(|expiration| now > expiration) {
        return Err(DenyReason::Expired);
    }

    if voucher.is_used && voucher.duration > 0 {
        // A used voucher without a start time cannot prove its window is still open.
        let Some(start_time) = voucher.start_time else {
            return Err(DenyReason::AccessWindowExpired);
        };
        // A window too long for `Duration` never elapses.
        let window = Duration::try_minutes(voucher.duration);
        if window.is_some_and(|window| now.signed_duration_since(start_time) > window) {
            return Err(DenyReason::AccessWindowExpired);
        }
    }

    Ok(())
}
