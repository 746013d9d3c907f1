//! # Vouchergate (Captive Portal Voucher Authorization)
//!
//! `vouchergate` decides whether a client on a captive-portal network may get
//! online by presenting an access voucher, and for how long.
//!
//! ## Vouchers
//!
//! A voucher is a short code (8 lowercase hex characters when generated) that grants
//! `duration` minutes of access, where `0` means no cap.
//!
//! - **Single use:** the first successful claim marks the voucher used and records the
//!   claimant's IP/MAC. Any later claim is denied.
//! - **Reusable:** any number of clients may claim it, but the access window still starts
//!   at the first claim and is never refreshed.
//! - **Expiration:** an absolute expiration always wins, even for unused vouchers.
//!
//! ## BinAuth Handoff
//!
//! The splash page validates a voucher with `/binauth-stage`, which stages the granted
//! duration in memory, keyed by MAC. The gateway's BinAuth script then polls
//! `/binauth-check` and consumes the grant exactly once. Unconsumed grants expire after
//! 30 seconds.
//!
//! ## Storage
//!
//! Vouchers and settings live in either a `SQLite` database or a single JSON file.
//! Both backends claim a voucher atomically so that two clients racing on the same
//! single-use code cannot both get online.

pub mod api;
pub mod cli;
pub mod store;
pub mod voucher;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
