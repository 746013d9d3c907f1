use crate::{
    api::{
        self,
        handlers::admin::{AdminSessions, AdminState},
    },
    cli::telemetry,
    store::{ADMIN_PASSWORD_KEY, Backend},
    voucher::VoucherEngine,
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub backend: Backend,
    pub web_root: PathBuf,
    pub admin_password: SecretString,
    pub session_ttl_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be opened, the admin password cannot be
/// initialized, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let stores = args
        .backend
        .open()
        .await
        .with_context(|| format!("Failed to open {} store", args.backend.name()))?;

    let initialized = stores
        .settings
        .initialize_setting(ADMIN_PASSWORD_KEY, args.admin_password.expose_secret())
        .await
        .context("Failed to initialize admin password")?;
    if initialized {
        info!("Admin password initialized from configuration");
    }

    let engine = Arc::new(VoucherEngine::new(stores.vouchers));
    let admin = Arc::new(AdminState::new(
        stores.settings,
        AdminSessions::new(Duration::from_secs(args.session_ttl_seconds)),
    ));

    let web_root = if args.web_root.is_dir() {
        Some(args.web_root)
    } else {
        warn!(
            "Web root {} is not a directory; static pages are disabled",
            args.web_root.display()
        );
        None
    };

    let result = api::new(args.port, api::app(engine, admin, web_root)).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let location = match &args.backend {
        Backend::Sqlite { dsn } => dsn.clone(),
        Backend::File { path } => path.display().to_string(),
    };
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("store", args.backend.name().to_string()),
        ("location", location),
        ("web_root", args.web_root.display().to_string()),
        ("session_ttl", format!("{}s", args.session_ttl_seconds)),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_commit_truncates() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
        assert_eq!(short_commit(" unknown "), "unknown");
    }
}
