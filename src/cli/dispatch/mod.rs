//! Command-line argument dispatch.
//!
//! Maps validated CLI arguments to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_PORT, ARG_WEB_ROOT, admin, store};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(7891);
    let web_root = matches
        .get_one::<PathBuf>(ARG_WEB_ROOT)
        .cloned()
        .context("missing required argument: --web-root")?;

    let backend = store::parse(matches)?;
    let admin_opts = admin::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        backend,
        web_root,
        admin_password: admin_opts.initial_password,
        session_ttl_seconds: admin_opts.session_ttl_seconds,
    }))
}
