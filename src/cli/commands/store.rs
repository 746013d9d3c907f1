use anyhow::{Result, anyhow};
use clap::{Arg, Command};
use std::path::PathBuf;

use crate::store::Backend;

pub const ARG_STORE: &str = "store";
pub const ARG_DSN: &str = "dsn";
pub const ARG_DATA_FILE: &str = "data-file";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_STORE)
                .long(ARG_STORE)
                .help("Voucher storage backend")
                .env("VOUCHERGATE_STORE")
                .default_value("sqlite")
                .value_parser(["sqlite", "file"]),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("SQLite connection string, used with --store sqlite")
                .env("VOUCHERGATE_DSN")
                .default_value("sqlite:///data/voucher.db?mode=rwc"),
        )
        .arg(
            Arg::new(ARG_DATA_FILE)
                .long(ARG_DATA_FILE)
                .help("JSON data file, used with --store file")
                .env("VOUCHERGATE_DATA_FILE")
                .default_value("/data/voucher.json")
                .value_parser(clap::value_parser!(PathBuf)),
        )
}

/// Resolve the configured storage backend.
///
/// # Errors
/// Returns an error if the backend name or its location is missing.
pub fn parse(matches: &clap::ArgMatches) -> Result<Backend> {
    let store = matches
        .get_one::<String>(ARG_STORE)
        .map_or("sqlite", String::as_str);

    match store {
        "sqlite" => {
            let dsn = matches
                .get_one::<String>(ARG_DSN)
                .cloned()
                .ok_or_else(|| anyhow!("missing required argument: --{ARG_DSN}"))?;
            Ok(Backend::Sqlite { dsn })
        }
        "file" => {
            let path = matches
                .get_one::<PathBuf>(ARG_DATA_FILE)
                .cloned()
                .ok_or_else(|| anyhow!("missing required argument: --{ARG_DATA_FILE}"))?;
            Ok(Backend::File { path })
        }
        other => Err(anyhow!("unknown store backend: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(args: &[&str]) -> clap::ArgMatches {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        with_args(Command::new("test")).get_matches_from(argv)
    }

    #[test]
    fn defaults_to_sqlite() {
        temp_env::with_vars(
            [
                ("VOUCHERGATE_STORE", None::<&str>),
                ("VOUCHERGATE_DSN", None::<&str>),
            ],
            || {
                let backend = parse(&matches(&[])).ok();
                assert_eq!(
                    backend,
                    Some(Backend::Sqlite {
                        dsn: "sqlite:///data/voucher.db?mode=rwc".to_string()
                    })
                );
            },
        );
    }

    #[test]
    fn file_backend_from_env() {
        temp_env::with_vars(
            [
                ("VOUCHERGATE_STORE", Some("file")),
                ("VOUCHERGATE_DATA_FILE", Some("/tmp/vouchers.json")),
            ],
            || {
                let backend = parse(&matches(&[])).ok();
                assert_eq!(
                    backend,
                    Some(Backend::File {
                        path: PathBuf::from("/tmp/vouchers.json")
                    })
                );
            },
        );
    }

    #[test]
    fn unknown_backend_is_rejected_by_clap() {
        let result = with_args(Command::new("test")).try_get_matches_from(vec![
            "test", "--store", "redis",
        ]);
        assert!(result.is_err());
    }
}
