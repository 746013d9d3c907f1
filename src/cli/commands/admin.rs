use anyhow::{Result, anyhow};
use clap::{Arg, Command};
use secrecy::SecretString;

pub const ARG_ADMIN_PASSWORD: &str = "admin-password";
pub const ARG_SESSION_TTL: &str = "session-ttl";

#[derive(Debug)]
pub struct Options {
    pub initial_password: SecretString,
    pub session_ttl_seconds: u64,
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ADMIN_PASSWORD)
                .long(ARG_ADMIN_PASSWORD)
                .help("Admin password stored on first start; ignored once a password exists")
                .env("VOUCHERGATE_ADMIN_PASSWORD")
                .default_value("rosepinepink")
                .hide_env_values(true)
                .hide_default_value(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long(ARG_SESSION_TTL)
                .help("Admin session lifetime in seconds")
                .env("VOUCHERGATE_SESSION_TTL")
                .default_value("600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

impl Options {
    /// # Errors
    /// Returns an error if an admin argument is missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let initial_password = matches
            .get_one::<String>(ARG_ADMIN_PASSWORD)
            .cloned()
            .ok_or_else(|| anyhow!("missing required argument: --{ARG_ADMIN_PASSWORD}"))?;
        let session_ttl_seconds = matches
            .get_one::<u64>(ARG_SESSION_TTL)
            .copied()
            .unwrap_or(600);

        Ok(Self {
            initial_password: SecretString::from(initial_password),
            session_ttl_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn password_and_ttl_from_env() -> Result<()> {
        temp_env::with_vars(
            [
                ("VOUCHERGATE_ADMIN_PASSWORD", Some("hunter2")),
                ("VOUCHERGATE_SESSION_TTL", Some("120")),
            ],
            || {
                let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
                let options = Options::parse(&matches)?;
                assert_eq!(options.initial_password.expose_secret(), "hunter2");
                assert_eq!(options.session_ttl_seconds, 120);
                Ok(())
            },
        )
    }

    #[test]
    fn zero_session_ttl_is_rejected() {
        let result = with_args(Command::new("test")).try_get_matches_from(vec![
            "test",
            "--session-ttl",
            "0",
        ]);
        assert!(result.is_err());
    }
}
