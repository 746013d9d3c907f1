pub mod admin;
pub mod logging;
pub mod store;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

pub const ARG_PORT: &str = "port";
pub const ARG_WEB_ROOT: &str = "web-root";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("vouchergate")
        .about("Captive portal voucher authorization")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("7891")
                .env("VOUCHERGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_WEB_ROOT)
                .long(ARG_WEB_ROOT)
                .help("Directory with the splash and admin pages, served for unmatched paths")
                .env("VOUCHERGATE_WEB_ROOT")
                .default_value("/www/voucher")
                .value_parser(clap::value_parser!(PathBuf)),
        );

    let command = store::with_args(command);
    let command = admin::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "vouchergate");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Captive portal voucher authorization".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_port_and_web_root() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "vouchergate",
            "--port",
            "8080",
            "--web-root",
            "/srv/portal",
        ]);

        assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(8080));
        assert_eq!(
            matches.get_one::<PathBuf>(ARG_WEB_ROOT).cloned(),
            Some(PathBuf::from("/srv/portal"))
        );
    }

    #[test]
    fn test_default_port() {
        temp_env::with_vars([("VOUCHERGATE_PORT", None::<&str>)], || {
            let matches = new().get_matches_from(vec!["vouchergate"]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(7891));
        });
    }

    #[test]
    fn test_port_from_env() {
        temp_env::with_vars([("VOUCHERGATE_PORT", Some("9000"))], || {
            let matches = new().get_matches_from(vec!["vouchergate"]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9000));
        });
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let result = new().try_get_matches_from(vec!["vouchergate", "--port", "70000"]);
        assert!(result.is_err());
    }
}
