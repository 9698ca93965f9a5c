//! Command-line argument parsing.
//!
//! Hand-rolled parsing for the small flag surface: help, version, debug
//! output, an alternate settings file, and a user id override.

use std::path::PathBuf;

use crate::settings::UserId;

/// Parsed command line and the action it requests.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the scheduler daemon.
    Run {
        debug_enabled: bool,
        config_path: Option<PathBuf>,
        user: Option<UserId>,
    },
    /// Print usage and exit.
    Help,
    /// Print the version and exit.
    Version,
    /// Unknown flag; print usage and exit nonzero.
    Unknown(String),
}

/// Parse the arguments after the program name.
pub fn parse_args<I>(args: I) -> CliAction
where
    I: IntoIterator<Item = String>,
{
    let mut debug_enabled = false;
    let mut config_path = None;
    let mut user = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return CliAction::Help,
            "-V" | "--version" => return CliAction::Version,
            "-d" | "--debug" => debug_enabled = true,
            "-c" | "--config" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => return CliAction::Unknown("--config requires a path".to_string()),
            },
            "-u" | "--user" => match args.next().and_then(|value| value.parse().ok()) {
                Some(id) => user = Some(id),
                None => return CliAction::Unknown("--user requires a numeric id".to_string()),
            },
            other => return CliAction::Unknown(format!("unrecognized option '{other}'")),
        }
    }

    CliAction::Run {
        debug_enabled,
        config_path,
        user,
    }
}

/// Print usage information.
pub fn print_help() {
    println!("duskr {}", env!("CARGO_PKG_VERSION"));
    println!("Automatic day/night display tint scheduler");
    println!();
    println!("Usage: duskr [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -d, --debug          Enable debug output");
    println!("  -c, --config <PATH>  Use an alternate settings file");
    println!("  -u, --user <ID>      Attach the session for this user id");
    println!("  -h, --help           Print this help");
    println!("  -V, --version        Print the version");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliAction {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn no_arguments_runs_with_defaults() {
        assert_eq!(
            parse(&[]),
            CliAction::Run {
                debug_enabled: false,
                config_path: None,
                user: None,
            }
        );
    }

    #[test]
    fn flags_combine() {
        assert_eq!(
            parse(&["--debug", "--config", "/tmp/duskr.toml", "--user", "1000"]),
            CliAction::Run {
                debug_enabled: true,
                config_path: Some(PathBuf::from("/tmp/duskr.toml")),
                user: Some(1000),
            }
        );
    }

    #[test]
    fn help_and_version_short_circuit() {
        assert_eq!(parse(&["--help"]), CliAction::Help);
        assert_eq!(parse(&["-V", "--debug"]), CliAction::Version);
    }

    #[test]
    fn missing_values_are_rejected() {
        assert!(matches!(parse(&["--config"]), CliAction::Unknown(_)));
        assert!(matches!(parse(&["--user", "alice"]), CliAction::Unknown(_)));
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(matches!(parse(&["--frobnicate"]), CliAction::Unknown(_)));
    }
}
