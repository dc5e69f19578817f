//! CLI argument definitions for the FloodSafe application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// FloodSafe - flood-safety chat assistant and flood status lookup.
#[derive(Parser, Debug)]
#[command(name = "floodsafe", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// API server port (serve only).
    #[arg(short = 'p', long = "port", global = true)]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Chat with the assistant in the terminal.
    Chat {
        /// Latitude used to localize advice.
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,
        /// Longitude used to localize advice.
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,
    },
    /// Query the flood-prediction service for a point.
    Status {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },
}

impl CliArgs {
    /// The subcommand to run; `serve` when none is given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > FLOODSAFE_CONFIG env var > ~/.floodsafe/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("FLOODSAFE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > FLOODSAFE_PORT env var > config file value > 8080.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("FLOODSAFE_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        if config_port != 0 {
            return config_port;
        }
        8080
    }

    /// Resolve the tracing filter directive.
    ///
    /// Priority: --log-level flag > RUST_LOG env var > config file value > "info".
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            if !filter.trim().is_empty() {
                return filter;
            }
        }
        if !config_level.trim().is_empty() {
            return config_level.to_string();
        }
        "info".to_string()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".floodsafe").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".floodsafe").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_serve() {
        let args = CliArgs::try_parse_from(["floodsafe"]).unwrap();
        assert_eq!(args.command(), Command::Serve);
    }

    #[test]
    fn test_status_accepts_negative_coordinates() {
        let args =
            CliArgs::try_parse_from(["floodsafe", "status", "--lat", "-33.86", "--lon", "151.2"])
                .unwrap();
        assert_eq!(
            args.command(),
            Command::Status {
                lat: -33.86,
                lon: 151.2
            }
        );
    }

    #[test]
    fn test_status_requires_both_coordinates() {
        assert!(CliArgs::try_parse_from(["floodsafe", "status", "--lat", "1"]).is_err());
    }

    #[test]
    fn test_chat_location_is_optional_but_paired() {
        let args = CliArgs::try_parse_from(["floodsafe", "chat"]).unwrap();
        assert_eq!(
            args.command(),
            Command::Chat {
                lat: None,
                lon: None
            }
        );
        assert!(CliArgs::try_parse_from(["floodsafe", "chat", "--lat", "19.0"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            CliArgs::try_parse_from(["floodsafe", "serve", "--port", "9000", "-l", "debug"])
                .unwrap();
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.resolve_port(8080), 9000);
        assert_eq!(args.resolve_log_level("info"), "debug");
    }

    #[test]
    fn test_config_flag_wins() {
        let args = CliArgs::try_parse_from(["floodsafe", "-c", "/tmp/fs.toml"]).unwrap();
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/fs.toml"));
    }

    #[test]
    fn test_default_config_path_under_floodsafe_dir() {
        let path = default_config_path();
        assert!(path.ends_with("config.toml"));
    }
}
