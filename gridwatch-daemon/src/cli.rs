//! CLI argument definitions for gridwatch-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Gridwatch event correlation and alert distribution daemon.
///
/// Orchestrates the four pipeline stages (ingest, correlation, alert,
/// distribution) and manages their lifecycles.
#[derive(Parser, Debug)]
#[command(name = "gridwatch-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to gridwatch.toml configuration file.
    #[arg(short, long, default_value = "/etc/gridwatch/gridwatch.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cli = DaemonCli::parse_from(["gridwatch-daemon"]);
        assert_eq!(
            cli.config,
            PathBuf::from("/etc/gridwatch/gridwatch.toml")
        );
        assert!(!cli.validate);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn overrides_parse() {
        let cli = DaemonCli::parse_from([
            "gridwatch-daemon",
            "--config",
            "/tmp/test.toml",
            "--log-level",
            "debug",
            "--validate",
        ]);
        assert_eq!(cli.config, PathBuf::from("/tmp/test.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(cli.validate);
    }
}
