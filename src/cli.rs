// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `jobctl`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobctl",
    version,
    about = "Run a group of dependent jobs to completion.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the job file (TOML).
    ///
    /// Default: `Jobs.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Jobs.toml")]
    pub jobs: String,

    /// Override `[group].poll_interval_ms` from the job file.
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBCTL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the jobs, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::try_parse_from(["jobctl"]).unwrap();
        assert_eq!(args.jobs, "Jobs.toml");
        assert!(args.poll_interval_ms.is_none());
        assert!(!args.dry_run);
    }

    #[test]
    fn parses_all_flags() {
        let args = CliArgs::try_parse_from([
            "jobctl",
            "--jobs",
            "ci/jobs.toml",
            "--poll-interval-ms",
            "200",
            "--log-level",
            "debug",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.jobs, "ci/jobs.toml");
        assert_eq!(args.poll_interval_ms, Some(200));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(args.dry_run);
    }
}
