//! Command-line interface: one-shot fetch, continuous polling, backfill and the dashboard.

use crate::config::{Config, DEFAULT_BASE_URL};
use crate::events::ConsoleSink;
use crate::fetch::RemoteSource;
use crate::pipeline::{self, RunMode};
use crate::snapshot::MissingNamePolicy;
use crate::tui;
use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "giscovid",
    version,
    about = "Poll the Piedmont COVID-19 dashboard and store per-municipality case snapshots"
)]
pub struct Args {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Fetch the latest update once. Exit status 0 = new snapshot written, 1 = no new data
    Fetch,
    /// Keep checking for new updates with a fixed delay
    Poll(PollArgs),
    /// Rebuild snapshots from previously downloaded payload files
    Backfill(BackfillArgs),
    /// Interactive terminal dashboard
    Dashboard,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct CommonArgs {
    /// Base URL of the tile-data backend
    #[arg(long, global = true, value_name = "URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Municipality reference file (`codice_comune;denominazione`)
    #[arg(long, global = true, value_name = "FILE", default_value = "comuni_piemonte.csv")]
    pub comuni: PathBuf,

    /// Directory for CSV snapshots
    #[arg(short, long, global = true, value_name = "DIR", default_value = "dataset")]
    pub output: PathBuf,

    /// Keep zstd copies of downloaded payloads in this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub archive: Option<PathBuf>,

    /// Fail when a municipality code is missing from the reference file
    #[arg(long, global = true)]
    pub strict_names: bool,

    /// HTTP timeout in seconds
    #[arg(long, global = true, value_name = "SECS", default_value_t = 60)]
    pub timeout: u64,

    /// Increase logging verbosity (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only show errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct PollArgs {
    /// Seconds between checks
    #[arg(long, value_name = "SECS", default_value_t = 900)]
    pub interval: u64,

    /// Stop after this many checks
    #[arg(long, value_name = "N")]
    pub cycles: Option<u64>,

    /// Exit on the first failed check instead of waiting for the next one
    #[arg(long)]
    pub stop_on_error: bool,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct BackfillArgs {
    /// `;`-separated manifest with a `datetime;data;header` header row
    #[arg(long, value_name = "FILE", default_value = "import_data/manifest.csv")]
    pub manifest: PathBuf,
}

impl Args {
    pub fn config(&self) -> Config {
        let c = &self.common;
        let mut config = Config {
            base_url: c.base_url.clone(),
            comuni_path: c.comuni.clone(),
            output_dir: c.output.clone(),
            archive_dir: c.archive.clone(),
            missing_names: if c.strict_names {
                MissingNamePolicy::Strict
            } else {
                MissingNamePolicy::Placeholder
            },
            request_timeout: Duration::from_secs(c.timeout),
            ..Config::default_piemonte()
        };
        if let Commands::Poll(poll) = &self.command {
            config.poll_interval = Duration::from_secs(poll.interval);
            config.stop_on_error = poll.stop_on_error;
        }
        config
    }

    pub fn log_level(&self) -> &'static str {
        if self.common.quiet {
            return "error";
        }
        match self.common.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn init_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("giscovid_poller={}", args.log_level())));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init();
}

fn headless(args: &Args, config: &Config) -> Arc<ConsoleSink> {
    init_logging(args);
    debug!(?config, "configuration");
    ConsoleSink::new()
}

/// Dispatch a parsed command line. The returned code is the process exit status.
pub fn run(args: Args) -> Result<ExitCode> {
    let config = args.config();

    match &args.command {
        Commands::Fetch => {
            let sink = headless(&args, &config);
            let source = RemoteSource::new(&config.base_url, config.request_timeout);
            let summary = pipeline::run(&config, &source, RunMode::Once, &*sink)?;
            Ok(if summary.written.is_empty() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Poll(poll) => {
            let sink = headless(&args, &config);
            let source = RemoteSource::new(&config.base_url, config.request_timeout);
            let mode = RunMode::Repeat {
                interval: config.poll_interval,
                max_cycles: poll.cycles,
            };
            let summary = pipeline::run(&config, &source, mode, &*sink)?;
            println!(
                "  {} checks, {} snapshots written, {} without new data, {} failed",
                summary.cycles,
                summary.written.len(),
                summary.skipped,
                summary.failures
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Backfill(backfill) => {
            let sink = headless(&args, &config);
            let entries = pipeline::load_manifest(&backfill.manifest)?;
            let written = pipeline::backfill(&config, &entries, &*sink)?;
            for path in written {
                println!("  Generated {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Dashboard => {
            // no subscriber here: log lines would tear the alternate screen
            tui::run(config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_args_into_config() {
        let args = Args::parse_from([
            "giscovid",
            "poll",
            "--interval",
            "60",
            "--cycles",
            "3",
            "--stop-on-error",
            "--strict-names",
            "--output",
            "/tmp/out",
        ]);
        let config = args.config();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert!(config.stop_on_error);
        assert_eq!(config.missing_names, MissingNamePolicy::Strict);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert!(matches!(args.command, Commands::Poll(PollArgs { cycles: Some(3), .. })));
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["giscovid", "fetch"]);
        let config = args.config();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.comuni_path, PathBuf::from("comuni_piemonte.csv"));
        assert_eq!(config.archive_dir, None);
        assert_eq!(args.log_level(), "info");
    }

    #[test]
    fn test_log_level() {
        assert_eq!(Args::parse_from(["giscovid", "-vv", "fetch"]).log_level(), "trace");
        assert_eq!(Args::parse_from(["giscovid", "fetch", "-q"]).log_level(), "error");
    }
}
