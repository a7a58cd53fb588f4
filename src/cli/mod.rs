//! CLI mode for provision-dl.

mod progress;

use std::path::{Path, PathBuf};

use indicatif::MultiProgress;

use crate::aggregate::aggregate_all;
use crate::config::AppConfig;
use crate::download::Downloader;
use crate::error::{Error, Result};
use crate::stats::{SessionStats, SessionStatsBuilder};

pub use progress::{BarProgress, make_progress_bar, make_total_progress_bar, print_summary};

/// Options for one CLI run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// URLs to fetch, in order.
    pub urls: Vec<String>,
    /// Destination directory; the configured one when absent.
    pub destination: Option<PathBuf>,
    /// Attempts per URL; the configured count when absent.
    pub attempts: Option<u32>,
    /// Explicit configuration file.
    pub config_path: Option<PathBuf>,
    /// Run all transfers in the background and aggregate them.
    pub background: bool,
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print usage and exit.
    Help,
    /// Fetch the given URLs.
    Run(CliArgs),
}

/// Parses command-line arguments (without the program name).
///
/// # Errors
///
/// Returns [`Error::Config`] for unknown options, missing or malformed option
/// values, or when no URL is given.
pub fn parse_args<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-d" | "--dest" => {
                parsed.destination = Some(PathBuf::from(option_value(&arg, args.next())?));
            }
            "-a" | "--attempts" => {
                let value = option_value(&arg, args.next())?;
                let attempts = value
                    .parse()
                    .map_err(|_| Error::Config(format!("{arg} expects a number, got {value}")))?;
                parsed.attempts = Some(attempts);
            }
            "-c" | "--config" => {
                parsed.config_path = Some(PathBuf::from(option_value(&arg, args.next())?));
            }
            "-b" | "--background" => parsed.background = true,
            "-h" | "--help" => return Ok(Command::Help),
            other if !other.starts_with('-') => parsed.urls.push(other.to_string()),
            other => return Err(Error::Config(format!("Unknown option: {other}"))),
        }
    }

    if parsed.urls.is_empty() {
        return Err(Error::Config("no URLs given".to_string()));
    }
    Ok(Command::Run(parsed))
}

fn option_value(option: &str, value: Option<String>) -> Result<String> {
    value.ok_or_else(|| Error::Config(format!("{option} requires a value")))
}

/// Prints usage to stderr.
pub fn print_usage() {
    eprintln!("Usage: provision-dl [OPTIONS] <url>...");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <url>                 Artifact to fetch (OS image, firmware bundle, ...)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -d, --dest <DIR>      Destination directory (default: configured download_dir)");
    eprintln!("  -a, --attempts <N>    Attempts per URL in foreground mode (default: 3)");
    eprintln!("  -c, --config <FILE>   Configuration file (default: <config dir>/provision-dl/config.toml)");
    eprintln!("  -b, --background      Start all transfers at once, resuming partial files");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_LOG              Log filter (default: warn)");
}

/// Runs the CLI with parsed arguments and prints a summary.
///
/// Individual transfer failures are counted in the returned statistics
/// rather than returned as errors.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the HTTP client
/// cannot be built.
pub async fn run(args: CliArgs) -> Result<SessionStats> {
    let config = AppConfig::load(args.config_path.as_deref())?;
    let mut download = config.download;
    if let Some(attempts) = args.attempts {
        download = download.with_attempts(attempts);
    }
    let destination = args.destination.unwrap_or(config.paths.download_dir);
    let downloader = Downloader::new(download)?;

    let stats = if args.background {
        run_background(&downloader, &args.urls, &destination).await
    } else {
        run_foreground(&downloader, &args.urls, &destination).await
    };
    print_summary(&stats);
    Ok(stats)
}

async fn run_foreground(
    downloader: &Downloader,
    urls: &[String],
    destination: &Path,
) -> SessionStats {
    let multi = MultiProgress::new();
    let progress = BarProgress::new(multi.clone(), None);
    let mut builder = SessionStatsBuilder::new();

    for url in urls {
        match downloader
            .fetch_with_default_retries(url, destination, &progress)
            .await
        {
            Ok(outcome) => builder.add_outcome(&outcome),
            Err(e) => {
                let _ = multi.println(format!("Giving up on {url}: {e}"));
                if e.is_resume_unsupported() {
                    let _ = multi.println("  Delete the local file and run again.");
                }
                builder.add_failure();
            }
        }
    }

    builder.build()
}

async fn run_background(
    downloader: &Downloader,
    urls: &[String],
    destination: &Path,
) -> SessionStats {
    let multi = MultiProgress::new();
    let mut builder = SessionStatsBuilder::new();

    let mut transfers = Vec::with_capacity(urls.len());
    for url in urls {
        match downloader.start_async(url, destination).await {
            Ok(transfer) => transfers.push(transfer),
            Err(e) => {
                let _ = multi.println(format!("Could not start {url}: {e}"));
                builder.add_failure();
            }
        }
    }

    let declared: u64 = transfers.iter().map(|t| t.declared_length).sum();
    let total_bar = multi.add(make_total_progress_bar(declared));
    let progress = BarProgress::new(multi.clone(), Some(total_bar.clone()));

    for result in aggregate_all(downloader.fs().as_ref(), transfers, &progress).await {
        match result {
            Ok(outcome) => builder.add_outcome(&outcome),
            Err(e) => {
                if e.is_resume_unsupported() {
                    let _ = multi.println("  Delete the local file and run again.");
                }
                builder.add_failure();
            }
        }
    }
    total_bar.finish_and_clear();

    builder.build()
}
