//! provision-dl - resumable, length-checked HTTP transfers for provisioning.
//!
//! This library fetches large remote artifacts (OS images, firmware bundles)
//! into local directories. A cached copy whose length matches the remote is
//! reused, a mismatching one is removed, and partial files left behind by a
//! background transfer are completed with byte-range requests.
//!
//! # Example
//!
//! ```no_run
//! use provision_dl::{DownloadConfig, Downloader, NoProgress, aggregate};
//!
//! # async fn example() -> provision_dl::Result<()> {
//! let downloader = Downloader::new(DownloadConfig::default())?;
//!
//! // Foreground: up to three attempts, partial files removed in between
//! let outcome = downloader
//!     .fetch_with_retries("https://example.com/os.img", "/var/cache/images", 3, &NoProgress)
//!     .await?;
//! println!("{} ready at {}", outcome.file_name, outcome.path.display());
//!
//! // Background: fresh or resumed transfer, observed through its signal
//! let transfer = downloader
//!     .start_async("https://example.com/firmware.bin", "/var/cache/images")
//!     .await?;
//! let outcome = aggregate(downloader.fs().as_ref(), transfer, &NoProgress).await?;
//! println!("{} bytes on disk", outcome.bytes_transferred);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod aggregate;
pub mod background;
#[cfg(feature = "cli")]
pub mod cli;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod fs;
pub mod length;
pub mod progress;
pub mod resume;
pub mod signal;
pub mod stats;
pub mod target;

#[cfg(test)]
mod test_support;

// Re-export main types for convenience
pub use aggregate::{aggregate, aggregate_all};
pub use background::{AsyncTransfer, TransferMode};
pub use client::build_http_client;
pub use config::{AppConfig, DownloadConfig, PathConfig};
pub use download::Downloader;
pub use error::{Error, Result};
pub use fs::{FileSystem, TokioFileSystem};
pub use length::{CacheState, LengthPair, RemoteProbe, local_length, probe_remote, remote_length};
pub use progress::{NoProgress, TransferOutcome, TransferProgress};
pub use resume::resume;
pub use signal::{ProgressSender, ProgressSignal, progress_channel};
pub use stats::{SessionStats, SessionStatsBuilder, TransferStats};
pub use target::TransferTarget;
