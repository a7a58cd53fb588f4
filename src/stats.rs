//! Transfer statistics.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::progress::TransferOutcome;

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn bytes_per_sec(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Tracks bytes and speed of one transfer while it runs.
#[derive(Debug)]
pub struct TransferStats {
    start_time: Instant,
    transferred: AtomicU64,
    peak_speed: AtomicU64,
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferStats {
    /// Starts tracking now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            transferred: AtomicU64::new(0),
            peak_speed: AtomicU64::new(0),
        }
    }

    /// Records written bytes and returns the current speed in bytes per second.
    pub fn record_bytes(&self, bytes: u64) -> u64 {
        let total = self.transferred.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let speed = bytes_per_sec(total, self.start_time.elapsed());
        self.peak_speed.fetch_max(speed, Ordering::Relaxed);
        speed
    }

    /// Bytes recorded so far.
    #[must_use]
    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    /// Time since tracking started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Highest speed observed.
    #[must_use]
    pub fn peak_speed(&self) -> u64 {
        self.peak_speed.load(Ordering::Relaxed)
    }

    /// Freezes the tracker into an outcome for `file_name` at `path`.
    #[must_use]
    pub fn into_outcome(self, file_name: String, path: PathBuf) -> TransferOutcome {
        let elapsed = self.elapsed();
        let bytes = self.transferred();
        TransferOutcome {
            file_name,
            path,
            bytes_transferred: bytes,
            from_cache: false,
            elapsed,
            average_speed: bytes_per_sec(bytes, elapsed),
            peak_speed: self.peak_speed(),
        }
    }
}

/// Statistics for an entire run over several targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Transfers that moved bytes.
    pub files_downloaded: usize,
    /// Transfers satisfied by a valid cached copy.
    pub files_cached: usize,
    /// Transfers that failed.
    pub files_failed: usize,
    /// Total bytes transferred.
    pub total_bytes: u64,
    /// Total elapsed time for the session.
    pub elapsed: Duration,
    /// Highest per-file peak speed.
    pub peak_speed: u64,
}

impl SessionStats {
    /// Average speed over the whole session in bytes per second.
    #[must_use]
    pub fn average_speed(&self) -> u64 {
        bytes_per_sec(self.total_bytes, self.elapsed)
    }
}

/// Builder for accumulating session statistics during a run.
#[derive(Debug)]
pub struct SessionStatsBuilder {
    stats: SessionStats,
    start_time: Instant,
}

impl Default for SessionStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStatsBuilder {
    /// Creates a new session stats builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stats: SessionStats::default(),
            start_time: Instant::now(),
        }
    }

    /// Records a finished transfer.
    pub fn add_outcome(&mut self, outcome: &TransferOutcome) {
        if outcome.from_cache {
            self.stats.files_cached += 1;
        } else {
            self.stats.files_downloaded += 1;
            self.stats.total_bytes += outcome.bytes_transferred;
            self.stats.peak_speed = self.stats.peak_speed.max(outcome.peak_speed);
        }
    }

    /// Records a failed transfer.
    pub const fn add_failure(&mut self) {
        self.stats.files_failed += 1;
    }

    /// Builds the final session statistics.
    #[must_use]
    pub fn build(mut self) -> SessionStats {
        self.stats.elapsed = self.start_time.elapsed();
        self.stats
    }
}
