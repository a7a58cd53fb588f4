//! Progress observation and transfer outcomes.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Trait for receiving transfer progress updates.
///
/// Implement this trait to receive callbacks during transfer operations.
/// Each transfer is identified by the full path of its destination file.
/// All methods have default no-op implementations for convenience.
pub trait TransferProgress: Send + Sync {
    /// Called when bytes are about to flow. `total` is `0` when unknown.
    fn on_start(&self, _path: &Path, _total: u64) {}

    /// Called with the number of bytes written since the last call.
    fn on_progress(&self, _path: &Path, _bytes_delta: u64) {}

    /// Called when a cached file matched the remote length and no fetch was needed.
    fn on_cache_hit(&self, _path: &Path, _size: u64) {}

    /// Called when a cached file was found to be corrupted and was removed.
    fn on_corrupted(&self, _path: &Path, _local: u64, _remote: u64) {}

    /// Called when a transfer completes successfully.
    fn on_complete(&self, _path: &Path, _outcome: &TransferOutcome) {}

    /// Called when a transfer fails.
    fn on_error(&self, _path: &Path, _error: &str) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl TransferProgress for NoProgress {}

/// Terminal result of one successful transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Name of the file inside the destination directory.
    pub file_name: String,
    /// Full path of the written file.
    pub path: PathBuf,
    /// Bytes accounted for by this transfer. For a resumed background
    /// transfer this includes the baseline that was already on disk.
    pub bytes_transferred: u64,
    /// True if the cached copy was used and nothing was fetched.
    pub from_cache: bool,
    /// Wall-clock time of the attempt.
    pub elapsed: Duration,
    /// Average speed in bytes per second.
    pub average_speed: u64,
    /// Peak speed in bytes per second.
    pub peak_speed: u64,
}

impl TransferOutcome {
    /// Outcome for a cached file that was used as is.
    #[must_use]
    pub const fn cached(file_name: String, path: PathBuf, elapsed: Duration) -> Self {
        Self {
            file_name,
            path,
            bytes_transferred: 0,
            from_cache: true,
            elapsed,
            average_speed: 0,
            peak_speed: 0,
        }
    }
}
