//! Consuming progress signals until their transfers end.

use std::path::Path;

use futures::future::join_all;

use crate::background::{AsyncTransfer, TransferMode};
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::length::local_length;
use crate::progress::{TransferOutcome, TransferProgress};
use crate::stats::TransferStats;

/// Follows one background transfer until both of its queues are closed.
///
/// Byte reports are forwarded to `progress` in the order they arrive. An
/// error does not fail the transfer by itself: the producer may close the
/// byte queue at end of stream and still report a trailing error, so the
/// file on disk is measured and compared with the declared length first.
/// Only a mismatch, or an error with no declared length to compare against,
/// fails the transfer. A transfer that ends without an error but with the
/// wrong length on disk fails with [`Error::Incomplete`].
///
/// # Errors
///
/// Returns the first error that could not be explained away, or
/// [`Error::Incomplete`].
pub async fn aggregate<F: FileSystem + ?Sized>(
    fs: &F,
    transfer: AsyncTransfer,
    progress: &dyn TransferProgress,
) -> Result<TransferOutcome> {
    let AsyncTransfer {
        file_name,
        path,
        declared_length,
        mode,
        signal,
    } = transfer;
    let (mut bytes_rx, mut errors_rx) = signal.into_parts();

    progress.on_start(&path, declared_length);
    let stats = TransferStats::new();
    let mut bytes_open = true;
    let mut errors_open = true;
    let mut failure = None;

    loop {
        tokio::select! {
            received = bytes_rx.recv(), if bytes_open => match received {
                Some(n) => {
                    stats.record_bytes(n);
                    progress.on_progress(&path, n);
                }
                None => bytes_open = false,
            },
            received = errors_rx.recv(), if errors_open => match received {
                Some(e) => {
                    if completed_on_disk(fs, &path, declared_length).await {
                        log::warn!("Ignoring error after {} was complete: {e}", path.display());
                    } else {
                        log::error!("Transfer of {} failed: {e}", path.display());
                        failure.get_or_insert(e);
                    }
                }
                None => errors_open = false,
            },
            else => break,
        }
    }

    let result = match failure {
        Some(e) => Err(e),
        None => check_length(fs, &path, declared_length).await,
    };
    if let Err(e) = result {
        progress.on_error(&path, &e.to_string());
        return Err(e);
    }

    let outcome = if mode == TransferMode::Complete {
        TransferOutcome::cached(file_name, path, stats.elapsed())
    } else {
        stats.into_outcome(file_name, path)
    };
    progress.on_complete(&outcome.path, &outcome);
    Ok(outcome)
}

/// Follows several background transfers concurrently.
///
/// Results are in the same order as `transfers`.
pub async fn aggregate_all<F: FileSystem + ?Sized>(
    fs: &F,
    transfers: Vec<AsyncTransfer>,
    progress: &dyn TransferProgress,
) -> Vec<Result<TransferOutcome>> {
    join_all(
        transfers
            .into_iter()
            .map(|transfer| aggregate(fs, transfer, progress)),
    )
    .await
}

async fn completed_on_disk<F: FileSystem + ?Sized>(fs: &F, path: &Path, expected: u64) -> bool {
    expected != 0 && local_length(fs, path).await.is_ok_and(|actual| actual == expected)
}

async fn check_length<F: FileSystem + ?Sized>(fs: &F, path: &Path, expected: u64) -> Result<()> {
    if expected == 0 {
        return Ok(());
    }
    let actual = local_length(fs, path).await?;
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Incomplete {
            path: path.to_path_buf(),
            actual,
            expected,
        })
    }
}
