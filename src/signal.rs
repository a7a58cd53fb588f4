//! Progress signalling between a background transfer and its observer.
//!
//! A transfer reports through two one-way queues: byte deltas and errors.
//! [`ProgressSender`] is the producing half and is deliberately not `Clone`;
//! [`ProgressSignal`] is the consuming half. Dropping the sender closes both
//! queues, so a producer task that owns it closes them on every exit path.

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::fs::write_chunk;

/// Errors a producer reports before it stops. Only one is ever sent, but a
/// small buffer keeps the send from waiting on the consumer.
const ERROR_QUEUE_CAPACITY: usize = 1;

/// Creates a connected sender/signal pair whose byte queue holds `capacity` reports.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn progress_channel(capacity: usize) -> (ProgressSender, ProgressSignal) {
    let (bytes_tx, bytes_rx) = mpsc::channel(capacity);
    let (errors_tx, errors_rx) = mpsc::channel(ERROR_QUEUE_CAPACITY);
    (
        ProgressSender {
            bytes: bytes_tx,
            errors: errors_tx,
        },
        ProgressSignal {
            bytes: bytes_rx,
            errors: errors_rx,
        },
    )
}

/// Producing half of a progress signal.
#[derive(Debug)]
pub struct ProgressSender {
    pub(crate) bytes: mpsc::Sender<u64>,
    pub(crate) errors: mpsc::Sender<Error>,
}

impl ProgressSender {
    /// Reports bytes written to disk. Waits only while the byte queue is full.
    ///
    /// A consumer that went away is not an error for the producer; the
    /// transfer keeps writing.
    pub async fn report_bytes(&self, bytes: u64) {
        if self.bytes.send(bytes).await.is_err() {
            log::trace!("Progress consumer gone, dropping {bytes} byte report");
        }
    }

    /// Reports the error that ended the transfer.
    pub async fn report_error(&self, error: Error) {
        if let Err(e) = self.errors.send(error).await {
            log::debug!("Progress consumer gone, dropping error: {}", e.0);
        }
    }

    /// Closes both queues.
    pub fn close(self) {
        drop(self);
    }

    /// Streams a response body into `file`, reporting each chunk once it is
    /// on disk. Returns the number of bytes written.
    pub(crate) async fn copy_response(
        &self,
        response: &mut reqwest::Response,
        file: &mut tokio::fs::File,
    ) -> Result<u64> {
        let mut written = 0;
        while let Some(chunk) = response.chunk().await? {
            write_chunk(file, &chunk).await?;
            let len = chunk.len() as u64;
            written += len;
            self.report_bytes(len).await;
        }
        Ok(written)
    }
}

/// Consuming half of a progress signal.
#[derive(Debug)]
pub struct ProgressSignal {
    pub(crate) bytes: mpsc::Receiver<u64>,
    pub(crate) errors: mpsc::Receiver<Error>,
}

impl ProgressSignal {
    /// Receives the next byte report, `None` once the byte queue is closed and drained.
    pub async fn recv_bytes(&mut self) -> Option<u64> {
        self.bytes.recv().await
    }

    /// Receives the next error, `None` once the error queue is closed and drained.
    pub async fn recv_error(&mut self) -> Option<Error> {
        self.errors.recv().await
    }

    /// Splits into the raw byte and error receivers.
    #[must_use]
    pub fn into_parts(self) -> (mpsc::Receiver<u64>, mpsc::Receiver<Error>) {
        (self.bytes, self.errors)
    }
}
