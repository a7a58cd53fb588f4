//! Background transfers observed through a progress signal.
//!
//! [`Downloader::start_async`] makes one GET to learn the file name and the
//! declared length, then hands the bulk of the work to a spawned task. The
//! task owns the [`ProgressSender`](crate::signal::ProgressSender), so both
//! queues close when it finishes, however it finishes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::StatusCode;

use crate::client::header_length;
use crate::download::Downloader;
use crate::error::Result;
use crate::fs::FileSystem;
use crate::length::LengthPair;
use crate::resume::resume;
use crate::signal::{ProgressSignal, progress_channel};
use crate::target::TransferTarget;

/// How a background transfer was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// No local file; the whole body is fetched.
    Fresh,
    /// A partial local file is completed with a ranged request.
    Resume {
        /// Local length when the transfer was started.
        offset: u64,
    },
    /// The local file was taken as complete; nothing is fetched.
    Complete,
}

/// A transfer running in the background.
#[derive(Debug)]
pub struct AsyncTransfer {
    /// Name of the file inside the destination directory.
    pub file_name: String,
    /// Full path of the destination file.
    pub path: PathBuf,
    /// Length to expect on disk when done, `0` if the remote did not say.
    pub declared_length: u64,
    /// Which branch the transfer took.
    pub mode: TransferMode,
    /// Consuming half of the transfer's progress queues.
    pub signal: ProgressSignal,
}

impl<F: FileSystem + 'static> Downloader<F> {
    /// Starts fetching `url` into `destination` without waiting for the body.
    ///
    /// | local file | remote length | action |
    /// |---|---|---|
    /// | absent | any | fresh fetch in the background |
    /// | present | unknown | complete, local length reported once |
    /// | present | not above local | complete, local length reported once |
    /// | present | above local | resume in the background |
    ///
    /// # Errors
    ///
    /// Returns an error if the probe request fails, no file name can be
    /// derived, or the destination file cannot be created. Failures after
    /// this returns arrive on the signal's error queue.
    pub async fn start_async(
        &self,
        url: &str,
        destination: impl AsRef<Path>,
    ) -> Result<AsyncTransfer> {
        let probe = self.client().get(url).send().await?.error_for_status()?;
        let target = TransferTarget::from_response(url, probe.headers(), destination.as_ref())?;
        let remote = if probe.status() == StatusCode::OK {
            header_length(probe.headers()).unwrap_or(0)
        } else {
            0
        };

        let path = target.full_path();
        let file_name = target.file_name().to_string();
        let (sender, signal) = progress_channel(self.config().queue_capacity.max(1));

        if let Some(local) = self.fs().file_size(&path).await {
            drop(probe);
            let lengths = LengthPair::new(local, remote);

            if lengths.is_resumable() {
                log::debug!("{} has {local} of {remote} bytes, resuming", path.display());
                let client = self.client().clone();
                let fs = Arc::clone(self.fs());
                let task_path = path.clone();
                let url = url.to_string();
                tokio::spawn(async move {
                    resume(&client, fs.as_ref(), &task_path, &url, sender).await;
                });
                return Ok(AsyncTransfer {
                    file_name,
                    path,
                    declared_length: remote,
                    mode: TransferMode::Resume { offset: local },
                    signal,
                });
            }

            if local > remote && lengths.remote_known() {
                log::warn!(
                    "{} is larger than the remote ({local} > {remote}), keeping it",
                    path.display()
                );
            } else {
                log::debug!("{} already present ({local} bytes)", path.display());
            }
            sender.report_bytes(local).await;
            sender.close();
            return Ok(AsyncTransfer {
                file_name,
                path,
                declared_length: local,
                mode: TransferMode::Complete,
                signal,
            });
        }

        let destination = target.destination();
        if !destination.as_os_str().is_empty() {
            self.fs().create_dir_all(destination).await?;
        }
        let mut file = self.fs().create_file(&path).await?;

        let task_path = path.clone();
        let mut response = probe;
        tokio::spawn(async move {
            match sender.copy_response(&mut response, &mut file).await {
                Ok(written) => {
                    log::info!("Fetched {} ({written} bytes)", task_path.display());
                }
                Err(e) => {
                    log::error!("Background fetch of {} failed: {e}", task_path.display());
                    sender.report_error(e).await;
                }
            }
        });

        Ok(AsyncTransfer {
            file_name,
            path,
            declared_length: remote,
            mode: TransferMode::Fresh,
            signal,
        })
    }
}
