//! Single-shot downloads and the retry loop around them.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::client::{build_http_client, header_length};
use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem, write_chunk};
use crate::length::{CacheState, LengthPair, local_length, probe_remote, remote_length};
use crate::progress::{TransferOutcome, TransferProgress};
use crate::stats::TransferStats;
use crate::target::TransferTarget;

/// Core downloader that fetches remote artifacts into local directories.
///
/// The file system is held behind an `Arc` so background transfers can share it.
pub struct Downloader<F: FileSystem = TokioFileSystem> {
    client: reqwest::Client,
    config: DownloadConfig,
    fs: Arc<F>,
}

impl Downloader<TokioFileSystem> {
    /// Creates a new downloader with the default file system and an HTTP
    /// client built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the client cannot
    /// be built.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        config.validate()?;
        let client = build_http_client(&config)?;
        Ok(Self {
            client,
            config,
            fs: Arc::new(TokioFileSystem),
        })
    }
}

impl<F: FileSystem> Downloader<F> {
    /// Creates a downloader from an existing client and a custom file system.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: DownloadConfig, fs: F) -> Self {
        Self {
            client,
            config,
            fs: Arc::new(fs),
        }
    }

    /// Returns a reference to the underlying HTTP client.
    #[must_use]
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Returns a reference to the download configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Returns the shared file system.
    #[must_use]
    pub const fn fs(&self) -> &Arc<F> {
        &self.fs
    }

    /// Probes `url` once and names the target after its `Content-Disposition`
    /// header, or the URL's final segment when there is none.
    ///
    /// A failed probe is not fatal here: the target is named from the URL and
    /// the remote length is taken as unknown.
    async fn resolve_target(&self, url: &str, destination: &Path) -> Result<(TransferTarget, u64)> {
        match probe_remote(&self.client, url).await {
            Ok(probe) => {
                let target = TransferTarget::from_response(url, &probe.headers, destination)?;
                Ok((target, probe.length))
            }
            Err(e) => {
                log::warn!("Could not probe {url}: {e}");
                Ok((TransferTarget::from_url(url, destination)?, 0))
            }
        }
    }

    /// Decides whether a cached copy at `path` can be used as is.
    ///
    /// `remote` is the already probed remote length, if any. A copy whose
    /// length differs from a known remote length is removed. When either
    /// length is unknown nothing is removed and the caller fetches again
    /// over it.
    async fn cache_is_valid(
        &self,
        target: &TransferTarget,
        path: &Path,
        remote: Option<u64>,
        progress: &dyn TransferProgress,
    ) -> Result<bool> {
        let Ok(local) = local_length(self.fs.as_ref(), path).await else {
            return Ok(false);
        };

        let remote = match remote {
            Some(length) => length,
            None => match remote_length(&self.client, target.url()).await {
                Ok(length) => length,
                Err(e) => {
                    log::warn!("Could not probe length of {}: {e}", target.url());
                    0
                }
            },
        };

        let lengths = LengthPair::new(local, remote);
        match lengths.cache_state() {
            CacheState::Valid => {
                log::debug!("Cached {} matches remote length {remote}", path.display());
                progress.on_cache_hit(path, local);
                Ok(true)
            }
            CacheState::Corrupted => {
                log::warn!(
                    "Removing corrupted {} ({local} bytes, remote has {remote})",
                    path.display()
                );
                progress.on_corrupted(path, local, remote);
                self.fs.remove_file(path).await?;
                Ok(false)
            }
            CacheState::Unverifiable => {
                log::debug!(
                    "Cannot verify {} (local {local}, remote {remote}), fetching again",
                    path.display()
                );
                Ok(false)
            }
        }
    }

    /// Fetches `url` into `destination`.
    ///
    /// The file is named after the `Content-Disposition` header of the length
    /// probe, falling back to the URL's final path segment.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable file name can be derived or the transfer
    /// fails.
    pub async fn fetch(
        &self,
        url: &str,
        destination: impl AsRef<Path>,
        progress: &dyn TransferProgress,
    ) -> Result<TransferOutcome> {
        let (target, remote) = self.resolve_target(url, destination.as_ref()).await?;
        self.fetch_resolved(&target, Some(remote), progress).await
    }

    /// Fetches a single target, skipping the network when a valid cached copy
    /// exists.
    ///
    /// On failure the partially written file is left on disk.
    ///
    /// # Errors
    ///
    /// Returns the network or I/O error that stopped the transfer.
    pub async fn fetch_target(
        &self,
        target: &TransferTarget,
        progress: &dyn TransferProgress,
    ) -> Result<TransferOutcome> {
        self.fetch_resolved(target, None, progress).await
    }

    async fn fetch_resolved(
        &self,
        target: &TransferTarget,
        remote: Option<u64>,
        progress: &dyn TransferProgress,
    ) -> Result<TransferOutcome> {
        let started = Instant::now();
        let path = target.full_path();

        if self.cache_is_valid(target, &path, remote, progress).await? {
            let outcome =
                TransferOutcome::cached(target.file_name().to_string(), path, started.elapsed());
            progress.on_complete(&outcome.path, &outcome);
            return Ok(outcome);
        }

        match self.fetch_body(target, &path, progress).await {
            Ok(outcome) => {
                log::info!(
                    "Fetched {} ({} bytes in {:.1?})",
                    outcome.path.display(),
                    outcome.bytes_transferred,
                    outcome.elapsed
                );
                progress.on_complete(&path, &outcome);
                Ok(outcome)
            }
            Err(e) => {
                progress.on_error(&path, &e.to_string());
                Err(e)
            }
        }
    }

    async fn fetch_body(
        &self,
        target: &TransferTarget,
        path: &Path,
        progress: &dyn TransferProgress,
    ) -> Result<TransferOutcome> {
        let destination = target.destination();
        if !destination.as_os_str().is_empty() {
            self.fs.create_dir_all(destination).await?;
        }
        let mut file = self.fs.create_file(path).await?;

        let mut response = self
            .client
            .get(target.url())
            .send()
            .await?
            .error_for_status()?;

        progress.on_start(path, header_length(response.headers()).unwrap_or(0));

        let stats = TransferStats::new();
        while let Some(chunk) = response.chunk().await? {
            write_chunk(&mut file, &chunk).await?;
            let written = chunk.len() as u64;
            stats.record_bytes(written);
            progress.on_progress(path, written);
        }

        Ok(stats.into_outcome(target.file_name().to_string(), path.to_path_buf()))
    }

    /// Fetches `url` up to `attempts` times, removing the partial file after
    /// each failed attempt.
    ///
    /// The target is resolved once, as in [`fetch`](Self::fetch), and kept
    /// for every attempt. Returns on the first success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `attempts` is zero, otherwise the error of
    /// the last attempt once all of them failed.
    pub async fn fetch_with_retries(
        &self,
        url: &str,
        destination: impl AsRef<Path>,
        attempts: u32,
        progress: &dyn TransferProgress,
    ) -> Result<TransferOutcome> {
        if attempts == 0 {
            return Err(Error::Config("attempts must be at least 1".to_string()));
        }

        let (target, remote) = self.resolve_target(url, destination.as_ref()).await?;
        let path = target.full_path();

        let mut attempt = 1;
        loop {
            log::info!("Fetching {} (try {attempt} of {attempts})", target.url());
            match self.fetch_resolved(&target, Some(remote), progress).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    log::warn!("Try {attempt} of {attempts} for {} failed: {e}", target.file_name());
                    self.remove_partial(&path).await;
                    if attempt >= attempts {
                        log::error!("Giving up on {} after {attempts} tries", target.url());
                        return Err(e);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Fetches `url` with the configured number of attempts.
    ///
    /// # Errors
    ///
    /// See [`fetch_with_retries`](Self::fetch_with_retries).
    pub async fn fetch_with_default_retries(
        &self,
        url: &str,
        destination: impl AsRef<Path>,
        progress: &dyn TransferProgress,
    ) -> Result<TransferOutcome> {
        self.fetch_with_retries(url, destination, self.config.attempts, progress)
            .await
    }

    async fn remove_partial(&self, path: &Path) {
        match self.fs.remove_file(path).await {
            Ok(()) => log::debug!("Removed partial {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Could not remove partial {}: {e}", path.display()),
        }
    }
}
