//! Local and remote length probes.
//!
//! Integrity of a cached artifact is approximated by comparing byte lengths.
//! A remote length of `0` means "unknown" (chunked transfer, or a server that
//! does not report one) and never counts as evidence of corruption.

use std::path::Path;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;

use crate::client::header_length;
use crate::error::{Error, Result};
use crate::fs::FileSystem;

/// Returns the byte length of a local file.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if there is no file at `path`.
pub async fn local_length<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> Result<u64> {
    fs.file_size(path).await.ok_or_else(|| Error::NotFound {
        path: path.to_path_buf(),
    })
}

/// What a length probe learned about a remote resource.
#[derive(Debug, Clone, Default)]
pub struct RemoteProbe {
    /// Advertised length, `0` if unknown.
    pub length: u64,
    /// Headers of the response the length was read from.
    pub headers: HeaderMap,
}

/// Probes a remote resource for its length and headers.
///
/// A HEAD request is tried first so no body is transferred. Origins that
/// reject HEAD or omit `Content-Length` on it get a GET, whose headers are
/// read and whose body is dropped unread.
///
/// # Errors
///
/// Returns [`Error::Network`] if the GET fails or answers with an error status.
pub async fn probe_remote(client: &reqwest::Client, url: &str) -> Result<RemoteProbe> {
    match client.head(url).send().await {
        Ok(response) if response.status().is_success() => {
            if let Some(length) = header_length(response.headers()).filter(|&n| n > 0) {
                return Ok(RemoteProbe {
                    length,
                    headers: response.headers().clone(),
                });
            }
            log::debug!("HEAD {url} reported no length, falling back to GET");
        }
        Ok(response) => {
            log::debug!("HEAD {url} answered {}, falling back to GET", response.status());
        }
        Err(e) => log::debug!("HEAD {url} failed ({e}), falling back to GET"),
    }

    let response = client.get(url).send().await?.error_for_status()?;
    let length = if response.status() == StatusCode::OK {
        header_length(response.headers()).unwrap_or(0)
    } else {
        0
    };
    let headers = response.headers().clone();
    drop(response);
    Ok(RemoteProbe { length, headers })
}

/// Returns the byte length a remote resource advertises, `0` when unknown.
///
/// # Errors
///
/// See [`probe_remote`].
pub async fn remote_length(client: &reqwest::Client, url: &str) -> Result<u64> {
    Ok(probe_remote(client, url).await?.length)
}

/// A local/remote length pair measured for one destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPair {
    /// Bytes currently on disk.
    pub local: u64,
    /// Bytes the remote advertises, `0` if unknown.
    pub remote: u64,
}

/// What a [`LengthPair`] says about a cached file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Both lengths known and equal; the cached file can be used as is.
    Valid,
    /// Both lengths known and different; the cached file must be removed.
    Corrupted,
    /// At least one side is zero; nothing can be concluded.
    Unverifiable,
}

impl LengthPair {
    /// Creates a new pair.
    #[must_use]
    pub const fn new(local: u64, remote: u64) -> Self {
        Self { local, remote }
    }

    /// Returns true if the remote reported a length.
    #[must_use]
    pub const fn remote_known(&self) -> bool {
        self.remote != 0
    }

    /// Classifies the cached file for the single-shot downloader.
    #[must_use]
    pub const fn cache_state(&self) -> CacheState {
        if self.local == 0 || self.remote == 0 {
            CacheState::Unverifiable
        } else if self.local == self.remote {
            CacheState::Valid
        } else {
            CacheState::Corrupted
        }
    }

    /// Returns true if the local file is a prefix that a ranged request can complete.
    #[must_use]
    pub const fn is_resumable(&self) -> bool {
        self.remote_known() && self.local < self.remote
    }
}
