//! Transfer targets and file-name derivation.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::Url;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};

use crate::error::{Error, Result};

static FILENAME_EXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|;)\s*filename\*\s*=\s*"?(?:[^'";]*'[^'";]*')?([^";]+)"?"#)
        .expect("valid regex")
});

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|;)\s*filename\s*=\s*(?:"([^"]*)"|([^;\s]+))"#).expect("valid regex")
});

/// A single transfer request: where from, where to, under which name.
///
/// The file name is fixed once the transfer starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    url: String,
    destination: PathBuf,
    file_name: String,
}

impl TransferTarget {
    /// Builds a target named after the final path segment of `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the URL cannot be parsed or has no
    /// usable final segment.
    pub fn from_url(url: &str, destination: impl Into<PathBuf>) -> Result<Self> {
        let file_name = file_name_from_url(url)?;
        Ok(Self {
            url: url.to_string(),
            destination: destination.into(),
            file_name,
        })
    }

    /// Builds a target from a response's headers, preferring the
    /// `Content-Disposition` file name over the URL's final segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if neither source yields a usable name.
    pub fn from_response(
        url: &str,
        headers: &HeaderMap,
        destination: impl Into<PathBuf>,
    ) -> Result<Self> {
        let disposition = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(file_name_from_disposition);

        match disposition {
            Some(file_name) => Ok(Self {
                url: url.to_string(),
                destination: destination.into(),
                file_name,
            }),
            None => Self::from_url(url, destination),
        }
    }

    /// Source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Destination directory.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// File name inside the destination directory.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// `destination/file_name`.
    #[must_use]
    pub fn full_path(&self) -> PathBuf {
        self.destination.join(&self.file_name)
    }
}

/// Extracts the last non-empty path segment of a URL.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if `url` does not parse or has no segment.
pub fn file_name_from_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(sanitize_file_name)
        .ok_or_else(|| Error::InvalidUrl(format!("{url}: no file name in path")))
}

/// Parses the file name out of a `Content-Disposition` header value.
///
/// `filename*` (RFC 5987) wins over `filename`.
#[must_use]
pub fn file_name_from_disposition(value: &str) -> Option<String> {
    if let Some(caps) = FILENAME_EXT_RE.captures(value) {
        let decoded = percent_decode_str(caps[1].trim()).decode_utf8_lossy();
        if let Some(name) = sanitize_file_name(&decoded) {
            return Some(name);
        }
    }
    let caps = FILENAME_RE.captures(value)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
    sanitize_file_name(raw.trim())
}

/// Reduces a name to its final component and rejects names that would
/// escape the destination directory.
fn sanitize_file_name(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}
