//! Resuming partial downloads with byte-range requests.

use std::path::Path;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, HeaderMap, RANGE};

use crate::client::resolve_final_url;
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::length::{LengthPair, local_length, remote_length};
use crate::signal::ProgressSender;

/// Appends the missing tail of `url` to the partial file at `path`.
///
/// Lengths are measured again here rather than trusted from the caller.
/// The current local length is reported first as the baseline, then each
/// appended chunk. Failures go to the error queue. `sender` is consumed, so
/// both queues are closed when this returns.
pub async fn resume<F: FileSystem + ?Sized>(
    client: &reqwest::Client,
    fs: &F,
    path: &Path,
    url: &str,
    sender: ProgressSender,
) {
    match try_resume(client, fs, path, url, &sender).await {
        Ok(appended) => log::info!("Resumed {}: appended {appended} bytes", path.display()),
        Err(e) => {
            log::error!("Resume of {} failed: {e}", path.display());
            sender.report_error(e).await;
        }
    }
}

async fn try_resume<F: FileSystem + ?Sized>(
    client: &reqwest::Client,
    fs: &F,
    path: &Path,
    url: &str,
    sender: &ProgressSender,
) -> Result<u64> {
    let final_url = resolve_final_url(client, url).await?;
    let lengths = LengthPair::new(
        local_length(fs, path).await?,
        remote_length(client, &final_url).await?,
    );
    let offset = lengths.local;
    sender.report_bytes(offset).await;

    if !lengths.is_resumable() {
        log::debug!(
            "Nothing to resume for {} (local {offset}, remote {})",
            path.display(),
            lengths.remote
        );
        return Ok(0);
    }

    log::debug!("Requesting bytes={offset}- of {final_url}");
    let mut response = client
        .get(&final_url)
        .header(RANGE, format!("bytes={offset}-"))
        .send()
        .await?;

    let status = response.status();
    if status != StatusCode::PARTIAL_CONTENT
        || content_range_start(response.headers()).is_some_and(|start| start != offset)
    {
        return Err(Error::ResumeUnsupported {
            url: final_url,
            status: status.as_u16(),
        });
    }

    let mut file = fs.open_append(path).await?;
    sender.copy_response(&mut response, &mut file).await
}

/// First byte position of a `Content-Range: bytes <start>-<end>/<total>` header.
fn content_range_start(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)?
        .to_str()
        .ok()?
        .trim()
        .strip_prefix("bytes ")?
        .split('-')
        .next()?
        .trim()
        .parse()
        .ok()
}
