//! HTTP client construction and small response helpers.

use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, HeaderMap};

use crate::config::DownloadConfig;
use crate::error::Result;

/// Builds a configured HTTP client for transfer requests.
///
/// Redirects are followed with reqwest's default policy.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client(config: &DownloadConfig) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.connect_timeout())
        .pool_idle_timeout(config.pool_idle_timeout())
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30));
    if let Some(timeout) = config.timeout() {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

/// Reads `Content-Length` straight from the headers.
///
/// `Response::content_length` reports the body size hint, which is zero for
/// HEAD responses, so the header is parsed directly.
#[must_use]
pub fn header_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Issues one GET and returns the URL the client ended up at after redirects.
///
/// The body is dropped unread.
///
/// # Errors
///
/// Returns [`crate::Error::Network`] if the request fails.
pub async fn resolve_final_url(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let final_url = response.url().to_string();
    if final_url != url {
        log::debug!("Resolved {url} to {final_url}");
    }
    Ok(final_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ServerOptions, TestServer};
    use reqwest::header::HeaderValue;

    #[test]
    fn header_length_parses_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(header_length(&headers), None);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1024"));
        assert_eq!(header_length(&headers), Some(1024));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("not-a-number"));
        assert_eq!(header_length(&headers), None);
    }

    #[test]
    fn client_builds_from_default_config() {
        let config = DownloadConfig::default().with_timeout(Some(Duration::from_secs(5)));
        assert!(build_http_client(&config).is_ok());
    }

    #[tokio::test]
    async fn resolve_follows_redirect() {
        let server = TestServer::start(ServerOptions::default()).await;
        let client = reqwest::Client::new();

        let resolved = resolve_final_url(&client, &server.url("/redirect/image.img"))
            .await
            .unwrap();
        assert_eq!(resolved, server.file_url());
    }

    #[tokio::test]
    async fn resolve_keeps_direct_url() {
        let server = TestServer::start(ServerOptions::default()).await;
        let client = reqwest::Client::new();

        let resolved = resolve_final_url(&client, &server.file_url()).await.unwrap();
        assert_eq!(resolved, server.file_url());
    }
}
