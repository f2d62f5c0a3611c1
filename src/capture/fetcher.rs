//! HTTP fetcher implementation
//!
//! Builds the shared HTTP client and performs static-mode fetches. Errors
//! are classified into the capture-wide [`FetchError`] taxonomy so the
//! orchestrator can decide pass/fail; non-success statuses surface as
//! errors, never as content.

use crate::config::CaptureConfig;
use crate::FetchError;
use reqwest::header::HeaderMap;
use reqwest::{redirect::Policy, Client, Proxy};
use std::time::Duration;
use url::Url;

/// Redirect chains longer than this fail with `TooManyRedirects`
pub const MAX_REDIRECTS: usize = 10;

/// Result of a successful fetch
///
/// Owned by whichever step produced it; never mutated after creation.
#[derive(Debug)]
pub struct FetchResult {
    /// Final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: u16,
    /// Content-Type header value, if any
    pub content_type: Option<String>,
    /// Response body
    pub body: Vec<u8>,
    /// Full response headers
    pub headers: HeaderMap,
}

/// Builds the HTTP client used for every static fetch in a capture
///
/// Applies the configured user agent, per-request timeout, and optional
/// proxy; redirects are followed up to [`MAX_REDIRECTS`] hops.
pub fn build_http_client(config: &CaptureConfig) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

/// Fetches a URL directly, capturing the post-redirect final URL
///
/// The final URL matters for relative asset resolution: a page fetched at
/// `/a` that redirects to `/b/` resolves its relative references against
/// the latter.
pub async fn fetch_static(client: &Client, url: &Url) -> Result<FetchResult, FetchError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(classify_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Http(status.as_u16()));
    }

    let final_url = response.url().clone();
    let headers = response.headers().clone();
    let content_type = headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let body = response.bytes().await.map_err(classify_error)?.to_vec();

    Ok(FetchResult {
        final_url,
        status: status.as_u16(),
        content_type,
        body,
        headers,
    })
}

/// Maps a reqwest error onto the capture error taxonomy
pub(crate) fn classify_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        return FetchError::Timeout;
    }
    if e.is_redirect() {
        return FetchError::TooManyRedirects;
    }
    if let Some(status) = e.status() {
        return FetchError::Http(status.as_u16());
    }
    if e.is_connect() {
        // TLS failures come through the connect path; the error chain is the
        // only place the distinction shows up.
        let detail = format!("{:?}", e);
        if detail.contains("certificate")
            || detail.contains("Tls")
            || detail.contains("handshake")
        {
            return FetchError::Tls(e.to_string());
        }
        return FetchError::ConnectionRefused;
    }
    FetchError::Other(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let config = CaptureConfig::default();
        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_build_http_client_with_proxy() {
        let config = CaptureConfig {
            proxy: Some("http://127.0.0.1:8080".to_string()),
            ..CaptureConfig::default()
        };
        assert!(build_http_client(&config).is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused_classified() {
        let config = CaptureConfig {
            request_timeout_secs: 2,
            ..CaptureConfig::default()
        };
        let client = build_http_client(&config).unwrap();
        // Port 1 is essentially never listening
        let url = Url::parse("http://127.0.0.1:1/").unwrap();
        let err = fetch_static(&client, &url).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::ConnectionRefused | FetchError::Timeout
        ));
    }
}
