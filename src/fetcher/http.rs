//! reqwest-backed [`PageFetcher`]

use super::retry_formatter::{extract_error_type, RetryErrorType};
use super::{FetchError, FetchRequest, FetchResponse, FetchResult, PageFetcher};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Browser-like User-Agent sent with every request.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Plain HTTP implementation of the page-fetch capability.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    /// Build a client with the default browser-like headers.
    pub fn new() -> FetchResult<Self> {
        let client = Client::builder()
            .default_headers(default_headers())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                FetchError::permanent(
                    RetryErrorType::NetworkGeneric,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,application/pdf;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers
}

/// Transport failures are transient unless the request itself was invalid.
fn classify_transport(err: reqwest::Error) -> FetchError {
    let kind = extract_error_type(None, Some(&err));
    if err.is_builder() {
        FetchError::permanent(kind, err.to_string())
    } else {
        FetchError::transient(kind, err.to_string())
    }
}

#[async_trait]
impl PageFetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> FetchResult<FetchResponse> {
        let mut builder = self.client.get(&request.url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(classify_transport)?;
        let status = response.status().as_u16();
        let expected_len = response.content_length();
        let body = response.bytes().await.map_err(classify_transport)?;

        debug!(
            url = %request.url,
            status,
            bytes = body.len(),
            expected = ?expected_len,
            "Fetched"
        );
        Ok(FetchResponse {
            status,
            body: body.to_vec(),
            expected_len,
        })
    }
}
