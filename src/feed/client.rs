use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::Result;
use crate::error::FeedError;

const CORRELATION_HEADER: &str = "x-correlation-id";

/// HTTP client for the upstream CAP/Atom feed. One GET per poll cycle,
/// short timeouts, no retries: a failed fetch is counted by the failure
/// monitor and the next cycle tries again.
#[derive(Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    url: Url,
}

impl FeedClient {
    /// Build a `FeedClient` for the given feed URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client fails to build.
    pub fn new(url: Url, request_timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/xml"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(concat!("caprelay/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| FeedError::Client { source: err })?;

        Ok(Self { http, url })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch the raw feed document.
    ///
    /// # Errors
    ///
    /// Returns a `FeedError` on transport failure or a non-2xx status.
    pub async fn fetch(&self) -> Result<Vec<u8>> {
        let correlation_id = Uuid::now_v7().to_string();
        let started = Instant::now();

        let response = self
            .http
            .get(self.url.clone())
            .header(CORRELATION_HEADER, &correlation_id)
            .send()
            .await
            .map_err(FeedError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::HttpStatus { status }.into());
        }

        let body = response.bytes().await.map_err(FeedError::from)?;
        debug!(
            %correlation_id,
            latency_ms = started.elapsed().as_millis(),
            bytes = body.len(),
            "feed fetched"
        );
        Ok(body.to_vec())
    }
}
