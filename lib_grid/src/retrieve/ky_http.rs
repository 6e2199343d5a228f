//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest` with retry middleware.
//! Only the configured status codes (by default 500, 502, 503 and 504) are
//! retried; client errors, timeouts and connection failures fail at once.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{
    policies::ExponentialBackoff, RetryTransientMiddleware, Retryable, RetryableStrategy,
};
use serde::{de::DeserializeOwned, Serialize};

/// A standardized container for API responses.
///
/// This struct wraps the response body along with metadata about the HTTP
/// transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully decoded response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// `HTTP <code> <reason>` for a failed response.
    pub fn status_line(&self) -> String {
        let reason = StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("");
        format!("HTTP {} {}", self.status, reason).trim_end().to_string()
    }
}

/// Retries exactly the configured status codes.
#[derive(Debug, Clone)]
pub struct StatusRetryStrategy {
    statuses: Vec<u16>,
}

impl StatusRetryStrategy {
    pub fn new(statuses: Vec<u16>) -> Self {
        Self { statuses }
    }
}

impl RetryableStrategy for StatusRetryStrategy {
    fn handle(
        &self,
        res: &Result<reqwest::Response, reqwest_middleware::Error>,
    ) -> Option<Retryable> {
        match res {
            Ok(response) if self.statuses.contains(&response.status().as_u16()) => {
                Some(Retryable::Transient)
            }
            Ok(_) => None,
            Err(_) => Some(Retryable::Fatal),
        }
    }
}

/// Construction options for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retry_limit: u32,
    pub retry_status_codes: Vec<u16>,
    /// Sent with every request.
    pub default_headers: Vec<(String, String)>,
    /// Shortest backoff between attempts.
    pub min_backoff: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(15_000),
            retry_limit: 1,
            retry_status_codes: vec![500, 502, 503, 504],
            default_headers: Vec::new(),
            min_backoff: Duration::from_millis(300),
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs, default
/// headers and automatic retries.
#[derive(Clone)]
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
}

impl ApiClient {
    /// Creates a new `ApiClient` with timeout, default headers and the status
    /// retry policy.
    ///
    /// # Errors
    /// Fails if `base_url` is not an absolute URL, a default header is not a
    /// valid header, or the TLS backend cannot be initialised.
    pub fn new(base_url: &str, options: ClientOptions) -> anyhow::Result<Self> {
        // A trailing slash keeps the last base segment when joining.
        let normalised = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let url = Url::parse(&normalised)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &options.default_headers {
            headers.insert(HeaderName::from_bytes(name.as_bytes())?, HeaderValue::from_str(value)?);
        }

        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .default_headers(headers)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(options.min_backoff, options.min_backoff.max(Duration::from_secs(5)))
            .build_with_max_retries(options.retry_limit);

        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy_and_strategy(
                retry_policy,
                StatusRetryStrategy::new(options.retry_status_codes),
            ))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> anyhow::Result<reqwest::Response> {
        let full_url = self.base_url.join(path.trim_start_matches('/'))?;
        let mut req = self.inner.request(method, full_url);

        if let Some(h) = headers {
            req = req.headers(h);
        }

        if let Some(b) = body {
            use reqwest::header::CONTENT_TYPE;
            let json_body = serde_json::to_string(&b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        Ok(req.send().await?)
    }

    /// Performs a request and decodes a 2xx body as JSON into `T`.
    ///
    /// # Errors
    /// Returns an `anyhow::Error` if URL joining, the network, or JSON
    /// decoding of a successful body fails. Non-2xx statuses are not errors;
    /// they come back with `success == false` and the raw body.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let response = self.send(method, path, headers, body).await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }

    /// GET returning the body as text, for delimited (CSV) endpoints.
    pub async fn get_text(
        &self,
        path: &str,
        headers: Option<HeaderMap>,
    ) -> anyhow::Result<ApiResponse<String>> {
        let response = self.send::<()>(Method::GET, path, headers, None).await?;
        let status = response.status();
        let resp_headers = response.headers().clone();
        let success = status.is_success();
        let text = response.text().await?;

        Ok(ApiResponse {
            data: success.then(|| text.clone()),
            error_body: (!success).then_some(text),
            status: status.as_u16(),
            success,
            headers: resp_headers,
        })
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("base_url", &self.base_url.as_str()).finish()
    }
}
