//! # NEM API Client
//!
//! Low-level access to the NEM dashboard API: one shared `ApiClient` carrying
//! the `x-api-key` header, cancellation racing, `{"data": ...}` envelope
//! unwrapping and diagnostic logging. Failures are logged with the endpoint
//! and status only; response bodies are never logged.

use crate::loggers::loggerlocal::LoggerLocal;
use crate::retrieve::ky_http::{ApiClient, ClientOptions};
use crate::retrieve::outcome::FetchOutcome;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Path prefix shared by every dashboard endpoint.
pub const NEM_DASHBOARD_PREFIX: &str = "NEM/v1/PWS/NEMDashboard/";

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// # NEM API Call Client
///
/// Wraps an `ApiClient` bound to the NEM base URL and a shared logger.
pub struct NemApiCall {
    client: ApiClient,
    logger: Arc<LoggerLocal>,
}

impl NemApiCall {
    /// Builds the client; `options` gets the API key header added.
    pub fn new(
        base_url: &str,
        api_key: &str,
        mut options: ClientOptions,
        logger: Arc<LoggerLocal>,
    ) -> anyhow::Result<Self> {
        options
            .default_headers
            .push((API_KEY_HEADER.to_string(), api_key.to_string()));
        Ok(Self {
            client: ApiClient::new(base_url, options)?,
            logger,
        })
    }

    /// GETs `path` and returns the content of its `data` envelope.
    ///
    /// Cancellation is checked first on every poll, so a fired token always
    /// yields [`FetchOutcome::Cancelled`] and nothing is logged.
    pub async fn fetch_data(&self, path: &str, token: &CancellationToken) -> FetchOutcome<Value> {
        let request = self.client.request::<Value, ()>(Method::GET, path, None, None);
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return FetchOutcome::Cancelled,
            response = request => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                let message = format!("{e:#}");
                self.logger
                    .error(&format!("[NemApi] {path}: {message}"), Some(json!({"path": path})))
                    .await;
                return FetchOutcome::Failed(message);
            }
        };

        if !response.success {
            let message = response.status_line();
            self.logger
                .error(
                    &format!("[NemApi] {path}: {message}"),
                    Some(json!({"path": path, "status": response.status})),
                )
                .await;
            return FetchOutcome::Failed(message);
        }

        match response.data {
            Some(Value::Object(mut body)) => match body.remove("data") {
                Some(data) if !data.is_null() => FetchOutcome::Succeeded(data),
                _ => self.envelope_missing(path).await,
            },
            _ => self.envelope_missing(path).await,
        }
    }

    async fn envelope_missing<T>(&self, path: &str) -> FetchOutcome<T> {
        let message = "response has no data envelope".to_string();
        self.logger
            .error(&format!("[NemApi] {path}: {message}"), Some(json!({"path": path})))
            .await;
        FetchOutcome::Failed(message)
    }

    /// [`fetch_data`](Self::fetch_data), then decodes the envelope into `T`.
    /// A shape mismatch is a failure, not an error.
    pub async fn fetch_typed<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &CancellationToken,
    ) -> FetchOutcome<T> {
        let data = match self.fetch_data(path, token).await {
            FetchOutcome::Succeeded(data) => data,
            FetchOutcome::Failed(message) => return FetchOutcome::Failed(message),
            FetchOutcome::Cancelled => return FetchOutcome::Cancelled,
        };
        match serde_json::from_value::<T>(data) {
            Ok(decoded) => FetchOutcome::Succeeded(decoded),
            Err(e) => {
                let message = format!("unexpected payload shape: {e}");
                self.logger
                    .error(&format!("[NemApi] {path}: {message}"), Some(json!({"path": path})))
                    .await;
                FetchOutcome::Failed(message)
            }
        }
    }

    pub fn logger(&self) -> &Arc<LoggerLocal> {
        &self.logger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loggers::loggerlocal::LoggerLocalOptions;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str, timeout: Duration) -> NemApiCall {
        let options = ClientOptions {
            timeout,
            min_backoff: Duration::from_millis(10),
            ..ClientOptions::default()
        };
        let logger = Arc::new(LoggerLocal::new(
            "nem_apicall_test".to_string(),
            Some(LoggerLocalOptions::default()),
        ));
        NemApiCall::new(base, "k", options, logger).unwrap()
    }

    #[tokio::test]
    async fn slow_response_is_a_single_failed_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/NEM/v1/PWS/NEMDashboard/elecSummary"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"summary": []}}))
                    .set_delay(Duration::from_millis(500)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let nem = client(&server.uri(), Duration::from_millis(100));
        let outcome = nem
            .fetch_data("NEM/v1/PWS/NEMDashboard/elecSummary", &CancellationToken::new())
            .await;
        assert!(matches!(outcome, FetchOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn missing_envelope_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bare"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rows": []})))
            .mount(&server)
            .await;

        let nem = client(&server.uri(), Duration::from_secs(2));
        let outcome = nem.fetch_data("bare", &CancellationToken::new()).await;
        assert!(matches!(outcome, FetchOutcome::Failed(ref m) if m.contains("data envelope")));
    }

    #[tokio::test]
    async fn fired_token_wins_before_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": 1})))
            .expect(0)
            .mount(&server)
            .await;

        let nem = client(&server.uri(), Duration::from_secs(2));
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(nem.fetch_data("any", &token).await, FetchOutcome::Cancelled));
    }
}
