//! # WEM CSV Client
//!
//! Low-level access to the WEM data site. The site's web server rejects the
//! default `Accept` header, so a browser-style one is sent on every request.
//! Parse warnings are logged and never turn a fetch into a failure.

use crate::loggers::loggerlocal::LoggerLocal;
use crate::retrieve::ky_http::{ApiClient, ClientOptions};
use crate::retrieve::outcome::FetchOutcome;
use crate::transform::RawRow;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::tabular::parse_csv;

/// `Accept` header the WEM web server tolerates.
pub const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Parse warnings included in one log entry.
const MAX_LOGGED_WARNINGS: usize = 5;

/// # WEM API Call Client
pub struct WemApiCall {
    client: ApiClient,
    logger: Arc<LoggerLocal>,
}

impl WemApiCall {
    pub fn new(
        base_url: &str,
        mut options: ClientOptions,
        logger: Arc<LoggerLocal>,
    ) -> anyhow::Result<Self> {
        options
            .default_headers
            .push(("accept".to_string(), BROWSER_ACCEPT.to_string()));
        Ok(Self {
            client: ApiClient::new(base_url, options)?,
            logger,
        })
    }

    /// GETs a CSV file and parses it into rows.
    pub async fn get_csv(
        &self,
        path: &str,
        token: &CancellationToken,
    ) -> FetchOutcome<Vec<RawRow>> {
        let request = self.client.get_text(path, None);
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
                    .error(&format!("[WemApi] {path}: {message}"), Some(json!({"path": path})))
                    .await;
                return FetchOutcome::Failed(message);
            }
        };

        if !response.success {
            let message = response.status_line();
            self.logger
                .error(
                    &format!("[WemApi] {path}: {message}"),
                    Some(json!({"path": path, "status": response.status})),
                )
                .await;
            return FetchOutcome::Failed(message);
        }

        let table = parse_csv(response.data.as_deref().unwrap_or_default());
        if !table.warnings.is_empty() {
            let sample: Vec<&String> = table.warnings.iter().take(MAX_LOGGED_WARNINGS).collect();
            self.logger
                .warn(
                    &format!("[WemApi] CSV parse warnings for {path}"),
                    Some(json!({"path": path, "count": table.warnings.len(), "warnings": sample})),
                )
                .await;
        }
        self.logger
            .debug(
                &format!("[WemApi] {path}: {} rows", table.rows.len()),
                Some(json!({"path": path})),
            )
            .await;
        FetchOutcome::Succeeded(table.rows)
    }
}
