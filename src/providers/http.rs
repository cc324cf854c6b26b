use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;
use url::Url;

use crate::auth::Token;
use crate::error::{FinditError, Result};

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY_SECONDS: u64 = 2;
const MAX_CONCURRENT_REQUESTS: usize = 50;

/// How often and how patiently transient failures are retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECONDS),
        }
    }
}

/// GET-only HTTP client shared by the providers.
pub struct HttpClient {
    client: Client,
    token: Option<Token>,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
    service: &'static str,
}

impl HttpClient {
    pub fn new(service: &'static str, token: Option<Token>, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("findit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FinditError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token,
            retry,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
            service,
        })
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    /// Fetches `url` as text, retrying network errors, 429 and 5xx.
    ///
    /// Returns `None` on 404.
    pub async fn get_text(&self, url: Url) -> Result<Option<String>> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| FinditError::Config(format!("Request limiter closed: {e}")))?;

        let max_retries = self.retry.max_retries;
        let mut retry_count = 0;
        loop {
            debug!("GET {url}");
            let request = self.auth_request(self.client.get(url.clone()));

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
                    if retry_count >= max_retries {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({e}), retrying in {}s ({}/{max_retries})...",
                        self.retry.retry_delay.as_secs(),
                        retry_count + 1,
                    );
                    tokio::time::sleep(self.retry.retry_delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retry_count >= max_retries {
                    return Err(FinditError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: max_retries,
                    });
                }

                warn!(
                    "{} error (status {status}). Waiting {}s before retry {}/{max_retries}...",
                    self.service,
                    self.retry.retry_delay.as_secs(),
                    retry_count + 1,
                );

                tokio::time::sleep(self.retry.retry_delay).await;
                retry_count += 1;
                continue;
            }

            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(FinditError::Api {
                    status: status.as_u16(),
                    message: error_text,
                });
            }

            return Ok(Some(response.text().await?));
        }
    }
}

/// Parses a configured base URL, keeping its path when joining onto it.
pub fn parse_base_url(base_url: &str) -> Result<Url> {
    let trimmed = base_url.trim_end_matches('/');
    Url::parse(&format!("{trimmed}/"))
        .map_err(|e| FinditError::Config(format!("Invalid base URL '{base_url}': {e}")))
}
