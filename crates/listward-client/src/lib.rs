//! Authenticated HTTP session against one Sympa web endpoint.
//!
//! Sympa exposes no API: everything goes through the same base URL the web
//! UI uses, with a persistent cookie session established by a form login.
//! Reads are retried on transient failures; writes are single-shot, because
//! the server answers every write with a rendered page rather than an ack
//! and correctness is re-verified by re-fetching state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::cookie::Jar;
use thiserror::Error;
use tracing::{debug, warn};

pub use reqwest::StatusCode;

pub const CRATE_NAME: &str = "listward-client";

/// Marker present on every page rendered for an authenticated session.
const LOGOUT_ACTION: &str = "action_logout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(20),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// A fetched page, raw. The sync layer compares `text` snapshots to detect
/// remote change and hands the same text to the extractor.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub status: StatusCode,
    pub final_url: String,
    pub text: String,
}

impl RawPage {
    /// Whether the page was rendered for a logged-in session.
    pub fn is_authenticated(&self) -> bool {
        self.text.contains(LOGOUT_ACTION)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// One authenticated Sympa session. Cheap to share (`&self` everywhere) and
/// safe for concurrent use by dispatcher workers: reqwest's client is
/// internally reference-counted and the cookie jar is shared.
#[derive(Debug)]
pub struct SympaClient {
    client: reqwest::Client,
    base_url: String,
    backoff: BackoffPolicy,
}

impl SympaClient {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let jar = Arc::new(Jar::default());
        let mut builder = reqwest::Client::builder()
            .cookie_provider(jar)
            .gzip(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            backoff: config.backoff,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path_and_query: &str) -> String {
        if path_and_query.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path_and_query)
        }
    }

    /// GET a page relative to the base URL. `path_and_query` is appended
    /// after a slash and may be a query string (`?action=review&...`) or
    /// path segments (`dump/mylist/light`).
    pub async fn get(&self, path_and_query: &str) -> Result<RawPage, FetchError> {
        let url = self.url_for(path_and_query);
        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            match self.client.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let text = resp.text().await?;
                        debug!(url = %final_url, bytes = text.len(), "page fetched");
                        return Ok(RawPage {
                            status,
                            final_url,
                            text,
                        });
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }

        Err(FetchError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }

    /// Single-shot form POST to the base URL. No retry: the response is a
    /// rendered page, not an acknowledgment, so callers re-verify by
    /// re-fetching rather than by resubmitting.
    pub async fn post_form(&self, fields: &[(String, String)]) -> Result<RawPage, FetchError> {
        let resp = self.client.post(&self.base_url).form(fields).send().await?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }
        let text = resp.text().await?;
        Ok(RawPage {
            status,
            final_url,
            text,
        })
    }

    /// Form login. Returns the response page; whether it worked is read off
    /// the page itself via [`RawPage::is_authenticated`], since the server
    /// answers failed logins with a 200 and an unauthenticated page.
    pub async fn login(&self, email: &str, password: &str) -> Result<RawPage, FetchError> {
        let fields = [
            ("action".to_string(), "login".to_string()),
            ("email".to_string(), email.to_string()),
            ("passwd".to_string(), password.to_string()),
        ];
        let page = self.post_form(&fields).await?;
        if !page.is_authenticated() {
            warn!(email, "login did not yield an authenticated page");
        }
        Ok(page)
    }

    /// Fetch the home page and check it for the authenticated marker.
    pub async fn logged_in(&self) -> Result<bool, FetchError> {
        let page = self.get("").await?;
        Ok(page.is_authenticated())
    }

    /// Best-effort logout.
    pub async fn logout(&self) -> Result<(), FetchError> {
        let fields = [("action".to_string(), "logout".to_string())];
        self.post_form(&fields).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }

    #[test]
    fn retryable_statuses() {
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            RetryDisposition::NonRetryable
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            RetryDisposition::NonRetryable
        );
    }

    #[test]
    fn url_join_handles_query_and_segments() {
        let client = SympaClient::new(ClientConfig::new("https://lists.example.edu/sympa/"))
            .expect("client");
        assert_eq!(client.base_url(), "https://lists.example.edu/sympa");
        assert_eq!(
            client.url_for("?sortby=email&action=review&list=dev&size=10000"),
            "https://lists.example.edu/sympa/?sortby=email&action=review&list=dev&size=10000"
        );
        assert_eq!(
            client.url_for("dump/dev/light"),
            "https://lists.example.edu/sympa/dump/dev/light"
        );
        assert_eq!(client.url_for(""), "https://lists.example.edu/sympa");
    }

    #[test]
    fn authenticated_marker_detection() {
        let page = RawPage {
            status: StatusCode::OK,
            final_url: "https://lists.example.edu/sympa".to_string(),
            text: "<a href=\"?action_logout\">Logout</a>".to_string(),
        };
        assert!(page.is_authenticated());

        let anon = RawPage {
            status: StatusCode::OK,
            final_url: "https://lists.example.edu/sympa".to_string(),
            text: "<form action=\"login\"></form>".to_string(),
        };
        assert!(!anon.is_authenticated());
    }
}
