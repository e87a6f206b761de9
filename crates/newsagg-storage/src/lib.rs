//! Upstream HTTP fetch utilities and the persistent article store.

mod postgres;
mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub use postgres::PgArticleStore;
pub use store::{
    ArticleFilter, ArticlePage, ArticleStore, MemoryArticleStore, StoreError, DEFAULT_PER_PAGE,
    MAX_PER_PAGE,
};

pub const CRATE_NAME: &str = "newsagg-storage";

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
    if err.is_timeout() || err.is_connect() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

/// Retry schedule for upstream calls. The default performs a single attempt.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
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
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
            global_concurrency: 8,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedJson {
    pub status: StatusCode,
    pub body: JsonValue,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("response from {url} is not valid JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("http fetcher is shut down")]
    Closed,
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            FetchError::Request { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Shared GET-and-decode client for every upstream news API.
///
/// `url` passed to [`HttpFetcher::get_json`] never carries the query string,
/// so credentials in query parameters stay out of spans and errors.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            backoff: config.backoff,
        })
    }

    pub async fn get_json(
        &self,
        run_id: Uuid,
        source: &str,
        url: &str,
        query: &[(String, String)],
    ) -> Result<FetchedJson, FetchError> {
        let span = info_span!("http_fetch", %run_id, source, url);
        self.get_json_inner(url, query).instrument(span).await
    }

    async fn get_json_inner(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<FetchedJson, FetchError> {
        let _permit = self
            .global_limit
            .acquire()
            .await
            .map_err(|_| FetchError::Closed)?;

        let mut attempt = 0usize;
        loop {
            let resp_result = self.client.get(url).query(query).send().await;

            match resp_result {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        let bytes = resp.bytes().await.map_err(|source| FetchError::Request {
                            url: url.to_string(),
                            source: source.without_url(),
                        })?;
                        let body = serde_json::from_slice(&bytes).map_err(|source| {
                            FetchError::Decode {
                                url: url.to_string(),
                                source,
                            }
                        })?;
                        debug!(status = status.as_u16(), bytes = bytes.len(), "upstream response");
                        return Ok(FetchedJson { status, body });
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Request {
                        url: url.to_string(),
                        source: err.without_url(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(backoff: BackoffPolicy, timeout: Duration) -> HttpFetcher {
        HttpFetcher::new(HttpClientConfig {
            timeout,
            backoff,
            ..Default::default()
        })
        .expect("fetcher")
    }

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
    fn default_policy_makes_a_single_attempt() {
        assert_eq!(BackoffPolicy::default().max_retries, 0);
        assert_eq!(HttpClientConfig::default().timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn get_json_sends_query_and_decodes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/everything"))
            .and(query_param("apiKey", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"articles":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let http = fetcher(BackoffPolicy::default(), Duration::from_secs(5));
        let url = format!("{}/everything", server.uri());
        let resp = http
            .get_json(Uuid::new_v4(), "newsapi", &url, &[("apiKey".into(), "k".into())])
            .await
            .unwrap();
        assert_eq!(resp.body["articles"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn non_success_status_is_reported_without_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let http = fetcher(BackoffPolicy::default(), Duration::from_secs(5));
        let url = format!("{}/search", server.uri());
        let err = http
            .get_json(Uuid::new_v4(), "guardian", &url, &[("api-key".into(), "secret".into())])
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(!err.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn retryable_status_is_retried_when_policy_allows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let http = fetcher(
            BackoffPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            Duration::from_secs(5),
        );
        let err = http
            .get_json(Uuid::new_v4(), "nytimes", &server.uri(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let http = fetcher(BackoffPolicy::default(), Duration::from_secs(5));
        let err = http
            .get_json(Uuid::new_v4(), "newsapi", &server.uri(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let http = fetcher(BackoffPolicy::default(), Duration::from_millis(50));
        let err = http
            .get_json(Uuid::new_v4(), "newsapi", &server.uri(), &[])
            .await
            .unwrap_err();
        match err {
            FetchError::Request { source, .. } => assert!(source.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_body_error_omits_query() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n{\"articles\":")
                .await;
            let _ = socket.shutdown().await;
        });

        let http = fetcher(BackoffPolicy::default(), Duration::from_secs(5));
        let err = http
            .get_json(
                Uuid::new_v4(),
                "newsapi",
                &format!("http://{addr}/everything"),
                &[("apiKey".into(), "secret".into())],
            )
            .await
            .unwrap_err();

        match &err {
            FetchError::Request { source, .. } => assert!(source.url().is_none()),
            other => panic!("expected body read failure, got {other:?}"),
        }
        assert!(!format!("{err} {err:?}").contains("secret"));
    }
}
