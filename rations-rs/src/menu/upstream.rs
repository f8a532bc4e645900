//! Performs the actual HTTP requests against the upstream menu API.
//!
//! The [Upstream] trait is the seam between the menu logic and the network. Production code uses
//! the [HttpUpstream] which is built on **hyper** and applies a connect timeout, a read timeout
//! and a bounded retry schedule for transient failures (429, 500, 502, 503, 504, timeouts and
//! connection errors).
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request, StatusCode, Uri};
use hyper_tls::HttpsConnector;

use crate::fmt::format_duration;
use crate::retry::{retry, RetryPolicy};

/// The largest response body accepted from the upstream (a week of one meal is ~100 KB).
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Describes why an upstream request failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The upstream answered with a non-success status.
    #[error("The upstream responded with status {0}")]
    Status(StatusCode),
    /// The connection could not be established or broke down.
    #[error("The request failed: {0}")]
    Transport(#[from] hyper::Error),
    /// No complete response arrived within the read timeout.
    #[error("No response within {}", format_duration(*.0))]
    Timeout(Duration),
    /// The request itself could not be built (e.g. an invalid URL).
    #[error("Invalid request: {0}")]
    Request(String),
    /// The response body exceeds the given limit (in bytes).
    #[error("The response exceeds the limit of {0} bytes")]
    TooLarge(usize),
}

impl FetchError {
    /// Determines if repeating the request might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status(status) => matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504),
            FetchError::Transport(_) | FetchError::Timeout(_) => true,
            FetchError::Request(_) | FetchError::TooLarge(_) => false,
        }
    }
}

/// Fetches raw response bodies from the upstream API.
#[async_trait::async_trait]
pub trait Upstream: Send + Sync {
    /// Performs a GET request for the given URL and returns the body of a successful response.
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// Talks to the upstream API via HTTP or HTTPS.
pub struct HttpUpstream {
    client: Client<HttpsConnector<HttpConnector>>,
    read_timeout: Duration,
    policy: RetryPolicy,
    body_limit: usize,
}

impl HttpUpstream {
    /// Creates a new client.
    ///
    /// The **connect_timeout** limits establishing a connection, the **read_timeout** limits
    /// the whole exchange of a single attempt. Transient failures are retried as specified by
    /// the given **policy**.
    pub fn new(connect_timeout: Duration, read_timeout: Duration, policy: RetryPolicy) -> Self {
        let mut http = HttpConnector::new();
        http.set_connect_timeout(Some(connect_timeout));
        http.enforce_http(false);

        let https = HttpsConnector::new_with_connector(http);
        let client = Client::builder().build::<_, Body>(https);

        HttpUpstream {
            client,
            read_timeout,
            policy,
            body_limit: MAX_BODY_SIZE,
        }
    }

    async fn fetch_once(&self, uri: &Uri) -> Result<Bytes, FetchError> {
        let request = Request::get(uri.clone())
            .header(hyper::header::ACCEPT, "application/json")
            .body(Body::empty())
            .map_err(|error| FetchError::Request(error.to_string()))?;

        let exchange = async {
            let response = self.client.request(request).await?;
            if !response.status().is_success() {
                return Err(FetchError::Status(response.status()));
            }

            read_body(response.into_body(), self.body_limit).await
        };

        match tokio::time::timeout(self.read_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.read_timeout)),
        }
    }
}

async fn read_body(mut body: Body, limit: usize) -> Result<Bytes, FetchError> {
    let announced = body.size_hint().lower() as usize;
    if announced > limit {
        return Err(FetchError::TooLarge(limit));
    }

    let mut buffer = BytesMut::with_capacity(announced);
    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        if buffer.len() + chunk.len() > limit {
            return Err(FetchError::TooLarge(limit));
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}

#[async_trait::async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let uri = url
            .parse::<Uri>()
            .map_err(|error| FetchError::Request(format!("{}: {}", url, error)))?;

        retry(
            &self.policy,
            url,
            || self.fetch_once(&uri),
            FetchError::is_transient,
        )
        .await
    }
}
