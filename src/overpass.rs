use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{trace, warn};

use crate::errors::AppResult;
use crate::normalize::{OverpassResponse, RawElement};

/// Why a single endpoint call produced no data. Every variant is retryable:
/// the controller moves on to the next endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("server overloaded (HTTP 504)")]
    ServerOverloaded,
    #[error("HTTP error: status {status}")]
    HttpError { status: u16 },
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

#[async_trait]
pub trait OverpassTransport: Send + Sync {
    async fn execute(&self, endpoint: &str, query: &str) -> Result<Vec<RawElement>, FetchFailure>;
}

pub struct HttpOverpassClient {
    http: Client,
}

impl HttpOverpassClient {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("city-poi-collector/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl OverpassTransport for HttpOverpassClient {
    async fn execute(&self, endpoint: &str, query: &str) -> Result<Vec<RawElement>, FetchFailure> {
        let response = self
            .http
            .post(endpoint)
            .form(&[("data", query)])
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status == StatusCode::GATEWAY_TIMEOUT {
            return Err(FetchFailure::ServerOverloaded);
        }
        if !status.is_success() {
            return Err(FetchFailure::HttpError {
                status: status.as_u16(),
            });
        }

        let parsed: OverpassResponse = response.json().await.map_err(classify_transport_error)?;
        if let Some(remark) = parsed.remark.as_deref() {
            warn!(target: "overpass", endpoint, remark, "server attached a remark to the response");
        }
        trace!(
            target: "overpass",
            endpoint,
            elements = parsed.elements.len(),
            "overpass response decoded"
        );
        Ok(parsed.elements)
    }
}

fn classify_transport_error(err: reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout(err.to_string())
    } else if err.is_connect() {
        FetchFailure::ConnectionError(err.to_string())
    } else {
        FetchFailure::Unexpected(err.to_string())
    }
}
