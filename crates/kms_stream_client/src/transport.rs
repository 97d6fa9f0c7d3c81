//! Byte-producing side of a query: one HTTP exchange per call.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::StatusCode;

use crate::messages::{QueryRequest, QueryResponse};

/// Raw response body chunks, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error! status: {status}")]
    Status { status: u16 },
    #[error("response body is empty")]
    MissingBody,
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// Sends a [`QueryRequest`] and hands back the response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Streaming exchange: the body as raw chunks.
    async fn open(&self, request: &QueryRequest) -> Result<ByteStream, TransportError>;

    /// Single-shot exchange: the whole body as one JSON object.
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, TransportError>;
}

/// [`Transport`] over HTTP POST with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn post(
        &self,
        request: &QueryRequest,
        accept: &str,
    ) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .header("Accept", accept)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), url = %self.url, "query rejected");
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Err(TransportError::MissingBody);
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &QueryRequest) -> Result<ByteStream, TransportError> {
        let request = QueryRequest {
            stream: true,
            ..request.clone()
        };
        let response = self.post(&request, "text/event-stream").await?;
        tracing::debug!(url = %self.url, "stream opened");
        Ok(response.bytes_stream().map_err(TransportError::from).boxed())
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, TransportError> {
        let request = QueryRequest {
            stream: false,
            ..request.clone()
        };
        let response = self.post(&request, "application/json").await?;
        Ok(response.json::<QueryResponse>().await?)
    }
}
