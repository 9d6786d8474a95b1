use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::ollama::GenerateRequest;

/// Raw body chunks of one upstream connection attempt, in transport order.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Opens one streaming generation attempt against the inference server.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn open_stream(&self, request: &GenerateRequest) -> Result<ByteStream, TransportError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection reset: {0}")]
    Reset(String),

    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Whether another attempt has a reasonable chance of succeeding.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout(_) | Self::Reset(_) => true,
            // 408 and 504 are timeouts reported by the server or a proxy in front of it
            Self::Status { status, body } => {
                matches!(status, 408 | 504) || indicates_timeout(body)
            }
            Self::Request(_) => false,
        }
    }
}

/// Heuristic used for upstream-provided text such as error bodies.
#[inline]
pub fn indicates_timeout(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("timeout") || message.contains("timed out")
}
