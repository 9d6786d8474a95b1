use serde::{Deserialize, Serialize};

/// Aggregate statistics reported by the inference server on its final line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_duration: u64,
    pub eval_count: u64,
    pub prompt_eval_count: u64,
    pub eval_duration: u64,
}

/// Why a relayed request ended without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The server sent an explicit `error` payload.
    UpstreamError,
    /// The server answered with a non-success status.
    HttpStatus,
    /// A transport failure that is not worth retrying.
    Transport,
    /// Every attempt failed with a retryable error.
    RetriesExhausted,
    /// The caller cancelled the request.
    Cancelled,
}

impl FailureReason {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpstreamError => "upstream_error",
            Self::HttpStatus => "http_status",
            Self::Transport => "transport",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized events emitted by [`StreamRelay`](super::StreamRelay).
///
/// A relayed request produces any number of `Token`, `Retrying` and `Restarted` events
/// followed by exactly one terminal event (`Complete` or `Failed`). Nothing follows a
/// terminal event.
///
/// `Restarted` means a retried attempt generated different text from what was already
/// relayed. Consumers drop the text they accumulated; the tokens that follow rebuild it
/// from the start, and `cumulative_text` always holds the current text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token {
        text: String,
        cumulative_text: String,
        index: u64,
    },
    Retrying {
        attempt: u32,
        max_attempts: u32,
        reason: String,
    },
    Restarted {
        attempt: u32,
    },
    Complete {
        full_text: String,
        token_count: u64,
        model: String,
        usage: UsageStats,
    },
    Failed {
        reason: FailureReason,
        detail: String,
    },
}

impl StreamEvent {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Failed { .. })
    }

    #[inline]
    pub fn as_token_text(&self) -> Option<&str> {
        match self {
            Self::Token { text, .. } => Some(text),
            _ => None,
        }
    }
}
