use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rag::Citation;
use crate::stream::{FailureReason, StreamEvent, UsageStats};

/// One server-sent event as delivered to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    #[serde(flatten)]
    pub body: ClientEventBody,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEventBody {
    Start {
        model: String,
        persona: String,
        citations: Vec<Citation>,
    },
    Token {
        content: String,
        /// Everything relayed so far, including this token
        full_response: String,
        index: u64,
    },
    Retry {
        attempt: u32,
        max_attempts: u32,
        message: String,
    },
    /// The client should drop the text it has; tokens that follow start over.
    Restart {
        attempt: u32,
        message: String,
    },
    Complete {
        full_response: String,
        token_count: u64,
        model: String,
        usage: UsageStats,
    },
    Error {
        reason: FailureReason,
        message: String,
    },
}

impl ClientEventBody {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

impl From<StreamEvent> for ClientEventBody {
    #[inline]
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Token {
                text,
                cumulative_text,
                index,
            } => Self::Token {
                content: text,
                full_response: cumulative_text,
                index,
            },
            StreamEvent::Retrying {
                attempt,
                max_attempts,
                reason,
            } => Self::Retry {
                attempt,
                max_attempts,
                message: format!("Retrying (attempt {attempt}/{max_attempts}): {reason}"),
            },
            StreamEvent::Restarted { attempt } => Self::Restart {
                attempt,
                message: format!("Attempt {attempt} generated different text; restarting"),
            },
            StreamEvent::Complete {
                full_text,
                token_count,
                model,
                usage,
            } => Self::Complete {
                full_response: full_text,
                token_count,
                model,
                usage,
            },
            StreamEvent::Failed { reason, detail } => Self::Error {
                reason,
                message: detail,
            },
        }
    }
}

impl ClientEvent {
    #[inline]
    pub fn new(conversation_id: impl Into<String>, body: ClientEventBody) -> Self {
        Self {
            body,
            conversation_id: conversation_id.into(),
            timestamp: Utc::now(),
        }
    }
}
