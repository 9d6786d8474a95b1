// Conversation store
// In-memory chat histories with a bounded number of conversations and messages

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::prompt::{ConversationTurn, DEFAULT_HISTORY_TURNS, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Conversations kept before the least recently updated one is evicted
    pub capacity: usize,
    /// Messages kept per conversation; the oldest are dropped first
    pub max_messages: usize,
    /// Turns of history included in each prompt
    pub history_turns: usize,
}

impl Default for ConversationConfig {
    #[inline]
    fn default() -> Self {
        Self {
            capacity: 1000,
            max_messages: 100,
            history_turns: DEFAULT_HISTORY_TURNS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<StoredMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    last_touch: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub preview: Option<String>,
}

const PREVIEW_CHARS: usize = 80;

impl Conversation {
    fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            message_count: self.messages.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            preview: self
                .messages
                .last()
                .map(|message| message.content.chars().take(PREVIEW_CHARS).collect()),
        }
    }
}

#[derive(Debug, Default)]
struct Conversations {
    by_id: HashMap<String, Conversation>,
    clock: u64,
}

#[derive(Debug)]
pub struct ConversationStore {
    config: ConversationConfig,
    inner: RwLock<Conversations>,
}

/// A fresh conversation identifier.
#[inline]
pub fn new_conversation_id() -> String {
    Uuid::new_v4().to_string()
}

impl ConversationStore {
    #[inline]
    pub fn new(config: ConversationConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Conversations::default()),
        }
    }

    /// Append a turn, creating the conversation if needed.
    ///
    /// Creating a conversation at capacity evicts the least recently updated one.
    #[inline]
    pub async fn append(&self, id: &str, turn: ConversationTurn) {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        inner.clock += 1;
        let touch = inner.clock;

        if !inner.by_id.contains_key(id) {
            while inner.by_id.len() >= self.config.capacity.max(1) {
                let Some(oldest) = inner
                    .by_id
                    .values()
                    .min_by_key(|conversation| conversation.last_touch)
                    .map(|conversation| conversation.id.clone())
                else {
                    break;
                };
                inner.by_id.remove(&oldest);
                info!("Evicted conversation {} to stay within capacity", oldest);
            }
        }

        let conversation = inner
            .by_id
            .entry(id.to_string())
            .or_insert_with(|| Conversation {
                id: id.to_string(),
                messages: Vec::new(),
                created_at: now,
                updated_at: now,
                last_touch: touch,
            });

        conversation.messages.push(StoredMessage {
            role: turn.role,
            content: turn.content,
            timestamp: now,
        });
        conversation.updated_at = now;
        conversation.last_touch = touch;

        let excess = conversation
            .messages
            .len()
            .saturating_sub(self.config.max_messages.max(1));
        if excess > 0 {
            conversation.messages.drain(..excess);
            debug!("Dropped {} old messages from conversation {}", excess, id);
        }
    }

    /// Stored turns in order, or an empty history for unknown conversations.
    #[inline]
    pub async fn history(&self, id: &str) -> Vec<ConversationTurn> {
        let inner = self.inner.read().await;
        inner
            .by_id
            .get(id)
            .map(|conversation| {
                conversation
                    .messages
                    .iter()
                    .map(|message| ConversationTurn {
                        role: message.role,
                        content: message.content.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    #[inline]
    pub async fn get(&self, id: &str) -> Option<Conversation> {
        self.inner.read().await.by_id.get(id).cloned()
    }

    /// Summaries, most recently updated first.
    #[inline]
    pub async fn list(&self) -> Vec<ConversationSummary> {
        let inner = self.inner.read().await;
        let mut conversations: Vec<&Conversation> = inner.by_id.values().collect();
        conversations.sort_by(|a, b| b.last_touch.cmp(&a.last_touch));
        conversations.into_iter().map(Conversation::summary).collect()
    }

    #[inline]
    pub async fn delete(&self, id: &str) -> bool {
        self.inner.write().await.by_id.remove(id).is_some()
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.by_id.is_empty()
    }
}
