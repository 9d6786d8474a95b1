use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::stream::CancellationToken;

#[derive(Debug)]
struct ActiveStream {
    ticket: u64,
    token: CancellationToken,
}

/// In-flight streams by conversation id, so a separate request can cancel them.
#[derive(Debug, Clone, Default)]
pub struct RequestRegistry {
    active: Arc<Mutex<HashMap<String, ActiveStream>>>,
    next_ticket: Arc<AtomicU64>,
}

impl RequestRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveStream>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Track `token` under `conversation_id` until the returned guard is dropped.
    ///
    /// A newer stream for the same conversation replaces the older entry.
    #[inline]
    pub fn register(&self, conversation_id: &str, token: CancellationToken) -> RegistrationGuard {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .insert(conversation_id.to_string(), ActiveStream { ticket, token });
        debug!("Registered stream {} for conversation {}", ticket, conversation_id);

        RegistrationGuard {
            registry: self.clone(),
            conversation_id: conversation_id.to_string(),
            ticket,
        }
    }

    /// Cancel the in-flight stream for a conversation. Returns whether one was found.
    #[inline]
    pub fn cancel(&self, conversation_id: &str) -> bool {
        let token = self
            .lock()
            .get(conversation_id)
            .map(|active| active.token.clone());

        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn is_active(&self, conversation_id: &str) -> bool {
        self.lock().contains_key(conversation_id)
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    fn unregister(&self, conversation_id: &str, ticket: u64) {
        let mut active = self.lock();
        if active
            .get(conversation_id)
            .is_some_and(|entry| entry.ticket == ticket)
        {
            active.remove(conversation_id);
            debug!("Unregistered stream {} for conversation {}", ticket, conversation_id);
        }
    }
}

/// Removes its registry entry when dropped, including when the client disconnects.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: RequestRegistry,
    conversation_id: String,
    ticket: u64,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.conversation_id, self.ticket);
    }
}
