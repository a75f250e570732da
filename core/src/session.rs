//! In-process append-only session store.
//!
//! Uses `DashMap` for lock-free concurrent reads, with a per-session
//! `RwLock` over the message vector so a reader sees either the
//! pre-append or post-append state, never a partially written message.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::error::{CoreError, Result};
use crate::model::{Message, SessionId, SessionSummary};

#[derive(Default)]
struct SessionRecord {
    messages: Vec<Message>,
    created_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<SessionId, RwLock<SessionRecord>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self { sessions: Arc::new(DashMap::new()) }
    }

    /// Creates a session, generating a fresh id when `id` is `None`.
    pub fn create(&self, id: Option<SessionId>) -> SessionId {
        let id = id.unwrap_or_else(SessionId::new_v4);
        self.sessions.entry(id).or_insert_with(|| RwLock::new(SessionRecord::default()));
        tracing::info!(session_id = %id, "session created");
        id
    }

    /// Appends `message`, creating the session first if it doesn't exist.
    /// Per-session appends are serialized by the record's write lock.
    pub async fn append(&self, id: SessionId, message: Message) {
        let record_ref = self.sessions.entry(id).or_insert_with(|| RwLock::new(SessionRecord::default()));
        let mut record = record_ref.write().await;
        if record.created_at.is_none() {
            record.created_at = Some(message.timestamp);
        }
        record.messages.push(message);
    }

    pub async fn list(&self, id: SessionId) -> Result<Vec<Message>> {
        let record = self.sessions.get(&id).ok_or(CoreError::SessionNotFound(id))?;
        let record = record.read().await;
        Ok(record.messages.clone())
    }

    /// Summaries for every non-empty session, skipping empty ones per the
    /// contract (a session with zero messages has no meaningful timestamps).
    pub async fn summarize(&self) -> Vec<SessionSummary> {
        let mut summaries = Vec::new();
        for entry in self.sessions.iter() {
            let record = entry.value().read().await;
            if record.messages.is_empty() {
                continue;
            }
            let Some(created_at) = record.created_at else { continue };
            let Some(last_updated_at) = record.messages.last().map(|m| m.timestamp) else { continue };
            summaries.push(SessionSummary {
                id: *entry.key(),
                message_count: record.messages.len(),
                created_at,
                last_updated_at,
            });
        }
        summaries
    }

    pub fn delete(&self, id: SessionId) -> bool {
        let existed = self.sessions.remove(&id).is_some();
        if existed {
            tracing::info!(session_id = %id, "session deleted");
        }
        existed
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn message(role: Role, content: &str) -> Message {
        Message { role, content: content.to_string(), timestamp: Utc::now() }
    }

    #[tokio::test]
    async fn append_then_list_roundtrips_verbatim() {
        let store = SessionStore::new();
        let id = store.create(None);
        store.append(id, message(Role::User, "hi")).await;
        store.append(id, message(Role::Assistant, "hello")).await;

        let messages = store.list(id).await.expect("list");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1].content, "hello");
    }

    #[tokio::test]
    async fn timestamps_are_monotonically_non_decreasing() {
        let store = SessionStore::new();
        let id = store.create(None);
        for i in 0..5 {
            store.append(id, message(Role::User, &i.to_string())).await;
        }
        let messages = store.list(id).await.expect("list");
        for pair in messages.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn delete_then_list_returns_not_found() {
        let store = SessionStore::new();
        let id = store.create(None);
        store.append(id, message(Role::User, "hi")).await;

        assert!(store.delete(id));
        assert!(matches!(store.list(id).await, Err(CoreError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn summarize_skips_empty_sessions() {
        let store = SessionStore::new();
        let empty_id = store.create(None);
        let used_id = store.create(None);
        store.append(used_id, message(Role::User, "hi")).await;
        let _ = empty_id;

        let summaries = store.summarize().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, used_id);
    }
}
