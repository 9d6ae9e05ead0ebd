//! Session storage collaborator
//!
//! The turn loop never creates or destroys sessions. It loads a context by id,
//! runs the turn and saves the result; whoever owns the store decides when
//! sessions begin and end.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use crate::context::ConversationContext;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Context for a session, `None` if the session does not exist
    async fn load(&self, session_id: &str) -> Result<Option<ConversationContext>>;

    async fn save(&self, session_id: &str, context: &ConversationContext) -> Result<()>;
}

/// Metadata kept alongside each stored context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub save_count: u64,
    pub context: ConversationContext,
}

/// Process-local store, suitable for the CLI and tests
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new empty session and return its id
    pub async fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let record = SessionRecord {
            id: id.clone(),
            created_at: now,
            last_activity: now,
            save_count: 0,
            context: ConversationContext::new(),
        };
        self.sessions.write().await.insert(id.clone(), record);
        info!("Created session {}", id);
        id
    }

    pub async fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Sessions ordered by most recent activity
    pub async fn list(&self) -> Vec<SessionRecord> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<SessionRecord> = sessions.values().cloned().collect();
        list.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        list
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            info!("Removed session {}", session_id);
        }
        removed
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationContext>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|r| r.context.clone()))
    }

    async fn save(&self, session_id: &str, context: &ConversationContext) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown session: {}", session_id))?;
        record.context = context.clone();
        record.last_activity = Utc::now();
        record.save_count += 1;
        debug!(
            "Saved session {} ({} messages)",
            session_id,
            record.context.messages.len()
        );
        Ok(())
    }
}

/// One async mutex per session id, so turns of the same session run one at a
/// time while different sessions proceed concurrently.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `session_id`; released when the guard drops
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(session_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop the lock entry of a finished session
    pub async fn forget(&self, session_id: &str) {
        self.locks.lock().await.remove(session_id);
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
