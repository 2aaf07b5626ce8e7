//! Query interfaces the chaos classifier and router consume.
//!
//! The core never depends on a concrete database; [`crate::sqlite::SqliteStore`]
//! is the reference implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{
    ActivityKind, ActivityText, ChaosMetricRecord, ConversationMessage, ConversationThread, Idea,
    Task,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(tokio_rusqlite::Error::from(err))
    }
}

/// Read-only view over a user's tasks and ideas.
///
/// Every `since` bound is inclusive.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Entities of `kind` created at or after `since`.
    async fn count_created(
        &self,
        kind: ActivityKind,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    /// Entities of `kind` whose last update is at or after `since`.
    async fn count_updated(
        &self,
        kind: ActivityKind,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    /// Tasks completed at or after `since`.
    async fn count_completed(&self, user_id: Uuid, since: DateTime<Utc>)
        -> Result<u32, StoreError>;

    /// Tasks created at or after `since`.
    async fn count_started(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<u32, StoreError>;

    /// Title/description of every entity of `kind` updated at or after `since`.
    async fn updated_since(
        &self,
        kind: ActivityKind,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityText>, StoreError>;

    /// Open MITs, highest priority first, oldest first within a priority.
    async fn current_mits(&self, user_id: Uuid, limit: usize) -> Result<Vec<Task>, StoreError>;

    /// Most recently created ideas regardless of status.
    async fn recent_ideas(&self, user_id: Uuid, limit: usize) -> Result<Vec<Idea>, StoreError>;
}

/// Append-only history of chaos classifications.
#[async_trait]
pub trait ChaosAuditLog: Send + Sync {
    async fn append_chaos_record(&self, record: &ChaosMetricRecord) -> Result<(), StoreError>;

    /// Newest first.
    async fn chaos_history(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ChaosMetricRecord>, StoreError>;
}

/// Persistence for AI conversation threads.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns `None` when the thread does not exist or belongs to another user.
    async fn get_thread(
        &self,
        thread_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ConversationThread>, StoreError>;

    async fn create_thread(&self, user_id: Uuid) -> Result<ConversationThread, StoreError>;

    /// Persist `messages`, which the caller has already appended to `thread`,
    /// along with the thread's participants and `updated_at`.
    async fn append_messages(
        &self,
        thread: &ConversationThread,
        messages: &[ConversationMessage],
    ) -> Result<(), StoreError>;
}
