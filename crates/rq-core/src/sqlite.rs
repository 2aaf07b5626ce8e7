use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::store::{ActivityStore, ChaosAuditLog, ConversationStore, StoreError};
use crate::types::{
    ActivityKind, ActivityText, ChaosMetricRecord, ChaosMetrics, ConversationMessage,
    ConversationThread, Idea, Task,
};

/// Async SQLite-backed store for tasks, ideas, chaos history, and conversations.
pub struct SqliteStore {
    conn: Connection,
}

// ---------------------------------------------------------------------------
// helpers – value <-> SQLite text
// ---------------------------------------------------------------------------

/// Fixed-width UTC timestamps so `>=` on the TEXT column orders chronologically.
fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn uuid_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn ts_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_ts_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn parsed_at<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn table_for(kind: ActivityKind) -> &'static str {
    match kind {
        ActivityKind::Task => "tasks",
        ActivityKind::Idea => "ideas",
    }
}

fn limit_to_sql(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl SqliteStore {
    /// Open (or create) a database at the given file path.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        tracing::debug!(path = %path.as_ref().display(), "opening sqlite store");
        let conn = Connection::open(path.as_ref()).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create a purely in-memory database (useful for tests).
    pub async fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    // -----------------------------------------------------------------------
    // Schema
    // -----------------------------------------------------------------------

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA busy_timeout=5000;

                    CREATE TABLE IF NOT EXISTS tasks (
                        id           TEXT PRIMARY KEY,
                        user_id      TEXT NOT NULL,
                        title        TEXT NOT NULL,
                        description  TEXT,
                        status       TEXT NOT NULL,
                        priority     INTEGER NOT NULL DEFAULT 0,
                        is_mit       INTEGER NOT NULL DEFAULT 0,
                        created_at   TEXT NOT NULL,
                        updated_at   TEXT NOT NULL,
                        completed_at TEXT
                    );

                    CREATE INDEX IF NOT EXISTS idx_tasks_user_created ON tasks(user_id, created_at);
                    CREATE INDEX IF NOT EXISTS idx_tasks_user_updated ON tasks(user_id, updated_at);

                    CREATE TABLE IF NOT EXISTS ideas (
                        id          TEXT PRIMARY KEY,
                        user_id     TEXT NOT NULL,
                        title       TEXT NOT NULL,
                        description TEXT,
                        status      TEXT NOT NULL,
                        created_at  TEXT NOT NULL,
                        updated_at  TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_ideas_user_created ON ideas(user_id, created_at);
                    CREATE INDEX IF NOT EXISTS idx_ideas_user_updated ON ideas(user_id, updated_at);

                    CREATE TABLE IF NOT EXISTS chaos_metrics (
                        id                     TEXT PRIMARY KEY,
                        user_id                TEXT NOT NULL,
                        chaos_level            TEXT NOT NULL,
                        capture_velocity       INTEGER NOT NULL,
                        task_switches          INTEGER NOT NULL,
                        urgency_keywords       INTEGER NOT NULL,
                        completion_ratio       INTEGER NOT NULL,
                        detection_reason       TEXT NOT NULL,
                        intervention_triggered INTEGER NOT NULL DEFAULT 0,
                        created_at             TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_chaos_user ON chaos_metrics(user_id, created_at);

                    CREATE TABLE IF NOT EXISTS conversations (
                        id           TEXT PRIMARY KEY,
                        user_id      TEXT NOT NULL,
                        title        TEXT NOT NULL,
                        participants TEXT NOT NULL,
                        created_at   TEXT NOT NULL,
                        updated_at   TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS conversation_messages (
                        seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                        thread_id   TEXT NOT NULL REFERENCES conversations(id),
                        role        TEXT NOT NULL,
                        backend     TEXT,
                        content     TEXT NOT NULL,
                        timestamp   TEXT NOT NULL,
                        model       TEXT,
                        tokens_used INTEGER
                    );

                    CREATE INDEX IF NOT EXISTS idx_messages_thread ON conversation_messages(thread_id, seq);
                    ",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Writers
    // -----------------------------------------------------------------------

    pub async fn upsert_task(&self, task: &Task) -> Result<(), StoreError> {
        let id = task.id.to_string();
        let user_id = task.user_id.to_string();
        let title = task.title.clone();
        let description = task.description.clone();
        let status = task.status.as_str();
        let priority = task.priority;
        let is_mit = task.is_mit;
        let created_at = ts_to_sql(&task.created_at);
        let updated_at = ts_to_sql(&task.updated_at);
        let completed_at = task.completed_at.as_ref().map(ts_to_sql);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO tasks (id, user_id, title, description, status, priority,
                        is_mit, created_at, updated_at, completed_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
                     ON CONFLICT(id) DO UPDATE SET
                        title=excluded.title, description=excluded.description,
                        status=excluded.status, priority=excluded.priority,
                        is_mit=excluded.is_mit, updated_at=excluded.updated_at,
                        completed_at=excluded.completed_at",
                    rusqlite::params![
                        id, user_id, title, description, status, priority, is_mit, created_at,
                        updated_at, completed_at,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn upsert_idea(&self, idea: &Idea) -> Result<(), StoreError> {
        let id = idea.id.to_string();
        let user_id = idea.user_id.to_string();
        let title = idea.title.clone();
        let description = idea.description.clone();
        let status = idea.status.as_str();
        let created_at = ts_to_sql(&idea.created_at);
        let updated_at = ts_to_sql(&idea.updated_at);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO ideas (id, user_id, title, description, status,
                        created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7)
                     ON CONFLICT(id) DO UPDATE SET
                        title=excluded.title, description=excluded.description,
                        status=excluded.status, updated_at=excluded.updated_at",
                    rusqlite::params![id, user_id, title, description, status, created_at, updated_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn count_where(
        &self,
        table: &'static str,
        column: &'static str,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let user = user_id.to_string();
        let since = ts_to_sql(&since);
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE user_id = ?1 AND {column} >= ?2");
        let count = self
            .conn
            .call(move |conn| {
                let n = conn.query_row(&sql, rusqlite::params![user, since], |r| {
                    r.get::<_, u32>(0)
                })?;
                Ok(n)
            })
            .await?;
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// ActivityStore
// ---------------------------------------------------------------------------

#[async_trait]
impl ActivityStore for SqliteStore {
    async fn count_created(
        &self,
        kind: ActivityKind,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        self.count_where(table_for(kind), "created_at", user_id, since)
            .await
    }

    async fn count_updated(
        &self,
        kind: ActivityKind,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        self.count_where(table_for(kind), "updated_at", user_id, since)
            .await
    }

    async fn count_completed(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        self.count_where("tasks", "completed_at", user_id, since)
            .await
    }

    async fn count_started(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<u32, StoreError> {
        self.count_where("tasks", "created_at", user_id, since).await
    }

    async fn updated_since(
        &self,
        kind: ActivityKind,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityText>, StoreError> {
        let user = user_id.to_string();
        let since = ts_to_sql(&since);
        let sql = format!(
            "SELECT title, description FROM {} WHERE user_id = ?1 AND updated_at >= ?2",
            table_for(kind)
        );
        let texts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params![user, since], |row| {
                    Ok(ActivityText {
                        title: row.get(0)?,
                        description: row.get(1)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(texts)
    }

    async fn current_mits(&self, user_id: Uuid, limit: usize) -> Result<Vec<Task>, StoreError> {
        let user = user_id.to_string();
        let limit = limit_to_sql(limit);
        let tasks = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, title, description, status, priority, is_mit,
                            created_at, updated_at, completed_at
                     FROM tasks
                     WHERE user_id = ?1 AND is_mit = 1 AND status != 'done'
                     ORDER BY priority DESC, created_at ASC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(rusqlite::params![user, limit], row_to_task)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(tasks)
    }

    async fn recent_ideas(&self, user_id: Uuid, limit: usize) -> Result<Vec<Idea>, StoreError> {
        let user = user_id.to_string();
        let limit = limit_to_sql(limit);
        let ideas = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, title, description, status, created_at, updated_at
                     FROM ideas
                     WHERE user_id = ?1
                     ORDER BY created_at DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(rusqlite::params![user, limit], row_to_idea)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(ideas)
    }
}

// ---------------------------------------------------------------------------
// ChaosAuditLog
// ---------------------------------------------------------------------------

#[async_trait]
impl ChaosAuditLog for SqliteStore {
    async fn append_chaos_record(&self, record: &ChaosMetricRecord) -> Result<(), StoreError> {
        let id = record.id.to_string();
        let user_id = record.user_id.to_string();
        let level = record.level.as_str();
        let m = record.metrics;
        let reason = record.reason.clone();
        let intervention = record.intervention_triggered;
        let created_at = ts_to_sql(&record.created_at);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO chaos_metrics (id, user_id, chaos_level, capture_velocity,
                        task_switches, urgency_keywords, completion_ratio, detection_reason,
                        intervention_triggered, created_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                    rusqlite::params![
                        id,
                        user_id,
                        level,
                        m.capture_velocity,
                        m.task_switches,
                        m.urgency_keywords,
                        m.completion_ratio,
                        reason,
                        intervention,
                        created_at,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn chaos_history(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ChaosMetricRecord>, StoreError> {
        let user = user_id.to_string();
        let limit = limit_to_sql(limit);
        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, chaos_level, capture_velocity, task_switches,
                            urgency_keywords, completion_ratio, detection_reason,
                            intervention_triggered, created_at
                     FROM chaos_metrics
                     WHERE user_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(rusqlite::params![user, limit], row_to_chaos_record)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// ConversationStore
// ---------------------------------------------------------------------------

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get_thread(
        &self,
        thread_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ConversationThread>, StoreError> {
        let id = thread_id.to_string();
        let user = user_id.to_string();
        let thread = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, title, participants, created_at, updated_at
                     FROM conversations WHERE id = ?1 AND user_id = ?2",
                )?;
                let mut rows = stmt.query(rusqlite::params![id, user])?;
                let Some(row) = rows.next()? else {
                    return Ok(None);
                };
                let participants_raw: String = row.get(3)?;
                let participants: BTreeSet<String> = serde_json::from_str(&participants_raw)
                    .map_err(|e| conversion_error(3, e))?;
                let mut thread = ConversationThread {
                    id: uuid_at(row, 0)?,
                    user_id: uuid_at(row, 1)?,
                    title: row.get(2)?,
                    messages: Vec::new(),
                    participants,
                    created_at: ts_at(row, 4)?,
                    updated_at: ts_at(row, 5)?,
                };

                let mut msg_stmt = conn.prepare(
                    "SELECT role, backend, content, timestamp, model, tokens_used
                     FROM conversation_messages WHERE thread_id = ?1 ORDER BY seq ASC",
                )?;
                let messages =
                    msg_stmt.query_map(rusqlite::params![id], row_to_message)?;
                thread.messages = messages.collect::<Result<Vec<_>, _>>()?;
                Ok(Some(thread))
            })
            .await?;
        Ok(thread)
    }

    async fn create_thread(&self, user_id: Uuid) -> Result<ConversationThread, StoreError> {
        let thread = ConversationThread::new(user_id);
        let id = thread.id.to_string();
        let user = user_id.to_string();
        let title = thread.title.clone();
        let participants = serde_json::to_string(&thread.participants)?;
        let created_at = ts_to_sql(&thread.created_at);
        let updated_at = ts_to_sql(&thread.updated_at);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO conversations (id, user_id, title, participants,
                        created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6)",
                    rusqlite::params![id, user, title, participants, created_at, updated_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(thread)
    }

    async fn append_messages(
        &self,
        thread: &ConversationThread,
        messages: &[ConversationMessage],
    ) -> Result<(), StoreError> {
        let id = thread.id.to_string();
        let participants = serde_json::to_string(&thread.participants)?;
        let updated_at = ts_to_sql(&thread.updated_at);
        let rows: Vec<_> = messages
            .iter()
            .map(|m| {
                (
                    m.role.as_str(),
                    m.backend.clone(),
                    m.content.clone(),
                    ts_to_sql(&m.timestamp),
                    m.model.clone(),
                    m.tokens_used.map(|t| i64::try_from(t).unwrap_or(i64::MAX)),
                )
            })
            .collect();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut insert = tx.prepare(
                        "INSERT INTO conversation_messages (thread_id, role, backend, content,
                            timestamp, model, tokens_used)
                         VALUES (?1,?2,?3,?4,?5,?6,?7)",
                    )?;
                    for (role, backend, content, timestamp, model, tokens) in rows {
                        insert.execute(rusqlite::params![
                            id, role, backend, content, timestamp, model, tokens
                        ])?;
                    }
                }
                tx.execute(
                    "UPDATE conversations SET participants = ?2, updated_at = ?3 WHERE id = ?1",
                    rusqlite::params![id, participants, updated_at],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: parsed_at(row, 4)?,
        priority: row.get(5)?,
        is_mit: row.get(6)?,
        created_at: ts_at(row, 7)?,
        updated_at: ts_at(row, 8)?,
        completed_at: opt_ts_at(row, 9)?,
    })
}

fn row_to_idea(row: &rusqlite::Row<'_>) -> rusqlite::Result<Idea> {
    Ok(Idea {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: parsed_at(row, 4)?,
        created_at: ts_at(row, 5)?,
        updated_at: ts_at(row, 6)?,
    })
}

fn row_to_chaos_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChaosMetricRecord> {
    Ok(ChaosMetricRecord {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        level: parsed_at(row, 2)?,
        metrics: ChaosMetrics {
            capture_velocity: row.get(3)?,
            task_switches: row.get(4)?,
            urgency_keywords: row.get(5)?,
            completion_ratio: row.get(6)?,
        },
        reason: row.get(7)?,
        intervention_triggered: row.get(8)?,
        created_at: ts_at(row, 9)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationMessage> {
    let tokens: Option<i64> = row.get(5)?;
    Ok(ConversationMessage {
        role: parsed_at(row, 0)?,
        backend: row.get(1)?,
        content: row.get(2)?,
        timestamp: ts_at(row, 3)?,
        model: row.get(4)?,
        tokens_used: tokens.map(|t| u64::try_from(t).unwrap_or(0)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = DateTime::parse_from_rfc3339("2026-01-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let b = DateTime::parse_from_rfc3339("2026-01-01T09:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let (sa, sb) = (ts_to_sql(&a), ts_to_sql(&b));
        assert_eq!(sa.len(), sb.len());
        assert!(sa < sb);
    }
}
