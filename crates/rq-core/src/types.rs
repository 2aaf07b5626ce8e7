use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned when a persisted enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    Doing,
    Done,
    Blocked,
    Paused,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::Doing => "doing",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(TaskStatus::NotStarted),
            "doing" => Ok(TaskStatus::Doing),
            "done" => Ok(TaskStatus::Done),
            "blocked" => Ok(TaskStatus::Blocked),
            "paused" => Ok(TaskStatus::Paused),
            other => Err(UnknownVariant {
                kind: "task status",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// IdeaStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    #[default]
    Active,
    Dormant,
    Archived,
}

impl IdeaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdeaStatus::Active => "active",
            IdeaStatus::Dormant => "dormant",
            IdeaStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for IdeaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdeaStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(IdeaStatus::Active),
            "dormant" => Ok(IdeaStatus::Dormant),
            "archived" => Ok(IdeaStatus::Archived),
            other => Err(UnknownVariant {
                kind: "idea status",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Task / Idea
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    /// Higher is more important.
    pub priority: i32,
    pub is_mit: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(user_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            description: None,
            status: TaskStatus::default(),
            priority: 0,
            is_mit: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Mark the task done at `at`, bumping `updated_at` as well.
    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.status = TaskStatus::Done;
        self.completed_at = Some(at);
        self.updated_at = at;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: IdeaStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Idea {
    pub fn new(user_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            description: None,
            status: IdeaStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// The two entity kinds tracked by the activity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Task,
    Idea,
}

/// Title and optional description of a recently touched task or idea.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityText {
    pub title: String,
    pub description: Option<String>,
}

/// Trailing time interval `[end - length, end]` used for metric aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Longest window accepted; larger requests are clamped.
pub const MAX_WINDOW_SECONDS: u64 = 7 * 24 * 60 * 60;

impl ActivityWindow {
    pub fn trailing(now: DateTime<Utc>, window_seconds: u64) -> Self {
        let length = Duration::seconds(window_seconds.min(MAX_WINDOW_SECONDS) as i64);
        Self {
            start: now - length,
            end: now,
        }
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

// ---------------------------------------------------------------------------
// Chaos
// ---------------------------------------------------------------------------

/// Inferred behavioral state, ordered by severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ChaosLevel {
    #[default]
    Focused,
    Scattered,
    Spinning,
}

impl ChaosLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChaosLevel::Focused => "focused",
            ChaosLevel::Scattered => "scattered",
            ChaosLevel::Spinning => "spinning",
        }
    }

    /// Scattered and spinning both warrant a nudge.
    pub fn suggests_intervention(&self) -> bool {
        *self >= ChaosLevel::Scattered
    }
}

impl fmt::Display for ChaosLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChaosLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "focused" => Ok(ChaosLevel::Focused),
            "scattered" => Ok(ChaosLevel::Scattered),
            "spinning" => Ok(ChaosLevel::Spinning),
            other => Err(UnknownVariant {
                kind: "chaos level",
                value: other.to_string(),
            }),
        }
    }
}

/// The four windowed activity signals. Recomputed on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChaosMetrics {
    pub capture_velocity: u32,
    pub task_switches: u32,
    pub urgency_keywords: u32,
    /// Percentage in `0..=100`.
    pub completion_ratio: u32,
}

impl ChaosMetrics {
    pub fn new(
        capture_velocity: u32,
        task_switches: u32,
        urgency_keywords: u32,
        completion_ratio: u32,
    ) -> Self {
        Self {
            capture_velocity,
            task_switches,
            urgency_keywords,
            completion_ratio: completion_ratio.min(100),
        }
    }
}

/// Append-only audit row written for every chaos-level query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosMetricRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub level: ChaosLevel,
    pub metrics: ChaosMetrics,
    pub reason: String,
    pub intervention_triggered: bool,
    pub created_at: DateTime<Utc>,
}

impl ChaosMetricRecord {
    pub fn new(
        user_id: Uuid,
        level: ChaosLevel,
        metrics: ChaosMetrics,
        reason: impl Into<String>,
    ) -> Self {
        Self::new_at(user_id, level, metrics, reason, Utc::now())
    }

    /// Record stamped with the instant the metrics were evaluated at.
    pub fn new_at(
        user_id: Uuid,
        level: ChaosLevel,
        metrics: ChaosMetrics,
        reason: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            level,
            metrics,
            reason: reason.into(),
            intervention_triggered: false,
            created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl FromStr for MessageRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(UnknownVariant {
                kind: "message role",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    /// Backend that produced an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            backend: None,
            content: content.into(),
            timestamp: Utc::now(),
            model: None,
            tokens_used: None,
        }
    }

    pub fn assistant(
        backend: impl Into<String>,
        content: impl Into<String>,
        model: impl Into<String>,
        tokens_used: u64,
    ) -> Self {
        Self {
            role: MessageRole::Assistant,
            backend: Some(backend.into()),
            content: content.into(),
            timestamp: Utc::now(),
            model: Some(model.into()),
            tokens_used: Some(tokens_used),
        }
    }
}

pub const DEFAULT_THREAD_TITLE: &str = "New AI Conversation";

/// A per-user message thread. Mutated only by appending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationThread {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub messages: Vec<ConversationMessage>,
    /// Backends that have responded at least once.
    pub participants: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationThread {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: DEFAULT_THREAD_TITLE.to_string(),
            messages: Vec::new(),
            participants: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn append(&mut self, message: ConversationMessage) {
        if let Some(backend) = &message.backend {
            self.participants.insert(backend.clone());
        }
        self.updated_at = message.timestamp.max(self.updated_at);
        self.messages.push(message);
    }
}
