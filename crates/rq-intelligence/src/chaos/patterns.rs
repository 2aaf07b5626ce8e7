//! Behavioral pattern detectors.
//!
//! Each detector runs one count over the trailing window and fires when the
//! count reaches its threshold. Detectors keep no state between calls.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rq_core::config::ChaosConfig;
use rq_core::store::{ActivityStore, StoreError};
use rq_core::types::{ActivityKind, ActivityWindow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternTrigger {
    RapidCapture,
    TaskSwitching,
    RapidTaskCreation,
}

impl PatternTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternTrigger::RapidCapture => "rapid_capture",
            PatternTrigger::TaskSwitching => "task_switching",
            PatternTrigger::RapidTaskCreation => "rapid_task_creation",
        }
    }
}

impl fmt::Display for PatternTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the UI should offer the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    SuggestTriage,
    SuggestFocus,
    CheckCurrentFocus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSuggestion {
    pub trigger: PatternTrigger,
    pub message: String,
    pub action: SuggestedAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternThresholds {
    pub rapid_capture: u32,
    pub task_switching: u32,
    pub task_creation: u32,
}

impl From<&ChaosConfig> for PatternThresholds {
    fn from(cfg: &ChaosConfig) -> Self {
        Self {
            rapid_capture: cfg.rapid_capture_threshold,
            task_switching: cfg.task_switch_threshold,
            task_creation: cfg.task_creation_threshold,
        }
    }
}

pub struct PatternDetector {
    store: Arc<dyn ActivityStore>,
    window_seconds: u64,
    thresholds: PatternThresholds,
}

impl PatternDetector {
    pub fn new(store: Arc<dyn ActivityStore>, config: &ChaosConfig) -> Self {
        Self {
            store,
            window_seconds: config.window_seconds,
            thresholds: PatternThresholds::from(config),
        }
    }

    fn window(&self, now: DateTime<Utc>) -> ActivityWindow {
        ActivityWindow::trailing(now, self.window_seconds)
    }

    pub async fn check_rapid_capture(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<PatternSuggestion>, StoreError> {
        let window = self.window(now);
        let ideas = self
            .store
            .count_created(ActivityKind::Idea, user_id, window.start)
            .await?;
        if ideas < self.thresholds.rapid_capture {
            return Ok(None);
        }
        Ok(Some(PatternSuggestion {
            trigger: PatternTrigger::RapidCapture,
            message: format!(
                "You've captured {ideas} ideas in {} minutes. Want to take a moment to organize them?",
                window.minutes()
            ),
            action: SuggestedAction::SuggestTriage,
        }))
    }

    pub async fn check_task_switching(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<PatternSuggestion>, StoreError> {
        let updated = self
            .store
            .count_updated(ActivityKind::Task, user_id, self.window(now).start)
            .await?;
        if updated < self.thresholds.task_switching {
            return Ok(None);
        }
        Ok(Some(PatternSuggestion {
            trigger: PatternTrigger::TaskSwitching,
            message: "Lots of task switching happening. Need help focusing on one thing?".into(),
            action: SuggestedAction::SuggestFocus,
        }))
    }

    pub async fn check_rapid_task_creation(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<PatternSuggestion>, StoreError> {
        let created = self
            .store
            .count_created(ActivityKind::Task, user_id, self.window(now).start)
            .await?;
        if created < self.thresholds.task_creation {
            return Ok(None);
        }
        Ok(Some(PatternSuggestion {
            trigger: PatternTrigger::RapidTaskCreation,
            message: "You're creating a lot of tasks quickly. Is this avoiding your current MIT?"
                .into(),
            action: SuggestedAction::CheckCurrentFocus,
        }))
    }

    /// Every detector that fires, in the order capture, switching, creation.
    pub async fn check_all(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<PatternSuggestion>, StoreError> {
        let checks = [
            self.check_rapid_capture(user_id, now).await?,
            self.check_task_switching(user_id, now).await?,
            self.check_rapid_task_creation(user_id, now).await?,
        ];
        Ok(checks.into_iter().flatten().collect())
    }
}
