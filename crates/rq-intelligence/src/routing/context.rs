use std::sync::Arc;

use rq_core::config::RoutingConfig;
use rq_core::store::{ActivityStore, StoreError};
use rq_core::types::{Idea, Task};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chaos::{ChaosReport, ChaosService};

/// Title and status of a task or idea as shown to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextItem {
    pub title: String,
    pub status: String,
}

impl From<&Task> for ContextItem {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            status: task.status.to_string(),
        }
    }
}

impl From<&Idea> for ContextItem {
    fn from(idea: &Idea) -> Self {
        Self {
            title: idea.title.clone(),
            status: idea.status.to_string(),
        }
    }
}

/// Snapshot injected into every backend prompt. Built fresh per message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutingContext {
    pub current_mits: Vec<ContextItem>,
    pub recent_ideas: Vec<ContextItem>,
    pub chaos: Option<ChaosReport>,
}

pub struct ContextGatherer {
    activity: Arc<dyn ActivityStore>,
    chaos: Arc<ChaosService>,
    max_mits: usize,
    max_recent_ideas: usize,
}

impl ContextGatherer {
    pub fn new(
        activity: Arc<dyn ActivityStore>,
        chaos: Arc<ChaosService>,
        config: &RoutingConfig,
    ) -> Self {
        Self {
            activity,
            chaos,
            max_mits: config.max_mits,
            max_recent_ideas: config.max_recent_ideas,
        }
    }

    /// Open MITs, newest ideas and the current chaos level.
    ///
    /// Querying the chaos level appends an audit record.
    pub async fn gather(&self, user_id: Uuid) -> Result<RoutingContext, StoreError> {
        let mits = self.activity.current_mits(user_id, self.max_mits).await?;
        let ideas = self
            .activity
            .recent_ideas(user_id, self.max_recent_ideas)
            .await?;
        let chaos = self.chaos.current_level(user_id).await?;

        Ok(RoutingContext {
            current_mits: mits.iter().map(ContextItem::from).collect(),
            recent_ideas: ideas.iter().map(ContextItem::from).collect(),
            chaos: Some(chaos),
        })
    }
}
