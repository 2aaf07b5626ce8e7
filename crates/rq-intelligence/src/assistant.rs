//! End-to-end handling of one chat message: parse, gather context, route,
//! and persist the exchange to its conversation thread.

use std::sync::Arc;

use rq_core::config::Config;
use rq_core::store::{ActivityStore, ChaosAuditLog, ConversationStore};
use rq_core::types::{ConversationMessage, ConversationThread};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::chaos::ChaosService;
use crate::routing::{
    parse_mentions, BackendFailure, BackendResponse, ContextGatherer, ModelRouter, RoutingContext,
};
use crate::IntelligenceError;

/// What the caller gets back for one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedMessage {
    pub responses: Vec<BackendResponse>,
    pub failures: Vec<BackendFailure>,
    pub thread_id: Uuid,
    pub context_used: RoutingContext,
}

pub struct Assistant {
    gatherer: ContextGatherer,
    router: ModelRouter,
    conversations: Arc<dyn ConversationStore>,
}

impl Assistant {
    pub fn new(
        gatherer: ContextGatherer,
        router: ModelRouter,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            gatherer,
            router,
            conversations,
        }
    }

    /// Wire an assistant over a single store that serves every query.
    pub fn with_store<S>(store: Arc<S>, config: &Config, router: ModelRouter) -> Self
    where
        S: ActivityStore + ChaosAuditLog + ConversationStore + 'static,
    {
        let activity: Arc<dyn ActivityStore> = store.clone();
        let audit: Arc<dyn ChaosAuditLog> = store.clone();
        let chaos = Arc::new(ChaosService::new(activity.clone(), audit, &config.chaos));
        let gatherer = ContextGatherer::new(activity, chaos, &config.routing);
        Self::new(gatherer, router, store)
    }

    /// As [`with_store`](Self::with_store) with backends built from config.
    /// Fails when a backend's API key is not in the environment.
    pub fn from_config<S>(store: Arc<S>, config: &Config) -> Result<Self, IntelligenceError>
    where
        S: ActivityStore + ChaosAuditLog + ConversationStore + 'static,
    {
        let router = ModelRouter::from_config(config)?;
        Ok(Self::with_store(store, config, router))
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// Route `message` and append it, plus every successful reply, to the
    /// thread. An unknown or foreign `thread_id` starts a new thread.
    ///
    /// No thread is created when gathering context fails.
    pub async fn process_message(
        &self,
        user_id: Uuid,
        message: &str,
        thread_id: Option<Uuid>,
    ) -> Result<ProcessedMessage, IntelligenceError> {
        let parsed = parse_mentions(message);
        let context = self.gatherer.gather(user_id).await?;
        let mut thread = self.thread_for(user_id, thread_id).await?;
        let outcome = self
            .router
            .route(&parsed.cleaned, &parsed.mentions, &context)
            .await;

        let mut new_messages = Vec::with_capacity(outcome.responses.len() + 1);
        new_messages.push(ConversationMessage::user(message));
        new_messages.extend(outcome.responses.iter().map(|r| {
            ConversationMessage::assistant(&r.backend, &r.content, &r.model, r.tokens_used)
        }));
        for m in &new_messages {
            thread.append(m.clone());
        }
        self.conversations
            .append_messages(&thread, &new_messages)
            .await?;

        info!(
            %user_id,
            thread_id = %thread.id,
            responses = outcome.responses.len(),
            failures = outcome.failures.len(),
            "message processed"
        );
        Ok(ProcessedMessage {
            responses: outcome.responses,
            failures: outcome.failures,
            thread_id: thread.id,
            context_used: context,
        })
    }

    async fn thread_for(
        &self,
        user_id: Uuid,
        thread_id: Option<Uuid>,
    ) -> Result<ConversationThread, IntelligenceError> {
        if let Some(id) = thread_id {
            if let Some(thread) = self.conversations.get_thread(id, user_id).await? {
                return Ok(thread);
            }
            debug!(%user_id, thread_id = %id, "thread not found for user, starting a new one");
        }
        Ok(self.conversations.create_thread(user_id).await?)
    }
}
