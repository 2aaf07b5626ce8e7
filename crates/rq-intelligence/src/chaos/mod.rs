//! Behavioral chaos detection.
//!
//! [`ChaosService`] ties the metric aggregator, the classifier, the pattern
//! detectors and the audit log together for one store.

pub mod classifier;
pub mod metrics;
pub mod patterns;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rq_core::config::{ChaosConfig, ChaosThresholds};
use rq_core::store::{ActivityStore, ChaosAuditLog, StoreError};
use rq_core::types::{ChaosLevel, ChaosMetricRecord, ChaosMetrics};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

pub use classifier::{classify, classify_with, level_message};
pub use metrics::{completion_ratio, count_keyword_hits, MetricAggregator, UrgencyMatcher};
pub use patterns::{PatternDetector, PatternSuggestion, PatternTrigger, SuggestedAction};

/// Result of a current-level query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaosReport {
    pub level: ChaosLevel,
    pub message: String,
    pub metrics: ChaosMetrics,
    pub intervention_suggested: bool,
}

impl ChaosReport {
    pub fn new(level: ChaosLevel, metrics: ChaosMetrics) -> Self {
        Self {
            level,
            message: level_message(level).to_string(),
            metrics,
            intervention_suggested: level.suggests_intervention(),
        }
    }
}

pub struct ChaosService {
    aggregator: MetricAggregator,
    detector: PatternDetector,
    thresholds: ChaosThresholds,
    audit: Arc<dyn ChaosAuditLog>,
}

impl ChaosService {
    pub fn new(
        activity: Arc<dyn ActivityStore>,
        audit: Arc<dyn ChaosAuditLog>,
        config: &ChaosConfig,
    ) -> Self {
        Self {
            aggregator: MetricAggregator::new(activity.clone(), config),
            detector: PatternDetector::new(activity, config),
            thresholds: config.thresholds,
            audit,
        }
    }

    /// Classify the user's current state and record it in the audit log.
    ///
    /// Every call appends exactly one record.
    pub async fn current_level(&self, user_id: Uuid) -> Result<ChaosReport, StoreError> {
        self.current_level_at(user_id, Utc::now()).await
    }

    pub async fn current_level_at(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ChaosReport, StoreError> {
        let metrics = self.aggregator.compute(user_id, now).await?;
        let level = classify_with(&metrics, &self.thresholds);
        let report = ChaosReport::new(level, metrics);

        let record =
            ChaosMetricRecord::new_at(user_id, level, metrics, report.message.clone(), now);
        self.audit.append_chaos_record(&record).await?;

        info!(%user_id, %level, intervention = report.intervention_suggested, "chaos level classified");
        Ok(report)
    }

    /// Run every pattern detector. Writes nothing.
    pub async fn check_patterns(&self, user_id: Uuid) -> Result<Vec<PatternSuggestion>, StoreError> {
        self.detector.check_all(user_id, Utc::now()).await
    }

    pub async fn history(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ChaosMetricRecord>, StoreError> {
        self.audit.chaos_history(user_id, limit).await
    }
}
