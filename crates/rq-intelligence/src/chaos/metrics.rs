//! Windowed activity signals feeding the classifier.

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use rq_core::config::ChaosConfig;
use rq_core::store::{ActivityStore, StoreError};
use rq_core::types::{ActivityKind, ActivityWindow, ChaosMetrics};
use tracing::debug;
use uuid::Uuid;

/// Whole-word, case-insensitive keyword counter.
///
/// Patterns are compiled once; matching runs against the lower-cased text so
/// multi-word keywords such as `need to` behave like single words.
#[derive(Debug, Clone)]
pub struct UrgencyMatcher {
    patterns: Vec<Regex>,
}

impl UrgencyMatcher {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        let patterns = keywords
            .iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .filter_map(|k| Regex::new(&format!(r"\b{}\b", regex::escape(&k))).ok())
            .collect();
        Self { patterns }
    }

    /// Sum of non-overlapping occurrences of every keyword in `text`.
    pub fn count(&self, text: &str) -> u32 {
        let lower = text.to_lowercase();
        self.patterns
            .iter()
            .map(|re| re.find_iter(&lower).count() as u32)
            .sum()
    }
}

/// One-shot form of [`UrgencyMatcher::count`].
pub fn count_keyword_hits<S: AsRef<str>>(text: &str, keywords: &[S]) -> u32 {
    UrgencyMatcher::new(keywords).count(text)
}

/// Percentage of today's starts that were completed, rounded and capped at 100.
/// Zero when nothing was started.
pub fn completion_ratio(completed_today: u32, started_today: u32) -> u32 {
    if started_today == 0 {
        return 0;
    }
    let (c, s) = (u64::from(completed_today), u64::from(started_today));
    let pct = (200 * c + s) / (2 * s);
    pct.min(100) as u32
}

/// Start of the local calendar day containing `now`, in UTC.
pub fn local_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let local_date = now.with_timezone(&Local).date_naive();
    let midnight = local_date.and_hms_opt(0, 0, 0).unwrap_or_default();
    first_valid_instant(midnight, |naive| {
        Local
            .from_local_datetime(naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
    .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Search limit for a skipped midnight: three hours in 15 minute steps.
const MAX_DST_GAP_STEPS: i64 = 4 * 3;

/// First wall-clock time at or after `start`, in 15 minute steps, that
/// `resolve` can place on the timeline.
fn first_valid_instant<F>(start: NaiveDateTime, resolve: F) -> Option<DateTime<Utc>>
where
    F: Fn(&NaiveDateTime) -> Option<DateTime<Utc>>,
{
    (0..=MAX_DST_GAP_STEPS)
        .map(|step| start + Duration::minutes(15 * step))
        .find_map(|naive| resolve(&naive))
}

/// Computes [`ChaosMetrics`] for a user from the activity store.
pub struct MetricAggregator {
    store: Arc<dyn ActivityStore>,
    window_seconds: u64,
    matcher: UrgencyMatcher,
}

impl MetricAggregator {
    pub fn new(store: Arc<dyn ActivityStore>, config: &ChaosConfig) -> Self {
        Self {
            store,
            window_seconds: config.window_seconds,
            matcher: UrgencyMatcher::new(&config.urgency_keywords),
        }
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    pub async fn compute(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<ChaosMetrics, StoreError> {
        self.compute_with_day_start(user_id, now, local_midnight(now))
            .await
    }

    /// As [`compute`](Self::compute) with an explicit start of "today".
    pub async fn compute_with_day_start(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        day_start: DateTime<Utc>,
    ) -> Result<ChaosMetrics, StoreError> {
        let window = ActivityWindow::trailing(now, self.window_seconds);
        let store = &self.store;

        let ideas_created = store
            .count_created(ActivityKind::Idea, user_id, window.start)
            .await?;
        let tasks_created = store
            .count_created(ActivityKind::Task, user_id, window.start)
            .await?;
        // Counts a new task's own creation as a switch.
        let task_switches = store
            .count_updated(ActivityKind::Task, user_id, window.start)
            .await?;

        let mut urgency = 0;
        for kind in [ActivityKind::Task, ActivityKind::Idea] {
            for text in store.updated_since(kind, user_id, window.start).await? {
                urgency += self.matcher.count(&text.title);
                if let Some(desc) = &text.description {
                    urgency += self.matcher.count(desc);
                }
            }
        }

        let completed = store.count_completed(user_id, day_start).await?;
        let started = store.count_started(user_id, day_start).await?;

        let metrics = ChaosMetrics::new(
            ideas_created + tasks_created,
            task_switches,
            urgency,
            completion_ratio(completed, started),
        );
        debug!(
            %user_id,
            capture_velocity = metrics.capture_velocity,
            task_switches = metrics.task_switches,
            urgency_keywords = metrics.urgency_keywords,
            completion_ratio = metrics.completion_ratio,
            completed_today = completed,
            started_today = started,
            "computed chaos metrics"
        );
        Ok(metrics)
    }
}
