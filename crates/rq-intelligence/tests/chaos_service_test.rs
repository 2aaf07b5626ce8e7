//! Chaos metrics, classification and pattern detection against an in-memory
//! SQLite store.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rq_core::config::ChaosConfig;
use rq_core::sqlite::SqliteStore;
use rq_core::store::ChaosAuditLog;
use rq_core::types::{ChaosLevel, Idea, Task};
use rq_intelligence::chaos::metrics::local_midnight;
use rq_intelligence::chaos::{
    ChaosService, MetricAggregator, PatternDetector, PatternTrigger, SuggestedAction,
};
use uuid::Uuid;

async fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::new_in_memory().await.unwrap())
}

fn service(store: &Arc<SqliteStore>) -> ChaosService {
    ChaosService::new(store.clone(), store.clone(), &ChaosConfig::default())
}

/// A task created and finished today, outside the activity window when the
/// day is old enough.
fn settled_task(user: Uuid) -> Task {
    let now = Utc::now();
    let earlier = (now - Duration::minutes(15)).max(local_midnight(now));
    let mut t = Task::new(user, "morning review");
    t.created_at = earlier;
    t.complete(earlier);
    t
}

// ===========================================================================
// MetricAggregator
// ===========================================================================

#[tokio::test]
async fn capture_velocity_sums_ideas_and_tasks() {
    let db = store().await;
    let user = Uuid::new_v4();
    for i in 0..2 {
        db.upsert_idea(&Idea::new(user, format!("idea {i}"))).await.unwrap();
    }
    db.upsert_task(&Task::new(user, "task")).await.unwrap();

    let agg = MetricAggregator::new(db.clone(), &ChaosConfig::default());
    let now = Utc::now();
    let m = agg
        .compute_with_day_start(user, now, now - Duration::hours(12))
        .await
        .unwrap();
    assert_eq!(m.capture_velocity, 3);
    // The new task's creation also counts as a switch.
    assert_eq!(m.task_switches, 1);
}

#[tokio::test]
async fn urgency_counts_titles_and_descriptions_in_window() {
    let db = store().await;
    let user = Uuid::new_v4();

    let mut task = Task::new(user, "This is urgent, urgent!");
    task.description = Some("Deadline is Friday".into());
    db.upsert_task(&task).await.unwrap();

    let mut old = Idea::new(user, "urgent but stale");
    old.created_at = Utc::now() - Duration::hours(3);
    old.updated_at = old.created_at;
    db.upsert_idea(&old).await.unwrap();

    let agg = MetricAggregator::new(db.clone(), &ChaosConfig::default());
    let now = Utc::now();
    let m = agg
        .compute_with_day_start(user, now, now - Duration::hours(12))
        .await
        .unwrap();
    assert_eq!(m.urgency_keywords, 3);
}

#[tokio::test]
async fn completion_ratio_is_zero_without_starts_today() {
    let db = store().await;
    let user = Uuid::new_v4();
    // Completed today but started yesterday.
    let mut t = Task::new(user, "carry-over");
    t.created_at = Utc::now() - Duration::days(2);
    t.complete(Utc::now());
    db.upsert_task(&t).await.unwrap();

    let agg = MetricAggregator::new(db.clone(), &ChaosConfig::default());
    let now = Utc::now();
    let m = agg
        .compute_with_day_start(user, now, now - Duration::hours(12))
        .await
        .unwrap();
    assert_eq!(m.completion_ratio, 0);
}

#[tokio::test]
async fn completion_ratio_uses_day_start() {
    let db = store().await;
    let user = Uuid::new_v4();
    db.upsert_task(&settled_task(user)).await.unwrap();
    let mut open = Task::new(user, "open");
    open.created_at = Utc::now() - Duration::hours(1);
    open.updated_at = open.created_at;
    db.upsert_task(&open).await.unwrap();

    let agg = MetricAggregator::new(db.clone(), &ChaosConfig::default());
    let now = Utc::now();
    let m = agg
        .compute_with_day_start(user, now, now - Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(m.completion_ratio, 50);
}

// ===========================================================================
// ChaosService
// ===========================================================================

#[tokio::test]
async fn calm_user_is_focused() {
    let db = store().await;
    let user = Uuid::new_v4();
    db.upsert_task(&settled_task(user)).await.unwrap();

    let report = service(&db).current_level(user).await.unwrap();
    assert_eq!(report.metrics.completion_ratio, 100);
    assert_eq!(report.level, ChaosLevel::Focused);
    assert!(!report.intervention_suggested);
}

#[tokio::test]
async fn burst_of_captures_is_spinning() {
    let db = store().await;
    let user = Uuid::new_v4();
    db.upsert_task(&settled_task(user)).await.unwrap();
    for i in 0..6 {
        db.upsert_idea(&Idea::new(user, format!("idea {i}"))).await.unwrap();
    }

    let report = service(&db).current_level(user).await.unwrap();
    assert!(report.metrics.capture_velocity >= 6);
    assert_eq!(report.level, ChaosLevel::Spinning);
    assert!(report.intervention_suggested);
    assert!(report.message.contains("regroup"));
}

#[tokio::test]
async fn every_query_appends_one_matching_record() {
    let db = store().await;
    let user = Uuid::new_v4();
    let svc = service(&db);

    let first = svc.current_level(user).await.unwrap();
    assert_eq!(db.chaos_history(user, 10).await.unwrap().len(), 1);

    db.upsert_idea(&Idea::new(user, "another")).await.unwrap();
    let second = svc.current_level(user).await.unwrap();

    let history = svc.history(user, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].level, second.level);
    assert_eq!(history[0].metrics, second.metrics);
    assert_eq!(history[0].reason, second.message);
    assert_eq!(history[1].level, first.level);
}

#[tokio::test]
async fn record_is_stamped_with_evaluated_instant() {
    let db = store().await;
    let user = Uuid::new_v4();
    let at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap();

    service(&db).current_level_at(user, at).await.unwrap();

    let history = db.chaos_history(user, 1).await.unwrap();
    assert_eq!(history[0].created_at, at);
}

// ===========================================================================
// PatternDetector
// ===========================================================================

#[tokio::test]
async fn rapid_capture_fires_at_threshold() {
    let db = store().await;
    let user = Uuid::new_v4();
    let detector = PatternDetector::new(db.clone(), &ChaosConfig::default());

    for i in 0..2 {
        db.upsert_idea(&Idea::new(user, format!("idea {i}"))).await.unwrap();
    }
    assert!(detector
        .check_rapid_capture(user, Utc::now())
        .await
        .unwrap()
        .is_none());

    db.upsert_idea(&Idea::new(user, "third")).await.unwrap();
    let s = detector
        .check_rapid_capture(user, Utc::now())
        .await
        .unwrap()
        .expect("fires at 3");
    assert_eq!(s.trigger, PatternTrigger::RapidCapture);
    assert_eq!(s.action, SuggestedAction::SuggestTriage);
    assert_eq!(
        s.message,
        "You've captured 3 ideas in 10 minutes. Want to take a moment to organize them?"
    );
}

#[tokio::test]
async fn check_all_returns_fired_in_fixed_order() {
    let db = store().await;
    let user = Uuid::new_v4();
    for i in 0..5 {
        db.upsert_task(&Task::new(user, format!("task {i}"))).await.unwrap();
    }
    for i in 0..3 {
        db.upsert_idea(&Idea::new(user, format!("idea {i}"))).await.unwrap();
    }

    let fired = service(&db).check_patterns(user).await.unwrap();
    let triggers: Vec<_> = fired.iter().map(|s| s.trigger).collect();
    assert_eq!(
        triggers,
        vec![
            PatternTrigger::RapidCapture,
            PatternTrigger::TaskSwitching,
            PatternTrigger::RapidTaskCreation,
        ]
    );
    // Pattern checks never write history.
    assert!(db.chaos_history(user, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn quiet_user_fires_nothing() {
    let db = store().await;
    let user = Uuid::new_v4();
    db.upsert_task(&settled_task(user)).await.unwrap();
    assert!(service(&db).check_patterns(user).await.unwrap().is_empty());
}
