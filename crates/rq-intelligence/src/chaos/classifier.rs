use rq_core::config::{ChaosThresholds, LevelThresholds};
use rq_core::types::{ChaosLevel, ChaosMetrics};

/// Classify with the default thresholds.
pub fn classify(metrics: &ChaosMetrics) -> ChaosLevel {
    classify_with(metrics, &ChaosThresholds::default())
}

/// OR-of-thresholds: any single signal crossing a band puts the user in it.
/// Spinning is checked first.
pub fn classify_with(metrics: &ChaosMetrics, thresholds: &ChaosThresholds) -> ChaosLevel {
    if exceeds(metrics, &thresholds.spinning) {
        ChaosLevel::Spinning
    } else if exceeds(metrics, &thresholds.scattered) {
        ChaosLevel::Scattered
    } else {
        ChaosLevel::Focused
    }
}

fn exceeds(m: &ChaosMetrics, band: &LevelThresholds) -> bool {
    m.capture_velocity > band.max_capture_velocity
        || m.task_switches > band.max_task_switches
        || m.urgency_keywords > band.max_urgency_keywords
        || m.completion_ratio < band.min_completion_ratio
}

/// Fixed rationale per level.
pub fn level_message(level: ChaosLevel) -> &'static str {
    match level {
        ChaosLevel::Focused => "You seem focused and on track. Keep it up!",
        ChaosLevel::Scattered => {
            "You're juggling quite a few things. Consider narrowing your focus."
        }
        ChaosLevel::Spinning => "Things look pretty chaotic right now. Let's pause and regroup.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(cv: u32, ts: u32, uk: u32, cr: u32) -> ChaosMetrics {
        ChaosMetrics::new(cv, ts, uk, cr)
    }

    #[test]
    fn calm_metrics_are_focused() {
        assert_eq!(classify(&m(0, 0, 0, 100)), ChaosLevel::Focused);
        assert_eq!(classify(&m(2, 2, 5, 80)), ChaosLevel::Focused);
    }

    #[test]
    fn each_signal_alone_can_spin() {
        assert_eq!(classify(&m(6, 0, 0, 100)), ChaosLevel::Spinning);
        assert_eq!(classify(&m(0, 6, 0, 100)), ChaosLevel::Spinning);
        assert_eq!(classify(&m(0, 0, 11, 100)), ChaosLevel::Spinning);
        assert_eq!(classify(&m(0, 0, 0, 49)), ChaosLevel::Spinning);
    }

    #[test]
    fn each_signal_alone_can_scatter() {
        assert_eq!(classify(&m(3, 0, 0, 100)), ChaosLevel::Scattered);
        assert_eq!(classify(&m(0, 3, 0, 100)), ChaosLevel::Scattered);
        assert_eq!(classify(&m(0, 0, 6, 100)), ChaosLevel::Scattered);
        assert_eq!(classify(&m(0, 0, 0, 79)), ChaosLevel::Scattered);
    }

    #[test]
    fn boundaries_are_strict() {
        assert_eq!(classify(&m(5, 5, 10, 50)), ChaosLevel::Scattered);
        assert_eq!(classify(&m(0, 0, 0, 50)), ChaosLevel::Scattered);
        assert_eq!(classify(&m(0, 0, 0, 80)), ChaosLevel::Focused);
    }

    #[test]
    fn spinning_overrides_otherwise_perfect_metrics() {
        // One hot signal is enough; no weighting.
        assert_eq!(classify(&m(100, 0, 0, 100)), ChaosLevel::Spinning);
    }

    #[test]
    fn idle_day_reads_as_spinning() {
        // completion_ratio is 0 when nothing started today.
        assert_eq!(classify(&m(0, 0, 0, 0)), ChaosLevel::Spinning);
    }

    #[test]
    fn custom_thresholds() {
        let mut t = ChaosThresholds::default();
        t.scattered.max_capture_velocity = 4;
        assert_eq!(classify_with(&m(3, 0, 0, 100), &t), ChaosLevel::Focused);
    }

    #[test]
    fn messages_are_distinct_per_level() {
        let all = [ChaosLevel::Focused, ChaosLevel::Scattered, ChaosLevel::Spinning];
        let msgs: std::collections::HashSet<_> = all.iter().map(|l| level_message(*l)).collect();
        assert_eq!(msgs.len(), 3);
        assert!(level_message(ChaosLevel::Spinning).contains("regroup"));
    }
}
