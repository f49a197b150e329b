//! Trend and timing analysis over a user's recent crisis events.

use std::collections::BTreeMap;

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::events::CrisisEvent;

/// Minimum number of events before any pattern is reported.
pub const MIN_EVENTS_FOR_PATTERNS: usize = 3;
/// Only the most recent events are considered.
pub const PATTERN_WINDOW: usize = 30;

const DAILY_MAX_GAP_HOURS: f64 = 36.0;
const WEEKLY_MAX_GAP_HOURS: f64 = 240.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Worsening,
    Stable,
    Improving,
    InsufficientData,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    Morning,
    Afternoon,
    Evening,
    LateEvening,
}

impl TimeWindow {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeWindow::Morning,
            12..=16 => TimeWindow::Afternoon,
            17..=20 => TimeWindow::Evening,
            _ => TimeWindow::LateEvening,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimeOfDayPattern {
    /// Set only when one window holds a strict majority of events
    pub dominant_window: Option<TimeWindow>,
    /// Share of events in the most common window (0.0 - 1.0)
    pub dominant_share: f64,
    pub counts: BTreeMap<TimeWindow, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyPattern {
    Daily,
    Weekly,
    Sporadic,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PatternAnalysis {
    pub trend: Trend,
    pub time_of_day_pattern: TimeOfDayPattern,
    pub frequency_pattern: FrequencyPattern,
    /// Median gap between consecutive events, in hours
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_gap_hours: Option<f64>,
    pub events_considered: usize,
}

impl PatternAnalysis {
    fn insufficient(events_considered: usize) -> Self {
        Self {
            trend: Trend::InsufficientData,
            time_of_day_pattern: TimeOfDayPattern {
                dominant_window: None,
                dominant_share: 0.0,
                counts: BTreeMap::new(),
            },
            frequency_pattern: FrequencyPattern::InsufficientData,
            median_gap_hours: None,
            events_considered,
        }
    }
}

/// Analyze a history in any order; events are sorted newest-first internally.
pub fn analyze(history: &[CrisisEvent]) -> PatternAnalysis {
    let mut recent: Vec<&CrisisEvent> = history.iter().collect();
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    recent.truncate(PATTERN_WINDOW);

    if recent.len() < MIN_EVENTS_FOR_PATTERNS {
        return PatternAnalysis::insufficient(recent.len());
    }

    let delta = recent[0].assessment.risk_level.rank() - recent[2].assessment.risk_level.rank();
    let trend = match delta.signum() {
        1 => Trend::Worsening,
        -1 => Trend::Improving,
        _ => Trend::Stable,
    };

    let median_gap_hours = median_gap_hours(&recent);
    let frequency_pattern = match median_gap_hours {
        Some(gap) if gap <= DAILY_MAX_GAP_HOURS => FrequencyPattern::Daily,
        Some(gap) if gap <= WEEKLY_MAX_GAP_HOURS => FrequencyPattern::Weekly,
        Some(_) => FrequencyPattern::Sporadic,
        None => FrequencyPattern::InsufficientData,
    };

    PatternAnalysis {
        trend,
        time_of_day_pattern: time_of_day_pattern(&recent),
        frequency_pattern,
        median_gap_hours,
        events_considered: recent.len(),
    }
}

fn time_of_day_pattern(events: &[&CrisisEvent]) -> TimeOfDayPattern {
    let mut counts: BTreeMap<TimeWindow, usize> = BTreeMap::new();
    for event in events {
        *counts
            .entry(TimeWindow::from_hour(event.timestamp.hour()))
            .or_insert(0) += 1;
    }

    let (modal, modal_count) = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(window, count)| (Some(*window), *count))
        .unwrap_or((None, 0));

    let total = events.len().max(1);
    let share = modal_count as f64 / total as f64;
    TimeOfDayPattern {
        dominant_window: if modal_count * 2 > events.len() { modal } else { None },
        dominant_share: (share * 100.0).round() / 100.0,
        counts,
    }
}

/// Events must already be sorted newest-first.
fn median_gap_hours(events: &[&CrisisEvent]) -> Option<f64> {
    let mut gaps: Vec<f64> = events
        .windows(2)
        .map(|pair| {
            let seconds = pair[0]
                .timestamp
                .signed_duration_since(pair[1].timestamp)
                .num_seconds();
            seconds.max(0) as f64 / 3600.0
        })
        .collect();
    if gaps.is_empty() {
        return None;
    }
    gaps.sort_by(|a, b| a.total_cmp(b));
    let mid = gaps.len() / 2;
    let median = if gaps.len() % 2 == 0 {
        (gaps[mid - 1] + gaps[mid]) / 2.0
    } else {
        gaps[mid]
    };
    Some(median)
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::assessment::CrisisAssessment;
    use crate::risk::RiskLevel;

    pub(crate) fn event_at(timestamp: DateTime<Utc>, level: RiskLevel) -> CrisisEvent {
        let score = match level {
            RiskLevel::None => 0.0,
            RiskLevel::Low => 3.0,
            RiskLevel::Moderate => 6.0,
            RiskLevel::High => 11.0,
            RiskLevel::Critical => 16.0,
        };
        CrisisEvent {
            id: Uuid::now_v7(),
            user_id: Uuid::nil(),
            timestamp,
            assessment: CrisisAssessment::from_score(score, Vec::new()),
            escalation: None,
            encrypted_content: Vec::new(),
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
    }

    #[test]
    fn fewer_than_three_events_is_insufficient() {
        let history = vec![
            event_at(base(), RiskLevel::High),
            event_at(base() + Duration::days(1), RiskLevel::Critical),
        ];
        let analysis = analyze(&history);
        assert_eq!(analysis.trend, Trend::InsufficientData);
        assert_eq!(analysis.frequency_pattern, FrequencyPattern::InsufficientData);
        assert_eq!(analysis.time_of_day_pattern.dominant_window, None);
        assert_eq!(analysis.events_considered, 2);
    }

    #[test]
    fn rising_levels_are_worsening_regardless_of_input_order() {
        // Oldest first on purpose; analyze sorts internally.
        let history = vec![
            event_at(base(), RiskLevel::Low),
            event_at(base() + Duration::days(1), RiskLevel::Moderate),
            event_at(base() + Duration::days(2), RiskLevel::High),
        ];
        assert_eq!(analyze(&history).trend, Trend::Worsening);

        let mut reversed = history.clone();
        reversed.reverse();
        assert_eq!(analyze(&reversed).trend, Trend::Worsening);
    }

    #[test]
    fn trend_compares_newest_with_third_newest() {
        let history = vec![
            event_at(base(), RiskLevel::None),
            event_at(base() + Duration::days(1), RiskLevel::Critical),
            event_at(base() + Duration::days(2), RiskLevel::Low),
            event_at(base() + Duration::days(3), RiskLevel::Critical),
            event_at(base() + Duration::days(4), RiskLevel::Low),
        ];
        // newest Low vs third-newest Low, the spike in between is ignored
        assert_eq!(analyze(&history).trend, Trend::Stable);

        let improving = vec![
            event_at(base(), RiskLevel::Critical),
            event_at(base() + Duration::days(1), RiskLevel::High),
            event_at(base() + Duration::days(2), RiskLevel::Moderate),
        ];
        assert_eq!(analyze(&improving).trend, Trend::Improving);
    }

    #[test]
    fn frequency_buckets_by_median_gap() {
        let daily: Vec<CrisisEvent> = (0..4)
            .map(|d| event_at(base() + Duration::days(d), RiskLevel::Low))
            .collect();
        let analysis = analyze(&daily);
        assert_eq!(analysis.frequency_pattern, FrequencyPattern::Daily);
        assert_eq!(analysis.median_gap_hours, Some(24.0));

        let weekly: Vec<CrisisEvent> = (0..4)
            .map(|w| event_at(base() + Duration::weeks(w), RiskLevel::Low))
            .collect();
        assert_eq!(analyze(&weekly).frequency_pattern, FrequencyPattern::Weekly);

        let sporadic: Vec<CrisisEvent> = (0..3)
            .map(|m| event_at(base() + Duration::days(m * 40), RiskLevel::Low))
            .collect();
        assert_eq!(
            analyze(&sporadic).frequency_pattern,
            FrequencyPattern::Sporadic
        );
    }

    #[test]
    fn dominant_window_requires_a_majority() {
        let late = Utc.with_ymd_and_hms(2026, 5, 4, 23, 30, 0).unwrap();
        let history = vec![
            event_at(late, RiskLevel::Moderate),
            event_at(late + Duration::days(1), RiskLevel::Moderate),
            event_at(late + Duration::days(2) - Duration::hours(22), RiskLevel::Moderate),
            event_at(base() + Duration::days(5), RiskLevel::Moderate),
        ];
        let pattern = analyze(&history).time_of_day_pattern;
        assert_eq!(pattern.dominant_window, Some(TimeWindow::LateEvening));
        assert_eq!(pattern.dominant_share, 0.75);

        let split = vec![
            event_at(late, RiskLevel::Low),
            event_at(late + Duration::days(1), RiskLevel::Low),
            event_at(base() + Duration::days(3), RiskLevel::Low),
            event_at(base() + Duration::days(4), RiskLevel::Low),
        ];
        let pattern = analyze(&split).time_of_day_pattern;
        assert_eq!(pattern.dominant_window, None);
        assert_eq!(pattern.dominant_share, 0.5);
    }

    #[test]
    fn only_the_recent_window_is_considered() {
        let history: Vec<CrisisEvent> = (0..(PATTERN_WINDOW as i64 + 10))
            .map(|h| event_at(base() + Duration::hours(h), RiskLevel::Low))
            .collect();
        assert_eq!(analyze(&history).events_considered, PATTERN_WINDOW);
    }
}
