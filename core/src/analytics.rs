//! Aggregate statistics over a user's stored events.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::escalation::EscalationStep;
use crate::events::CrisisEvent;
use crate::patterns::{self, FrequencyPattern, PatternAnalysis, TimeWindow, Trend};
use crate::risk::RiskLevel;

/// Share of high/critical events at which a clinical follow-up is recommended.
pub const ELEVATED_SHARE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Day,
    Week,
    #[default]
    Month,
    Quarter,
    Year,
    All,
}

impl Timeframe {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "day" | "24h" => Some(Timeframe::Day),
            "week" | "7d" => Some(Timeframe::Week),
            "month" | "30d" => Some(Timeframe::Month),
            "quarter" | "90d" => Some(Timeframe::Quarter),
            "year" | "365d" => Some(Timeframe::Year),
            "all" => Some(Timeframe::All),
            _ => None,
        }
    }

    /// Length of the window; `None` for all time.
    pub fn span(self) -> Option<Duration> {
        match self {
            Timeframe::Day => Some(Duration::hours(24)),
            Timeframe::Week => Some(Duration::days(7)),
            Timeframe::Month => Some(Duration::days(30)),
            Timeframe::Quarter => Some(Duration::days(90)),
            Timeframe::Year => Some(Duration::days(365)),
            Timeframe::All => None,
        }
    }
}

/// How an event was resolved, judged from its escalation outcome.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    EmergencyServices,
    CrisisHotline,
    SupportNetwork,
    /// Escalated, but no step got through
    Unreached,
    /// No escalation ran
    SelfManaged,
}

impl ResolutionMethod {
    pub const ALL: [ResolutionMethod; 5] = [
        ResolutionMethod::EmergencyServices,
        ResolutionMethod::CrisisHotline,
        ResolutionMethod::SupportNetwork,
        ResolutionMethod::Unreached,
        ResolutionMethod::SelfManaged,
    ];

    /// The most intensive step that succeeded wins.
    pub fn of(event: &CrisisEvent) -> Self {
        let Some(outcome) = &event.escalation else {
            return ResolutionMethod::SelfManaged;
        };
        let succeeded: Vec<EscalationStep> = outcome.succeeded_steps().collect();
        if succeeded.contains(&EscalationStep::EmergencyServices) {
            ResolutionMethod::EmergencyServices
        } else if succeeded.contains(&EscalationStep::Hotline) {
            ResolutionMethod::CrisisHotline
        } else if succeeded.contains(&EscalationStep::ContactNotification) {
            ResolutionMethod::SupportNetwork
        } else if outcome.steps_attempted.is_empty() {
            ResolutionMethod::SelfManaged
        } else {
            ResolutionMethod::Unreached
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CrisisAnalytics {
    pub timeframe: Timeframe,
    /// Start of the window (absent for `all`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_start: Option<DateTime<Utc>>,
    pub total_events: usize,
    /// Every level is present, zero when unseen
    pub risk_level_distribution: BTreeMap<RiskLevel, usize>,
    pub resolution_methods: BTreeMap<ResolutionMethod, usize>,
    /// Mean seconds from event to escalation completion, over escalated events
    pub average_resolution_time_seconds: Option<f64>,
    pub prevention_recommendations: Vec<String>,
    pub patterns: PatternAnalysis,
}

/// Compute analytics over the events of `history` that fall inside the window
/// ending at `now`.
pub fn compute(
    history: &[CrisisEvent],
    timeframe: Timeframe,
    now: DateTime<Utc>,
) -> CrisisAnalytics {
    let window_start = timeframe.span().map(|span| now - span);
    let events: Vec<CrisisEvent> = history
        .iter()
        .filter(|e| window_start.is_none_or(|start| e.timestamp >= start))
        .cloned()
        .collect();

    let mut risk_level_distribution: BTreeMap<RiskLevel, usize> =
        RiskLevel::ALL.iter().map(|level| (*level, 0)).collect();
    let mut resolution_methods: BTreeMap<ResolutionMethod, usize> =
        ResolutionMethod::ALL.iter().map(|m| (*m, 0)).collect();
    let mut resolution_seconds: Vec<f64> = Vec::new();

    for event in &events {
        *risk_level_distribution
            .entry(event.assessment.risk_level)
            .or_insert(0) += 1;
        *resolution_methods.entry(ResolutionMethod::of(event)).or_insert(0) += 1;
        if let Some(outcome) = &event.escalation {
            let elapsed = outcome.completed_at.signed_duration_since(event.timestamp);
            resolution_seconds.push(elapsed.num_milliseconds().max(0) as f64 / 1000.0);
        }
    }

    let average_resolution_time_seconds = if resolution_seconds.is_empty() {
        None
    } else {
        let mean = resolution_seconds.iter().sum::<f64>() / resolution_seconds.len() as f64;
        Some((mean * 10.0).round() / 10.0)
    };

    let patterns = patterns::analyze(&events);
    let prevention_recommendations = prevention_recommendations(
        &events,
        &risk_level_distribution,
        &resolution_methods,
        &patterns,
    );

    CrisisAnalytics {
        timeframe,
        window_start,
        total_events: events.len(),
        risk_level_distribution,
        resolution_methods,
        average_resolution_time_seconds,
        prevention_recommendations,
        patterns,
    }
}

fn prevention_recommendations(
    events: &[CrisisEvent],
    distribution: &BTreeMap<RiskLevel, usize>,
    methods: &BTreeMap<ResolutionMethod, usize>,
    patterns: &PatternAnalysis,
) -> Vec<String> {
    let elevated = distribution
        .iter()
        .filter(|(level, _)| **level >= RiskLevel::High)
        .map(|(_, count)| *count)
        .sum::<usize>();
    let elevated_share = if events.is_empty() {
        0.0
    } else {
        elevated as f64 / events.len() as f64
    };

    let rules: [(bool, &str); 5] = [
        (patterns.trend == Trend::Worsening, "review_safety_plan"),
        (
            elevated_share >= ELEVATED_SHARE_THRESHOLD,
            "schedule_clinical_followup",
        ),
        (
            patterns.time_of_day_pattern.dominant_window == Some(TimeWindow::LateEvening),
            "plan_evening_support",
        ),
        (
            methods.get(&ResolutionMethod::Unreached).copied().unwrap_or(0) > 0,
            "verify_emergency_contacts",
        ),
        (
            patterns.frequency_pattern == FrequencyPattern::Daily,
            "increase_check_in_frequency",
        ),
    ];

    let mut recommendations: Vec<String> = rules
        .iter()
        .filter(|(fired, _)| *fired)
        .map(|(_, name)| name.to_string())
        .collect();
    if recommendations.is_empty() {
        recommendations.push("continue_monitoring".to_string());
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::escalation::tests::outcome_with;
    use crate::patterns::tests::event_at;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 30, 12, 0, 0).unwrap()
    }

    fn escalated(
        at: DateTime<Utc>,
        level: RiskLevel,
        steps: &[(EscalationStep, bool)],
        minutes_to_resolve: i64,
    ) -> CrisisEvent {
        let mut event = event_at(at, level);
        event.escalation = Some(outcome_with(
            steps,
            at,
            at + Duration::minutes(minutes_to_resolve),
        ));
        event
    }

    #[test]
    fn empty_history_recommends_monitoring() {
        let analytics = compute(&[], Timeframe::Month, now());
        assert_eq!(analytics.total_events, 0);
        assert_eq!(analytics.average_resolution_time_seconds, None);
        assert_eq!(analytics.prevention_recommendations, vec!["continue_monitoring"]);
        assert_eq!(analytics.risk_level_distribution.len(), 5);
        assert_eq!(analytics.patterns.trend, Trend::InsufficientData);
    }

    #[test]
    fn timeframe_filters_old_events() {
        let history = vec![
            event_at(now() - Duration::days(2), RiskLevel::Low),
            event_at(now() - Duration::days(20), RiskLevel::Low),
            event_at(now() - Duration::days(200), RiskLevel::Low),
        ];
        assert_eq!(compute(&history, Timeframe::Day, now()).total_events, 0);
        assert_eq!(compute(&history, Timeframe::Week, now()).total_events, 1);
        assert_eq!(compute(&history, Timeframe::Month, now()).total_events, 2);
        assert_eq!(compute(&history, Timeframe::All, now()).total_events, 3);
        assert_eq!(
            compute(&history, Timeframe::Week, now()).window_start,
            Some(now() - Duration::days(7))
        );
    }

    #[test]
    fn resolution_method_prefers_the_most_intensive_success() {
        use EscalationStep::*;
        let at = now() - Duration::hours(3);
        let cases = [
            (
                vec![(Hotline, true), (EmergencyServices, true), (ContactNotification, true)],
                ResolutionMethod::EmergencyServices,
            ),
            (
                vec![(Hotline, true), (ContactNotification, false)],
                ResolutionMethod::CrisisHotline,
            ),
            (
                vec![(Hotline, false), (ContactNotification, true)],
                ResolutionMethod::SupportNetwork,
            ),
            (vec![(Hotline, false)], ResolutionMethod::Unreached),
            (vec![], ResolutionMethod::SelfManaged),
        ];
        for (steps, expected) in cases {
            let event = escalated(at, RiskLevel::High, &steps, 5);
            assert_eq!(ResolutionMethod::of(&event), expected);
        }
        assert_eq!(
            ResolutionMethod::of(&event_at(at, RiskLevel::Low)),
            ResolutionMethod::SelfManaged
        );
    }

    #[test]
    fn distribution_and_average_resolution_time() {
        let history = vec![
            escalated(
                now() - Duration::days(1),
                RiskLevel::Critical,
                &[(EscalationStep::EmergencyServices, true)],
                10,
            ),
            escalated(
                now() - Duration::days(3),
                RiskLevel::High,
                &[(EscalationStep::Hotline, true)],
                20,
            ),
            event_at(now() - Duration::days(5), RiskLevel::Low),
        ];
        let analytics = compute(&history, Timeframe::Month, now());

        assert_eq!(analytics.total_events, 3);
        assert_eq!(analytics.risk_level_distribution[&RiskLevel::Critical], 1);
        assert_eq!(analytics.risk_level_distribution[&RiskLevel::Moderate], 0);
        assert_eq!(
            analytics.resolution_methods[&ResolutionMethod::EmergencyServices],
            1
        );
        assert_eq!(analytics.resolution_methods[&ResolutionMethod::SelfManaged], 1);
        assert_eq!(analytics.average_resolution_time_seconds, Some(900.0));
        assert!(
            analytics
                .prevention_recommendations
                .contains(&"schedule_clinical_followup".to_string())
        );
    }

    #[test]
    fn rules_fire_on_worsening_daily_late_unreached_history() {
        let late = Utc.with_ymd_and_hms(2026, 9, 26, 23, 0, 0).unwrap();
        let history = vec![
            event_at(late, RiskLevel::Low),
            event_at(late + Duration::days(1), RiskLevel::Moderate),
            escalated(
                late + Duration::days(2),
                RiskLevel::High,
                &[(EscalationStep::Hotline, false)],
                2,
            ),
        ];
        let analytics = compute(&history, Timeframe::Week, now());
        assert_eq!(
            analytics.prevention_recommendations,
            vec![
                "review_safety_plan",
                "plan_evening_support",
                "verify_emergency_contacts",
                "increase_check_in_frequency",
            ]
        );
    }

    #[test]
    fn timeframe_parsing() {
        assert_eq!(Timeframe::parse("Quarter"), Some(Timeframe::Quarter));
        assert_eq!(Timeframe::parse("30d"), Some(Timeframe::Month));
        assert_eq!(Timeframe::parse("decade"), None);
        assert_eq!(Timeframe::default(), Timeframe::Month);
    }
}
