use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::risk::{RiskLevel, confidence_for_score};

/// What kind of signal produced an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorCategory {
    /// Critical-tier lexicon phrase
    Critical,
    /// High-tier lexicon phrase
    High,
    /// Moderate-tier lexicon phrase
    Moderate,
    /// User-configured keyword
    Custom,
    /// Derived from prior entries or stored history
    Pattern,
    /// Derived from the circumstances of the entry (e.g. time of day)
    Contextual,
    /// Named risk term from structured factors
    Factor,
    /// Named protective term from structured factors (lowers the score)
    Protective,
}

/// A single reason the score moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Indicator {
    pub category: IndicatorCategory,
    /// Matched phrase or factor name
    pub term: String,
    /// Total contribution to the score (negative for protective terms)
    pub weight: f64,
    /// How many times the term was found (1 for factors)
    pub occurrences: u32,
}

impl Indicator {
    pub fn new(category: IndicatorCategory, term: impl Into<String>, weight: f64) -> Self {
        Self {
            category,
            term: term.into(),
            weight,
            occurrences: 1,
        }
    }
}

/// Immutable result of an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CrisisAssessment {
    pub risk_level: RiskLevel,
    /// 0.0 - 1.0
    pub confidence: f64,
    /// In the order the signals were found
    pub indicators: Vec<Indicator>,
    pub contributing_score: f64,
    pub recommendations: Vec<String>,
    pub immediate_action_required: bool,
}

impl CrisisAssessment {
    /// Build an assessment from a final score. Level, confidence,
    /// recommendations and the action flag all derive from the score.
    pub fn from_score(score: f64, indicators: Vec<Indicator>) -> Self {
        let score = if score.is_finite() { score.max(0.0) } else { 0.0 };
        let risk_level = RiskLevel::from_score(score);
        Self {
            risk_level,
            confidence: confidence_for_score(score),
            indicators,
            contributing_score: (score * 100.0).round() / 100.0,
            recommendations: recommended_actions(risk_level),
            immediate_action_required: risk_level >= RiskLevel::High,
        }
    }

    pub fn none() -> Self {
        Self::from_score(0.0, Vec::new())
    }
}

/// Level → action lookup. First entry is the primary action.
pub fn recommended_actions(level: RiskLevel) -> Vec<String> {
    let actions: &[&str] = match level {
        RiskLevel::Critical => &[
            "immediate_intervention",
            "contact_emergency_services",
            "notify_emergency_contacts",
        ],
        RiskLevel::High => &[
            "crisis_hotline_referral",
            "safety_plan_review",
            "schedule_urgent_followup",
        ],
        RiskLevel::Moderate => &["increase_check_ins", "share_coping_resources"],
        RiskLevel::Low => &["continue_monitoring", "self_care_suggestions"],
        RiskLevel::None => &["continue_monitoring"],
    };
    actions.iter().map(|a| a.to_string()).collect()
}
