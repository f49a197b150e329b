use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const CRITICAL_THRESHOLD: f64 = 15.0;
pub const HIGH_THRESHOLD: f64 = 10.0;
pub const MODERATE_THRESHOLD: f64 = 5.0;
pub const LOW_THRESHOLD: f64 = 2.0;

/// Score at which confidence saturates at 1.0.
pub const CONFIDENCE_SATURATION: f64 = 20.0;

/// Ordered severity of a crisis signal.
///
/// Variants are declared in severity order; `Ord` follows declaration order,
/// never the string form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::None,
        RiskLevel::Low,
        RiskLevel::Moderate,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// Integer rank (0-4) used for trend arithmetic.
    pub fn rank(self) -> i32 {
        match self {
            RiskLevel::None => 0,
            RiskLevel::Low => 1,
            RiskLevel::Moderate => 2,
            RiskLevel::High => 3,
            RiskLevel::Critical => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(RiskLevel::None),
            "low" => Some(RiskLevel::Low),
            "moderate" => Some(RiskLevel::Moderate),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }

    /// Map a weighted score onto the level scale.
    pub fn from_score(score: f64) -> Self {
        if score >= CRITICAL_THRESHOLD {
            RiskLevel::Critical
        } else if score >= HIGH_THRESHOLD {
            RiskLevel::High
        } else if score >= MODERATE_THRESHOLD {
            RiskLevel::Moderate
        } else if score >= LOW_THRESHOLD {
            RiskLevel::Low
        } else {
            RiskLevel::None
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `min(1, score / 20)` rounded to two decimals.
pub fn confidence_for_score(score: f64) -> f64 {
    if !score.is_finite() || score <= 0.0 {
        return 0.0;
    }
    let raw = (score / CONFIDENCE_SATURATION).min(1.0);
    (raw * 100.0).round() / 100.0
}
