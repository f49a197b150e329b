//! Risk aggregation.
//!
//! Combines the lexical score, the user's history trend and structured
//! behavioural/clinical factors into one `CrisisAssessment`. Every weight is a
//! named constant and every non-zero term becomes an indicator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::assessment::{CrisisAssessment, Indicator, IndicatorCategory};
use crate::error::CrisisError;
use crate::lexicon::{LexicalScore, LexicalScorer, ScoringContext};
use crate::patterns::{PatternAnalysis, Trend};

/// Added to a text assessment when the stored history is trending worse.
pub const WORSENING_TREND_BONUS: f64 = 2.0;

/// Mood scores are on a 1-10 scale; a day at or below the floor is "low".
pub const MOOD_SCALE_MIN: f64 = 1.0;
pub const MOOD_SCALE_MAX: f64 = 10.0;
pub const LOW_MOOD_FLOOR: f64 = 3.0;
/// Consecutive low days before the persistent-low-mood term applies.
pub const LOW_MOOD_RUN_LENGTH: usize = 3;
pub const LOW_MOOD_WEIGHT: f64 = 4.0;
/// Each low day past the run length adds this much, up to the cap.
pub const LOW_MOOD_EXTRA_DAY_WEIGHT: f64 = 1.0;
pub const LOW_MOOD_MAX_WEIGHT: f64 = 7.0;

pub const SUICIDAL_IDEATION_WEIGHT: f64 = 5.0;
pub const SUICIDAL_PLAN_WEIGHT: f64 = 7.0;
pub const MEANS_AVAILABLE_WEIGHT: f64 = 9.0;
pub const TIMELINE_IMMEDIATE_WEIGHT: f64 = 3.0;

pub const SOCIAL_WITHDRAWAL_WEIGHT: f64 = 2.0;
pub const SLEEP_DISRUPTION_WEIGHT: f64 = 1.0;
pub const SUBSTANCE_USE_WEIGHT: f64 = 3.0;
pub const GIVING_AWAY_POSSESSIONS_WEIGHT: f64 = 4.0;

pub const PREVIOUS_INCIDENT_WEIGHT: f64 = 2.0;
pub const PREVIOUS_INCIDENTS_MAX_WEIGHT: f64 = 6.0;

pub const FAMILY_SUPPORT_WEIGHT: f64 = -3.0;
pub const ACTIVE_TREATMENT_WEIGHT: f64 = -3.0;
pub const EXPRESSED_HOPE_WEIGHT: f64 = -2.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatAnalysis {
    #[serde(default)]
    pub suicidal_ideation: bool,
    #[serde(default)]
    pub suicidal_plan: bool,
    #[serde(default)]
    pub means_available: bool,
    #[serde(default)]
    pub timeline_immediate: bool,
    #[serde(default)]
    pub expressed_hope: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BehaviorPatterns {
    #[serde(default)]
    pub social_withdrawal: bool,
    #[serde(default)]
    pub sleep_disruption: bool,
    #[serde(default)]
    pub substance_use: bool,
    #[serde(default)]
    pub giving_away_possessions: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProtectiveFactors {
    #[serde(default)]
    pub family_support: bool,
    #[serde(default)]
    pub active_treatment: bool,
}

/// Validated structured input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RiskFactors {
    /// Oldest first, 1-10
    pub mood_scores: Option<Vec<f64>>,
    pub journal_keywords: Vec<String>,
    pub chat_analysis: Option<ChatAnalysis>,
    pub behavior_patterns: BehaviorPatterns,
    pub protective_factors: ProtectiveFactors,
    pub previous_incidents: u32,
}

impl RiskFactors {
    /// Validate the shape of a raw factor payload. Any malformed field fails
    /// the whole call. Keys are accepted in snake_case or camelCase; unknown
    /// top-level keys are ignored.
    pub fn from_value(value: &Value) -> Result<Self, CrisisError> {
        let object = value
            .as_object()
            .ok_or_else(|| CrisisError::invalid_input("$", "risk factors must be a JSON object"))?;

        let mut factors = RiskFactors::default();

        if let Some(raw) = lookup(object, "mood_scores", "moodScores") {
            factors.mood_scores = Some(mood_scores(raw)?);
        }

        if let Some(raw) = lookup(object, "journal_keywords", "journalKeywords") {
            let items = raw.as_array().ok_or_else(|| {
                CrisisError::invalid_input("journal_keywords", "must be an array of strings")
            })?;
            for (index, item) in items.iter().enumerate() {
                let keyword = item.as_str().ok_or_else(|| {
                    CrisisError::invalid_input(
                        format!("journal_keywords[{index}]"),
                        "must be a string",
                    )
                })?;
                factors.journal_keywords.push(keyword.to_string());
            }
        }

        if let Some(raw) = lookup(object, "chat_analysis", "chatAnalysis") {
            let flags = flag_object(raw, "chat_analysis", &[
                ("suicidal_ideation", "suicidalIdeation"),
                ("suicidal_plan", "suicidalPlan"),
                ("means_available", "meansAvailable"),
                ("timeline_immediate", "timelineImmediate"),
                ("expressed_hope", "expressedHope"),
            ])?;
            factors.chat_analysis = Some(ChatAnalysis {
                suicidal_ideation: flags[0],
                suicidal_plan: flags[1],
                means_available: flags[2],
                timeline_immediate: flags[3],
                expressed_hope: flags[4],
            });
        }

        if let Some(raw) = lookup(object, "behavior_patterns", "behaviorPatterns") {
            let flags = flag_object(raw, "behavior_patterns", &[
                ("social_withdrawal", "socialWithdrawal"),
                ("sleep_disruption", "sleepDisruption"),
                ("substance_use", "substanceUse"),
                ("giving_away_possessions", "givingAwayPossessions"),
            ])?;
            factors.behavior_patterns = BehaviorPatterns {
                social_withdrawal: flags[0],
                sleep_disruption: flags[1],
                substance_use: flags[2],
                giving_away_possessions: flags[3],
            };
        }

        if let Some(raw) = lookup(object, "protective_factors", "protectiveFactors") {
            let flags = flag_object(raw, "protective_factors", &[
                ("family_support", "familySupport"),
                ("active_treatment", "activeTreatment"),
            ])?;
            factors.protective_factors = ProtectiveFactors {
                family_support: flags[0],
                active_treatment: flags[1],
            };
        }

        if let Some(raw) = lookup(object, "previous_incidents", "previousIncidents") {
            let count = raw
                .as_u64()
                .filter(|n| *n <= u32::MAX as u64)
                .ok_or_else(|| {
                    CrisisError::invalid_input(
                        "previous_incidents",
                        "must be a non-negative integer",
                    )
                })?;
            factors.previous_incidents = count as u32;
        }

        Ok(factors)
    }
}

fn lookup<'a>(object: &'a Map<String, Value>, snake: &str, camel: &str) -> Option<&'a Value> {
    object
        .get(snake)
        .or_else(|| object.get(camel))
        .filter(|v| !v.is_null())
}

fn mood_scores(raw: &Value) -> Result<Vec<f64>, CrisisError> {
    let items = raw
        .as_array()
        .ok_or_else(|| CrisisError::invalid_input("mood_scores", "must be an array of numbers"))?;
    if items.is_empty() {
        return Err(CrisisError::invalid_input("mood_scores", "must not be empty"));
    }
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_f64()
                .filter(|s| (MOOD_SCALE_MIN..=MOOD_SCALE_MAX).contains(s))
                .ok_or_else(|| {
                    CrisisError::invalid_input(
                        format!("mood_scores[{index}]"),
                        format!("must be a number between {MOOD_SCALE_MIN} and {MOOD_SCALE_MAX}"),
                    )
                })
        })
        .collect()
}

/// Read an object of optional boolean flags, in the order of `keys`.
fn flag_object(
    raw: &Value,
    field: &str,
    keys: &[(&str, &str)],
) -> Result<Vec<bool>, CrisisError> {
    let object = raw
        .as_object()
        .ok_or_else(|| CrisisError::invalid_input(field, "must be an object"))?;
    keys.iter()
        .map(|(snake, camel)| match lookup(object, snake, camel) {
            None => Ok(false),
            Some(Value::Bool(flag)) => Ok(*flag),
            Some(_) => Err(CrisisError::invalid_input(
                format!("{field}.{snake}"),
                "must be a boolean",
            )),
        })
        .collect()
}

/// A named term and how much it moved the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FactorContribution {
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StructuredAssessment {
    #[serde(flatten)]
    pub assessment: CrisisAssessment,
    /// Terms that pushed the score up, largest first
    pub contributing_factors: Vec<FactorContribution>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAggregator {
    scorer: LexicalScorer,
}

impl RiskAggregator {
    pub fn new(scorer: LexicalScorer) -> Self {
        Self { scorer }
    }

    /// Fold the history trend into a lexical score.
    pub fn combine_text(
        &self,
        lexical: LexicalScore,
        patterns: &PatternAnalysis,
    ) -> CrisisAssessment {
        let mut score = lexical.total_score;
        let mut indicators = lexical.indicators;
        if patterns.trend == Trend::Worsening {
            score += WORSENING_TREND_BONUS;
            indicators.push(Indicator::new(
                IndicatorCategory::Pattern,
                "worsening_trend",
                WORSENING_TREND_BONUS,
            ));
        }
        CrisisAssessment::from_score(score, indicators)
    }

    pub fn assess(&self, factors: &RiskFactors) -> StructuredAssessment {
        let mut indicators: Vec<Indicator> = Vec::new();

        if let Some(scores) = &factors.mood_scores {
            let run = longest_low_run(scores);
            if run >= LOW_MOOD_RUN_LENGTH {
                let extra = (run - LOW_MOOD_RUN_LENGTH) as f64 * LOW_MOOD_EXTRA_DAY_WEIGHT;
                let weight = (LOW_MOOD_WEIGHT + extra).min(LOW_MOOD_MAX_WEIGHT);
                indicators.push(factor("persistent_low_mood", weight));
            }
        }

        if let Some(chat) = &factors.chat_analysis {
            let terms = [
                (chat.suicidal_ideation, "suicidal_ideation", SUICIDAL_IDEATION_WEIGHT),
                (chat.suicidal_plan, "suicidal_plan", SUICIDAL_PLAN_WEIGHT),
                (chat.means_available, "means_available", MEANS_AVAILABLE_WEIGHT),
                (chat.timeline_immediate, "timeline_immediate", TIMELINE_IMMEDIATE_WEIGHT),
            ];
            for (present, name, weight) in terms {
                if present {
                    indicators.push(factor(name, weight));
                }
            }
        }

        if !factors.journal_keywords.is_empty() {
            let text = factors.journal_keywords.join(" | ");
            let lexical = self.scorer.score(&text, &ScoringContext::default());
            indicators.extend(lexical.indicators);
        }

        let behavior = &factors.behavior_patterns;
        let terms = [
            (behavior.social_withdrawal, "social_withdrawal", SOCIAL_WITHDRAWAL_WEIGHT),
            (behavior.sleep_disruption, "sleep_disruption", SLEEP_DISRUPTION_WEIGHT),
            (behavior.substance_use, "substance_use", SUBSTANCE_USE_WEIGHT),
            (
                behavior.giving_away_possessions,
                "giving_away_possessions",
                GIVING_AWAY_POSSESSIONS_WEIGHT,
            ),
        ];
        for (present, name, weight) in terms {
            if present {
                indicators.push(factor(name, weight));
            }
        }

        if factors.previous_incidents > 0 {
            let weight = (factors.previous_incidents as f64 * PREVIOUS_INCIDENT_WEIGHT)
                .min(PREVIOUS_INCIDENTS_MAX_WEIGHT);
            indicators.push(factor("previous_incidents", weight));
        }

        let hope = factors
            .chat_analysis
            .as_ref()
            .is_some_and(|chat| chat.expressed_hope);
        let support = &factors.protective_factors;
        let protective = [
            (support.family_support, "family_support", FAMILY_SUPPORT_WEIGHT),
            (support.active_treatment, "active_treatment", ACTIVE_TREATMENT_WEIGHT),
            (hope, "expressed_hope", EXPRESSED_HOPE_WEIGHT),
        ];
        for (present, name, weight) in protective {
            if present {
                indicators.push(Indicator::new(IndicatorCategory::Protective, name, weight));
            }
        }

        let total: f64 = indicators.iter().map(|i| i.weight).sum();
        let mut contributing_factors: Vec<FactorContribution> = indicators
            .iter()
            .filter(|i| i.weight > 0.0)
            .map(|i| FactorContribution {
                name: i.term.clone(),
                weight: i.weight,
            })
            .collect();
        contributing_factors.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        let assessment = CrisisAssessment::from_score(total, indicators);
        tracing::debug!(
            risk_level = %assessment.risk_level,
            score = assessment.contributing_score,
            "structured assessment computed"
        );
        StructuredAssessment {
            assessment,
            contributing_factors,
        }
    }
}

fn factor(name: &str, weight: f64) -> Indicator {
    Indicator::new(IndicatorCategory::Factor, name, weight)
}

fn longest_low_run(scores: &[f64]) -> usize {
    let (mut longest, mut current) = (0usize, 0usize);
    for score in scores {
        if *score <= LOW_MOOD_FLOOR {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}
