//! Lexical risk scoring.
//!
//! Text is matched case-insensitively against a tiered phrase table. Every
//! occurrence of a phrase adds its weight (cumulative scoring), and context
//! modifiers are additive so a score can always be explained line by line
//! from its indicators.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::assessment::{Indicator, IndicatorCategory};
use crate::risk::{RiskLevel, confidence_for_score};

/// Bonus when every one of the recent prior entries reads as negative affect.
pub const RECURRING_NEGATIVE_MOOD_BONUS: f64 = 3.0;
/// How many prior entries must all be negative for the bonus to apply.
pub const RECURRING_NEGATIVE_MOOD_WINDOW: usize = 3;
pub const LATE_NIGHT_BONUS: f64 = 1.0;
/// User keywords weigh the same as a moderate-tier phrase.
pub const CUSTOM_KEYWORD_WEIGHT: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    En,
    Es,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Some(Language::En),
            "es" | "spanish" | "español" => Some(Language::Es),
            _ => None,
        }
    }

    /// Guess the language from function words. Falls back to `default` when
    /// the text gives no clear signal.
    pub fn detect(text: &str, default: Language) -> Language {
        const EN_MARKERS: &[&str] = &[
            "the", "and", "i", "to", "my", "is", "it", "feel", "want", "am", "of",
        ];
        const ES_MARKERS: &[&str] = &[
            "el", "la", "que", "de", "y", "me", "mi", "quiero", "estoy", "siento", "muy",
            "los", "las", "por",
        ];

        let lowered = text.to_lowercase();
        let (mut en, mut es) = (0usize, 0usize);
        for word in lowered.split(|c: char| !c.is_alphabetic()) {
            if word.is_empty() {
                continue;
            }
            if EN_MARKERS.contains(&word) {
                en += 1;
            }
            if ES_MARKERS.contains(&word) {
                es += 1;
            }
        }

        if es > en {
            Language::Es
        } else if en > es {
            Language::En
        } else {
            default
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse part of day an entry was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Critical,
    High,
    Moderate,
}

impl Tier {
    fn category(self) -> IndicatorCategory {
        match self {
            Tier::Critical => IndicatorCategory::Critical,
            Tier::High => IndicatorCategory::High,
            Tier::Moderate => IndicatorCategory::Moderate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexiconEntry {
    pub phrase: &'static str,
    pub tier: Tier,
    pub weight: u32,
}

const fn entry(phrase: &'static str, tier: Tier, weight: u32) -> LexiconEntry {
    LexiconEntry {
        phrase,
        tier,
        weight,
    }
}

/// Phrase table for one language. Phrases are lowercase and avoid being
/// strict substrings of one another so a single mention is not counted twice.
#[derive(Debug, Clone, Copy)]
pub struct Lexicon {
    pub language: Language,
    pub entries: &'static [LexiconEntry],
    pub negative_affect: &'static [&'static str],
}

static EN_ENTRIES: &[LexiconEntry] = &[
    entry("kill myself", Tier::Critical, 10),
    entry("end my life", Tier::Critical, 10),
    entry("take my own life", Tier::Critical, 10),
    entry("suicidal", Tier::Critical, 9),
    entry("suicide", Tier::Critical, 9),
    entry("want to die", Tier::Critical, 9),
    entry("better off dead", Tier::Critical, 8),
    entry("end it all", Tier::Critical, 8),
    entry("no reason to live", Tier::Critical, 8),
    entry("overdose", Tier::Critical, 8),
    entry("can't go on", Tier::High, 7),
    entry("cannot go on", Tier::High, 7),
    entry("hurt myself", Tier::High, 7),
    entry("self harm", Tier::High, 7),
    entry("self-harm", Tier::High, 7),
    entry("hopeless", Tier::High, 6),
    entry("no way out", Tier::High, 6),
    entry("burden to everyone", Tier::High, 6),
    entry("worthless", Tier::High, 5),
    entry("giving up", Tier::High, 5),
    entry("depressed", Tier::Moderate, 4),
    entry("trapped", Tier::Moderate, 4),
    entry("alone", Tier::Moderate, 3),
    entry("empty", Tier::Moderate, 3),
    entry("exhausted", Tier::Moderate, 3),
    entry("numb", Tier::Moderate, 3),
    entry("crying", Tier::Moderate, 3),
    entry("can't sleep", Tier::Moderate, 3),
];

static EN_NEGATIVE_AFFECT: &[&str] = &[
    "sad",
    "depressed",
    "hopeless",
    "alone",
    "lonely",
    "empty",
    "worthless",
    "numb",
    "crying",
    "hate myself",
    "tired of",
    "miserable",
];

static ES_ENTRIES: &[LexiconEntry] = &[
    entry("matarme", Tier::Critical, 10),
    entry("suicidarme", Tier::Critical, 10),
    entry("quitarme la vida", Tier::Critical, 10),
    entry("quiero morir", Tier::Critical, 9),
    entry("suicidio", Tier::Critical, 9),
    entry("acabar con todo", Tier::Critical, 8),
    entry("mejor muerto", Tier::Critical, 8),
    entry("mejor muerta", Tier::Critical, 8),
    entry("sobredosis", Tier::Critical, 8),
    entry("no puedo más", Tier::High, 7),
    entry("no puedo mas", Tier::High, 7),
    entry("hacerme daño", Tier::High, 7),
    entry("sin esperanza", Tier::High, 6),
    entry("desesperanza", Tier::High, 6),
    entry("sin salida", Tier::High, 6),
    entry("no valgo nada", Tier::High, 5),
    entry("deprimido", Tier::Moderate, 4),
    entry("deprimida", Tier::Moderate, 4),
    entry("atrapado", Tier::Moderate, 4),
    entry("atrapada", Tier::Moderate, 4),
    entry("muy solo", Tier::Moderate, 3),
    entry("muy sola", Tier::Moderate, 3),
    entry("vacío", Tier::Moderate, 3),
    entry("vacía", Tier::Moderate, 3),
    entry("agotado", Tier::Moderate, 3),
    entry("agotada", Tier::Moderate, 3),
];

static ES_NEGATIVE_AFFECT: &[&str] = &[
    "triste",
    "deprimid",
    "sin esperanza",
    "vacío",
    "vacía",
    "sola",
    "solo",
    "llorando",
    "me odio",
    "cansado de",
    "cansada de",
];

impl Lexicon {
    pub fn for_language(language: Language) -> Lexicon {
        match language {
            Language::En => Lexicon {
                language,
                entries: EN_ENTRIES,
                negative_affect: EN_NEGATIVE_AFFECT,
            },
            Language::Es => Lexicon {
                language,
                entries: ES_ENTRIES,
                negative_affect: ES_NEGATIVE_AFFECT,
            },
        }
    }

    pub fn contains_phrase(&self, phrase: &str) -> bool {
        self.entries.iter().any(|e| e.phrase == phrase)
    }

    fn is_negative_affect(&self, text: &str) -> bool {
        let normalized = normalize(text);
        self.negative_affect
            .iter()
            .any(|marker| normalized.contains(marker))
    }
}

/// Optional circumstances of the entry being scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScoringContext {
    /// Earlier entries, oldest first
    #[serde(default)]
    pub previous_entries: Vec<String>,
    #[serde(default)]
    pub time_of_day: Option<TimeOfDay>,
    /// Forces a lexicon instead of detecting one
    #[serde(default)]
    pub language: Option<Language>,
}

/// Per-user tuning applied on top of the lexicon.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringOptions {
    /// 0.0 - 1.0, 0.5 is neutral
    pub sensitivity: f64,
    pub custom_keywords: Vec<String>,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            sensitivity: 0.5,
            custom_keywords: Vec::new(),
        }
    }
}

impl ScoringOptions {
    /// Multiplier in [0.5, 1.5]; exactly 1.0 at the neutral sensitivity.
    pub fn sensitivity_factor(&self) -> f64 {
        let sensitivity = if self.sensitivity.is_finite() {
            self.sensitivity.clamp(0.0, 1.0)
        } else {
            0.5
        };
        0.5 + sensitivity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LexicalScore {
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub indicators: Vec<Indicator>,
    pub total_score: f64,
    pub language: Language,
}

impl LexicalScore {
    fn empty(language: Language) -> Self {
        Self {
            risk_level: RiskLevel::None,
            confidence: 0.0,
            indicators: Vec::new(),
            total_score: 0.0,
            language,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LexicalScorer {
    default_language: Language,
}

impl Default for LexicalScorer {
    fn default() -> Self {
        Self::new(Language::En)
    }
}

impl LexicalScorer {
    pub fn new(default_language: Language) -> Self {
        Self { default_language }
    }

    pub fn score(&self, text: &str, context: &ScoringContext) -> LexicalScore {
        self.score_with(text, context, &ScoringOptions::default())
    }

    pub fn score_with(
        &self,
        text: &str,
        context: &ScoringContext,
        options: &ScoringOptions,
    ) -> LexicalScore {
        let language = context
            .language
            .unwrap_or_else(|| Language::detect(text, self.default_language));
        let haystack = normalize(text);
        if haystack.trim().is_empty() {
            return LexicalScore::empty(language);
        }

        let lexicon = Lexicon::for_language(language);
        let mut matches: Vec<(usize, Indicator)> = Vec::new();

        for entry in lexicon.entries {
            if let Some(found) = count_occurrences(&haystack, entry.phrase) {
                let weight = entry.weight as f64 * found.count as f64;
                matches.push((
                    found.first,
                    Indicator {
                        category: entry.tier.category(),
                        term: entry.phrase.to_string(),
                        weight,
                        occurrences: found.count,
                    },
                ));
            }
        }

        let mut seen_custom: Vec<String> = Vec::new();
        for keyword in &options.custom_keywords {
            let keyword = normalize(keyword).trim().to_string();
            if keyword.is_empty()
                || lexicon.contains_phrase(&keyword)
                || seen_custom.contains(&keyword)
            {
                continue;
            }
            if let Some(found) = count_occurrences(&haystack, &keyword) {
                matches.push((
                    found.first,
                    Indicator {
                        category: IndicatorCategory::Custom,
                        term: keyword.clone(),
                        weight: CUSTOM_KEYWORD_WEIGHT * found.count as f64,
                        occurrences: found.count,
                    },
                ));
            }
            seen_custom.push(keyword);
        }

        // Stable sort keeps table order for phrases found at the same offset.
        matches.sort_by_key(|(position, _)| *position);
        let mut total: f64 = matches.iter().map(|(_, i)| i.weight).sum();
        let mut indicators: Vec<Indicator> = matches.into_iter().map(|(_, i)| i).collect();

        if recurring_negative_mood(&lexicon, &context.previous_entries) {
            total += RECURRING_NEGATIVE_MOOD_BONUS;
            indicators.push(Indicator::new(
                IndicatorCategory::Pattern,
                "recurring_negative_mood",
                RECURRING_NEGATIVE_MOOD_BONUS,
            ));
        }

        if context.time_of_day == Some(TimeOfDay::Night) {
            total += LATE_NIGHT_BONUS;
            indicators.push(Indicator::new(
                IndicatorCategory::Contextual,
                "late_night",
                LATE_NIGHT_BONUS,
            ));
        }

        let total_score = total * options.sensitivity_factor();
        tracing::debug!(
            language = %language,
            matched = indicators.len(),
            total_score,
            "lexical score computed"
        );

        LexicalScore {
            risk_level: RiskLevel::from_score(total_score),
            confidence: confidence_for_score(total_score),
            indicators,
            total_score,
            language,
        }
    }
}

fn recurring_negative_mood(lexicon: &Lexicon, previous_entries: &[String]) -> bool {
    if previous_entries.len() < RECURRING_NEGATIVE_MOOD_WINDOW {
        return false;
    }
    previous_entries[previous_entries.len() - RECURRING_NEGATIVE_MOOD_WINDOW..]
        .iter()
        .all(|entry| lexicon.is_negative_affect(entry))
}

struct Occurrences {
    first: usize,
    count: u32,
}

fn count_occurrences(haystack: &str, needle: &str) -> Option<Occurrences> {
    let mut positions = haystack.match_indices(needle).map(|(i, _)| i);
    let first = positions.next()?;
    let count = 1 + positions.count() as u32;
    Some(Occurrences { first, count })
}

/// Lowercase and fold typographic apostrophes so "can’t" matches "can't".
fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}
