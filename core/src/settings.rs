//! Per-user crisis settings and validated partial updates.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::CrisisError;
use crate::escalation::ContactKind;
use crate::lexicon::ScoringOptions;

pub const DEFAULT_SENSITIVITY: f64 = 0.5;
pub const MAX_CUSTOM_KEYWORDS: usize = 50;
pub const MAX_KEYWORD_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotificationPreferences {
    pub emergency_contacts: bool,
    pub therapist: bool,
    pub family_members: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            emergency_contacts: true,
            therapist: true,
            family_members: true,
        }
    }
}

impl NotificationPreferences {
    pub fn allows(&self, kind: ContactKind) -> bool {
        match kind {
            ContactKind::EmergencyContact => self.emergency_contacts,
            ContactKind::Therapist => self.therapist,
            ContactKind::FamilyMember => self.family_members,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserCrisisSettings {
    /// 0.0 - 1.0; scales the lexical score by `0.5 + sensitivity`
    pub sensitivity: f64,
    pub auto_escalation_enabled: bool,
    /// Extra phrases scored like moderate-tier lexicon entries
    pub custom_keywords: Vec<String>,
    pub notification_preferences: NotificationPreferences,
}

impl Default for UserCrisisSettings {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            auto_escalation_enabled: true,
            custom_keywords: Vec::new(),
            notification_preferences: NotificationPreferences::default(),
        }
    }
}

impl UserCrisisSettings {
    pub fn scoring_options(&self) -> ScoringOptions {
        ScoringOptions {
            sensitivity: self.sensitivity,
            custom_keywords: self.custom_keywords.clone(),
        }
    }
}

/// A validated partial update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub sensitivity: Option<f64>,
    pub auto_escalation_enabled: Option<bool>,
    pub custom_keywords: Option<Vec<String>>,
    pub emergency_contacts: Option<bool>,
    pub therapist: Option<bool>,
    pub family_members: Option<bool>,
}

impl SettingsPatch {
    /// Validate a raw JSON patch. Works on `Value` rather than a typed struct
    /// so a wrong type (e.g. `"auto_escalation_enabled": "yes"`) is reported
    /// against the exact field.
    pub fn from_value(value: &Value) -> Result<Self, CrisisError> {
        let object = value.as_object().ok_or_else(|| {
            CrisisError::invalid_settings("$", "settings patch must be a JSON object")
        })?;

        let mut patch = SettingsPatch::default();
        for (key, field) in object {
            match key.as_str() {
                "sensitivity" => {
                    let sensitivity = field.as_f64().ok_or_else(|| {
                        CrisisError::invalid_settings("sensitivity", "must be a number")
                    })?;
                    if !(0.0..=1.0).contains(&sensitivity) {
                        return Err(CrisisError::invalid_settings(
                            "sensitivity",
                            format!("must be within [0, 1], got {sensitivity}"),
                        ));
                    }
                    patch.sensitivity = Some(sensitivity);
                }
                "auto_escalation_enabled" => {
                    patch.auto_escalation_enabled = Some(bool_field(key, field)?);
                }
                "custom_keywords" => {
                    patch.custom_keywords = Some(keyword_list(field)?);
                }
                "notification_preferences" => {
                    let prefs = field.as_object().ok_or_else(|| {
                        CrisisError::invalid_settings(
                            "notification_preferences",
                            "must be an object",
                        )
                    })?;
                    for (pref, flag) in prefs {
                        let path = format!("notification_preferences.{pref}");
                        let flag = bool_field(&path, flag)?;
                        match pref.as_str() {
                            "emergency_contacts" => patch.emergency_contacts = Some(flag),
                            "therapist" => patch.therapist = Some(flag),
                            "family_members" => patch.family_members = Some(flag),
                            _ => {
                                return Err(CrisisError::invalid_settings(
                                    path,
                                    "unknown notification preference",
                                ));
                            }
                        }
                    }
                }
                other => {
                    return Err(CrisisError::invalid_settings(other, "unknown settings field"));
                }
            }
        }
        Ok(patch)
    }

    pub fn apply(&self, current: &UserCrisisSettings) -> UserCrisisSettings {
        let mut next = current.clone();
        if let Some(sensitivity) = self.sensitivity {
            next.sensitivity = sensitivity;
        }
        if let Some(enabled) = self.auto_escalation_enabled {
            next.auto_escalation_enabled = enabled;
        }
        if let Some(keywords) = &self.custom_keywords {
            next.custom_keywords = keywords.clone();
        }
        let prefs = &mut next.notification_preferences;
        if let Some(flag) = self.emergency_contacts {
            prefs.emergency_contacts = flag;
        }
        if let Some(flag) = self.therapist {
            prefs.therapist = flag;
        }
        if let Some(flag) = self.family_members {
            prefs.family_members = flag;
        }
        next
    }
}

fn bool_field(field: &str, value: &Value) -> Result<bool, CrisisError> {
    value
        .as_bool()
        .ok_or_else(|| CrisisError::invalid_settings(field, "must be a boolean"))
}

/// Keywords are trimmed, lowercased and deduplicated in first-seen order.
fn keyword_list(value: &Value) -> Result<Vec<String>, CrisisError> {
    let items = value.as_array().ok_or_else(|| {
        CrisisError::invalid_settings("custom_keywords", "must be a list of strings")
    })?;
    if items.len() > MAX_CUSTOM_KEYWORDS {
        return Err(CrisisError::invalid_settings(
            "custom_keywords",
            format!("at most {MAX_CUSTOM_KEYWORDS} keywords are allowed"),
        ));
    }

    let mut keywords: Vec<String> = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let field = format!("custom_keywords[{index}]");
        let keyword = item
            .as_str()
            .ok_or_else(|| CrisisError::invalid_settings(field.as_str(), "must be a string"))?
            .trim()
            .to_lowercase();
        if keyword.is_empty() {
            return Err(CrisisError::invalid_settings(field, "must not be blank"));
        }
        if keyword.chars().count() > MAX_KEYWORD_LEN {
            return Err(CrisisError::invalid_settings(
                field,
                format!("must be at most {MAX_KEYWORD_LEN} characters"),
            ));
        }
        if !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }
    Ok(keywords)
}
