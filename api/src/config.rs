//! Process configuration, read once from the environment at start-up.

use std::time::Duration;

use beacon_core::escalation::{
    DEFAULT_CONTACT_CONCURRENCY, DEFAULT_EMERGENCY_NUMBER, DEFAULT_HOTLINE_NUMBER,
    EscalationConfig,
};
use beacon_core::lexicon::Language;
use beacon_core::risk::RiskLevel;
use beacon_core::service::ServiceConfig;
use beacon_core::store::DEFAULT_HISTORY_CAP;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not valid: {message}")]
    Invalid { var: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub history_cap: usize,
    pub step_timeout: Duration,
    pub contact_concurrency: usize,
    pub escalation_threshold: RiskLevel,
    pub default_language: Language,
    pub hotline_url: Option<String>,
    pub emergency_url: Option<String>,
    pub contact_url: Option<String>,
    pub hotline_number: String,
    pub emergency_number: String,
    pub content_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: None,
            history_cap: DEFAULT_HISTORY_CAP,
            step_timeout: Duration::from_millis(5000),
            contact_concurrency: DEFAULT_CONTACT_CONCURRENCY,
            escalation_threshold: RiskLevel::High,
            default_language: Language::En,
            hotline_url: None,
            emergency_url: None,
            contact_url: None,
            hotline_number: DEFAULT_HOTLINE_NUMBER.to_string(),
            emergency_number: DEFAULT_EMERGENCY_NUMBER.to_string(),
            content_key: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset or blank values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = AppConfig::default();

        let port = parse_or(get("PORT"), "PORT", defaults.port)?;
        let history_cap: usize =
            parse_or(get("BEACON_HISTORY_CAP"), "BEACON_HISTORY_CAP", defaults.history_cap)?;
        if history_cap == 0 {
            return Err(ConfigError::Invalid {
                var: "BEACON_HISTORY_CAP",
                message: "must be at least 1".to_string(),
            });
        }
        let timeout_ms: u64 = parse_or(
            get("BEACON_STEP_TIMEOUT_MS"),
            "BEACON_STEP_TIMEOUT_MS",
            defaults.step_timeout.as_millis() as u64,
        )?;
        let contact_concurrency: usize = parse_or(
            get("BEACON_CONTACT_CONCURRENCY"),
            "BEACON_CONTACT_CONCURRENCY",
            defaults.contact_concurrency,
        )?;

        let escalation_threshold = match get("BEACON_ESCALATION_THRESHOLD") {
            Some(raw) => RiskLevel::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                var: "BEACON_ESCALATION_THRESHOLD",
                message: format!("unknown risk level '{raw}'"),
            })?,
            None => defaults.escalation_threshold,
        };
        let default_language = match get("BEACON_DEFAULT_LANGUAGE") {
            Some(raw) => Language::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                var: "BEACON_DEFAULT_LANGUAGE",
                message: format!("unsupported language '{raw}'"),
            })?,
            None => defaults.default_language,
        };

        Ok(Self {
            port,
            database_url: get("DATABASE_URL"),
            history_cap,
            step_timeout: Duration::from_millis(timeout_ms.max(1)),
            contact_concurrency: contact_concurrency.max(1),
            escalation_threshold,
            default_language,
            hotline_url: get("BEACON_HOTLINE_URL"),
            emergency_url: get("BEACON_EMERGENCY_URL"),
            contact_url: get("BEACON_CONTACT_URL"),
            hotline_number: get("BEACON_HOTLINE_NUMBER").unwrap_or(defaults.hotline_number),
            emergency_number: get("BEACON_EMERGENCY_NUMBER").unwrap_or(defaults.emergency_number),
            content_key: get("BEACON_CONTENT_KEY"),
        })
    }

    pub fn escalation_config(&self) -> EscalationConfig {
        EscalationConfig {
            step_timeout: self.step_timeout,
            contact_concurrency: self.contact_concurrency,
            hotline_number: self.hotline_number.clone(),
            emergency_number: self.emergency_number.clone(),
            default_language: self.default_language,
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            escalation_threshold: self.escalation_threshold,
            default_language: self.default_language,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}
