pub mod aggregator;
pub mod analytics;
pub mod assessment;
pub mod clock;
pub mod error;
pub mod escalation;
pub mod events;
pub mod lexicon;
pub mod patterns;
pub mod risk;
pub mod service;
pub mod settings;
pub mod store;

pub use assessment::{CrisisAssessment, Indicator, IndicatorCategory};
pub use error::CrisisError;
pub use risk::RiskLevel;
