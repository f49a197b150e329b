pub mod assess;
pub mod escalation;
pub mod health;
pub mod history;
pub mod settings;
