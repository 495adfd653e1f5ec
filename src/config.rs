//! Configuration
//!
//! Everything comes from environment variables with development defaults,
//! read once at startup.

use crate::survey::SurveyLimits;

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub db_path: String,
    pub frontend_url: String,
    pub environment: String,
    pub openai_api_key: String,
    pub openai_model: String,
    /// Override for the OpenAI-compatible endpoint, e.g. a gateway.
    pub openai_base_url: Option<String>,
    pub limits: SurveyLimits,
}

impl Settings {
    pub fn from_env() -> Self {
        let db_path = std::env::var("SENSEI_DB_PATH").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.survey-sensei/sensei.db")
        });

        let defaults = SurveyLimits::default();
        let limits = SurveyLimits {
            initial_questions: env_usize("INITIAL_QUESTIONS_COUNT", defaults.initial_questions),
            min_survey_questions: env_usize("MIN_SURVEY_QUESTIONS", defaults.min_survey_questions),
            max_survey_questions: env_usize("MAX_SURVEY_QUESTIONS", defaults.max_survey_questions),
            min_answered_questions: env_usize(
                "MIN_ANSWERED_QUESTIONS",
                defaults.min_answered_questions,
            ),
            max_consecutive_skips: env_usize(
                "MAX_CONSECUTIVE_SKIPS",
                defaults.max_consecutive_skips,
            ),
            followup_batch: defaults.followup_batch,
            followup_cadence: defaults.followup_cadence,
        };

        Self {
            port: std::env::var("SENSEI_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            db_path,
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openai_base_url: std::env::var("OPENAI_BASE_URL").ok(),
            limits,
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
