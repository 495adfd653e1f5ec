//! API request and response types

use crate::survey::{AnswerValue, Artifact, Question};
use serde::{Deserialize, Serialize};

/// Request to start a new survey session
#[derive(Debug, Deserialize)]
pub struct StartSurveyRequest {
    pub user_id: String,
    pub item_id: String,
    #[serde(default)]
    pub form_data: serde_json::Value,
}

/// Response with the first question of a new session
#[derive(Debug, Serialize)]
pub struct StartSurveyResponse {
    pub session_id: String,
    pub question: Question,
    pub question_number: usize,
    pub total_questions: usize,
}

/// Request to answer the current question
#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub session_id: String,
    /// A single option, or a list for multi-select questions.
    pub answer: AnswerValue,
}

/// Request to skip the current question
#[derive(Debug, Deserialize)]
pub struct SkipQuestionRequest {
    pub session_id: String,
}

/// Request to edit a past answer and branch from that point
#[derive(Debug, Deserialize)]
pub struct EditAnswerRequest {
    pub session_id: String,
    pub question_number: usize,
    pub answer: AnswerValue,
}

/// Response for answer, skip and edit: either the next question or the
/// completion status.
#[derive(Debug, Serialize)]
pub struct SubmitAnswerResponse {
    pub session_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<Question>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consecutive_skips: Option<usize>,
}

/// Request to generate (or regenerate) review options
#[derive(Debug, Deserialize)]
pub struct GenerateReviewsRequest {
    pub session_id: String,
}

/// Response with generated review options
#[derive(Debug, Serialize)]
pub struct GenerateReviewsResponse {
    pub session_id: String,
    pub status: &'static str,
    pub review_options: Vec<Artifact>,
    pub sentiment_band: &'static str,
}

/// Request to select one of the generated reviews
#[derive(Debug, Deserialize)]
pub struct SubmitReviewRequest {
    pub session_id: String,
    pub selected_review_index: usize,
}

/// Confirmation of the persisted review
#[derive(Debug, Serialize)]
pub struct SubmitReviewResponse {
    pub session_id: String,
    pub status: &'static str,
    pub review_id: String,
    pub review: Artifact,
}

/// Response with the full question ledger of a session
#[derive(Debug, Serialize)]
pub struct SessionQuestionsResponse {
    pub session_id: String,
    pub questions: Vec<Question>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            error: message.into(),
            retryable,
        }
    }
}
