//! HTTP request handlers
//!
//! Thin adapters between the transport and the orchestrator; all decision
//! logic lives behind the `SessionOrchestrator` boundary.

use super::types::{
    EditAnswerRequest, ErrorResponse, GenerateReviewsRequest, GenerateReviewsResponse,
    HealthResponse, SessionQuestionsResponse, SkipQuestionRequest, StartSurveyRequest,
    StartSurveyResponse, SubmitAnswerRequest, SubmitAnswerResponse, SubmitReviewRequest,
    SubmitReviewResponse,
};
use super::AppState;
use crate::orchestrator::{OrchestratorError, StepOutcome};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/", get(health))
        .route("/health", get(health))
        // Survey lifecycle
        .route("/api/survey/start", post(start_survey))
        .route("/api/survey/answer", post(submit_answer))
        .route("/api/survey/skip", post(skip_question))
        .route("/api/survey/edit", post(edit_answer))
        // Review generation and selection
        .route("/api/reviews/generate", post(generate_reviews))
        .route("/api/reviews/regenerate", post(generate_reviews))
        .route("/api/survey/review", post(submit_review))
        // Inspection
        .route("/api/survey/session/:id", get(get_session))
        .route("/api/survey/questions/:id", get(get_session_questions))
        .with_state(state)
}

// ============================================================
// Health
// ============================================================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.environment.clone(),
    })
}

// ============================================================
// Survey lifecycle
// ============================================================

async fn start_survey(
    State(state): State<AppState>,
    Json(req): Json<StartSurveyRequest>,
) -> Result<Json<StartSurveyResponse>, AppError> {
    let started = state
        .orchestrator
        .start(&req.user_id, &req.item_id, &req.form_data)
        .await?;

    Ok(Json(StartSurveyResponse {
        session_id: started.session_id,
        question: started.card.question,
        question_number: started.card.question_number,
        total_questions: started.card.total_questions,
    }))
}

async fn submit_answer(
    State(state): State<AppState>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, AppError> {
    let outcome = state.orchestrator.answer(&req.session_id, req.answer).await?;
    Ok(Json(step_response(req.session_id, outcome)))
}

async fn skip_question(
    State(state): State<AppState>,
    Json(req): Json<SkipQuestionRequest>,
) -> Result<Json<SubmitAnswerResponse>, AppError> {
    let outcome = state.orchestrator.skip(&req.session_id).await?;
    Ok(Json(step_response(req.session_id, outcome)))
}

async fn edit_answer(
    State(state): State<AppState>,
    Json(req): Json<EditAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, AppError> {
    let outcome = state
        .orchestrator
        .edit(&req.session_id, req.question_number, req.answer)
        .await?;
    Ok(Json(step_response(req.session_id, outcome)))
}

fn step_response(session_id: String, outcome: StepOutcome) -> SubmitAnswerResponse {
    match outcome {
        StepOutcome::Continue {
            card,
            skipped_count,
            consecutive_skips,
        } => SubmitAnswerResponse {
            session_id,
            status: "continue",
            question: Some(card.question),
            question_number: Some(card.question_number),
            total_questions: Some(card.total_questions),
            skipped_count: Some(skipped_count),
            consecutive_skips: Some(consecutive_skips),
        },
        StepOutcome::SurveyCompleted => SubmitAnswerResponse {
            session_id,
            status: "survey_completed",
            question: None,
            question_number: None,
            total_questions: None,
            skipped_count: None,
            consecutive_skips: None,
        },
    }
}

// ============================================================
// Review generation and selection
// ============================================================

async fn generate_reviews(
    State(state): State<AppState>,
    Json(req): Json<GenerateReviewsRequest>,
) -> Result<Json<GenerateReviewsResponse>, AppError> {
    let generated = state.orchestrator.generate_reviews(&req.session_id).await?;

    Ok(Json(GenerateReviewsResponse {
        session_id: req.session_id,
        status: "reviews_generated",
        review_options: generated.artifacts,
        sentiment_band: generated.sentiment_band.as_str(),
    }))
}

async fn submit_review(
    State(state): State<AppState>,
    Json(req): Json<SubmitReviewRequest>,
) -> Result<Json<SubmitReviewResponse>, AppError> {
    let selected = state
        .orchestrator
        .select_review(&req.session_id, req.selected_review_index)?;

    Ok(Json(SubmitReviewResponse {
        session_id: req.session_id,
        status: "review_saved",
        review_id: selected.review_id,
        review: selected.artifact,
    }))
}

// ============================================================
// Inspection
// ============================================================

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let snapshot = state.orchestrator.session_snapshot(&id)?;
    Ok(Json(serde_json::to_value(snapshot).unwrap_or(Value::Null)))
}

async fn get_session_questions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionQuestionsResponse>, AppError> {
    let questions = state.orchestrator.session_questions(&id)?;
    Ok(Json(SessionQuestionsResponse {
        session_id: id,
        questions,
    }))
}

// ============================================================
// Error Handling
// ============================================================

struct AppError(OrchestratorError);

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retryable = self.0.is_retryable();
        let status = match &self.0 {
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::Policy(_)
            | OrchestratorError::ReviewIndexOutOfRange { .. }
            | OrchestratorError::NotReadyForReviews => StatusCode::BAD_REQUEST,
            OrchestratorError::Contention(_) => StatusCode::CONFLICT,
            OrchestratorError::Upstream(_) => StatusCode::BAD_GATEWAY,
            OrchestratorError::Invariant(_) | OrchestratorError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.0.to_string(), retryable));
        (status, body).into_response()
    }
}
