//! External content-generation collaborators
//!
//! Narrow trait seams over the LLM-backed generators. Implementations are
//! constructed once in `main` and injected; the engine never reaches for a
//! global client.

mod context;
mod error;
mod openai;

pub use error::{SupplierError, SupplierErrorKind};
pub use openai::OpenAiSupplier;

use crate::survey::{AnswerRecord, Artifact, Question, SentimentBand, UpstreamContext};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;

/// Everything the question generator may condition on.
#[derive(Debug)]
pub struct QuestionRequest<'a> {
    pub upstream_context: &'a UpstreamContext,
    pub answered: &'a [AnswerRecord],
    /// Texts of every question already appended, for generator-side dedup.
    /// The engine re-checks; this only reduces wasted candidates.
    pub already_asked: &'a BTreeSet<String>,
    pub skipped_count: usize,
    pub count: usize,
}

/// Source of adaptive survey questions.
#[async_trait]
pub trait QuestionSupplier: Send + Sync {
    /// Generate up to `request.count` candidate questions. Callers validate
    /// and dedup the batch; a short or empty batch is not an error here.
    async fn generate_questions(
        &self,
        request: QuestionRequest<'_>,
    ) -> Result<Vec<Question>, SupplierError>;
}

/// Candidate review artifacts plus the sentiment band that drove their
/// rating spread.
#[derive(Debug, Clone)]
pub struct ReviewBatch {
    pub artifacts: Vec<Artifact>,
    pub sentiment_band: SentimentBand,
}

/// Turns a completed ledger into candidate review artifacts.
#[async_trait]
pub trait ReviewSupplier: Send + Sync {
    async fn generate_reviews(
        &self,
        answers: &[AnswerRecord],
        context: &UpstreamContext,
    ) -> Result<ReviewBatch, SupplierError>;
}

/// Profiles the product and the customer ahead of question generation.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Fetch both context halves. Failure aborts session creation; this is
    /// the one supplier call that is fatal rather than retryable.
    async fn fetch_context(
        &self,
        item_id: &str,
        user_id: &str,
        form_inputs: &Value,
    ) -> Result<UpstreamContext, SupplierError>;
}
