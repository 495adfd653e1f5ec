//! Session orchestration
//!
//! The public façade over the engine. Every operation is one stateless
//! load -> transition -> effects -> versioned-replace cycle against the
//! store; there is no long-lived in-process session object, durability is
//! the only source of truth between calls. A replace that loses the
//! version race is retried from a fresh load a bounded number of times.

use crate::db::{Database, DbError, ReviewRow, StoredSnapshot, TurnRow};
use crate::suppliers::{
    ContextProvider, QuestionRequest, QuestionSupplier, ReviewSupplier, SupplierError,
};
use crate::survey::{
    absorb_followups, transition, AnswerValue, Artifact, Effect, Event, FollowupOutcome,
    InvariantError, Question, SentimentBand, Snapshot, SurveyLimits, SurveyPhase, TransitionError,
    TurnOutcome,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

const SUPPLIER_TIMEOUT: Duration = Duration::from_secs(45);
const MAX_REPLACE_ATTEMPTS: u32 = 3;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Session not found: {0}")]
    NotFound(String),

    /// User-correctable rule violation; surfaced with the triggering reason.
    #[error(transparent)]
    Policy(TransitionError),

    #[error("Review index {index} out of range ({available} artifacts available)")]
    ReviewIndexOutOfRange { index: usize, available: usize },

    #[error("Survey is still collecting answers; reviews are not available yet")]
    NotReadyForReviews,

    /// Corrupted snapshot or a concurrency bug; never patched in place.
    #[error(transparent)]
    Invariant(#[from] InvariantError),

    #[error("Upstream generator failure: {0}")]
    Upstream(SupplierError),

    #[error("Storage failure: {0}")]
    Storage(DbError),

    #[error("Session {0} is receiving concurrent transitions; retry the request")]
    Contention(String),
}

impl OrchestratorError {
    fn from_db(err: DbError) -> Self {
        match err {
            DbError::SessionNotFound(id) => OrchestratorError::NotFound(id),
            DbError::Conflict(id) => OrchestratorError::Contention(id),
            other => OrchestratorError::Storage(other),
        }
    }

    fn from_transition(err: TransitionError, snapshot: &Snapshot) -> Self {
        if err.is_policy() {
            OrchestratorError::Policy(err)
        } else {
            tracing::error!(?snapshot, error = %err, "transition hit a corrupted snapshot");
            OrchestratorError::Invariant(InvariantError(err.to_string()))
        }
    }

    /// Whether the caller may safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrchestratorError::Upstream(err) => err.is_retryable(),
            OrchestratorError::Contention(_) => true,
            _ => false,
        }
    }
}

// ============================================================================
// Operation results
// ============================================================================

/// A question ready to present, with its 1-indexed position.
#[derive(Debug, Clone)]
pub struct QuestionCard {
    pub question: Question,
    pub question_number: usize,
    pub total_questions: usize,
}

/// Outcome of an answer, skip or edit.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The survey continues with another question.
    Continue {
        card: QuestionCard,
        skipped_count: usize,
        consecutive_skips: usize,
    },
    /// The ledger is closed; review generation is next.
    SurveyCompleted,
}

#[derive(Debug, Clone)]
pub struct StartedSession {
    pub session_id: String,
    pub card: QuestionCard,
}

#[derive(Debug, Clone)]
pub struct GeneratedReviews {
    pub artifacts: Vec<Artifact>,
    pub sentiment_band: SentimentBand,
}

#[derive(Debug, Clone)]
pub struct SelectedReview {
    pub review_id: String,
    pub artifact: Artifact,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Owns the read-modify-write cycle for every session operation.
pub struct SessionOrchestrator {
    db: Database,
    contexts: Arc<dyn ContextProvider>,
    questions: Arc<dyn QuestionSupplier>,
    reviews: Arc<dyn ReviewSupplier>,
    limits: SurveyLimits,
}

impl SessionOrchestrator {
    pub fn new(
        db: Database,
        contexts: Arc<dyn ContextProvider>,
        questions: Arc<dyn QuestionSupplier>,
        reviews: Arc<dyn ReviewSupplier>,
        limits: SurveyLimits,
    ) -> Self {
        Self {
            db,
            contexts,
            questions,
            reviews,
            limits,
        }
    }

    /// Start a new session: profile the product and customer, generate the
    /// initial question batch, persist the first snapshot and hand back the
    /// first question. A context or generation failure here is fatal; no
    /// session is created.
    pub async fn start(
        &self,
        user_id: &str,
        item_id: &str,
        form_inputs: &Value,
    ) -> Result<StartedSession, OrchestratorError> {
        let upstream_context = timeout(
            SUPPLIER_TIMEOUT,
            self.contexts.fetch_context(item_id, user_id, form_inputs),
        )
        .await
        .map_err(|_| {
            OrchestratorError::Upstream(SupplierError::network("Context fetch timed out"))
        })?
        .map_err(OrchestratorError::Upstream)?;

        let initial = timeout(
            SUPPLIER_TIMEOUT,
            self.questions.generate_questions(QuestionRequest {
                upstream_context: &upstream_context,
                answered: &[],
                already_asked: &std::collections::BTreeSet::new(),
                skipped_count: 0,
                count: self.limits.initial_questions,
            }),
        )
        .await
        .map_err(|_| {
            OrchestratorError::Upstream(SupplierError::network(
                "Initial question generation timed out",
            ))
        })?
        .map_err(OrchestratorError::Upstream)?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let snapshot = Snapshot::new(
            session_id.clone(),
            user_id,
            item_id,
            initial,
            upstream_context,
            Utc::now(),
        );
        if snapshot.ordered_questions.is_empty() {
            return Err(OrchestratorError::Upstream(SupplierError::unusable_content(
                "No valid questions generated - all candidates missing options",
            )));
        }

        self.db
            .create_session(&snapshot)
            .map_err(OrchestratorError::from_db)?;
        tracing::info!(
            session_id = %session_id,
            questions = snapshot.ordered_questions.len(),
            "survey session started"
        );

        let card = question_card(&snapshot)?;
        Ok(StartedSession { session_id, card })
    }

    /// Record an answer for the current question.
    pub async fn answer(
        &self,
        session_id: &str,
        value: AnswerValue,
    ) -> Result<StepOutcome, OrchestratorError> {
        self.apply_event(session_id, Event::Answer { value }).await
    }

    /// Skip the current question.
    pub async fn skip(&self, session_id: &str) -> Result<StepOutcome, OrchestratorError> {
        self.apply_event(session_id, Event::Skip).await
    }

    /// Replace a past answer and branch the session from that point.
    pub async fn edit(
        &self,
        session_id: &str,
        question_number: usize,
        value: AnswerValue,
    ) -> Result<StepOutcome, OrchestratorError> {
        self.apply_event(
            session_id,
            Event::Edit {
                question_number,
                value,
            },
        )
        .await
    }

    /// One full read-modify-write cycle, retried from a fresh load when a
    /// concurrent transition wins the version race.
    async fn apply_event(
        &self,
        session_id: &str,
        event: Event,
    ) -> Result<StepOutcome, OrchestratorError> {
        for attempt in 0..MAX_REPLACE_ATTEMPTS {
            let StoredSnapshot { snapshot, version } = self
                .db
                .load_session(session_id)
                .map_err(OrchestratorError::from_db)?;

            let result = transition(&snapshot, &self.limits, event.clone(), Utc::now())
                .map_err(|err| OrchestratorError::from_transition(err, &snapshot))?;

            let mut next = result.snapshot;
            let mut audits = Vec::new();
            for effect in result.effects {
                match effect {
                    Effect::AuditTurn {
                        question_index,
                        outcome,
                    } => audits.push((question_index, outcome)),
                    Effect::FetchFollowups { count } => {
                        self.fetch_followups(&mut next, count).await;
                    }
                }
            }

            next.check_invariants(&self.limits).map_err(|err| {
                tracing::error!(snapshot = ?next, error = %err, "post-transition invariant failure");
                OrchestratorError::Invariant(err)
            })?;

            match self.db.replace_session(&next, version) {
                Ok(_) => {
                    self.audit_turns(&next, &event, &audits);
                    return step_outcome(&next);
                }
                Err(DbError::Conflict(_)) => {
                    tracing::warn!(
                        session_id,
                        attempt,
                        "concurrent transition won the version race; reloading"
                    );
                }
                Err(err) => return Err(OrchestratorError::from_db(err)),
            }
        }
        Err(OrchestratorError::Contention(session_id.to_string()))
    }

    /// Ask the question supplier for follow-ups and absorb the usable ones.
    /// A failed or empty round is not an error: if the queue also ran dry,
    /// the snapshot degrades to review generation instead of looping.
    async fn fetch_followups(&self, snapshot: &mut Snapshot, count: usize) {
        let batch = {
            let request = QuestionRequest {
                upstream_context: &snapshot.upstream_context,
                answered: &snapshot.answers,
                already_asked: &snapshot.asked_question_texts,
                skipped_count: snapshot.skipped_count(),
                count,
            };
            match timeout(SUPPLIER_TIMEOUT, self.questions.generate_questions(request)).await {
                Ok(Ok(batch)) => batch,
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "follow-up generation failed");
                    Vec::new()
                }
                Err(_) => {
                    tracing::warn!("follow-up generation timed out");
                    Vec::new()
                }
            }
        };

        match absorb_followups(snapshot, batch, count) {
            FollowupOutcome::Appended(accepted) => {
                tracing::debug!(
                    session_id = %snapshot.session_id,
                    accepted,
                    requested = count,
                    "absorbed follow-up questions"
                );
            }
            FollowupOutcome::Exhausted => {
                tracing::info!(
                    session_id = %snapshot.session_id,
                    turns = snapshot.total_turns,
                    "question generation exhausted; moving to review generation"
                );
            }
        }
    }

    /// Mirror resolved turns to the audit log. Best-effort: the snapshot
    /// has already committed, so an audit failure only logs.
    fn audit_turns(&self, snapshot: &Snapshot, event: &Event, audits: &[(usize, TurnOutcome)]) {
        for &(question_index, outcome) in audits {
            let question_text = snapshot
                .ordered_questions
                .get(question_index)
                .map_or_else(String::new, |q| q.text.clone());
            let answer_text = match event {
                Event::Answer { value } | Event::Edit { value, .. } => Some(value.as_text()),
                Event::Skip => None,
            };
            let row = TurnRow {
                session_id: snapshot.session_id.clone(),
                question_index,
                question_text,
                outcome,
                answer_text,
                logged_at: Utc::now(),
            };
            if let Err(err) = self.db.append_turn(&row) {
                tracing::warn!(error = %err, "failed to append audit turn");
            }
        }
    }

    /// Generate candidate reviews for a closed ledger.
    ///
    /// Depends only on already-persisted state, so the caller may retry
    /// after a failure or timeout; a repeat call regenerates a fresh batch,
    /// which is acceptable because nothing is authoritative until a review
    /// is selected.
    pub async fn generate_reviews(
        &self,
        session_id: &str,
    ) -> Result<GeneratedReviews, OrchestratorError> {
        let StoredSnapshot { snapshot, version } = self
            .db
            .load_session(session_id)
            .map_err(OrchestratorError::from_db)?;

        if snapshot.phase == SurveyPhase::Collecting {
            return Err(OrchestratorError::NotReadyForReviews);
        }

        let batch = timeout(
            SUPPLIER_TIMEOUT,
            self.reviews
                .generate_reviews(&snapshot.answers, &snapshot.upstream_context),
        )
        .await
        .map_err(|_| {
            OrchestratorError::Upstream(SupplierError::network("Review generation timed out"))
        })?
        .map_err(OrchestratorError::Upstream)?;

        if batch.artifacts.is_empty() {
            return Err(OrchestratorError::Upstream(SupplierError::unusable_content(
                "Review supplier returned no artifacts",
            )));
        }

        let mut next = snapshot;
        next.attach_reviews(batch.artifacts.clone(), batch.sentiment_band);
        self.db
            .replace_session(&next, version)
            .map_err(OrchestratorError::from_db)?;

        Ok(GeneratedReviews {
            artifacts: batch.artifacts,
            sentiment_band: batch.sentiment_band,
        })
    }

    /// Persist the user's chosen artifact and close out the session.
    pub fn select_review(
        &self,
        session_id: &str,
        index: usize,
    ) -> Result<SelectedReview, OrchestratorError> {
        let StoredSnapshot { snapshot, version } = self
            .db
            .load_session(session_id)
            .map_err(OrchestratorError::from_db)?;

        let available = snapshot.generated_artifacts.as_deref().map_or(0, <[Artifact]>::len);
        let artifact = snapshot
            .artifact(index)
            .cloned()
            .ok_or(OrchestratorError::ReviewIndexOutOfRange { index, available })?;

        let review_id = uuid::Uuid::new_v4().to_string();
        self.db
            .save_review(&ReviewRow {
                id: review_id.clone(),
                session_id: snapshot.session_id.clone(),
                user_id: snapshot.user_id.clone(),
                item_id: snapshot.item_id.clone(),
                review_text: artifact.text.clone(),
                rating: artifact.rating,
                tone: artifact.tone.clone(),
                sentiment_band: snapshot.sentiment_band,
                created_at: Utc::now(),
            })
            .map_err(OrchestratorError::from_db)?;

        let mut next = snapshot;
        next.selected_review_id = Some(review_id.clone());
        self.db
            .replace_session(&next, version)
            .map_err(OrchestratorError::from_db)?;

        tracing::info!(session_id, review_id = %review_id, "review selected");
        Ok(SelectedReview {
            review_id,
            artifact,
        })
    }

    /// Full snapshot for inspection endpoints.
    pub fn session_snapshot(&self, session_id: &str) -> Result<Snapshot, OrchestratorError> {
        Ok(self
            .db
            .load_session(session_id)
            .map_err(OrchestratorError::from_db)?
            .snapshot)
    }

    /// The full question ledger for a session.
    pub fn session_questions(&self, session_id: &str) -> Result<Vec<Question>, OrchestratorError> {
        Ok(self.session_snapshot(session_id)?.ordered_questions)
    }
}

fn question_card(snapshot: &Snapshot) -> Result<QuestionCard, OrchestratorError> {
    let question = snapshot.current_question().cloned().ok_or_else(|| {
        OrchestratorError::Invariant(InvariantError(format!(
            "collecting session {} has no question at cursor {}",
            snapshot.session_id, snapshot.cursor
        )))
    })?;
    Ok(QuestionCard {
        question,
        question_number: snapshot.question_number(),
        total_questions: snapshot.ordered_questions.len(),
    })
}

fn step_outcome(snapshot: &Snapshot) -> Result<StepOutcome, OrchestratorError> {
    match snapshot.phase {
        SurveyPhase::Collecting => Ok(StepOutcome::Continue {
            card: question_card(snapshot)?,
            skipped_count: snapshot.skipped_count(),
            consecutive_skips: snapshot.consecutive_skips,
        }),
        SurveyPhase::GeneratingContent | SurveyPhase::Completed => {
            Ok(StepOutcome::SurveyCompleted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suppliers::ReviewBatch;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Scripted supplier standing in for the LLM-backed generators.
    struct MockSupplier {
        question_counter: AtomicUsize,
        review_calls: AtomicUsize,
        fail_questions: AtomicBool,
        fail_reviews: AtomicBool,
        /// When set, every generated question carries the same text, so
        /// dedup rejects all but the first.
        repeat_question_text: AtomicBool,
    }

    impl MockSupplier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                question_counter: AtomicUsize::new(0),
                review_calls: AtomicUsize::new(0),
                fail_questions: AtomicBool::new(false),
                fail_reviews: AtomicBool::new(false),
                repeat_question_text: AtomicBool::new(false),
            })
        }

        fn question(&self) -> Question {
            let text = if self.repeat_question_text.load(Ordering::SeqCst) {
                "The same question again".to_string()
            } else {
                let n = self.question_counter.fetch_add(1, Ordering::SeqCst);
                format!("Generated question {n}")
            };
            Question {
                text,
                options: vec![
                    "Strongly agree".to_string(),
                    "Agree".to_string(),
                    "Disagree".to_string(),
                    "Strongly disagree".to_string(),
                ],
                allow_multiple: false,
                rationale: String::new(),
            }
        }
    }

    #[async_trait]
    impl ContextProvider for MockSupplier {
        async fn fetch_context(
            &self,
            _item_id: &str,
            _user_id: &str,
            _form_inputs: &Value,
        ) -> Result<crate::survey::UpstreamContext, SupplierError> {
            Ok(crate::survey::UpstreamContext::default())
        }
    }

    #[async_trait]
    impl QuestionSupplier for MockSupplier {
        async fn generate_questions(
            &self,
            request: QuestionRequest<'_>,
        ) -> Result<Vec<Question>, SupplierError> {
            if self.fail_questions.load(Ordering::SeqCst) {
                return Err(SupplierError::server_error("generator down"));
            }
            Ok((0..request.count).map(|_| self.question()).collect())
        }
    }

    #[async_trait]
    impl ReviewSupplier for MockSupplier {
        async fn generate_reviews(
            &self,
            _answers: &[crate::survey::AnswerRecord],
            _context: &crate::survey::UpstreamContext,
        ) -> Result<ReviewBatch, SupplierError> {
            self.review_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_reviews.load(Ordering::SeqCst) {
                return Err(SupplierError::server_error("generator down"));
            }
            Ok(ReviewBatch {
                artifacts: vec![
                    Artifact {
                        text: "Loved it".to_string(),
                        rating: 5,
                        tone: "enthusiastic".to_string(),
                        highlights: vec![],
                    },
                    Artifact {
                        text: "Pretty solid".to_string(),
                        rating: 4,
                        tone: "balanced".to_string(),
                        highlights: vec![],
                    },
                ],
                sentiment_band: SentimentBand::Good,
            })
        }
    }

    fn orchestrator(mock: &Arc<MockSupplier>) -> SessionOrchestrator {
        SessionOrchestrator::new(
            Database::open_in_memory().unwrap(),
            mock.clone(),
            mock.clone(),
            mock.clone(),
            SurveyLimits::default(),
        )
    }

    async fn started(orchestrator: &SessionOrchestrator) -> StartedSession {
        orchestrator
            .start("user-1", "item-1", &serde_json::json!({}))
            .await
            .unwrap()
    }

    fn yes() -> AnswerValue {
        AnswerValue::Single("Strongly agree".to_string())
    }

    #[tokio::test]
    async fn start_presents_the_first_question() {
        let mock = MockSupplier::new();
        let orchestrator = orchestrator(&mock);

        let session = started(&orchestrator).await;
        assert_eq!(session.card.question_number, 1);
        assert_eq!(session.card.total_questions, 3);
    }

    #[tokio::test]
    async fn full_run_yields_increasing_unique_questions_until_the_cap() {
        let mock = MockSupplier::new();
        let orchestrator = orchestrator(&mock);
        let session = started(&orchestrator).await;

        let mut seen_texts = std::collections::BTreeSet::new();
        let mut expected_number = 1;
        let mut turns = 0;
        loop {
            turns += 1;
            match orchestrator.answer(&session.session_id, yes()).await.unwrap() {
                StepOutcome::Continue { card, .. } => {
                    expected_number += 1;
                    assert_eq!(card.question_number, expected_number);
                    assert!(
                        seen_texts.insert(card.question.text.clone()),
                        "duplicate question presented: {}",
                        card.question.text
                    );
                }
                StepOutcome::SurveyCompleted => break,
            }
            assert!(turns <= 10, "survey ran past the question cap");
        }
        assert_eq!(turns, 10);

        let snapshot = orchestrator.session_snapshot(&session.session_id).unwrap();
        assert_eq!(snapshot.phase, SurveyPhase::GeneratingContent);
        assert_eq!(snapshot.answers.len(), 10);
    }

    #[tokio::test]
    async fn skip_limit_is_a_policy_error_and_state_is_untouched() {
        let mock = MockSupplier::new();
        let orchestrator = orchestrator(&mock);
        let session = started(&orchestrator).await;

        // Meet the answered minimum first so the skips hit the streak cap
        // rather than the last-question rule.
        for _ in 0..3 {
            orchestrator.answer(&session.session_id, yes()).await.unwrap();
        }
        for _ in 0..3 {
            orchestrator.skip(&session.session_id).await.unwrap();
        }
        let before = orchestrator.session_snapshot(&session.session_id).unwrap();

        let err = orchestrator.skip(&session.session_id).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Policy(TransitionError::SkipLimitExceeded { .. })
        ));

        let after = orchestrator.session_snapshot(&session.session_id).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn edit_branches_back_and_resumes() {
        let mock = MockSupplier::new();
        let orchestrator = orchestrator(&mock);
        let session = started(&orchestrator).await;

        for _ in 0..5 {
            orchestrator.answer(&session.session_id, yes()).await.unwrap();
        }

        let outcome = orchestrator
            .edit(
                &session.session_id,
                3,
                AnswerValue::Single("Disagree".to_string()),
            )
            .await
            .unwrap();

        match outcome {
            StepOutcome::Continue { card, .. } => assert_eq!(card.question_number, 4),
            StepOutcome::SurveyCompleted => panic!("edit should resume collection"),
        }

        let snapshot = orchestrator.session_snapshot(&session.session_id).unwrap();
        assert_eq!(snapshot.answers.len(), 3);
        assert_eq!(snapshot.answers[2].value.as_text(), "Disagree");
    }

    #[tokio::test]
    async fn generation_starvation_degrades_to_review_generation() {
        let mock = MockSupplier::new();
        let orchestrator = orchestrator(&mock);
        let session = started(&orchestrator).await;

        // The generator goes down after the initial batch of 3.
        mock.fail_questions.store(true, Ordering::SeqCst);

        let mut last = None;
        for _ in 0..3 {
            last = Some(orchestrator.answer(&session.session_id, yes()).await.unwrap());
        }
        assert!(matches!(last, Some(StepOutcome::SurveyCompleted)));

        let snapshot = orchestrator.session_snapshot(&session.session_id).unwrap();
        assert_eq!(snapshot.phase, SurveyPhase::GeneratingContent);
    }

    #[tokio::test]
    async fn duplicate_followups_are_filtered_then_degrade() {
        let mock = MockSupplier::new();
        let orchestrator = orchestrator(&mock);
        let session = started(&orchestrator).await;

        mock.repeat_question_text.store(true, Ordering::SeqCst);

        // Turn 3 exhausts the initial batch; the repeated follow-up text is
        // accepted once, then every later batch dedups to nothing.
        let mut completed_at = 0;
        for turn in 1..=10 {
            match orchestrator.answer(&session.session_id, yes()).await.unwrap() {
                StepOutcome::Continue { .. } => {}
                StepOutcome::SurveyCompleted => {
                    completed_at = turn;
                    break;
                }
            }
        }
        assert_eq!(completed_at, 4);

        let snapshot = orchestrator.session_snapshot(&session.session_id).unwrap();
        assert_eq!(snapshot.phase, SurveyPhase::GeneratingContent);
        assert_eq!(snapshot.ordered_questions.len(), 4);
    }

    #[tokio::test]
    async fn review_generation_is_idempotent_on_the_ledger() {
        let mock = MockSupplier::new();
        let orchestrator = orchestrator(&mock);
        let session = started(&orchestrator).await;

        loop {
            if matches!(
                orchestrator.answer(&session.session_id, yes()).await.unwrap(),
                StepOutcome::SurveyCompleted
            ) {
                break;
            }
        }
        let before = orchestrator.session_snapshot(&session.session_id).unwrap();

        let first = orchestrator.generate_reviews(&session.session_id).await.unwrap();
        assert_eq!(first.artifacts.len(), 2);
        assert_eq!(first.sentiment_band, SentimentBand::Good);

        // A regenerate call must not disturb the ledger.
        orchestrator.generate_reviews(&session.session_id).await.unwrap();
        let after = orchestrator.session_snapshot(&session.session_id).unwrap();
        assert_eq!(before.answers, after.answers);
        assert_eq!(before.cursor, after.cursor);
        assert_eq!(before.asked_question_texts, after.asked_question_texts);
        assert_eq!(mock.review_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn review_failure_is_retryable_and_leaves_phase_alone() {
        let mock = MockSupplier::new();
        let orchestrator = orchestrator(&mock);
        let session = started(&orchestrator).await;

        loop {
            if matches!(
                orchestrator.answer(&session.session_id, yes()).await.unwrap(),
                StepOutcome::SurveyCompleted
            ) {
                break;
            }
        }

        mock.fail_reviews.store(true, Ordering::SeqCst);
        let err = orchestrator.generate_reviews(&session.session_id).await.unwrap_err();
        assert!(err.is_retryable());

        let snapshot = orchestrator.session_snapshot(&session.session_id).unwrap();
        assert_eq!(snapshot.phase, SurveyPhase::GeneratingContent);
        assert!(snapshot.generated_artifacts.is_none());

        mock.fail_reviews.store(false, Ordering::SeqCst);
        assert!(orchestrator.generate_reviews(&session.session_id).await.is_ok());
    }

    #[tokio::test]
    async fn reviews_refused_while_collecting() {
        let mock = MockSupplier::new();
        let orchestrator = orchestrator(&mock);
        let session = started(&orchestrator).await;

        let err = orchestrator.generate_reviews(&session.session_id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotReadyForReviews));
    }

    #[tokio::test]
    async fn select_review_persists_and_validates_the_index() {
        let mock = MockSupplier::new();
        let orchestrator = orchestrator(&mock);
        let session = started(&orchestrator).await;

        loop {
            if matches!(
                orchestrator.answer(&session.session_id, yes()).await.unwrap(),
                StepOutcome::SurveyCompleted
            ) {
                break;
            }
        }
        orchestrator.generate_reviews(&session.session_id).await.unwrap();

        let err = orchestrator
            .select_review(&session.session_id, 9)
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::ReviewIndexOutOfRange {
                index: 9,
                available: 2
            }
        ));

        let selected = orchestrator.select_review(&session.session_id, 1).unwrap();
        assert_eq!(selected.artifact.rating, 4);

        let snapshot = orchestrator.session_snapshot(&session.session_id).unwrap();
        assert_eq!(snapshot.selected_review_id, Some(selected.review_id));
        assert_eq!(snapshot.phase, SurveyPhase::Completed);
    }

    #[tokio::test]
    async fn concurrent_answers_never_corrupt_the_ledger() {
        let mock = MockSupplier::new();
        let orchestrator = Arc::new(orchestrator(&mock));
        let session = started(&orchestrator).await;

        let a = {
            let orchestrator = orchestrator.clone();
            let id = session.session_id.clone();
            tokio::spawn(async move { orchestrator.answer(&id, yes()).await })
        };
        let b = {
            let orchestrator = orchestrator.clone();
            let id = session.session_id.clone();
            tokio::spawn(async move { orchestrator.answer(&id, yes()).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let accepted = results.iter().filter(|r| r.is_ok()).count();

        let snapshot = orchestrator.session_snapshot(&session.session_id).unwrap();
        snapshot.check_invariants(&SurveyLimits::default()).unwrap();
        // Every accepted transition advanced the cursor exactly once; a
        // loser either retried onto the next question or reported
        // contention, never a double-advance for one answer.
        assert_eq!(snapshot.answers.len(), accepted);
        assert_eq!(snapshot.cursor, accepted);
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let mock = MockSupplier::new();
        let orchestrator = orchestrator(&mock);
        let err = orchestrator.answer("ghost", yes()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }
}
