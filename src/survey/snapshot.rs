//! Survey session state types
//!
//! The `Snapshot` is the unit of persistence: one value per session,
//! serialized as a whole at the store boundary and never mutated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

// ============================================================================
// Tunable bounds
// ============================================================================

/// Immutable per-deployment survey bounds, passed to every transition.
#[derive(Debug, Clone)]
pub struct SurveyLimits {
    /// Questions generated at session start.
    pub initial_questions: usize,
    /// Turns before the survey may complete.
    pub min_survey_questions: usize,
    /// Hard cap on turns; reaching it always completes the survey.
    pub max_survey_questions: usize,
    /// Answered (not skipped) questions required before the last remaining
    /// question may be skipped.
    pub min_answered_questions: usize,
    /// Skips allowed in a row before the next skip is refused.
    pub max_consecutive_skips: usize,
    /// Follow-up questions requested per generation round.
    pub followup_batch: usize,
    /// A follow-up round fires every N turns once the minimum is reached.
    pub followup_cadence: usize,
}

impl Default for SurveyLimits {
    fn default() -> Self {
        Self {
            initial_questions: 3,
            min_survey_questions: 5,
            max_survey_questions: 10,
            min_answered_questions: 3,
            max_consecutive_skips: 3,
            followup_batch: 2,
            followup_cadence: 3,
        }
    }
}

// ============================================================================
// Ledger entries
// ============================================================================

/// A multiple-choice question presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    /// At least two options; questions with fewer are rejected on arrival.
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple: bool,
    /// Generator's explanation of why the question is relevant.
    #[serde(default)]
    pub rationale: String,
}

impl Question {
    /// A question needs at least two options to be worth presenting.
    pub fn is_presentable(&self) -> bool {
        self.options.len() >= 2
    }
}

/// A submitted answer: one option, or several for multi-select questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Single(String),
    Multiple(Vec<String>),
}

impl AnswerValue {
    /// Flatten to prompt-friendly text; multi-select values are joined.
    pub fn as_text(&self) -> String {
        match self {
            AnswerValue::Single(s) => s.clone(),
            AnswerValue::Multiple(values) => values.join(", "),
        }
    }
}

/// A resolved answer, index-aligned with `ordered_questions`.
///
/// `question_text` is a frozen copy taken at answer time, so the record
/// stays self-describing even after a branch discards downstream state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_index: usize,
    pub question_text: String,
    pub value: AnswerValue,
    pub answered_at: DateTime<Utc>,
}

// ============================================================================
// Generated review artifacts
// ============================================================================

/// A candidate generated review the user may select.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub text: String,
    /// Star rating, 1 through 5.
    pub rating: u8,
    /// Tone tag: "enthusiastic", "balanced", "critical", ...
    pub tone: String,
    #[serde(default)]
    pub highlights: Vec<String>,
}

/// Overall sentiment band derived from the ledger; drives the rating
/// spread of the generated artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentBand {
    Good,
    Okay,
    Bad,
}

impl SentimentBand {
    pub fn as_str(self) -> &'static str {
        match self {
            SentimentBand::Good => "good",
            SentimentBand::Okay => "okay",
            SentimentBand::Bad => "bad",
        }
    }
}

// ============================================================================
// Upstream context
// ============================================================================

/// Output of the external profiling step, fetched once at session start.
/// Opaque to the engine; only the suppliers interpret it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamContext {
    pub product: Value,
    pub customer: Value,
}

// ============================================================================
// Session snapshot
// ============================================================================

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SurveyPhase {
    /// Presenting questions and recording answers/skips.
    #[default]
    Collecting,
    /// Ledger is closed; review generation is pending or retryable.
    GeneratingContent,
    /// Artifacts attached; only an edit-branch can reopen the session.
    Completed,
}

impl SurveyPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SurveyPhase::Collecting => "collecting",
            SurveyPhase::GeneratingContent => "generating_content",
            SurveyPhase::Completed => "completed",
        }
    }
}

/// Complete persisted state of one survey session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub session_id: String,
    pub user_id: String,
    pub item_id: String,

    /// Append-only question queue; an edit never truncates it, so questions
    /// past the branch point remain available for replay.
    pub ordered_questions: Vec<Question>,
    pub answers: Vec<AnswerRecord>,
    pub skipped_indices: BTreeSet<usize>,
    pub consecutive_skips: usize,
    /// Dedup guard over every question ever appended; grows monotonically.
    pub asked_question_texts: BTreeSet<String>,

    /// Index of the next question to present; `cursor` equals the number of
    /// resolved (answered or skipped) questions.
    pub cursor: usize,
    pub total_turns: usize,

    pub phase: SurveyPhase,
    pub generated_artifacts: Option<Vec<Artifact>>,
    pub sentiment_band: Option<SentimentBand>,
    /// Set once the user picks an artifact; terminal for this lineage.
    pub selected_review_id: Option<String>,

    pub upstream_context: UpstreamContext,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Create a fresh session from an initial question batch.
    ///
    /// Questions with fewer than two options or duplicate text are dropped
    /// here, mirroring follow-up validation. The caller is responsible for
    /// treating an entirely empty result as a fatal start error.
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        item_id: impl Into<String>,
        initial_questions: Vec<Question>,
        upstream_context: UpstreamContext,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut snapshot = Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            item_id: item_id.into(),
            ordered_questions: Vec::new(),
            answers: Vec::new(),
            skipped_indices: BTreeSet::new(),
            consecutive_skips: 0,
            asked_question_texts: BTreeSet::new(),
            cursor: 0,
            total_turns: 0,
            phase: SurveyPhase::Collecting,
            generated_artifacts: None,
            sentiment_band: None,
            selected_review_id: None,
            upstream_context,
            created_at,
        };
        for question in initial_questions {
            snapshot.try_append_question(question);
        }
        snapshot
    }

    /// Append a question if it passes option-count and dedup validation.
    /// Returns whether the question was accepted.
    pub fn try_append_question(&mut self, question: Question) -> bool {
        if !question.is_presentable() {
            return false;
        }
        if !self.asked_question_texts.insert(question.text.clone()) {
            return false;
        }
        self.ordered_questions.push(question);
        true
    }

    /// The question the cursor points at, if any remain.
    pub fn current_question(&self) -> Option<&Question> {
        self.ordered_questions.get(self.cursor)
    }

    /// 1-indexed number of the question currently presented.
    pub fn question_number(&self) -> usize {
        self.cursor + 1
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped_indices.len()
    }

    /// Attach generated artifacts and move to `Completed`.
    ///
    /// The caller must have verified the artifact list is non-empty; an
    /// empty list is a supplier failure, not a completion.
    pub fn attach_reviews(&mut self, artifacts: Vec<Artifact>, band: SentimentBand) {
        debug_assert!(!artifacts.is_empty());
        self.generated_artifacts = Some(artifacts);
        self.sentiment_band = Some(band);
        self.phase = SurveyPhase::Completed;
    }

    /// Look up a generated artifact by selection index.
    pub fn artifact(&self, index: usize) -> Option<&Artifact> {
        self.generated_artifacts.as_deref()?.get(index)
    }

    /// Validate the structural invariants that must hold after every
    /// transition. A violation indicates a concurrency bug or a corrupted
    /// store and is always fatal to the request.
    pub fn check_invariants(&self, limits: &SurveyLimits) -> Result<(), InvariantError> {
        if self.cursor > self.ordered_questions.len() {
            return Err(InvariantError(format!(
                "cursor {} past end of {} questions",
                self.cursor,
                self.ordered_questions.len()
            )));
        }
        if self.total_turns != self.cursor {
            return Err(InvariantError(format!(
                "total_turns {} != cursor {}",
                self.total_turns, self.cursor
            )));
        }
        if self.answers.len() + self.skipped_indices.len() != self.cursor {
            return Err(InvariantError(format!(
                "{} answers + {} skips != cursor {}",
                self.answers.len(),
                self.skipped_indices.len(),
                self.cursor
            )));
        }
        if let Some(&skipped) = self.skipped_indices.iter().next_back() {
            if skipped >= self.cursor {
                return Err(InvariantError(format!(
                    "skipped index {skipped} not behind cursor {}",
                    self.cursor
                )));
            }
        }
        // Every resolved index is answered or skipped, never both.
        let mut resolved: BTreeSet<usize> = self.skipped_indices.clone();
        for record in &self.answers {
            if record.question_index >= self.cursor {
                return Err(InvariantError(format!(
                    "answer at index {} not behind cursor {}",
                    record.question_index, self.cursor
                )));
            }
            if !resolved.insert(record.question_index) {
                return Err(InvariantError(format!(
                    "index {} resolved twice",
                    record.question_index
                )));
            }
        }
        if resolved.len() != self.cursor {
            return Err(InvariantError(format!(
                "{} distinct resolved indices for cursor {}",
                resolved.len(),
                self.cursor
            )));
        }
        if self.consecutive_skips > limits.max_consecutive_skips {
            return Err(InvariantError(format!(
                "consecutive_skips {} above cap {}",
                self.consecutive_skips, limits.max_consecutive_skips
            )));
        }
        for question in &self.ordered_questions {
            if !self.asked_question_texts.contains(&question.text) {
                return Err(InvariantError(format!(
                    "question {:?} missing from dedup guard",
                    question.text
                )));
            }
        }
        if self.generated_artifacts.is_some() && self.phase != SurveyPhase::Completed {
            return Err(InvariantError(format!(
                "artifacts present in phase {:?}",
                self.phase
            )));
        }
        Ok(())
    }
}

/// A structural invariant did not survive a transition. Never patched in
/// place; surfaced as an internal error with the offending snapshot logged.
#[derive(Debug, Error)]
#[error("snapshot invariant violated: {0}")]
pub struct InvariantError(pub String);
