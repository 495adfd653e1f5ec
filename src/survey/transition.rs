//! Pure state transition function
//!
//! Given a snapshot and one event, compute the next snapshot and the
//! effects the orchestrator must execute. No I/O happens here; given the
//! same inputs the function always produces the same outputs.

use super::effect::{Effect, TurnOutcome};
use super::event::Event;
use super::snapshot::{AnswerRecord, Question, Snapshot, SurveyLimits, SurveyPhase};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result of a state transition.
#[derive(Debug)]
pub struct TransitionResult {
    pub snapshot: Snapshot,
    pub effects: Vec<Effect>,
}

/// Errors that can occur during a transition.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("survey is no longer collecting answers (phase: {phase:?})")]
    SurveyClosed { phase: SurveyPhase },

    #[error("skip limit reached: {consecutive} consecutive skips (limit {limit})")]
    SkipLimitExceeded { consecutive: usize, limit: usize },

    #[error(
        "cannot skip the final question: {answered} of {required} required answers collected"
    )]
    MinimumNotMet { answered: usize, required: usize },

    #[error("invalid question number {number}: session has {answered} answered questions")]
    InvalidQuestionNumber { number: usize, answered: usize },

    #[error("question cursor {cursor} out of bounds ({questions} questions)")]
    CursorOutOfBounds { cursor: usize, questions: usize },
}

impl TransitionError {
    /// Policy violations are user-correctable; everything else indicates a
    /// corrupted snapshot or a concurrency bug and is fatal to the request.
    pub fn is_policy(&self) -> bool {
        !matches!(self, TransitionError::CursorOutOfBounds { .. })
    }
}

/// Apply one event to a snapshot.
///
/// `now` is injected so the function stays deterministic under test; it
/// stamps any answer record created by the transition.
pub fn transition(
    snapshot: &Snapshot,
    limits: &SurveyLimits,
    event: Event,
    now: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    match event {
        // ============================================================
        // Answer the question at the cursor
        // ============================================================
        Event::Answer { value } => {
            ensure_collecting(snapshot)?;
            let question =
                snapshot
                    .current_question()
                    .ok_or(TransitionError::CursorOutOfBounds {
                        cursor: snapshot.cursor,
                        questions: snapshot.ordered_questions.len(),
                    })?;

            let mut next = snapshot.clone();
            let question_index = next.cursor;
            next.answers.push(AnswerRecord {
                question_index,
                question_text: question.text.clone(),
                value,
                answered_at: now,
            });
            next.cursor += 1;
            next.total_turns += 1;
            next.consecutive_skips = 0;

            let mut effects = vec![Effect::AuditTurn {
                question_index,
                outcome: TurnOutcome::Answered,
            }];
            route_after_turn(&mut next, limits, &mut effects);
            Ok(TransitionResult {
                snapshot: next,
                effects,
            })
        }

        // ============================================================
        // Skip the question at the cursor
        // ============================================================
        Event::Skip => {
            ensure_collecting(snapshot)?;
            if snapshot.cursor >= snapshot.ordered_questions.len() {
                return Err(TransitionError::CursorOutOfBounds {
                    cursor: snapshot.cursor,
                    questions: snapshot.ordered_questions.len(),
                });
            }
            if snapshot.consecutive_skips >= limits.max_consecutive_skips {
                return Err(TransitionError::SkipLimitExceeded {
                    consecutive: snapshot.consecutive_skips,
                    limit: limits.max_consecutive_skips,
                });
            }
            // Skips never satisfy the minimum, so the last remaining
            // question must be answered until enough answers exist.
            let is_last_remaining = snapshot.cursor + 1 == snapshot.ordered_questions.len();
            if is_last_remaining && snapshot.answered_count() < limits.min_answered_questions {
                return Err(TransitionError::MinimumNotMet {
                    answered: snapshot.answered_count(),
                    required: limits.min_answered_questions,
                });
            }

            let mut next = snapshot.clone();
            let question_index = next.cursor;
            next.skipped_indices.insert(question_index);
            next.cursor += 1;
            next.total_turns += 1;
            next.consecutive_skips += 1;

            let mut effects = vec![Effect::AuditTurn {
                question_index,
                outcome: TurnOutcome::Skipped,
            }];
            route_after_turn(&mut next, limits, &mut effects);
            Ok(TransitionResult {
                snapshot: next,
                effects,
            })
        }

        // ============================================================
        // Edit a past answer: destructive rebase onto a new lineage
        // ============================================================
        Event::Edit {
            question_number,
            value,
        } => {
            if question_number == 0 || question_number > snapshot.answers.len() {
                return Err(TransitionError::InvalidQuestionNumber {
                    number: question_number,
                    answered: snapshot.answers.len(),
                });
            }
            let answer_index = question_number - 1;
            let question_index = snapshot.answers[answer_index].question_index;
            let question_text = snapshot
                .ordered_questions
                .get(question_index)
                .map(|q| q.text.clone())
                .ok_or(TransitionError::CursorOutOfBounds {
                    cursor: question_index,
                    questions: snapshot.ordered_questions.len(),
                })?;

            let mut next = snapshot.clone();
            next.answers.truncate(answer_index);
            next.answers.push(AnswerRecord {
                question_index,
                question_text,
                value,
                answered_at: now,
            });
            // Everything downstream of the edited question is discarded.
            next.skipped_indices.retain(|&skipped| skipped < question_index);
            next.cursor = question_index + 1;
            next.total_turns = next.cursor;
            next.consecutive_skips = 0;
            next.generated_artifacts = None;
            next.sentiment_band = None;
            next.selected_review_id = None;
            next.phase = SurveyPhase::Collecting;

            let mut effects = vec![Effect::AuditTurn {
                question_index,
                outcome: TurnOutcome::Edited,
            }];
            // Replay already-generated questions instead of regenerating
            // them; only the cap and exhaustion rules apply on a branch.
            if next.total_turns >= limits.max_survey_questions {
                next.phase = SurveyPhase::GeneratingContent;
            } else if next.cursor == next.ordered_questions.len() {
                effects.push(Effect::FetchFollowups {
                    count: followup_allowance(&next, limits),
                });
            }
            Ok(TransitionResult {
                snapshot: next,
                effects,
            })
        }
    }
}

fn ensure_collecting(snapshot: &Snapshot) -> Result<(), TransitionError> {
    if snapshot.phase == SurveyPhase::Collecting {
        Ok(())
    } else {
        Err(TransitionError::SurveyClosed {
            phase: snapshot.phase,
        })
    }
}

/// Routing decision after a resolved turn, in strict priority order: the
/// turn cap wins over the cadence, which wins over queue exhaustion.
fn route_after_turn(next: &mut Snapshot, limits: &SurveyLimits, effects: &mut Vec<Effect>) {
    if next.total_turns >= limits.max_survey_questions {
        next.phase = SurveyPhase::GeneratingContent;
        return;
    }
    let cadence_hit = next.total_turns >= limits.min_survey_questions
        && limits.followup_cadence > 0
        && next.total_turns % limits.followup_cadence == 0;
    if cadence_hit || next.cursor == next.ordered_questions.len() {
        effects.push(Effect::FetchFollowups {
            count: followup_allowance(next, limits),
        });
    }
}

/// How many follow-ups may still be appended without overshooting the cap.
fn followup_allowance(snapshot: &Snapshot, limits: &SurveyLimits) -> usize {
    limits
        .followup_batch
        .min(limits.max_survey_questions - snapshot.total_turns)
}

// ============================================================================
// Follow-up absorption
// ============================================================================

/// Outcome of absorbing a follow-up batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowupOutcome {
    /// Number of questions accepted after validation and dedup.
    Appended(usize),
    /// Nothing usable arrived and no presentable question remains; the
    /// session has degraded to review generation.
    Exhausted,
}

/// Validate and append a supplier batch: questions with fewer than two
/// options or already-asked text are dropped, the rest are accepted in
/// supplier order up to `requested`.
///
/// A fully-rejected batch is not an error. If the queue is also exhausted
/// the session degrades to `GeneratingContent` rather than asking the
/// generator again in a loop.
pub fn absorb_followups(
    snapshot: &mut Snapshot,
    batch: Vec<Question>,
    requested: usize,
) -> FollowupOutcome {
    let mut accepted = 0;
    for question in batch {
        if accepted >= requested {
            break;
        }
        if snapshot.try_append_question(question) {
            accepted += 1;
        }
    }
    if accepted == 0 && degrade_if_exhausted(snapshot) {
        FollowupOutcome::Exhausted
    } else {
        FollowupOutcome::Appended(accepted)
    }
}

/// Close the ledger when no presentable question remains. Returns whether
/// the session moved to review generation.
pub fn degrade_if_exhausted(snapshot: &mut Snapshot) -> bool {
    if snapshot.phase == SurveyPhase::Collecting
        && snapshot.cursor == snapshot.ordered_questions.len()
    {
        snapshot.phase = SurveyPhase::GeneratingContent;
        true
    } else {
        false
    }
}
