//! Property-based tests for the survey state machine
//!
//! These tests drive random event sequences through the transition
//! function and verify the snapshot invariants hold after every step.

use super::snapshot::{AnswerValue, Question, Snapshot, SurveyLimits, SurveyPhase, UpstreamContext};
use super::transition::{absorb_followups, transition};
use super::{Effect, Event};
use chrono::{DateTime, Utc};
use proptest::prelude::*;

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn question(text: &str) -> Question {
    Question {
        text: text.to_string(),
        options: vec!["Yes".to_string(), "No".to_string()],
        allow_multiple: false,
        rationale: String::new(),
    }
}

fn fresh_session(initial: usize) -> Snapshot {
    Snapshot::new(
        "sess-prop",
        "user-prop",
        "item-prop",
        (0..initial).map(|i| question(&format!("Question {i}"))).collect(),
        UpstreamContext::default(),
        now(),
    )
}

// ============================================================================
// Random walk driver
// ============================================================================

/// One step of a random session walk. The `usize` on `Edit` seeds the
/// target question number; the bool decides whether the generator has
/// fresh follow-ups to offer this round.
#[derive(Debug, Clone)]
enum Step {
    Answer,
    Skip,
    Edit(usize),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => Just(Step::Answer),
        2 => Just(Step::Skip),
        1 => (0usize..64).prop_map(Step::Edit),
    ]
}

/// Apply a walk, absorbing follow-ups the way the orchestrator would, and
/// check every invariant after each accepted transition.
fn drive(initial: usize, steps: Vec<(Step, bool)>) -> Result<Snapshot, TestCaseError> {
    let limits = SurveyLimits::default();
    let mut snapshot = fresh_session(initial);
    let mut generated = 0usize;

    for (step, supply) in steps {
        let event = match step {
            Step::Answer => Event::Answer {
                value: AnswerValue::Single("opt".to_string()),
            },
            Step::Skip => Event::Skip,
            Step::Edit(seed) => {
                if snapshot.answers.is_empty() {
                    continue;
                }
                Event::Edit {
                    question_number: seed % snapshot.answers.len() + 1,
                    value: AnswerValue::Single("edited".to_string()),
                }
            }
        };

        match transition(&snapshot, &limits, event, now()) {
            Ok(result) => {
                let mut next = result.snapshot;
                for effect in result.effects {
                    if let Effect::FetchFollowups { count } = effect {
                        let batch: Vec<Question> = if supply {
                            (0..count)
                                .map(|_| {
                                    generated += 1;
                                    question(&format!("Follow-up {generated}"))
                                })
                                .collect()
                        } else {
                            Vec::new()
                        };
                        absorb_followups(&mut next, batch, count);
                    }
                }
                prop_assert!(
                    next.check_invariants(&limits).is_ok(),
                    "invariants broken: {:?} for {next:?}",
                    next.check_invariants(&limits)
                );
                prop_assert!(next.total_turns <= limits.max_survey_questions);
                // A collecting session must always have a question to show.
                if next.phase == SurveyPhase::Collecting {
                    prop_assert!(next.current_question().is_some());
                }
                snapshot = next;
            }
            Err(err) => {
                // Preconditions refuse with policy errors; an out-of-bounds
                // cursor would mean the routing logic let the queue run dry.
                prop_assert!(
                    err.is_policy(),
                    "non-policy transition error {err} from {snapshot:?}"
                );
            }
        }
    }
    Ok(snapshot)
}

proptest! {
    #[test]
    fn invariants_hold_over_random_event_sequences(
        initial in 1usize..6,
        steps in proptest::collection::vec((arb_step(), any::<bool>()), 0..40),
    ) {
        drive(initial, steps)?;
    }

    #[test]
    fn skip_streak_is_bounded_by_the_cap(
        initial in 3usize..6,
        steps in proptest::collection::vec((arb_step(), Just(true)), 0..40),
    ) {
        let snapshot = drive(initial, steps)?;
        prop_assert!(snapshot.consecutive_skips <= SurveyLimits::default().max_consecutive_skips);
    }

    #[test]
    fn asked_texts_cover_the_queue_exactly(
        initial in 1usize..6,
        steps in proptest::collection::vec((arb_step(), any::<bool>()), 0..40),
    ) {
        let snapshot = drive(initial, steps)?;
        // One dedup entry per queued question, no strays: the guard grows
        // with the queue and only with the queue.
        prop_assert_eq!(
            snapshot.asked_question_texts.len(),
            snapshot.ordered_questions.len()
        );
    }

    #[test]
    fn edit_always_preserves_the_answer_prefix(
        initial in 4usize..6,
        answers_before in 2usize..4,
        target in 1usize..3,
    ) {
        let limits = SurveyLimits::default();
        let mut snapshot = fresh_session(initial);
        for _ in 0..answers_before {
            snapshot = transition(
                &snapshot,
                &limits,
                Event::Answer { value: AnswerValue::Single("opt".to_string()) },
                now(),
            )
            .unwrap()
            .snapshot;
        }
        let before = snapshot.answers.clone();

        prop_assume!(target <= before.len());
        let result = transition(
            &snapshot,
            &limits,
            Event::Edit {
                question_number: target,
                value: AnswerValue::Single("edited".to_string()),
            },
            now(),
        )
        .unwrap();

        let after = result.snapshot.answers;
        prop_assert_eq!(after.len(), target);
        prop_assert_eq!(&after[..target - 1], &before[..target - 1]);
        prop_assert_eq!(after[target - 1].value.as_text(), "edited");
    }
}
