//! Events that can occur in a survey session

use crate::survey::snapshot::AnswerValue;

/// Events that trigger state transitions.
#[derive(Debug, Clone)]
pub enum Event {
    /// Answer the question at the cursor.
    Answer { value: AnswerValue },

    /// Skip the question at the cursor without answering.
    Skip,

    /// Replace a past answer and discard everything downstream of it.
    /// `question_number` is 1-indexed over *answered* questions.
    Edit {
        question_number: usize,
        value: AnswerValue,
    },
}
