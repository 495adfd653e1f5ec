//! Effects produced by state transitions
//!
//! Transitions are pure; anything that touches a supplier or the store is
//! described here and executed by the orchestrator.

use serde::{Deserialize, Serialize};

/// Effects to be executed after a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Ask the question supplier for up to `count` follow-up questions and
    /// absorb the validated ones into the snapshot.
    FetchFollowups { count: usize },

    /// Mirror a resolved turn to the append-only audit log.
    AuditTurn {
        question_index: usize,
        outcome: TurnOutcome,
    },
}

/// How a turn was resolved, for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Answered,
    Skipped,
    Edited,
}

impl TurnOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnOutcome::Answered => "answered",
            TurnOutcome::Skipped => "skipped",
            TurnOutcome::Edited => "edited",
        }
    }
}
