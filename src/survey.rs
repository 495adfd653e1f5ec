//! Survey session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! every user event maps to a new snapshot plus a list of effects for the
//! orchestrator to execute.

mod effect;
pub mod event;
pub mod snapshot;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, TurnOutcome};
pub use event::Event;
pub use snapshot::{
    AnswerRecord, AnswerValue, Artifact, InvariantError, Question, SentimentBand, Snapshot,
    SurveyLimits, SurveyPhase, UpstreamContext,
};
pub use transition::{
    absorb_followups, transition, FollowupOutcome, TransitionError, TransitionResult,
};
