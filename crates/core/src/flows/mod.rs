pub mod engine;
pub mod states;

pub use engine::{FlowTransitionError, SubmissionFlow, SubmissionTrail};
pub use states::{SubmissionAction, SubmissionEvent, SubmissionState, TransitionOutcome};
