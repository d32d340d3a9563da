use thiserror::Error;

use crate::flows::states::{SubmissionAction, SubmissionEvent, SubmissionState, TransitionOutcome};

/// Transition table for one quote submission:
///
/// ```text
/// Received -> Validated -> Rendered -> {Archived | ArchiveSkipped | ArchiveFailed}
///          -> {Notified | NotifyFailed | NotifySkipped -> DownloadReturned} -> Responded
/// ```
///
/// Rejected and RenderFailed short-circuit straight to Responded. Archive outcomes never
/// block the notification step.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubmissionFlow;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: SubmissionState, event: SubmissionEvent },
}

impl SubmissionFlow {
    pub fn initial_state(&self) -> SubmissionState {
        SubmissionState::Received
    }

    pub fn apply(
        &self,
        current: SubmissionState,
        event: SubmissionEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        use SubmissionAction::{
            ArchiveDocument, DispatchNotification, RenderDocument, RespondError, RespondSuccess,
            ReturnDownload,
        };
        use SubmissionEvent as E;
        use SubmissionState as S;

        let (to, actions) = match (current, event) {
            (S::Received, E::PayloadAccepted) => (S::Validated, vec![RenderDocument]),
            (S::Received, E::PayloadRejected) => (S::Rejected, vec![RespondError]),
            (S::Validated, E::RenderSucceeded) => {
                (S::Rendered, vec![ArchiveDocument, DispatchNotification])
            }
            (S::Validated, E::RenderFailed) => (S::RenderFailed, vec![RespondError]),
            (S::Rendered, E::ArchiveStored) => (S::Archived, Vec::new()),
            (S::Rendered, E::ArchiveSkipped) => (S::ArchiveSkipped, Vec::new()),
            (S::Rendered, E::ArchiveFailed) => (S::ArchiveFailed, Vec::new()),
            (S::Archived | S::ArchiveSkipped | S::ArchiveFailed, E::NotificationSent) => {
                (S::Notified, vec![RespondSuccess])
            }
            (S::Archived | S::ArchiveSkipped | S::ArchiveFailed, E::NotificationFailed) => {
                (S::NotifyFailed, vec![RespondError])
            }
            (S::Archived | S::ArchiveSkipped | S::ArchiveFailed, E::NotificationSkipped) => {
                (S::NotifySkipped, vec![ReturnDownload])
            }
            (S::NotifySkipped, E::DownloadPrepared) => (S::DownloadReturned, Vec::new()),
            (state, E::ResponseSent) if state.awaits_response() => (S::Responded, Vec::new()),
            _ => return Err(FlowTransitionError::InvalidTransition { state: current, event }),
        };

        Ok(TransitionOutcome { from: current, to, event, actions })
    }
}

/// Running record of one submission's transitions.
#[derive(Clone, Debug)]
pub struct SubmissionTrail {
    flow: SubmissionFlow,
    state: SubmissionState,
    history: Vec<TransitionOutcome>,
}

impl Default for SubmissionTrail {
    fn default() -> Self {
        let flow = SubmissionFlow;
        Self { state: flow.initial_state(), flow, history: Vec::new() }
    }
}

impl SubmissionTrail {
    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn record(
        &mut self,
        event: SubmissionEvent,
    ) -> Result<&TransitionOutcome, FlowTransitionError> {
        let outcome = self.flow.apply(self.state, event)?;
        self.state = outcome.to;
        self.history.push(outcome);
        Ok(&self.history[self.history.len() - 1])
    }

    /// States visited so far, starting with `Received`.
    pub fn path(&self) -> Vec<SubmissionState> {
        std::iter::once(self.flow.initial_state())
            .chain(self.history.iter().map(|outcome| outcome.to))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::flows::engine::{FlowTransitionError, SubmissionFlow, SubmissionTrail};
    use crate::flows::states::{SubmissionAction, SubmissionEvent, SubmissionState};

    #[test]
    fn delivered_path_reaches_responded() {
        let mut trail = SubmissionTrail::default();
        for event in [
            SubmissionEvent::PayloadAccepted,
            SubmissionEvent::RenderSucceeded,
            SubmissionEvent::ArchiveFailed,
            SubmissionEvent::NotificationSent,
            SubmissionEvent::ResponseSent,
        ] {
            trail.record(event).expect("valid transition");
        }

        assert_eq!(
            trail.path(),
            vec![
                SubmissionState::Received,
                SubmissionState::Validated,
                SubmissionState::Rendered,
                SubmissionState::ArchiveFailed,
                SubmissionState::Notified,
                SubmissionState::Responded,
            ]
        );
        assert!(trail.state().is_terminal());
    }

    #[test]
    fn rendered_schedules_archive_and_notification() {
        let outcome = SubmissionFlow
            .apply(SubmissionState::Validated, SubmissionEvent::RenderSucceeded)
            .expect("validated -> rendered");

        assert_eq!(
            outcome.actions,
            vec![SubmissionAction::ArchiveDocument, SubmissionAction::DispatchNotification]
        );
    }

    #[test]
    fn skipped_notification_returns_download() {
        let mut trail = SubmissionTrail::default();
        trail.record(SubmissionEvent::PayloadAccepted).expect("accepted");
        trail.record(SubmissionEvent::RenderSucceeded).expect("rendered");
        trail.record(SubmissionEvent::ArchiveSkipped).expect("archive skipped");
        let skipped = trail.record(SubmissionEvent::NotificationSkipped).expect("notify skipped");
        assert_eq!(skipped.actions, vec![SubmissionAction::ReturnDownload]);

        trail.record(SubmissionEvent::DownloadPrepared).expect("download");
        trail.record(SubmissionEvent::ResponseSent).expect("responded");
        assert_eq!(trail.state(), SubmissionState::Responded);
    }

    #[test]
    fn render_failure_cannot_reach_archival() {
        let mut trail = SubmissionTrail::default();
        trail.record(SubmissionEvent::PayloadAccepted).expect("accepted");
        trail.record(SubmissionEvent::RenderFailed).expect("render failed");

        let error = trail.record(SubmissionEvent::ArchiveStored).expect_err("no archive");
        assert_eq!(
            error,
            FlowTransitionError::InvalidTransition {
                state: SubmissionState::RenderFailed,
                event: SubmissionEvent::ArchiveStored,
            }
        );

        trail.record(SubmissionEvent::ResponseSent).expect("error response");
        assert_eq!(trail.state(), SubmissionState::Responded);
    }

    #[test]
    fn only_one_response_is_allowed() {
        let mut trail = SubmissionTrail::default();
        trail.record(SubmissionEvent::PayloadRejected).expect("rejected");
        trail.record(SubmissionEvent::ResponseSent).expect("first response");

        assert!(trail.record(SubmissionEvent::ResponseSent).is_err());
    }

    #[test]
    fn notification_requires_a_settled_archive_step() {
        let error = SubmissionFlow
            .apply(SubmissionState::Rendered, SubmissionEvent::NotificationSent)
            .expect_err("archive outcome first");

        assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));
    }
}
