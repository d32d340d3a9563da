use serde::{Deserialize, Serialize};

/// Stages a single quote submission moves through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionState {
    Received,
    Validated,
    Rejected,
    Rendered,
    RenderFailed,
    Archived,
    ArchiveSkipped,
    ArchiveFailed,
    Notified,
    NotifyFailed,
    NotifySkipped,
    DownloadReturned,
    Responded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionEvent {
    PayloadAccepted,
    PayloadRejected,
    RenderSucceeded,
    RenderFailed,
    ArchiveStored,
    ArchiveSkipped,
    ArchiveFailed,
    NotificationSent,
    NotificationFailed,
    NotificationSkipped,
    DownloadPrepared,
    ResponseSent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionAction {
    RenderDocument,
    ArchiveDocument,
    DispatchNotification,
    ReturnDownload,
    RespondSuccess,
    RespondError,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: SubmissionState,
    pub to: SubmissionState,
    pub event: SubmissionEvent,
    pub actions: Vec<SubmissionAction>,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Responded)
    }

    /// States after which exactly one response must be produced.
    pub fn awaits_response(&self) -> bool {
        matches!(
            self,
            Self::Rejected
                | Self::RenderFailed
                | Self::Notified
                | Self::NotifyFailed
                | Self::DownloadReturned
        )
    }
}
