use lt_core::{DocumentId, DocumentLocation, TimelineError};
use thiserror::Error;

use crate::peer::PeerId;

/// Errors raised by the sync layer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The document is not open in the coordinator's timeline.
    #[error("unknown document: {0}")]
    UnknownDocument(DocumentId),
    /// Any other engine failure.
    #[error(transparent)]
    Timeline(TimelineError),
    /// The peer's receiving side is gone.
    #[error("peer {0} is closed")]
    PeerClosed(PeerId),
    #[error("failed to encode sync message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode sync message: {0}")]
    Decode(#[source] serde_json::Error),
    /// No peer has announced a selected time yet.
    #[error("no selected time received")]
    NoSelectedTime,
    /// The line has no calculated time (document not indexed).
    #[error("no time known at {0}")]
    NoTimeAtLine(DocumentLocation),
    /// Reconciliation already set this document's offset.
    #[error("document {0} is synced from its peers")]
    ExternallySynced(DocumentId),
}

impl From<TimelineError> for SyncError {
    fn from(err: TimelineError) -> Self {
        match err {
            TimelineError::UnknownDocument(id) => Self::UnknownDocument(id),
            other => Self::Timeline(other),
        }
    }
}
