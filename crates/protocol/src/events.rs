use serde::{Deserialize, Serialize};

use crate::types::{ContentId, RequestId, TransferOutcome};

/// Listener notification in value form, for channel-based consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferEvent {
    Progress {
        request_id: RequestId,
        transferred: u64,
    },
    DownloadCompleted {
        request_id: RequestId,
        content_id: Option<ContentId>,
        outcome: TransferOutcome,
    },
    DownloadToBufferCompleted {
        request_id: RequestId,
        buffer: Vec<u8>,
        outcome: TransferOutcome,
    },
    UploadCompleted {
        request_id: RequestId,
        outcome: TransferOutcome,
    },
    Canceled {
        request_id: RequestId,
        outcome: TransferOutcome,
    },
}

impl TransferEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Progress { request_id, .. }
            | Self::DownloadCompleted { request_id, .. }
            | Self::DownloadToBufferCompleted { request_id, .. }
            | Self::UploadCompleted { request_id, .. }
            | Self::Canceled { request_id, .. } => *request_id,
        }
    }

    /// Returns `true` for every event except progress.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }

    /// Returns the terminal outcome, if this is a terminal event.
    pub fn outcome(&self) -> Option<&TransferOutcome> {
        match self {
            Self::Progress { .. } => None,
            Self::DownloadCompleted { outcome, .. }
            | Self::DownloadToBufferCompleted { outcome, .. }
            | Self::UploadCompleted { outcome, .. }
            | Self::Canceled { outcome, .. } => Some(outcome),
        }
    }
}
