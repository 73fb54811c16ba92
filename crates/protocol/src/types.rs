use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TransferError;

/// Process-unique identifier of an admitted transfer request.
///
/// Assigned monotonically by the manager, starting at 1. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier handed out by the content registry for a downloaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub uuid::Uuid);

impl ContentId {
    /// Generates a fresh random id.
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a transfer moves, and where the bytes end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    #[serde(rename = "download")]
    Download,
    #[serde(rename = "download_to_buffer")]
    DownloadToBuffer,
    #[serde(rename = "upload")]
    Upload,
}

/// Lifecycle state of a transfer record.
///
/// Transitions only move forward: `Queued -> Active -> {Completed, Canceled}`
/// or `Queued -> Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    #[serde(rename = "queued")]
    Queued,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "canceled")]
    Canceled,
}

impl TransferStatus {
    /// Returns `true` for `Completed` and `Canceled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }
}

/// Result of a finished transfer as seen by listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub result: Result<(), TransferError>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_error_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_error_msg: String,
}

impl TransferOutcome {
    /// A successful outcome.
    pub fn success() -> Self {
        Self {
            result: Ok(()),
            server_error_code: String::new(),
            server_error_msg: String::new(),
        }
    }

    /// A failed outcome. Server code and message are lifted out of
    /// [`TransferError::ServerError`] so listeners can read them directly.
    pub fn failure(err: TransferError) -> Self {
        let (code, msg) = match &err {
            TransferError::ServerError { code, message } => (code.clone(), message.clone()),
            _ => (String::new(), String::new()),
        };
        Self {
            result: Err(err),
            server_error_code: code,
            server_error_msg: msg,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Immutable snapshot of a transfer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInfo {
    pub request_id: RequestId,
    pub kind: TransferKind,
    pub status: TransferStatus,
    pub uri: String,
    /// Destination for downloads, source for uploads, empty for buffers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local_path: String,
    /// Zero when the transport has not reported a size.
    pub total_size: u64,
    pub transferred_size: u64,
    pub timeout_secs: u32,
    pub progress_interval_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TransferOutcome>,
}

impl TransferInfo {
    /// Returns the progress as a percentage (0-100), or `None` when the
    /// total size is unknown.
    pub fn percentage(&self) -> Option<f64> {
        if self.total_size == 0 {
            return None;
        }
        let pct = (self.transferred_size as f64 / self.total_size as f64) * 100.0;
        Some(pct.min(100.0))
    }
}
