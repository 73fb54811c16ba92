//! Error taxonomy shared by the manager and its listeners.

use std::io;

use serde::{Deserialize, Serialize};

use crate::types::RequestId;

/// Errors returned by manager operations or carried in a terminal
/// [`TransferOutcome`](crate::TransferOutcome).
///
/// Validation and resource errors are usually returned synchronously.
/// Transport and server errors only ever arrive through a callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransferError {
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("file already exists: {0}")]
    FileAlreadyExists(String),

    #[error("storage full")]
    StorageFull,

    #[error("illegal access: {0}")]
    IllegalAccess(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("operation already in progress")]
    InProgress,

    #[error("request not found: {0}")]
    NotFound(RequestId),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("server error {code}: {message}")]
    ServerError { code: String, message: String },

    #[error("timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(String),
}

impl TransferError {
    /// Maps a local I/O failure onto the taxonomy.
    pub fn from_io(err: &io::Error, context: &str) -> Self {
        match err.kind() {
            io::ErrorKind::StorageFull => Self::StorageFull,
            io::ErrorKind::OutOfMemory => Self::OutOfMemory,
            io::ErrorKind::PermissionDenied => Self::IllegalAccess(context.to_string()),
            io::ErrorKind::AlreadyExists => Self::FileAlreadyExists(context.to_string()),
            io::ErrorKind::TimedOut => Self::Timeout,
            io::ErrorKind::NotFound => Self::InvalidArg(format!("{context}: not found")),
            _ => Self::Io(format!("{context}: {err}")),
        }
    }

    /// Returns `true` for errors that originate on the network side.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::ServerError { .. } | Self::Timeout
        )
    }
}
