//! Content registration collaborator.
//!
//! Files downloaded under a configured media root are announced to the
//! content database through this trait. The manager only calls it.

use std::path::Path;

use content_transfer_protocol::{ContentId, TransferError};

/// Registers downloaded media with an external content database.
pub trait ContentRegistry: Send + Sync {
    /// Registers the file at `path` and returns its content id.
    fn register(&self, path: &Path) -> Result<ContentId, TransferError>;

    /// Withdraws `id` after its download was canceled past registration.
    fn unregister(&self, _id: &ContentId) -> Result<(), TransferError> {
        Ok(())
    }
}

impl<F> ContentRegistry for F
where
    F: Fn(&Path) -> Result<ContentId, TransferError> + Send + Sync,
{
    fn register(&self, path: &Path) -> Result<ContentId, TransferError> {
        self(path)
    }
}
