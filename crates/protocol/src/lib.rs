//! Shared value types for the content transfer manager.
//!
//! Everything here is plain data: request and content identifiers, the
//! record snapshot handed out by listing operations, terminal outcomes,
//! listener events and the error taxonomy.

pub mod error;
pub mod events;
pub mod types;

// Re-export primary types for convenience.
pub use error::TransferError;
pub use events::TransferEvent;
pub use types::{
    ContentId, RequestId, TransferInfo, TransferKind, TransferOutcome, TransferStatus,
};
