//! Bounded, cancellable content transfer manager.
//!
//! Downloads to files or memory and uploads local files, running at most
//! [`SLOT_COUNT`] transfers at a time and queueing the rest in submission
//! order. Outcomes, progress and cancellations are reported to a
//! [`TransferListener`] from a dedicated dispatch thread.

pub mod config;
mod dispatcher;
pub mod fs;
pub mod listener;
mod manager;
pub mod registry;
mod slot;
mod store;
mod ticker;
pub mod transport;
pub mod validation;

pub use config::ManagerConfig;
pub use content_transfer_protocol::{
    ContentId, RequestId, TransferError, TransferEvent, TransferInfo, TransferKind,
    TransferOutcome, TransferStatus,
};
pub use fs::{FileSystem, LocalFileSystem};
pub use listener::{ChannelListener, TransferListener};
pub use manager::{TransferManager, TransferManagerBuilder};
pub use registry::ContentRegistry;
pub use slot::SLOT_COUNT;
pub use transport::{HttpTransport, Transport, TransportError};
