//! Listener callbacks.

use content_transfer_protocol::{ContentId, RequestId, TransferEvent, TransferOutcome};
use tokio::sync::mpsc;

/// Receives transfer notifications.
///
/// Every method has a no-op default, so implementors override only what
/// they care about and new callbacks can be added without breaking them.
/// Callbacks run on the manager's dispatch thread, one at a time; keep
/// them short.
pub trait TransferListener: Send + Sync {
    /// Bytes transferred so far for an active request.
    fn on_transfer_progress(&self, _request_id: RequestId, _transferred: u64) {}

    /// A download to a file finished (successfully or not). `content_id`
    /// is set when the file was registered as media content.
    fn on_download_completed(
        &self,
        _request_id: RequestId,
        _content_id: Option<ContentId>,
        _outcome: &TransferOutcome,
    ) {
    }

    /// A download to memory finished. `buffer` is empty on failure.
    fn on_download_to_buffer_completed(
        &self,
        _request_id: RequestId,
        _buffer: Vec<u8>,
        _outcome: &TransferOutcome,
    ) {
    }

    /// An upload finished.
    fn on_upload_completed(&self, _request_id: RequestId, _outcome: &TransferOutcome) {}

    /// A request was canceled, by the caller or by a timeout. A timeout
    /// carries `Err(TransferError::Timeout)`.
    fn on_transfer_canceled(&self, _request_id: RequestId, _outcome: &TransferOutcome) {}
}

/// Invokes the callback matching `event`.
pub(crate) fn deliver(listener: &dyn TransferListener, event: TransferEvent) {
    match event {
        TransferEvent::Progress {
            request_id,
            transferred,
        } => listener.on_transfer_progress(request_id, transferred),
        TransferEvent::DownloadCompleted {
            request_id,
            content_id,
            outcome,
        } => listener.on_download_completed(request_id, content_id, &outcome),
        TransferEvent::DownloadToBufferCompleted {
            request_id,
            buffer,
            outcome,
        } => listener.on_download_to_buffer_completed(request_id, buffer, &outcome),
        TransferEvent::UploadCompleted {
            request_id,
            outcome,
        } => listener.on_upload_completed(request_id, &outcome),
        TransferEvent::Canceled {
            request_id,
            outcome,
        } => listener.on_transfer_canceled(request_id, &outcome),
    }
}

/// Listener that forwards every callback as a [`TransferEvent`] into an
/// unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

impl ChannelListener {
    /// Creates a listener and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: TransferEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl TransferListener for ChannelListener {
    fn on_transfer_progress(&self, request_id: RequestId, transferred: u64) {
        self.send(TransferEvent::Progress {
            request_id,
            transferred,
        });
    }

    fn on_download_completed(
        &self,
        request_id: RequestId,
        content_id: Option<ContentId>,
        outcome: &TransferOutcome,
    ) {
        self.send(TransferEvent::DownloadCompleted {
            request_id,
            content_id,
            outcome: outcome.clone(),
        });
    }

    fn on_download_to_buffer_completed(
        &self,
        request_id: RequestId,
        buffer: Vec<u8>,
        outcome: &TransferOutcome,
    ) {
        self.send(TransferEvent::DownloadToBufferCompleted {
            request_id,
            buffer,
            outcome: outcome.clone(),
        });
    }

    fn on_upload_completed(&self, request_id: RequestId, outcome: &TransferOutcome) {
        self.send(TransferEvent::UploadCompleted {
            request_id,
            outcome: outcome.clone(),
        });
    }

    fn on_transfer_canceled(&self, request_id: RequestId, outcome: &TransferOutcome) {
        self.send(TransferEvent::Canceled {
            request_id,
            outcome: outcome.clone(),
        });
    }
}
