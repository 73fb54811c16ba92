//! Listener dispatch thread.
//!
//! Callbacks run on one dedicated thread, in the order the manager queued
//! them. Each callback runs while its record's gate is held, so a cancel
//! or remove for the same request waits until the callback returns.

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use content_transfer_protocol::{RequestId, TransferError, TransferEvent};
use tracing::{debug, trace, warn};

use crate::listener::{TransferListener, deliver};
use crate::store::lock;

thread_local! {
    static ON_DISPATCH_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Returns `true` when called from inside a listener callback.
pub(crate) fn on_dispatch_thread() -> bool {
    ON_DISPATCH_THREAD.with(Cell::get)
}

/// What the dispatch thread may ask of the manager.
pub(crate) trait DispatchTarget: Send + Sync + 'static {
    /// Whether progress for `id` is still worth delivering.
    fn is_active(&self, id: RequestId) -> bool;

    /// Listener used when a request has none of its own.
    fn default_listener(&self) -> Option<Arc<dyn TransferListener>>;
}

/// A queued callback.
pub(crate) struct Dispatch {
    pub gate: Arc<Mutex<()>>,
    pub listener: Option<Arc<dyn TransferListener>>,
    pub event: TransferEvent,
}

/// Sending half of the dispatch queue. The thread exits once this is
/// dropped and the queue has drained.
pub(crate) struct Dispatcher {
    tx: Mutex<Option<mpsc::Sender<Dispatch>>>,
}

impl Dispatcher {
    pub fn spawn(target: Arc<dyn DispatchTarget>) -> Result<Self, TransferError> {
        let (tx, rx) = mpsc::channel::<Dispatch>();
        thread::Builder::new()
            .name("transfer-dispatch".into())
            .spawn(move || run(target, rx))
            .map_err(|e| TransferError::from_io(&e, "spawning dispatch thread"))?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
        })
    }

    pub fn send_all(&self, dispatches: Vec<Dispatch>) {
        if dispatches.is_empty() {
            return;
        }
        let tx = lock(&self.tx);
        let Some(tx) = tx.as_ref() else {
            return;
        };
        for dispatch in dispatches {
            if tx.send(dispatch).is_err() {
                warn!("dispatch thread is gone; dropping callbacks");
                return;
            }
        }
    }

    /// Stops accepting callbacks. Already queued ones still run.
    pub fn close(&self) {
        lock(&self.tx).take();
    }
}

fn run(target: Arc<dyn DispatchTarget>, rx: mpsc::Receiver<Dispatch>) {
    ON_DISPATCH_THREAD.with(|flag| flag.set(true));
    debug!("dispatch thread started");

    for Dispatch {
        gate,
        listener,
        event,
    } in rx
    {
        let _held = lock(&gate);
        let request_id = event.request_id();

        if !event.is_terminal() && !target.is_active(request_id) {
            trace!(request = %request_id, "dropping stale progress");
            continue;
        }

        let Some(listener) = listener.or_else(|| target.default_listener()) else {
            continue;
        };

        if catch_unwind(AssertUnwindSafe(|| deliver(listener.as_ref(), event))).is_err() {
            warn!(request = %request_id, "listener panicked");
        }
    }

    debug!("dispatch thread stopped");
}
