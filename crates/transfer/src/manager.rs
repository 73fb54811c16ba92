//! The transfer manager.
//!
//! [`TransferManager`] is a cheap, clonable handle. All bookkeeping lives
//! behind one mutex in the shared core; a background driver task runs the
//! ticker and consumes worker reports, and a dispatch thread delivers
//! listener callbacks.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use content_transfer_protocol::{
    ContentId, RequestId, TransferError, TransferEvent, TransferInfo, TransferKind,
    TransferOutcome, TransferStatus,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::dispatcher::{Dispatch, DispatchTarget, Dispatcher, on_dispatch_thread};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::listener::TransferListener;
use crate::registry::ContentRegistry;
use crate::slot::{
    AbortNotice, Job, SlotOutcome, SlotPool, SlotReport, WorkerContext, WorkerResult,
};
use crate::store::{Defaults, TransferRecord, TransferStore, lock};
use crate::ticker;
use crate::transport::{HttpTransport, Transport};
use crate::validation::{
    join_uri, validate_download_destination, validate_relative_path, validate_upload_source,
};

/// Everything guarded by the manager mutex.
struct State {
    store: TransferStore,
    pool: SlotPool,
    defaults: Defaults,
    closed: bool,
}

impl State {
    fn ensure_open(&self) -> Result<(), TransferError> {
        if self.closed {
            return Err(TransferError::InvalidState(
                "transfer manager is shut down".into(),
            ));
        }
        Ok(())
    }
}

/// State shared with the dispatch thread.
struct Core {
    state: Mutex<State>,
    default_listener: RwLock<Option<Arc<dyn TransferListener>>>,
}

impl DispatchTarget for Core {
    fn is_active(&self, id: RequestId) -> bool {
        lock(&self.state)
            .store
            .get(id)
            .is_some_and(|r| r.status == TransferStatus::Active)
    }

    fn default_listener(&self) -> Option<Arc<dyn TransferListener>> {
        self.default_listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct Shared {
    core: Arc<Core>,
    dispatcher: Dispatcher,
    workers: WorkerContext,
    config: ManagerConfig,
    shutdown: CancellationToken,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.core.state)
    }

    /// Moves queued records into free slots, oldest first.
    fn promote(&self, state: &mut State) {
        if state.closed {
            return;
        }
        while let Some(slot) = state.pool.free_slot() {
            let Some(id) = state.store.activate_head(slot, Instant::now()) else {
                break;
            };
            let Some(record) = state.store.get(id) else {
                continue;
            };
            let job = job_for(record, self.config.max_buffer_size);
            debug!(
                request = %id,
                slot,
                queued = state.store.pending_len(),
                "transfer activated"
            );
            state.pool.start(slot, id, job, &self.workers);
        }
    }
}

fn job_for(record: &TransferRecord, max_buffer_size: usize) -> Job {
    match record.kind {
        TransferKind::Download => Job::Download {
            uri: record.uri.clone(),
            dest: record.dest_path.clone().unwrap_or_default(),
            replace: record.replace,
        },
        TransferKind::DownloadToBuffer => Job::DownloadToBuffer {
            uri: record.uri.clone(),
            max_size: max_buffer_size,
        },
        TransferKind::Upload => Job::Upload {
            source: record.source_path.clone().unwrap_or_default(),
            uri: record.uri.clone(),
            replace: record.replace,
            total_size: record.total_size,
        },
    }
}

/// Cancels `id` under the state lock. Queued records yield their
/// callback right away; active ones get it once the worker reports.
fn cancel_locked(
    state: &mut State,
    id: RequestId,
    outcome: TransferOutcome,
) -> Result<Option<Dispatch>, TransferError> {
    let record = state.store.get(id).ok_or(TransferError::NotFound(id))?;
    let listener = record.listener.clone();
    let gate = Arc::clone(&record.gate);

    match state.store.cancel(id, outcome.clone())? {
        (TransferStatus::Active, Some(slot)) => {
            state.pool.abort(
                slot,
                id,
                AbortNotice {
                    outcome,
                    listener,
                    gate,
                },
            );
            Ok(None)
        }
        _ => Ok(Some(Dispatch {
            gate,
            listener,
            event: TransferEvent::Canceled {
                request_id: id,
                outcome,
            },
        })),
    }
}

/// Holds `gate` unless we are already inside a callback.
fn hold(gate: &Mutex<()>) -> Option<MutexGuard<'_, ()>> {
    if on_dispatch_thread() {
        None
    } else {
        Some(lock(gate))
    }
}

fn completion_event(
    kind: TransferKind,
    request_id: RequestId,
    result: Result<WorkerResult, TransferError>,
) -> (TransferOutcome, TransferEvent) {
    let (outcome, payload) = match result {
        Ok(payload) => (TransferOutcome::success(), Some(payload)),
        Err(e) => (TransferOutcome::failure(e), None),
    };

    let event = match (kind, payload) {
        (_, Some(WorkerResult::Buffered(buffer))) => TransferEvent::DownloadToBufferCompleted {
            request_id,
            buffer,
            outcome: outcome.clone(),
        },
        (_, Some(WorkerResult::Downloaded { content_id })) => TransferEvent::DownloadCompleted {
            request_id,
            content_id,
            outcome: outcome.clone(),
        },
        (_, Some(WorkerResult::Uploaded)) | (TransferKind::Upload, None) => {
            TransferEvent::UploadCompleted {
                request_id,
                outcome: outcome.clone(),
            }
        }
        (TransferKind::Download, None) => TransferEvent::DownloadCompleted {
            request_id,
            content_id: None,
            outcome: outcome.clone(),
        },
        (TransferKind::DownloadToBuffer, None) => TransferEvent::DownloadToBufferCompleted {
            request_id,
            buffer: Vec::new(),
            outcome: outcome.clone(),
        },
    };
    (outcome, event)
}

/// Consumes a worker report: frees the slot, settles the record and
/// promotes the next queued request.
async fn handle_report(shared: &Shared, report: SlotReport) {
    let SlotReport {
        slot,
        request_id,
        outcome,
    } = report;

    let (dispatch, stray) = {
        let mut state = shared.state();
        let Some(occupant) = state.pool.release(slot, request_id) else {
            return;
        };

        let (transferred, total) = occupant.progress();
        if let Some(record) = state.store.get_mut(request_id) {
            record.transferred_size = transferred;
            if total > 0 {
                record.total_size = total;
            }
        }

        let settled = match occupant.abort {
            Some(notice) => {
                // Finished before it noticed the abort; the file it wrote
                // and any registration must not survive a cancel.
                let stray = match outcome {
                    SlotOutcome::Finished(Ok(WorkerResult::Downloaded { content_id })) => {
                        occupant.dest.map(|dest| (dest, content_id))
                    }
                    _ => None,
                };
                info!(request = %request_id, "transfer canceled");
                let dispatch = Dispatch {
                    gate: notice.gate,
                    listener: notice.listener,
                    event: TransferEvent::Canceled {
                        request_id,
                        outcome: notice.outcome,
                    },
                };
                (Some(dispatch), stray)
            }
            None => (finish(&mut state, request_id, outcome), None),
        };

        shared.promote(&mut state);
        debug!(
            request = %request_id,
            active = state.store.active_count(),
            busy_slots = state.pool.occupied(),
            "slot released"
        );
        settled
    };

    if let Some((path, content_id)) = stray {
        if let Err(e) = shared.workers.fs.remove(&path).await {
            warn!(path = %path.display(), error = %e, "failed to delete canceled download");
        }
        if let (Some(id), Some(registry)) = (content_id, shared.workers.registry.clone()) {
            withdraw(registry, id).await;
        }
    }
    shared.dispatcher.send_all(dispatch.into_iter().collect());
}

async fn withdraw(registry: Arc<dyn ContentRegistry>, id: ContentId) {
    match tokio::task::spawn_blocking(move || registry.unregister(&id)).await {
        Ok(Ok(())) => debug!(content = %id, "withdrew canceled registration"),
        Ok(Err(e)) => warn!(content = %id, error = %e, "failed to withdraw registration"),
        Err(e) => warn!(content = %id, error = %e, "content unregistration panicked"),
    }
}

/// Settles a record whose worker stopped without being aborted.
fn finish(state: &mut State, id: RequestId, outcome: SlotOutcome) -> Option<Dispatch> {
    let record = state.store.get(id)?;
    let kind = record.kind;
    let listener = record.listener.clone();
    let gate = Arc::clone(&record.gate);

    let result = match outcome {
        SlotOutcome::Finished(result) => result,
        SlotOutcome::Aborted => {
            // Only happens when the token fired without a recorded reason.
            return cancel_locked(state, id, TransferOutcome::success())
                .ok()
                .flatten();
        }
    };

    let (outcome, event) = completion_event(kind, id, result);
    match &outcome.result {
        Ok(()) => info!(request = %id, ?kind, "transfer completed"),
        Err(e) if e.is_transport() => warn!(request = %id, ?kind, error = %e, "transfer failed"),
        Err(e) => error!(request = %id, ?kind, error = %e, "transfer failed locally"),
    }
    state.store.complete(id, outcome).ok()?;
    Some(Dispatch {
        gate,
        listener,
        event,
    })
}

fn handle_tick(shared: &Shared) {
    let dispatches = {
        let mut state = shared.state();
        if state.closed {
            return;
        }

        let State {
            store,
            pool,
            defaults,
            ..
        } = &mut *state;
        let out = ticker::sample(store, pool, defaults, Instant::now());

        let mut dispatches = Vec::with_capacity(out.progress.len());
        for (id, transferred) in out.progress {
            let Some(record) = store.get(id) else {
                continue;
            };
            debug!(request = %id, transferred, total = record.total_size, "progress");
            dispatches.push(Dispatch {
                gate: Arc::clone(&record.gate),
                listener: record.listener.clone(),
                event: TransferEvent::Progress {
                    request_id: id,
                    transferred,
                },
            });
        }

        for id in out.timed_out {
            warn!(request = %id, "transfer timed out");
            if let Ok(Some(dispatch)) =
                cancel_locked(&mut state, id, TransferOutcome::failure(TransferError::Timeout))
            {
                dispatches.push(dispatch);
            }
        }
        dispatches
    };
    shared.dispatcher.send_all(dispatches);
}

async fn drive(shared: Arc<Shared>, mut reports: mpsc::UnboundedReceiver<SlotReport>) {
    let mut ticker = tokio::time::interval(shared.config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            Some(report) = reports.recv() => handle_report(&shared, report).await,
            _ = ticker.tick() => handle_tick(&shared),
        }
    }

    {
        let mut state = shared.state();
        state.closed = true;
        state.pool.abort_tasks();
    }
    shared.dispatcher.close();
    debug!("transfer driver stopped");
}

/// Builder for [`TransferManager`].
pub struct TransferManagerBuilder {
    transport: Arc<dyn Transport>,
    fs: Arc<dyn FileSystem>,
    registry: Option<Arc<dyn ContentRegistry>>,
    config: ManagerConfig,
    default_listener: Option<Arc<dyn TransferListener>>,
}

impl TransferManagerBuilder {
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn content_registry(mut self, registry: Arc<dyn ContentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn default_listener(mut self, listener: Arc<dyn TransferListener>) -> Self {
        self.default_listener = Some(listener);
        self
    }

    /// Starts the driver task and the dispatch thread.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<TransferManager, TransferError> {
        let runtime = Handle::try_current().map_err(|_| {
            TransferError::InvalidState("transfer manager needs a tokio runtime".into())
        })?;

        let config = self.config;
        let core = Arc::new(Core {
            state: Mutex::new(State {
                store: TransferStore::new(),
                pool: SlotPool::new(),
                defaults: Defaults {
                    timeout_secs: config.default_timeout_secs,
                    progress_interval_percent: config.progress_interval_percent.min(100),
                },
                closed: false,
            }),
            default_listener: RwLock::new(self.default_listener),
        });
        let dispatcher = Dispatcher::spawn(Arc::clone(&core) as Arc<dyn DispatchTarget>)?;

        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let workers = WorkerContext {
            transport: self.transport,
            fs: self.fs,
            registry: self.registry,
            media_roots: config.media_roots.clone().into(),
            chunk_size: config.effective_chunk_size(),
            reports: reports_tx,
            runtime: runtime.clone(),
        };

        let shutdown = CancellationToken::new();
        let shared = Arc::new(Shared {
            core,
            dispatcher,
            workers,
            config,
            shutdown: shutdown.clone(),
        });
        runtime.spawn(drive(Arc::clone(&shared), reports_rx));

        info!(
            tick_ms = shared.config.tick_interval().as_millis() as u64,
            "transfer manager started"
        );
        Ok(TransferManager {
            shared,
            _guard: Arc::new(shutdown.drop_guard()),
        })
    }
}

/// Handle to a running transfer manager.
///
/// Clones share the same manager. Dropping the last clone stops it.
#[derive(Clone)]
pub struct TransferManager {
    shared: Arc<Shared>,
    _guard: Arc<DropGuard>,
}

impl TransferManager {
    pub fn builder(transport: Arc<dyn Transport>) -> TransferManagerBuilder {
        TransferManagerBuilder {
            transport,
            fs: Arc::new(LocalFileSystem),
            registry: None,
            config: ManagerConfig::default(),
            default_listener: None,
        }
    }

    /// Builds a manager that talks HTTP through [`HttpTransport`].
    pub fn with_http(config: ManagerConfig) -> Result<Self, TransferError> {
        let transport = HttpTransport::new(config.connect_timeout())?;
        Self::builder(Arc::new(transport)).config(config).build()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.state()
    }

    /// Downloads `uri` into the file at `dest`.
    pub fn download(
        &self,
        uri: &str,
        dest: impl AsRef<Path>,
        replace: bool,
        timeout_secs: u32,
        progress_percent: u8,
    ) -> Result<RequestId, TransferError> {
        self.submit_download(uri, dest.as_ref(), replace, timeout_secs, progress_percent, None)
    }

    /// Like [`download`](Self::download), reporting to `listener`.
    pub fn download_with_listener(
        &self,
        uri: &str,
        dest: impl AsRef<Path>,
        replace: bool,
        timeout_secs: u32,
        progress_percent: u8,
        listener: Arc<dyn TransferListener>,
    ) -> Result<RequestId, TransferError> {
        self.submit_download(
            uri,
            dest.as_ref(),
            replace,
            timeout_secs,
            progress_percent,
            Some(listener),
        )
    }

    /// Downloads `uri` into memory.
    pub fn download_to_buffer(
        &self,
        uri: &str,
        timeout_secs: u32,
        progress_percent: u8,
    ) -> Result<RequestId, TransferError> {
        self.submit_buffer(uri, timeout_secs, progress_percent, None)
    }

    pub fn download_to_buffer_with_listener(
        &self,
        uri: &str,
        timeout_secs: u32,
        progress_percent: u8,
        listener: Arc<dyn TransferListener>,
    ) -> Result<RequestId, TransferError> {
        self.submit_buffer(uri, timeout_secs, progress_percent, Some(listener))
    }

    /// Uploads the local file `src` to `dest`, relative to the configured
    /// upload base. Returns the request id and the target URI.
    pub fn upload(
        &self,
        src: impl AsRef<Path>,
        dest: &str,
        replace: bool,
    ) -> Result<(RequestId, String), TransferError> {
        self.submit_upload(src.as_ref(), dest, replace, None)
    }

    pub fn upload_with_listener(
        &self,
        src: impl AsRef<Path>,
        dest: &str,
        replace: bool,
        listener: Arc<dyn TransferListener>,
    ) -> Result<(RequestId, String), TransferError> {
        self.submit_upload(src.as_ref(), dest, replace, Some(listener))
    }

    fn submit_download(
        &self,
        uri: &str,
        dest: &Path,
        replace: bool,
        timeout_secs: u32,
        progress_percent: u8,
        listener: Option<Arc<dyn TransferListener>>,
    ) -> Result<RequestId, TransferError> {
        self.state().ensure_open()?;
        check_uri(uri)?;
        check_percent(progress_percent)?;
        validate_download_destination(
            dest,
            &self.shared.config.allowed_roots,
            replace,
            self.shared.workers.fs.as_ref(),
        )?;

        self.admit(Some(dest), |id| {
            let mut record = TransferRecord::new(id, TransferKind::Download, uri.to_string());
            record.dest_path = Some(dest.to_path_buf());
            record.replace = replace;
            record.timeout_secs = timeout_secs;
            record.progress_interval_percent = progress_percent;
            record.listener = listener;
            record
        })
    }

    fn submit_buffer(
        &self,
        uri: &str,
        timeout_secs: u32,
        progress_percent: u8,
        listener: Option<Arc<dyn TransferListener>>,
    ) -> Result<RequestId, TransferError> {
        self.state().ensure_open()?;
        check_uri(uri)?;
        check_percent(progress_percent)?;

        self.admit(None, |id| {
            let mut record =
                TransferRecord::new(id, TransferKind::DownloadToBuffer, uri.to_string());
            record.timeout_secs = timeout_secs;
            record.progress_interval_percent = progress_percent;
            record.listener = listener;
            record
        })
    }

    fn submit_upload(
        &self,
        src: &Path,
        dest: &str,
        replace: bool,
        listener: Option<Arc<dyn TransferListener>>,
    ) -> Result<(RequestId, String), TransferError> {
        self.state().ensure_open()?;
        let size = validate_upload_source(src, self.shared.workers.fs.as_ref())?;
        validate_relative_path(dest)?;
        let base = self
            .shared
            .config
            .upload_base_uri
            .as_deref()
            .ok_or_else(|| TransferError::InvalidState("no upload base URI configured".into()))?;
        let uri = join_uri(base, dest);

        let id = self.admit(None, |id| {
            let mut record = TransferRecord::new(id, TransferKind::Upload, uri.clone());
            record.source_path = Some(src.to_path_buf());
            record.replace = replace;
            record.total_size = size;
            record.listener = listener;
            record
        })?;
        Ok((id, uri))
    }

    fn admit(
        &self,
        dest: Option<&Path>,
        build: impl FnOnce(RequestId) -> TransferRecord,
    ) -> Result<RequestId, TransferError> {
        let mut state = self.state();
        state.ensure_open()?;
        if let Some(dest) = dest {
            if state.store.dest_in_use(dest) {
                return Err(TransferError::FileAlreadyExists(format!(
                    "{} is already being downloaded",
                    dest.display()
                )));
            }
        }

        let id = state.store.next_id();
        let record = build(id);
        info!(request = %id, kind = ?record.kind, uri = %record.uri, "transfer queued");
        state.store.admit(record);
        self.shared.promote(&mut state);
        Ok(id)
    }

    fn gate_of(&self, id: RequestId) -> Result<Arc<Mutex<()>>, TransferError> {
        let state = self.state();
        state.ensure_open()?;
        state
            .store
            .get(id)
            .map(|r| Arc::clone(&r.gate))
            .ok_or(TransferError::NotFound(id))
    }

    /// Cancels a queued or active request.
    pub fn cancel(&self, id: RequestId) -> Result<(), TransferError> {
        let gate = self.gate_of(id)?;
        let _held = hold(&gate);

        let dispatch = {
            let mut state = self.state();
            state.ensure_open()?;
            cancel_locked(&mut state, id, TransferOutcome::success())?
        };
        info!(request = %id, "cancel requested");
        self.shared.dispatcher.send_all(dispatch.into_iter().collect());
        Ok(())
    }

    /// Cancels every queued and active request.
    pub fn cancel_all(&self) -> Result<(), TransferError> {
        let ids = {
            let state = self.state();
            state.ensure_open()?;
            // Queued first, so none of them gets promoted into a slot
            // freed while the active ones are being canceled.
            let mut ids = state.store.ids_with_status(TransferStatus::Queued);
            ids.extend(state.store.ids_with_status(TransferStatus::Active));
            ids
        };

        let mut dispatches = Vec::new();
        for id in &ids {
            let Ok(gate) = self.gate_of(*id) else {
                continue;
            };
            let _held = hold(&gate);
            let mut state = self.state();
            match cancel_locked(&mut state, *id, TransferOutcome::success()) {
                Ok(dispatch) => dispatches.extend(dispatch),
                // Finished or removed in the meantime.
                Err(_) => continue,
            }
        }
        info!(count = ids.len(), "cancel all requested");
        self.shared.dispatcher.send_all(dispatches);
        Ok(())
    }

    /// Deletes a record that is not active.
    pub fn remove(&self, id: RequestId) -> Result<(), TransferError> {
        let gate = self.gate_of(id)?;
        let _held = hold(&gate);

        let mut state = self.state();
        state.ensure_open()?;
        state.store.remove(id)?;
        self.shared.promote(&mut state);
        debug!(request = %id, "transfer removed");
        Ok(())
    }

    /// Deletes every record that is not active.
    pub fn remove_all(&self) -> Result<(), TransferError> {
        let inactive = {
            let state = self.state();
            state.ensure_open()?;
            state.store.inactive()
        };
        let _held: Vec<_> = inactive.iter().map(|(_, gate)| hold(gate)).collect();

        let mut state = self.state();
        let removed = inactive
            .iter()
            .filter(|(id, _)| state.store.remove(*id).is_ok())
            .count();
        self.shared.promote(&mut state);
        debug!(removed, "inactive transfers removed");
        Ok(())
    }

    /// Timeout used by requests that pass zero. Zero disables it.
    pub fn set_default_timeout(&self, secs: u32) -> Result<(), TransferError> {
        let mut state = self.state();
        state.ensure_open()?;
        state.defaults.timeout_secs = secs;
        Ok(())
    }

    /// Progress interval used by requests that pass zero.
    pub fn set_progress_interval_by_percent(&self, percent: u8) -> Result<(), TransferError> {
        check_percent(percent)?;
        let mut state = self.state();
        state.ensure_open()?;
        state.defaults.progress_interval_percent = percent;
        Ok(())
    }

    /// Listener for requests submitted without one. `None` clears it.
    pub fn set_default_listener(&self, listener: Option<Arc<dyn TransferListener>>) {
        *self
            .shared
            .core
            .default_listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = listener;
    }

    /// Snapshot of every record, ordered by id.
    pub fn transfer_list(&self) -> Result<Vec<TransferInfo>, TransferError> {
        let state = self.state();
        state.ensure_open()?;
        Ok(state.store.snapshot(&state.defaults, false))
    }

    /// Snapshot of the active records, ordered by id.
    pub fn active_transfer_list(&self) -> Result<Vec<TransferInfo>, TransferError> {
        let state = self.state();
        state.ensure_open()?;
        Ok(state.store.snapshot(&state.defaults, true))
    }

    pub fn transfer_info(&self, id: RequestId) -> Result<TransferInfo, TransferError> {
        let state = self.state();
        state.ensure_open()?;
        state
            .store
            .get(id)
            .map(|r| r.snapshot(&state.defaults))
            .ok_or(TransferError::NotFound(id))
    }

    /// Stops the driver, kills running workers and rejects further calls.
    /// No callbacks are delivered for requests still in flight.
    pub fn shutdown(&self) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.pool.abort_tasks();
        }
        self.shared.shutdown.cancel();
        self.shared.dispatcher.close();
        info!("transfer manager shut down");
    }
}

fn check_uri(uri: &str) -> Result<(), TransferError> {
    if uri.trim().is_empty() {
        return Err(TransferError::InvalidArg("empty URI".into()));
    }
    Ok(())
}

fn check_percent(percent: u8) -> Result<(), TransferError> {
    if percent > 100 {
        return Err(TransferError::InvalidArg(format!(
            "progress interval {percent}% exceeds 100%"
        )));
    }
    Ok(())
}
