//! Fixed pool of worker slots.
//!
//! Each occupied slot owns one spawned worker task. The worker reports
//! back through the manager's report channel; the slot stays occupied
//! until that report has been consumed, including while an aborted
//! worker is still winding down, so no more than [`SLOT_COUNT`]
//! transports ever run at once.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use content_transfer_protocol::{ContentId, RequestId, TransferError, TransferOutcome};
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::fs::{FileReader, FileSystem};
use crate::listener::TransferListener;
use crate::registry::ContentRegistry;
use crate::transport::{ByteStream, Transport, TransportError, UploadRequest};
use crate::validation::is_under_any;

/// Number of transfers that may run concurrently.
pub const SLOT_COUNT: usize = 3;

/// Byte counters shared between a worker and the ticker.
#[derive(Debug, Default)]
pub(crate) struct SlotProgress {
    transferred: AtomicU64,
    total: AtomicU64,
}

impl SlotProgress {
    fn add(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// `(transferred, total)`; total is zero when unknown.
    pub fn sample(&self) -> (u64, u64) {
        (
            self.transferred.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }
}

/// Work handed to a slot.
#[derive(Debug, Clone)]
pub(crate) enum Job {
    Download {
        uri: String,
        dest: PathBuf,
        replace: bool,
    },
    DownloadToBuffer {
        uri: String,
        max_size: usize,
    },
    Upload {
        source: PathBuf,
        uri: String,
        replace: bool,
        total_size: u64,
    },
}

impl Job {
    fn dest(&self) -> Option<&Path> {
        match self {
            Job::Download { dest, .. } => Some(dest),
            _ => None,
        }
    }
}

/// What a worker produced.
#[derive(Debug)]
pub(crate) enum WorkerResult {
    Downloaded { content_id: Option<ContentId> },
    Buffered(Vec<u8>),
    Uploaded,
}

#[derive(Debug)]
pub(crate) enum SlotOutcome {
    Finished(Result<WorkerResult, TransferError>),
    /// The worker stopped because its slot was aborted. Any partial
    /// destination file is already gone.
    Aborted,
}

/// Sent by a worker when it stops.
#[derive(Debug)]
pub(crate) struct SlotReport {
    pub slot: usize,
    pub request_id: RequestId,
    pub outcome: SlotOutcome,
}

/// Why and for whom a slot was aborted. Delivered once the worker has
/// reported back.
pub(crate) struct AbortNotice {
    pub outcome: TransferOutcome,
    pub listener: Option<Arc<dyn TransferListener>>,
    pub gate: Arc<Mutex<()>>,
}

/// Everything a worker needs, cloned into each spawned task.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub transport: Arc<dyn Transport>,
    pub fs: Arc<dyn FileSystem>,
    pub registry: Option<Arc<dyn ContentRegistry>>,
    pub media_roots: Arc<[PathBuf]>,
    pub chunk_size: usize,
    pub reports: mpsc::UnboundedSender<SlotReport>,
    pub runtime: Handle,
}

/// A slot's current tenant.
pub(crate) struct Occupant {
    pub request_id: RequestId,
    pub dest: Option<PathBuf>,
    pub abort: Option<AbortNotice>,
    cancel: CancellationToken,
    progress: Arc<SlotProgress>,
    task: JoinHandle<()>,
}

impl Occupant {
    pub fn progress(&self) -> (u64, u64) {
        self.progress.sample()
    }
}

pub(crate) struct SlotPool {
    slots: [Option<Occupant>; SLOT_COUNT],
}

impl SlotPool {
    pub fn new() -> Self {
        Self {
            slots: [None, None, None],
        }
    }

    /// Lowest-numbered free slot.
    pub fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Spawns a worker for `job` in `slot`.
    pub fn start(&mut self, slot: usize, request_id: RequestId, job: Job, ctx: &WorkerContext) {
        debug_assert!(self.slots[slot].is_none(), "slot {slot} already occupied");

        let cancel = CancellationToken::new();
        let progress = Arc::new(SlotProgress::default());
        let dest = job.dest().map(Path::to_path_buf);

        let task = {
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            let progress = Arc::clone(&progress);
            ctx.runtime.clone().spawn(async move {
                let outcome = run_worker(job, &ctx, &cancel, &progress).await;
                let _ = ctx.reports.send(SlotReport {
                    slot,
                    request_id,
                    outcome,
                });
            })
        };

        debug!(slot, request = %request_id, "slot started");
        self.slots[slot] = Some(Occupant {
            request_id,
            dest,
            abort: None,
            cancel,
            progress,
            task,
        });
    }

    /// Tells the worker in `slot` to stop. Returns `false` if the slot does
    /// not hold `request_id` or was already aborted.
    pub fn abort(&mut self, slot: usize, request_id: RequestId, notice: AbortNotice) -> bool {
        match self.slots.get_mut(slot).and_then(Option::as_mut) {
            Some(occupant) if occupant.request_id == request_id && occupant.abort.is_none() => {
                occupant.cancel.cancel();
                occupant.abort = Some(notice);
                true
            }
            _ => false,
        }
    }

    /// Current `(transferred, total)` of the worker in `slot`.
    pub fn poll_progress(&self, slot: usize) -> Option<(u64, u64)> {
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .map(Occupant::progress)
    }

    /// Frees `slot` if it still holds `request_id`.
    pub fn release(&mut self, slot: usize, request_id: RequestId) -> Option<Occupant> {
        let entry = self.slots.get_mut(slot)?;
        match entry {
            Some(occupant) if occupant.request_id == request_id => entry.take(),
            _ => None,
        }
    }

    /// Kills every worker without waiting for reports.
    pub fn abort_tasks(&mut self) {
        for occupant in self.slots.iter_mut().filter_map(Option::take) {
            occupant.cancel.cancel();
            occupant.task.abort();
        }
    }
}

/// Reason a worker stopped early.
enum Stop {
    Aborted,
    Failed(TransferError),
}

impl From<TransportError> for Stop {
    fn from(err: TransportError) -> Self {
        Stop::Failed(err.into())
    }
}

async fn run_worker(
    job: Job,
    ctx: &WorkerContext,
    cancel: &CancellationToken,
    progress: &Arc<SlotProgress>,
) -> SlotOutcome {
    let result = match job {
        Job::Download { uri, dest, replace } => {
            download_to_file(ctx, &uri, &dest, replace, cancel, progress).await
        }
        Job::DownloadToBuffer { uri, max_size } => {
            download_to_buffer(ctx, &uri, max_size, cancel, progress).await
        }
        Job::Upload {
            source,
            uri,
            replace,
            total_size,
        } => upload_file(ctx, &source, uri, replace, total_size, cancel, progress).await,
    };

    // A worker that got past its last cancellation point reports what it
    // produced; the driver undoes it if the slot was aborted meanwhile.
    match result {
        Ok(result) => SlotOutcome::Finished(Ok(result)),
        Err(Stop::Aborted) => SlotOutcome::Aborted,
        Err(Stop::Failed(e)) => SlotOutcome::Finished(Err(e)),
    }
}

async fn fetch(
    ctx: &WorkerContext,
    uri: &str,
    cancel: &CancellationToken,
    progress: &SlotProgress,
) -> Result<ByteStream, Stop> {
    let resp = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Stop::Aborted),
        resp = ctx.transport.fetch(uri) => resp?,
    };
    if let Some(total) = resp.total_size {
        progress.set_total(total);
    }
    Ok(resp.body)
}

/// Next body chunk, or `None` at end of stream.
async fn next_chunk(
    body: &mut ByteStream,
    cancel: &CancellationToken,
) -> Result<Option<Vec<u8>>, Stop> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Stop::Aborted),
        chunk = body.next() => match chunk {
            None => Ok(None),
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(e)) => Err(e.into()),
        },
    }
}

async fn download_to_file(
    ctx: &WorkerContext,
    uri: &str,
    dest: &Path,
    replace: bool,
    cancel: &CancellationToken,
    progress: &SlotProgress,
) -> Result<WorkerResult, Stop> {
    let mut body = fetch(ctx, uri, cancel, progress).await?;

    // Without `replace` the file is created exclusively, so one that
    // appeared while the request was queued is left alone.
    let shown = dest.display().to_string();
    let mut file = ctx
        .fs
        .create(dest, replace)
        .await
        .map_err(|e| Stop::Failed(TransferError::from_io(&e, &shown)))?;

    let written: Result<(), Stop> = async {
        while let Some(bytes) = next_chunk(&mut body, cancel).await? {
            file.write_all(&bytes)
                .await
                .map_err(|e| Stop::Failed(TransferError::from_io(&e, &shown)))?;
            progress.add(bytes.len() as u64);
        }
        file.flush()
            .await
            .map_err(|e| Stop::Failed(TransferError::from_io(&e, &shown)))?;
        if cancel.is_cancelled() {
            return Err(Stop::Aborted);
        }
        Ok(())
    }
    .await;
    drop(file);

    if let Err(stop) = written {
        if let Err(e) = ctx.fs.remove(dest).await {
            warn!(path = %shown, error = %e, "failed to delete partial download");
        }
        return Err(stop);
    }

    let content_id = register_if_media(ctx, dest).await;
    Ok(WorkerResult::Downloaded { content_id })
}

async fn register_if_media(ctx: &WorkerContext, dest: &Path) -> Option<ContentId> {
    let registry = ctx.registry.clone()?;
    if !is_under_any(dest, &ctx.media_roots) {
        return None;
    }

    let path = dest.to_path_buf();
    match tokio::task::spawn_blocking(move || registry.register(&path)).await {
        Ok(Ok(id)) => {
            debug!(path = %dest.display(), content = %id, "registered downloaded content");
            Some(id)
        }
        Ok(Err(e)) => {
            warn!(path = %dest.display(), error = %e, "content registration failed");
            None
        }
        Err(e) => {
            warn!(path = %dest.display(), error = %e, "content registration panicked");
            None
        }
    }
}

async fn download_to_buffer(
    ctx: &WorkerContext,
    uri: &str,
    max_size: usize,
    cancel: &CancellationToken,
    progress: &SlotProgress,
) -> Result<WorkerResult, Stop> {
    let mut body = fetch(ctx, uri, cancel, progress).await?;

    let (_, total) = progress.sample();
    if total > max_size as u64 {
        return Err(Stop::Failed(TransferError::OutOfMemory));
    }

    let mut buffer = Vec::with_capacity(total as usize);
    while let Some(bytes) = next_chunk(&mut body, cancel).await? {
        if buffer.len() + bytes.len() > max_size {
            return Err(Stop::Failed(TransferError::OutOfMemory));
        }
        buffer.extend_from_slice(&bytes);
        progress.add(bytes.len() as u64);
    }
    Ok(WorkerResult::Buffered(buffer))
}

async fn upload_file(
    ctx: &WorkerContext,
    source: &Path,
    uri: String,
    replace: bool,
    total_size: u64,
    cancel: &CancellationToken,
    progress: &Arc<SlotProgress>,
) -> Result<WorkerResult, Stop> {
    progress.set_total(total_size);
    let reader = ctx.fs.open(source).await.map_err(|e| {
        Stop::Failed(TransferError::from_io(&e, &source.display().to_string()))
    })?;

    let request = UploadRequest {
        uri,
        total_size,
        replace,
        body: upload_body(reader, ctx.chunk_size, Arc::clone(progress)),
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Stop::Aborted),
        result = ctx.transport.upload(request) => {
            result?;
            Ok(WorkerResult::Uploaded)
        }
    }
}

/// Streams `reader` in `chunk_size` pieces, counting bytes as the
/// transport pulls them.
fn upload_body(reader: FileReader, chunk_size: usize, counter: Arc<SlotProgress>) -> ByteStream {
    let stream = futures_util::stream::unfold(Some(reader), move |state| {
        let counter = Arc::clone(&counter);
        async move {
            let mut reader = state?;
            let mut buf = vec![0u8; chunk_size];
            match reader.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    counter.add(n as u64);
                    Some((Ok(buf), Some(reader)))
                }
                Err(e) => Some((Err(TransportError::Io(e)), None)),
            }
        }
    });
    Box::pin(stream)
}
