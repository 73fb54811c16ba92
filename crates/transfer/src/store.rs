//! In-memory table of transfer records and the FIFO pending queue.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use content_transfer_protocol::{
    RequestId, TransferError, TransferInfo, TransferKind, TransferOutcome, TransferStatus,
};

use crate::listener::TransferListener;

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide values used when a request passes zero.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Defaults {
    pub timeout_secs: u32,
    pub progress_interval_percent: u8,
}

/// The manager's descriptor for one admitted request.
pub(crate) struct TransferRecord {
    pub id: RequestId,
    pub kind: TransferKind,
    pub status: TransferStatus,
    pub uri: String,
    pub dest_path: Option<PathBuf>,
    pub source_path: Option<PathBuf>,
    pub replace: bool,
    /// Present iff `status == Active`.
    pub slot: Option<usize>,
    pub timeout_secs: u32,
    pub progress_interval_percent: u8,
    pub total_size: u64,
    pub transferred_size: u64,
    /// Byte count at the last progress callback.
    pub last_reported: u64,
    pub started_at: Option<Instant>,
    pub listener: Option<Arc<dyn TransferListener>>,
    /// Held by the dispatcher while a callback for this record runs.
    pub gate: Arc<Mutex<()>>,
    pub outcome: Option<TransferOutcome>,
}

impl TransferRecord {
    pub fn new(id: RequestId, kind: TransferKind, uri: String) -> Self {
        Self {
            id,
            kind,
            status: TransferStatus::Queued,
            uri,
            dest_path: None,
            source_path: None,
            replace: false,
            slot: None,
            timeout_secs: 0,
            progress_interval_percent: 0,
            total_size: 0,
            transferred_size: 0,
            last_reported: 0,
            started_at: None,
            listener: None,
            gate: Arc::new(Mutex::new(())),
            outcome: None,
        }
    }

    pub fn effective_timeout(&self, defaults: &Defaults) -> u32 {
        if self.timeout_secs == 0 {
            defaults.timeout_secs
        } else {
            self.timeout_secs
        }
    }

    pub fn effective_progress_interval(&self, defaults: &Defaults) -> u8 {
        if self.progress_interval_percent == 0 {
            defaults.progress_interval_percent
        } else {
            self.progress_interval_percent
        }
    }

    fn local_path(&self) -> Option<&Path> {
        self.dest_path.as_deref().or(self.source_path.as_deref())
    }

    pub fn snapshot(&self, defaults: &Defaults) -> TransferInfo {
        TransferInfo {
            request_id: self.id,
            kind: self.kind,
            status: self.status,
            uri: self.uri.clone(),
            local_path: self
                .local_path()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            total_size: self.total_size,
            transferred_size: self.transferred_size,
            timeout_secs: self.effective_timeout(defaults),
            progress_interval_percent: self.effective_progress_interval(defaults),
            outcome: self.outcome.clone(),
        }
    }
}

/// Records keyed by id, plus the queue of records waiting for a slot.
pub(crate) struct TransferStore {
    records: HashMap<RequestId, TransferRecord>,
    pending: VecDeque<RequestId>,
    last_id: u64,
}

impl TransferStore {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            pending: VecDeque::new(),
            last_id: 0,
        }
    }

    /// Hands out the next id. Ids are never reused.
    pub fn next_id(&mut self) -> RequestId {
        self.last_id += 1;
        RequestId(self.last_id)
    }

    /// Inserts a `Queued` record at the tail of the pending queue.
    pub fn admit(&mut self, record: TransferRecord) {
        debug_assert_eq!(record.status, TransferStatus::Queued);
        self.pending.push_back(record.id);
        self.records.insert(record.id, record);
    }

    pub fn get(&self, id: RequestId) -> Option<&TransferRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut TransferRecord> {
        self.records.get_mut(&id)
    }

    /// Id of the oldest queued record, if any.
    pub fn pending_head(&self) -> Option<RequestId> {
        self.pending.front().copied()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.status == TransferStatus::Active)
            .count()
    }

    /// Ids of every record in `status`, in submission order.
    pub fn ids_with_status(&self, status: TransferStatus) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self
            .records
            .values()
            .filter(|r| r.status == status)
            .map(|r| r.id)
            .collect();
        ids.sort();
        ids
    }

    /// Returns `true` if a non-terminal record already writes to `dest`.
    pub fn dest_in_use(&self, dest: &Path) -> bool {
        self.records
            .values()
            .any(|r| !r.status.is_terminal() && r.dest_path.as_deref() == Some(dest))
    }

    /// Moves the pending head into `slot`.
    pub fn activate_head(&mut self, slot: usize, now: Instant) -> Option<RequestId> {
        let id = self.pending.pop_front()?;
        let record = self.records.get_mut(&id)?;
        record.status = TransferStatus::Active;
        record.slot = Some(slot);
        record.started_at = Some(now);
        Some(id)
    }

    /// `Active -> Completed`. Returns the slot the record held.
    pub fn complete(
        &mut self,
        id: RequestId,
        outcome: TransferOutcome,
    ) -> Result<Option<usize>, TransferError> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(TransferError::NotFound(id))?;
        if record.status != TransferStatus::Active {
            return Err(TransferError::InvalidState(format!(
                "cannot complete a {:?} transfer",
                record.status
            )));
        }
        record.status = TransferStatus::Completed;
        record.outcome = Some(outcome);
        Ok(record.slot.take())
    }

    /// `Queued | Active -> Canceled`. Returns the status the record left
    /// and the slot it held.
    pub fn cancel(
        &mut self,
        id: RequestId,
        outcome: TransferOutcome,
    ) -> Result<(TransferStatus, Option<usize>), TransferError> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(TransferError::NotFound(id))?;
        let previous = record.status;
        match previous {
            TransferStatus::Queued => {
                self.pending.retain(|p| *p != id);
            }
            TransferStatus::Active => {}
            TransferStatus::Completed | TransferStatus::Canceled => {
                return Err(TransferError::InvalidState(format!(
                    "transfer {id} already finished"
                )));
            }
        }
        record.status = TransferStatus::Canceled;
        record.outcome = Some(outcome);
        Ok((previous, record.slot.take()))
    }

    /// Deletes a record that is not `Active`.
    pub fn remove(&mut self, id: RequestId) -> Result<TransferRecord, TransferError> {
        let record = self.records.get(&id).ok_or(TransferError::NotFound(id))?;
        if record.status == TransferStatus::Active {
            return Err(TransferError::InvalidState(format!(
                "transfer {id} is in progress; cancel it first"
            )));
        }
        self.pending.retain(|p| *p != id);
        self.records
            .remove(&id)
            .ok_or(TransferError::NotFound(id))
    }

    /// Ids and gates of every record that is not `Active`, by id.
    pub fn inactive(&self) -> Vec<(RequestId, Arc<Mutex<()>>)> {
        let mut list: Vec<_> = self
            .records
            .values()
            .filter(|r| r.status != TransferStatus::Active)
            .map(|r| (r.id, Arc::clone(&r.gate)))
            .collect();
        list.sort_by_key(|(id, _)| *id);
        list
    }

    /// Snapshots of every record, ordered by id.
    pub fn snapshot(&self, defaults: &Defaults, only_active: bool) -> Vec<TransferInfo> {
        let mut list: Vec<TransferInfo> = self
            .records
            .values()
            .filter(|r| !only_active || r.status == TransferStatus::Active)
            .map(|r| r.snapshot(defaults))
            .collect();
        list.sort_by_key(|info| info.request_id);
        list
    }
}
