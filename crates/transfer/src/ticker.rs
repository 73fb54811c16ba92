//! Periodic sampling of active transfers.
//!
//! On every tick the manager copies each slot's byte counters into its
//! record, then decides which requests have run past their timeout and
//! which deserve a progress callback.

use std::time::{Duration, Instant};

use content_transfer_protocol::{RequestId, TransferStatus};

use crate::slot::SlotPool;
use crate::store::{Defaults, TransferStore};

/// Result of one tick.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct TickOutput {
    /// Active requests whose timeout elapsed.
    pub timed_out: Vec<RequestId>,
    /// `(request, transferred)` pairs to report.
    pub progress: Vec<(RequestId, u64)>,
}

/// Returns `true` once an active transfer started at `started_at` has run
/// longer than `timeout_secs`. Zero disables the timeout.
pub(crate) fn timed_out(started_at: Instant, now: Instant, timeout_secs: u32) -> bool {
    timeout_secs > 0
        && now.saturating_duration_since(started_at) > Duration::from_secs(u64::from(timeout_secs))
}

/// Progress reporting rule.
///
/// An interval of zero reports on every tick. Otherwise a report is due
/// when at least `interval_percent` of `total` has moved since the last
/// one. With an unknown total, any forward movement is reported.
pub(crate) fn progress_due(
    interval_percent: u8,
    total: u64,
    transferred: u64,
    last_reported: u64,
) -> bool {
    if interval_percent == 0 {
        return true;
    }
    let advanced = transferred.saturating_sub(last_reported);
    if total == 0 {
        return advanced > 0;
    }
    u128::from(advanced) * 100 >= u128::from(interval_percent) * u128::from(total)
}

/// Samples every active record.
pub(crate) fn sample(
    store: &mut TransferStore,
    pool: &SlotPool,
    defaults: &Defaults,
    now: Instant,
) -> TickOutput {
    let mut out = TickOutput::default();

    for id in store.ids_with_status(TransferStatus::Active) {
        let Some(record) = store.get_mut(id) else {
            continue;
        };
        let Some(slot) = record.slot else {
            continue;
        };

        if let Some((transferred, total)) = pool.poll_progress(slot) {
            record.transferred_size = transferred;
            if total > 0 {
                record.total_size = total;
            }
        }

        if let Some(started_at) = record.started_at {
            if timed_out(started_at, now, record.effective_timeout(defaults)) {
                out.timed_out.push(id);
                continue;
            }
        }

        let interval = record.effective_progress_interval(defaults);
        if progress_due(
            interval,
            record.total_size,
            record.transferred_size,
            record.last_reported,
        ) {
            record.last_reported = record.transferred_size;
            out.progress.push((id, record.transferred_size));
        }
    }

    out
}
