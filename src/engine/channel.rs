//! Hardware-channel batch copy engine
//!
//! Submits batched copies across a pool of independent transfer channels,
//! tracking per-channel outstanding work and falling back per item to the
//! synchronous copy when a submission is refused. The channel seam is the
//! [`TransferChannel`] trait so DMA-class hardware backends can plug in;
//! the built-in [`CpuChannel`] backend drives each channel from a
//! dedicated thread and lets the engine run end-to-end without special
//! hardware.

use crate::batch::{Batch, Span, SpanMut};
use crate::engine::{copy_batch_sync, copy_unit_sync, OffloadEngine};
use crate::error::{MigCopyError, Result};
use crate::registry::Migrator;
use crossbeam::channel::{unbounded, Sender};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Maximum transfer channels one batch-copy call will use.
pub const MAX_TRANSFER_CHANNELS: usize = 16;

/// Why a channel refused a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitErrorKind {
    /// Mapping an end of the unit for device access failed.
    Mapping,
    /// The channel could not prepare a transfer descriptor.
    Prepare,
    /// The prepared descriptor was refused at submission.
    Submit,
}

/// A transfer handed back at submission so the caller can complete the
/// unit by other means.
pub struct RejectedTransfer {
    /// Why the channel refused.
    pub kind: SubmitErrorKind,
    /// The untouched transfer.
    pub transfer: Transfer,
}

/// Outstanding-transfer accounting for one channel, with a one-shot
/// completion signal once the count drains to zero.
///
/// The same lock closes the race between submission-side increments and
/// completion-side decrements.
struct ChannelWork {
    outstanding: Mutex<usize>,
    done: Condvar,
}

impl ChannelWork {
    fn new() -> Self {
        Self {
            outstanding: Mutex::new(0),
            done: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Account for a transfer about to be submitted.
    fn add_transfer(&self) {
        *self.lock() += 1;
    }

    /// Roll back an accounted transfer whose submission was refused.
    fn retract_one(&self) {
        *self.lock() -= 1;
    }

    /// Completion callback bookkeeping: decrement and signal at zero.
    /// Constant-time and non-blocking apart from the counter lock.
    fn complete_one(&self) {
        let mut outstanding = self.lock();
        *outstanding -= 1;
        if *outstanding == 0 {
            self.done.notify_all();
        }
    }

    /// Block until every accounted transfer has completed. A channel that
    /// was assigned no transfers completes immediately.
    fn wait_idle(&self) {
        let mut outstanding = self.lock();
        while *outstanding > 0 {
            outstanding = self
                .done
                .wait(outstanding)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// One queued unit copy: raw spans over both ends plus the completion
/// bookkeeping of the channel it was assigned to.
pub struct Transfer {
    src: Span,
    dst: SpanMut,
    work: Arc<ChannelWork>,
}

impl Transfer {
    /// Perform the copy and signal completion.
    ///
    /// Channel backends call this once per transfer after
    /// [`TransferChannel::issue_pending`].
    pub fn execute(mut self) {
        // SAFETY: the spans derive from a `Batch` borrow held by the
        // submitting `copy_batch` call, which blocks on `wait_idle` for
        // every channel before returning; the borrow therefore outlives
        // this copy.
        unsafe {
            self.dst.as_slice_mut().copy_from_slice(self.src.as_slice());
        }
        self.work.complete_one();
    }

    /// Copy synchronously without signaling, after the outstanding count
    /// has been rolled back. Fallback path for refused submissions.
    fn copy_sync(mut self) {
        // SAFETY: as in `execute`; additionally this runs on the
        // submitting thread itself while the batch borrow is live.
        unsafe {
            copy_unit_sync(self.dst.as_slice_mut(), self.src.as_slice());
        }
    }
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer").finish_non_exhaustive()
    }
}

/// One independent transfer path capable of memcpy-class operations.
///
/// Submissions only queue work: nothing may start copying until
/// `issue_pending`, so a partially submitted channel can never complete
/// ahead of later units queued on it.
pub trait TransferChannel: Send + Sync {
    /// Queue a transfer. A refusal hands the transfer back untouched.
    fn submit(&self, transfer: Transfer) -> std::result::Result<(), RejectedTransfer>;

    /// Start everything queued since the last issue.
    fn issue_pending(&self);
}

/// Software transfer channel: a dedicated thread executes issued
/// transfers in submission order. Stands in for a hardware channel when
/// no device backend is plugged in.
pub struct CpuChannel {
    pending: Mutex<Vec<Transfer>>,
    issued: Option<Sender<Vec<Transfer>>>,
    worker: Option<JoinHandle<()>>,
}

impl CpuChannel {
    /// Spawn the channel's worker thread.
    pub fn spawn(index: usize) -> std::io::Result<Self> {
        let (issued, queue) = unbounded::<Vec<Transfer>>();
        let worker = std::thread::Builder::new()
            .name(format!("migcopy-chan-{index}"))
            .spawn(move || {
                for transfers in queue {
                    for transfer in transfers {
                        transfer.execute();
                    }
                }
            })?;
        Ok(Self {
            pending: Mutex::new(Vec::new()),
            issued: Some(issued),
            worker: Some(worker),
        })
    }
}

impl TransferChannel for CpuChannel {
    fn submit(&self, transfer: Transfer) -> std::result::Result<(), RejectedTransfer> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transfer);
        Ok(())
    }

    fn issue_pending(&self) {
        let batch = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *pending)
        };
        if batch.is_empty() {
            return;
        }
        if let Some(issued) = &self.issued {
            if let Err(send_error) = issued.send(batch) {
                // Worker is gone; run the transfers inline so completion
                // still signals.
                for transfer in send_error.0 {
                    transfer.execute();
                }
            }
        }
    }
}

impl Drop for CpuChannel {
    fn drop(&mut self) {
        // Hang up the issue queue so the worker drains and exits.
        drop(self.issued.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Process-wide pool of transfer channels.
///
/// There is no dedicated reservation: concurrent batches contend for the
/// same channels and engines degrade to however many they obtain.
pub struct ChannelPool {
    channels: Vec<Arc<dyn TransferChannel>>,
}

impl ChannelPool {
    /// A pool with no channels; every acquisition fails and callers fall
    /// back to the synchronous path.
    pub fn empty() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Build a pool of software channels, stopping short if a worker
    /// thread cannot be spawned.
    pub fn with_cpu_channels(count: usize) -> Self {
        let mut channels: Vec<Arc<dyn TransferChannel>> = Vec::with_capacity(count);
        for index in 0..count {
            match CpuChannel::spawn(index) {
                Ok(channel) => channels.push(Arc::new(channel)),
                Err(error) => {
                    warn!(
                        acquired = index,
                        %error,
                        "could only allocate part of the channel pool"
                    );
                    break;
                }
            }
        }
        Self { channels }
    }

    /// Build a pool from caller-provided channel backends.
    pub fn from_channels(channels: Vec<Arc<dyn TransferChannel>>) -> Self {
        Self { channels }
    }

    /// Acquire up to `want` channels. May return fewer, or none.
    pub fn acquire(&self, want: usize) -> Vec<Arc<dyn TransferChannel>> {
        self.channels.iter().take(want).cloned().collect()
    }

    /// Number of channels in the pool.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the pool holds no channels.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Batch copy engine backed by a pool of independent transfer channels.
pub struct HardwareChannelCopyEngine {
    pool: Arc<ChannelPool>,
    channel_count: AtomicUsize,
    fallbacks: AtomicU64,
}

impl HardwareChannelCopyEngine {
    /// Registry name of this engine.
    pub const NAME: &'static str = "channel-batch";

    /// Create the engine over a shared channel pool. The tunable channel
    /// count starts at 1.
    pub fn new(pool: Arc<ChannelPool>) -> Self {
        Self {
            pool,
            channel_count: AtomicUsize::new(1),
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Cumulative count of units completed via the per-item CPU fallback.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Channel count used by registry-dispatched copy calls.
    pub fn channel_count(&self) -> usize {
        self.channel_count.load(Ordering::Relaxed)
    }

    /// Set the channel count for subsequent copy calls. Rejects values
    /// below 1 and clamps to [`MAX_TRANSFER_CHANNELS`].
    pub fn set_channel_count(&self, count: usize) -> Result<()> {
        if count < 1 {
            return Err(MigCopyError::config("at least 1 channel is required"));
        }
        self.channel_count
            .store(count.min(MAX_TRANSFER_CHANNELS), Ordering::Relaxed);
        Ok(())
    }

    /// Copy every unit of the batch, spreading submissions round-robin
    /// over up to `requested_channels` transfer channels.
    ///
    /// Synchronous: returns once every unit has been copied, by a channel
    /// or by the per-item fallback. Resource shortfalls degrade the whole
    /// batch to the synchronous path and still return success.
    pub fn copy_batch(&self, batch: &mut Batch<'_>, requested_channels: usize) -> Result<()> {
        let unit_count = batch.len();
        if unit_count == 0 {
            return Ok(());
        }

        let want = requested_channels
            .max(1)
            .min(unit_count)
            .min(MAX_TRANSFER_CHANNELS);
        let channels = self.pool.acquire(want);
        if channels.is_empty() {
            warn!("no transfer channels available, copying batch on the CPU");
            copy_batch_sync(batch);
            return Ok(());
        }
        if channels.len() < want {
            debug!(
                acquired = channels.len(),
                requested = want,
                "short channel acquisition"
            );
        }

        let works: Vec<Arc<ChannelWork>> = (0..channels.len())
            .map(|_| Arc::new(ChannelWork::new()))
            .collect();

        // Phase 1: submit every unit; a refused submission falls back to
        // the synchronous copy for that unit only.
        let mut fallbacks = 0u64;
        for (index, unit) in batch.units_mut().iter_mut().enumerate() {
            let slot = index % channels.len();
            let work = Arc::clone(&works[slot]);
            work.add_transfer();
            let (dst, src) = unit.raw_parts();
            let transfer = Transfer { src, dst, work };
            if let Err(rejected) = channels[slot].submit(transfer) {
                debug!(unit = index, kind = ?rejected.kind, "submission refused, copying unit on the CPU");
                rejected.transfer.work.retract_one();
                rejected.transfer.copy_sync();
                fallbacks += 1;
            }
        }

        // Phase 2: issue all pending work, only after every submission.
        for channel in &channels {
            channel.issue_pending();
        }

        // Phase 3: wait until every channel drains.
        for work in &works {
            work.wait_idle();
        }

        if fallbacks > 0 {
            self.fallbacks.fetch_add(fallbacks, Ordering::Relaxed);
            warn!(count = fallbacks, "processed fallback units with the CPU");
        }
        Ok(())
    }
}

impl Migrator for HardwareChannelCopyEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn copy_batch(&self, batch: &mut Batch<'_>) -> Result<()> {
        self.copy_batch(batch, self.channel_count())
    }

    fn may_copy(&self, dst: &[u8], src: &[u8]) -> bool {
        !src.is_empty() && dst.len() == src.len()
    }
}

impl OffloadEngine for HardwareChannelCopyEngine {
    fn parallelism(&self) -> usize {
        self.channel_count()
    }

    fn set_parallelism(&self, value: usize) -> Result<()> {
        self.set_channel_count(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pairs(count: usize, len: usize) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        let srcs = (0..count)
            .map(|i| (0..len).map(|j| (i * 31 + j) as u8).collect())
            .collect();
        let dsts = (0..count).map(|_| vec![0u8; len]).collect();
        (dsts, srcs)
    }

    fn fill_batch<'a>(
        batch: &mut Batch<'a>,
        dsts: &'a mut [Vec<u8>],
        srcs: &'a [Vec<u8>],
    ) {
        for (dst, src) in dsts.iter_mut().zip(srcs.iter()) {
            batch.push_pair(dst, src).unwrap();
        }
    }

    #[test]
    fn test_copies_batch_over_cpu_channels() {
        let pool = Arc::new(ChannelPool::with_cpu_channels(3));
        let engine = HardwareChannelCopyEngine::new(pool);

        let (mut dsts, srcs) = make_pairs(8, 4096);
        let mut batch = Batch::new();
        fill_batch(&mut batch, &mut dsts, &srcs);

        engine.copy_batch(&mut batch, 3).unwrap();
        drop(batch);

        for (dst, src) in dsts.iter().zip(srcs.iter()) {
            assert_eq!(dst, src);
        }
        assert_eq!(engine.fallback_count(), 0);
    }

    #[test]
    fn test_empty_pool_degrades_to_sync_copy() {
        let engine = HardwareChannelCopyEngine::new(Arc::new(ChannelPool::empty()));

        let (mut dsts, srcs) = make_pairs(4, 512);
        let mut batch = Batch::new();
        fill_batch(&mut batch, &mut dsts, &srcs);

        engine.copy_batch(&mut batch, 4).unwrap();
        drop(batch);

        for (dst, src) in dsts.iter().zip(srcs.iter()) {
            assert_eq!(dst, src);
        }
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let engine = HardwareChannelCopyEngine::new(Arc::new(ChannelPool::empty()));
        let mut batch = Batch::new();
        engine.copy_batch(&mut batch, 2).unwrap();
    }

    /// Refuses its `reject_at`-th submission, passing everything else to
    /// a real software channel.
    struct RejectNth {
        inner: CpuChannel,
        next: AtomicUsize,
        reject_at: usize,
    }

    impl TransferChannel for RejectNth {
        fn submit(&self, transfer: Transfer) -> std::result::Result<(), RejectedTransfer> {
            let sequence = self.next.fetch_add(1, Ordering::Relaxed);
            if sequence == self.reject_at {
                return Err(RejectedTransfer {
                    kind: SubmitErrorKind::Submit,
                    transfer,
                });
            }
            self.inner.submit(transfer)
        }

        fn issue_pending(&self) {
            self.inner.issue_pending();
        }
    }

    #[test]
    fn test_single_submission_failure_falls_back_per_item() {
        let flaky: Arc<dyn TransferChannel> = Arc::new(RejectNth {
            inner: CpuChannel::spawn(0).unwrap(),
            next: AtomicUsize::new(0),
            reject_at: 1,
        });
        let steady: Arc<dyn TransferChannel> = Arc::new(CpuChannel::spawn(1).unwrap());
        let pool = Arc::new(ChannelPool::from_channels(vec![flaky, steady]));
        let engine = HardwareChannelCopyEngine::new(pool);

        let (mut dsts, srcs) = make_pairs(5, 1024);
        let mut batch = Batch::new();
        fill_batch(&mut batch, &mut dsts, &srcs);

        engine.copy_batch(&mut batch, 2).unwrap();
        drop(batch);

        assert_eq!(engine.fallback_count(), 1);
        for (dst, src) in dsts.iter().zip(srcs.iter()) {
            assert_eq!(dst, src);
        }
    }

    #[test]
    fn test_channel_count_tunable() {
        let engine = HardwareChannelCopyEngine::new(Arc::new(ChannelPool::empty()));
        assert_eq!(engine.channel_count(), 1);

        assert!(engine.set_channel_count(0).is_err());
        engine.set_channel_count(8).unwrap();
        assert_eq!(engine.channel_count(), 8);
        engine.set_channel_count(1000).unwrap();
        assert_eq!(engine.channel_count(), MAX_TRANSFER_CHANNELS);
    }

    #[test]
    fn test_eligibility_predicate() {
        let engine = HardwareChannelCopyEngine::new(Arc::new(ChannelPool::empty()));
        let a = vec![0u8; 16];
        let b = vec![0u8; 16];
        let c = vec![0u8; 8];
        assert!(engine.may_copy(&a, &b));
        assert!(!engine.may_copy(&a, &c));
        assert!(!engine.may_copy(&[], &[]));
    }
}
