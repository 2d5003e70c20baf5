//! CPU thread-parallel batch copy engine
//!
//! Partitions a batch across a bounded shared worker pool and joins
//! before returning. Small batches are striped (every worker copies a
//! byte range of every unit); large batches are partitioned (every worker
//! copies whole units). A worker hitting an uncorrectable copy fault
//! surfaces as a retryable batch-level failure.

use crate::batch::Batch;
use crate::engine::{copy_unit_sync, OffloadEngine};
use crate::error::{MigCopyError, Result};
use crate::registry::Migrator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Maximum worker tasks one batch-copy call will dispatch.
pub const MAX_COPY_WORKERS: usize = 64;

/// Marker for an uncorrectable fault reported by the platform's
/// memory-copy primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UncorrectableCopy;

/// Outcome of copying one byte range.
pub type CopyAttempt = std::result::Result<(), UncorrectableCopy>;

/// The platform memory-copy primitive used by worker tasks. Replaceable
/// so fault-injecting harnesses can exercise the failure path.
pub type CopyRoutine = Arc<dyn Fn(&mut [u8], &[u8]) -> CopyAttempt + Send + Sync>;

/// One worker's slice of the batch: whole units or byte stripes.
type Ranges<'b> = Vec<(&'b mut [u8], &'b [u8])>;

/// Build a worker pool shared by all thread-engine copy calls.
///
/// `threads == 0` sizes the pool to the machine's logical CPU count.
pub fn build_shared_pool(threads: usize) -> Result<Arc<rayon::ThreadPool>> {
    let threads = if threads == 0 {
        num_cpus::get()
    } else {
        threads
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|index| format!("migcopy-worker-{index}"))
        .build()
        .map(Arc::new)
        .map_err(|error| MigCopyError::ThreadPool(error.to_string()))
}

/// Batch copy engine backed by a bounded shared thread pool.
pub struct ThreadPoolCopyEngine {
    pool: Arc<rayon::ThreadPool>,
    worker_count: AtomicUsize,
    routine: CopyRoutine,
}

impl ThreadPoolCopyEngine {
    /// Registry name of this engine.
    pub const NAME: &'static str = "cpu-threaded";

    /// Create the engine over a shared worker pool. The tunable worker
    /// count starts at 4.
    pub fn new(pool: Arc<rayon::ThreadPool>) -> Self {
        let routine: CopyRoutine = Arc::new(|dst, src| {
            copy_unit_sync(dst, src);
            Ok(())
        });
        Self {
            pool,
            worker_count: AtomicUsize::new(4),
            routine,
        }
    }

    /// Replace the memory-copy primitive used by worker tasks.
    pub fn with_copy_routine(mut self, routine: CopyRoutine) -> Self {
        self.routine = routine;
        self
    }

    /// Worker count used by registry-dispatched copy calls.
    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::Relaxed)
    }

    /// Set the worker count for subsequent copy calls. Rejects values
    /// below 1 and clamps to [`MAX_COPY_WORKERS`].
    pub fn set_worker_count(&self, count: usize) -> Result<()> {
        if count < 1 {
            return Err(MigCopyError::config("at least 1 worker is required"));
        }
        self.worker_count
            .store(count.min(MAX_COPY_WORKERS), Ordering::Relaxed);
        Ok(())
    }

    /// Copy every unit of the batch across up to `worker_count` tasks on
    /// the shared pool.
    ///
    /// Synchronous: dispatch is fire-and-join, never fire-and-forget. On
    /// a retryable failure the destinations must be treated as not
    /// copied; the caller may re-attempt the batch via the default path.
    pub fn copy_batch(&self, batch: &mut Batch<'_>, worker_count: usize) -> Result<()> {
        let unit_count = batch.len();
        if unit_count == 0 {
            return Ok(());
        }
        let workers = worker_count.clamp(1, MAX_COPY_WORKERS);

        let assignments = if unit_count < workers {
            striped_assignments(batch, workers)
        } else {
            partitioned_assignments(batch, workers)
        };

        let mut failed = vec![false; assignments.len()];
        let routine = self.routine.as_ref();
        self.pool.scope(|scope| {
            for (flag, ranges) in failed.iter_mut().zip(assignments) {
                scope.spawn(move |_| {
                    for (dst, src) in ranges {
                        if routine(dst, src).is_err() {
                            *flag = true;
                        }
                    }
                });
            }
        });

        let failed_tasks = failed.iter().filter(|flag| **flag).count();
        if failed_tasks > 0 {
            debug!(failed_tasks, "uncorrectable copy fault, batch not copied");
            return Err(MigCopyError::CopyIncomplete { failed_tasks });
        }
        Ok(())
    }
}

/// Striped regime (N < workers): every unit is cut into one contiguous
/// byte stripe per worker, so each worker performs N partial copies.
///
/// Stripe length rounds down; the last worker takes the remainder of a
/// unit whose length is not evenly divisible.
fn striped_assignments<'b>(batch: &'b mut Batch<'_>, workers: usize) -> Vec<Ranges<'b>> {
    let unit_count = batch.len();
    let mut assignments: Vec<Ranges<'b>> = (0..workers)
        .map(|_| Vec::with_capacity(unit_count))
        .collect();

    for unit in batch.units_mut() {
        let stripe = unit.len() / workers;
        let (mut dst, mut src) = unit.parts_mut();
        for ranges in assignments.iter_mut().take(workers - 1) {
            let (dst_head, dst_tail) = std::mem::take(&mut dst).split_at_mut(stripe);
            dst = dst_tail;
            let (src_head, src_tail) = src.split_at(stripe);
            src = src_tail;
            ranges.push((dst_head, src_head));
        }
        assignments[workers - 1].push((dst, src));
    }
    assignments
}

/// Partitioned regime (N >= workers): units are split whole into buckets;
/// the first `N mod workers` buckets get the ceiling share, the rest the
/// floor share.
fn partitioned_assignments<'b>(batch: &'b mut Batch<'_>, workers: usize) -> Vec<Ranges<'b>> {
    let unit_count = batch.len();
    let floor_share = unit_count / workers;
    let remainder = unit_count % workers;

    let mut assignments: Vec<Ranges<'b>> = Vec::with_capacity(workers);
    let mut units = batch.units_mut().iter_mut();
    for index in 0..workers {
        let share = floor_share + usize::from(index < remainder);
        let mut ranges: Ranges<'b> = Vec::with_capacity(share);
        for unit in units.by_ref().take(share) {
            ranges.push(unit.parts_mut());
        }
        assignments.push(ranges);
    }
    assignments
}

impl Migrator for ThreadPoolCopyEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn copy_batch(&self, batch: &mut Batch<'_>) -> Result<()> {
        self.copy_batch(batch, self.worker_count())
    }

    fn may_copy(&self, dst: &[u8], src: &[u8]) -> bool {
        dst.len() == src.len()
    }
}

impl OffloadEngine for ThreadPoolCopyEngine {
    fn parallelism(&self) -> usize {
        self.worker_count()
    }

    fn set_parallelism(&self, value: usize) -> Result<()> {
        self.set_worker_count(value)
    }
}
