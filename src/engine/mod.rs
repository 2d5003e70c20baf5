//! Batch copy engines
//!
//! Two offload engines perform the actual bulk copy: a hardware-channel
//! engine ([`channel::HardwareChannelCopyEngine`]) and a CPU
//! thread-parallel engine ([`threaded::ThreadPoolCopyEngine`]). Both
//! degrade toward the default synchronous copy rather than fail, and both
//! are synchronous from the caller's perspective.

pub mod channel;
pub mod threaded;

pub use channel::{ChannelPool, CpuChannel, HardwareChannelCopyEngine, TransferChannel};
pub use threaded::ThreadPoolCopyEngine;

use crate::batch::Batch;
use crate::error::Result;
use crate::registry::Migrator;

/// Default synchronous single-unit copy.
///
/// This is the boundary to the external default copy primitive: every
/// fallback path, item-level or whole-batch, lands here.
pub fn copy_unit_sync(dst: &mut [u8], src: &[u8]) {
    dst.copy_from_slice(src);
}

/// Copy an entire batch via the default synchronous path.
pub fn copy_batch_sync(batch: &mut Batch<'_>) {
    for unit in batch.units_mut() {
        let (dst, src) = unit.parts_mut();
        copy_unit_sync(dst, src);
    }
}

/// A migrator whose degree of parallelism an operator can tune.
///
/// The stored value is used by the next registry-dispatched batch-copy
/// call; it never affects a call already in flight.
pub trait OffloadEngine: Migrator {
    /// Current channel or worker count.
    fn parallelism(&self) -> usize;

    /// Update the count used by subsequent copy calls.
    ///
    /// Values below 1 are rejected; values above the engine-specific
    /// maximum are clamped.
    fn set_parallelism(&self, value: usize) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_batch_sync_copies_everything() {
        let srcs: Vec<Vec<u8>> = (0..5).map(|i| vec![i as u8 + 1; 64]).collect();
        let mut dsts: Vec<Vec<u8>> = (0..5).map(|_| vec![0u8; 64]).collect();

        let mut batch = Batch::new();
        for (dst, src) in dsts.iter_mut().zip(srcs.iter()) {
            batch.push_pair(dst, src).unwrap();
        }
        copy_batch_sync(&mut batch);

        for (dst, src) in dsts.iter().zip(srcs.iter()) {
            assert_eq!(dst, src);
        }
    }
}
