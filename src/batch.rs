//! Batch data model
//!
//! A [`CopyUnit`] pairs one source block with one destination block of
//! equal length; a [`Batch`] is the ordered sequence of units handed to a
//! copy engine in a single invocation. The migration-list builder
//! constructs the batch immediately before the call and the call owns it
//! exclusively until it returns.

use crate::error::{MigCopyError, Result};

/// One source/destination block pairing of equal length.
///
/// The exclusive destination borrow guarantees units never alias each
/// other or their sources.
#[derive(Debug)]
pub struct CopyUnit<'a> {
    src: &'a [u8],
    dst: &'a mut [u8],
}

impl<'a> CopyUnit<'a> {
    /// Pair a destination block with its source block.
    ///
    /// Rejects blocks of unequal length; the positional pairing produced
    /// by the migration-list builder must already be size-matched.
    pub fn new(dst: &'a mut [u8], src: &'a [u8]) -> Result<Self> {
        if dst.len() != src.len() {
            return Err(MigCopyError::MismatchedUnit {
                dst_len: dst.len(),
                src_len: src.len(),
            });
        }
        Ok(Self { src, dst })
    }

    /// Size of the unit in bytes.
    pub fn len(&self) -> usize {
        self.src.len()
    }

    /// Whether the unit is zero-length.
    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    /// The source block.
    pub fn source(&self) -> &[u8] {
        self.src
    }

    /// Simultaneous access to both ends of the unit.
    pub fn parts_mut(&mut self) -> (&mut [u8], &[u8]) {
        (&mut *self.dst, self.src)
    }

    /// Raw spans over both ends, for handing to a transfer channel.
    pub(crate) fn raw_parts(&mut self) -> (SpanMut, Span) {
        (
            SpanMut {
                ptr: self.dst.as_mut_ptr(),
                len: self.dst.len(),
            },
            Span {
                ptr: self.src.as_ptr(),
                len: self.src.len(),
            },
        )
    }
}

/// An ordered sequence of copy units with a count known up front.
#[derive(Debug, Default)]
pub struct Batch<'a> {
    units: Vec<CopyUnit<'a>>,
}

impl<'a> Batch<'a> {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self { units: Vec::new() }
    }

    /// Create an empty batch with room for `capacity` units.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            units: Vec::with_capacity(capacity),
        }
    }

    /// Append a unit; the Nth pushed destination pairs with the Nth source.
    pub fn push(&mut self, unit: CopyUnit<'a>) {
        self.units.push(unit);
    }

    /// Pair and append a destination/source block in one step.
    pub fn push_pair(&mut self, dst: &'a mut [u8], src: &'a [u8]) -> Result<()> {
        self.units.push(CopyUnit::new(dst, src)?);
        Ok(())
    }

    /// Number of units in the batch.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the batch holds no units.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Total bytes across all units.
    pub fn total_bytes(&self) -> usize {
        self.units.iter().map(CopyUnit::len).sum()
    }

    /// Mutable access to the units, in order.
    pub fn units_mut(&mut self) -> &mut [CopyUnit<'a>] {
        &mut self.units
    }
}

impl<'a> From<Vec<CopyUnit<'a>>> for Batch<'a> {
    fn from(units: Vec<CopyUnit<'a>>) -> Self {
        Self { units }
    }
}

/// Raw read-only span over a source block.
///
/// Spans cross thread boundaries into channel backends; they are only
/// valid while the originating [`Batch`] borrow is live, which every
/// engine guarantees by joining all outstanding work before its
/// `copy_batch` call returns.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Span {
    ptr: *const u8,
    len: usize,
}

// SAFETY: the pointee is an immutable borrow kept alive for the duration
// of the blocking copy call that produced the span.
unsafe impl Send for Span {}

impl Span {
    /// Reconstruct the source slice.
    ///
    /// # Safety
    /// The originating batch borrow must still be live.
    pub(crate) unsafe fn as_slice<'s>(&self) -> &'s [u8] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }
}

/// Raw mutable span over a destination block.
#[derive(Debug)]
pub(crate) struct SpanMut {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: derived from an exclusive borrow; at most one holder exists and
// the borrow outlives the blocking copy call.
unsafe impl Send for SpanMut {}

impl SpanMut {
    /// Reconstruct the destination slice.
    ///
    /// # Safety
    /// The originating batch borrow must still be live and no other
    /// reconstruction of this span may be in use.
    pub(crate) unsafe fn as_slice_mut<'s>(&mut self) -> &'s mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr, self.len)
    }
}
