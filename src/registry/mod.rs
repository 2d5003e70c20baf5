//! Migrator registry
//!
//! Holds the single active offload engine and swaps it safely while
//! concurrent migrations may be reading it. Mutation (enable/disable) is
//! serialized by a short mutex; readers are lock-free and pin an epoch
//! guard instead of reference-counting, so a superseded descriptor is
//! physically reclaimed only once every reader that could have observed
//! it has exited its read section.

use crate::batch::Batch;
use crate::error::{MigCopyError, Result};
use crossbeam::epoch::{self, Atomic, Owned, Shared};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// A pluggable batch-copy implementation.
///
/// The registry dispatches to at most one migrator at a time. `copy_batch`
/// must be synchronous: it returns only once every unit has been copied
/// by the offload path or an internal fallback, or with a retryable error
/// meaning the batch was not copied.
pub trait Migrator: Send + Sync {
    /// Registration name, reflected by [`MigratorRegistry::active_name`].
    fn name(&self) -> &str;

    /// Copy every unit of the batch using the engine's current tunables.
    fn copy_batch(&self, batch: &mut Batch<'_>) -> Result<()>;

    /// May this engine copy the given destination/source pair? Ineligible
    /// pairs must go through the caller's default copy path.
    fn may_copy(&self, dst: &[u8], src: &[u8]) -> bool;
}

/// Immutable registration record for one migrator.
///
/// The inner `Arc` is the ownership token: a descriptor detached from the
/// slot keeps its engine alive until the epoch grace period ends.
pub struct MigratorDescriptor {
    name: String,
    migrator: Arc<dyn Migrator>,
}

impl MigratorDescriptor {
    /// Build a descriptor from a migrator, taking the name it reports.
    pub fn new(migrator: Arc<dyn Migrator>) -> Self {
        let name = migrator.name().to_owned();
        Self { name, migrator }
    }

    /// Registration name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MigratorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigratorDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Process-wide slot holding the single active migrator.
///
/// Callers share the registry by `Arc`; there is no hidden global. State
/// machine: Disabled -> Enabled -> Disabled, initial Disabled. The
/// dispatch flag is true only while the slot holds a descriptor.
pub struct MigratorRegistry {
    slot: Atomic<MigratorDescriptor>,
    dispatch: AtomicBool,
    mutate: Mutex<()>,
}

impl MigratorRegistry {
    /// Create a registry in the Disabled state.
    pub fn new() -> Self {
        Self {
            slot: Atomic::null(),
            dispatch: AtomicBool::new(false),
            mutate: Mutex::new(()),
        }
    }

    /// Install `descriptor` and enable dispatch.
    ///
    /// Enabling while already enabled is an idempotent no-op, logged and
    /// reported as success. Fails only on an invalid descriptor.
    pub fn enable(&self, descriptor: MigratorDescriptor) -> Result<()> {
        if descriptor.name.is_empty() {
            return Err(MigCopyError::InvalidDescriptor(
                "migrator name must not be empty".into(),
            ));
        }

        let _serialize = self.mutate.lock().unwrap_or_else(PoisonError::into_inner);
        if self.dispatch.load(Ordering::Acquire) {
            debug!("migration offloading is already on");
            return Ok(());
        }

        info!(migrator = %descriptor.name, "starting migration offload");
        let guard = epoch::pin();
        let previous = self
            .slot
            .swap(Owned::new(descriptor), Ordering::AcqRel, &guard);
        if !previous.is_null() {
            // A disable already detached the slot, so this only happens if
            // the previous descriptor is still in its grace period.
            unsafe { guard.defer_destroy(previous) };
        }
        self.dispatch.store(true, Ordering::Release);
        Ok(())
    }

    /// Clear the dispatch flag and detach the active descriptor.
    ///
    /// The caller may return before the detached descriptor is physically
    /// reclaimed; reclamation is deferred until no in-flight reader can
    /// still hold it. Disabling while already disabled is a no-op.
    pub fn disable(&self) {
        let _serialize = self.mutate.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.dispatch.load(Ordering::Acquire) {
            debug!("migration offloading is already off");
            return;
        }

        self.dispatch.store(false, Ordering::Release);
        let guard = epoch::pin();
        let previous = self.slot.swap(Shared::null(), Ordering::AcqRel, &guard);
        if let Some(descriptor) = unsafe { previous.as_ref() } {
            info!(migrator = %descriptor.name, "stopping migration offload");
            unsafe { guard.defer_destroy(previous) };
        }
        guard.flush();
    }

    /// Whether dispatch to an offload engine is currently enabled.
    ///
    /// Lock-free; safe to call concurrently with enable/disable and with
    /// in-flight copy calls.
    pub fn is_enabled(&self) -> bool {
        self.dispatch.load(Ordering::Acquire)
    }

    /// Name of the active migrator, or an empty string when disabled.
    pub fn active_name(&self) -> String {
        let guard = epoch::pin();
        let shared = self.slot.load(Ordering::Acquire, &guard);
        match unsafe { shared.as_ref() } {
            Some(descriptor) => descriptor.name.clone(),
            None => String::new(),
        }
    }

    /// Delegate to the active migrator's eligibility predicate.
    ///
    /// Always false when disabled: the caller must use the default copy
    /// path instead.
    pub fn eligible(&self, dst: &[u8], src: &[u8]) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let guard = epoch::pin();
        let shared = self.slot.load(Ordering::Acquire, &guard);
        match unsafe { shared.as_ref() } {
            Some(descriptor) => descriptor.migrator.may_copy(dst, src),
            None => false,
        }
    }

    /// Run the active migrator's batch copy, or `None` when disabled.
    ///
    /// The migrator handle is snapshotted under a short epoch pin and the
    /// long-running copy executes without holding any registry lock, so
    /// enable/disable cannot be blocked by an in-flight batch.
    pub fn dispatch(&self, batch: &mut Batch<'_>) -> Option<Result<()>> {
        if !self.is_enabled() {
            return None;
        }
        let migrator = {
            let guard = epoch::pin();
            let shared = self.slot.load(Ordering::Acquire, &guard);
            unsafe { shared.as_ref() }.map(|descriptor| Arc::clone(&descriptor.migrator))
        }?;
        Some(migrator.copy_batch(batch))
    }
}

impl Default for MigratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MigratorRegistry {
    fn drop(&mut self) {
        // Exclusive access: no reader can still be pinned on this slot.
        let guard = unsafe { epoch::unprotected() };
        let previous = self.slot.swap(Shared::null(), Ordering::AcqRel, guard);
        if !previous.is_null() {
            drop(unsafe { previous.into_owned() });
        }
    }
}
