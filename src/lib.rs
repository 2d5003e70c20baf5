//! # MigCopy - Batch Page-Copy Offload for Memory Migration
//!
//! MigCopy lets a memory manager offload the bulk copying of pages during
//! migration to a pluggable "migrator" engine instead of a synchronous
//! per-page CPU copy. It targets workloads that migrate many pages per
//! operation (compaction, NUMA balancing, live migration) where
//! DMA-class copy offload or multi-core parallel copy beats a sequential
//! loop.
//!
//! ## Features
//!
//! - **Migrator registry**: exactly one offload engine active at a time,
//!   hot-swappable while concurrent migrations read it (epoch-based
//!   quiescent reclamation, no reader-side locking)
//! - **Hardware-channel engine**: round-robin batch submission over a
//!   pool of independent transfer channels with per-item CPU fallback
//! - **Thread-pool engine**: striped or partitioned batch dispatch over
//!   a bounded shared worker pool with retryable failure aggregation
//! - **Graceful degradation**: every resource shortfall falls back to
//!   the guaranteed-correct synchronous copy
//!
//! ## Quick Start
//!
//! ```
//! # fn main() -> Result<(), migcopy::MigCopyError> {
//! use migcopy::prelude::*;
//! use std::sync::Arc;
//!
//! let pool = Arc::new(ChannelPool::with_cpu_channels(2));
//! let engine = Arc::new(HardwareChannelCopyEngine::new(pool));
//!
//! let registry = MigratorRegistry::new();
//! registry.enable(MigratorDescriptor::new(engine))?;
//!
//! let src = vec![7u8; 4096];
//! let mut dst = vec![0u8; 4096];
//!
//! if registry.eligible(&dst, &src) {
//!     let mut batch = Batch::new();
//!     batch.push_pair(&mut dst, &src)?;
//!     registry.dispatch(&mut batch).expect("offloading enabled")?;
//! }
//! assert_eq!(dst, src);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread-Parallel Copy
//!
//! ```
//! # fn main() -> Result<(), migcopy::MigCopyError> {
//! use migcopy::engine::threaded::{build_shared_pool, ThreadPoolCopyEngine};
//! use migcopy::Batch;
//!
//! let engine = ThreadPoolCopyEngine::new(build_shared_pool(0)?);
//!
//! let src = vec![1u8; 8192];
//! let mut dst = vec![0u8; 8192];
//! let mut batch = Batch::new();
//! batch.push_pair(&mut dst, &src)?;
//!
//! engine.copy_batch(&mut batch, 4)?;
//! drop(batch);
//! assert_eq!(dst, src);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod registry;

// Re-export commonly used types
pub use batch::{Batch, CopyUnit};
pub use config::OffloadConfig;
pub use error::{MigCopyError, Result};
pub use registry::{Migrator, MigratorDescriptor, MigratorRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```
    //! use migcopy::prelude::*;
    //! ```

    pub use crate::batch::{Batch, CopyUnit};
    pub use crate::config::OffloadConfig;
    pub use crate::control::EngineControl;
    pub use crate::engine::{
        copy_batch_sync, copy_unit_sync, ChannelPool, CpuChannel, HardwareChannelCopyEngine,
        OffloadEngine, ThreadPoolCopyEngine, TransferChannel,
    };
    pub use crate::error::{MigCopyError, Result};
    pub use crate::registry::{Migrator, MigratorDescriptor, MigratorRegistry};
}
