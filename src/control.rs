//! Operator control surface
//!
//! A small attribute set binding one engine to the registry, mirroring a
//! sysfs-style read/write interface without prescribing any wire format:
//! `offloading` (0/1), `parallelism` (bounded positive integer) and the
//! read-only `active_migrator` name. Invalid input is rejected with a
//! configuration error and no state change.

use crate::engine::OffloadEngine;
use crate::error::{MigCopyError, Result};
use crate::registry::{Migrator, MigratorDescriptor, MigratorRegistry};
use std::sync::Arc;

/// Attribute handlers for one engine bound to a control group.
pub struct EngineControl<E: OffloadEngine + 'static> {
    registry: Arc<MigratorRegistry>,
    engine: Arc<E>,
}

impl<E: OffloadEngine + 'static> EngineControl<E> {
    /// Bind an engine to a registry.
    pub fn new(registry: Arc<MigratorRegistry>, engine: Arc<E>) -> Self {
        Self { registry, engine }
    }

    /// Write the `offloading` attribute: `"1"` enables this engine on the
    /// registry, `"0"` disables offloading. Anything else is rejected.
    pub fn write_offloading(&self, raw: &str) -> Result<()> {
        let action: i64 = raw
            .trim()
            .parse()
            .map_err(|_| MigCopyError::config(format!("error parsing input {raw:?}")))?;
        match action {
            0 => {
                self.registry.disable();
                Ok(())
            }
            1 => {
                let engine = Arc::clone(&self.engine) as Arc<dyn Migrator>;
                self.registry.enable(MigratorDescriptor::new(engine))
            }
            other => Err(MigCopyError::config(format!(
                "input should be zero or one, parsed as {other}"
            ))),
        }
    }

    /// Read the `offloading` attribute: `"1"` when this engine is the
    /// active migrator, else `"0"`.
    pub fn read_offloading(&self) -> String {
        let active = self.registry.is_enabled()
            && self.registry.active_name() == self.engine.name();
        if active { "1".into() } else { "0".into() }
    }

    /// Write the `parallelism` attribute (channel or worker count); the
    /// value applies to the next batch-copy call. Values below 1 are
    /// rejected, values above the engine maximum are clamped.
    pub fn write_parallelism(&self, raw: &str) -> Result<()> {
        let value: usize = raw
            .trim()
            .parse()
            .map_err(|_| MigCopyError::config(format!("error parsing input {raw:?}")))?;
        self.engine.set_parallelism(value)
    }

    /// Read the `parallelism` attribute.
    pub fn read_parallelism(&self) -> String {
        self.engine.parallelism().to_string()
    }

    /// Read the registry-wide `active_migrator` name; empty when
    /// offloading is disabled.
    pub fn read_active_migrator(&self) -> String {
        self.registry.active_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ChannelPool, HardwareChannelCopyEngine};

    fn control() -> EngineControl<HardwareChannelCopyEngine> {
        let registry = Arc::new(MigratorRegistry::new());
        let pool = Arc::new(ChannelPool::empty());
        let engine = Arc::new(HardwareChannelCopyEngine::new(pool));
        EngineControl::new(registry, engine)
    }

    #[test]
    fn test_offloading_round_trip() {
        let control = control();
        assert_eq!(control.read_offloading(), "0");
        assert_eq!(control.read_active_migrator(), "");

        control.write_offloading("1").unwrap();
        assert_eq!(control.read_offloading(), "1");
        assert_eq!(
            control.read_active_migrator(),
            HardwareChannelCopyEngine::NAME
        );

        control.write_offloading("0").unwrap();
        assert_eq!(control.read_offloading(), "0");
    }

    #[test]
    fn test_offloading_rejects_bad_input() {
        let control = control();
        assert!(control.write_offloading("2").is_err());
        assert!(control.write_offloading("yes").is_err());
        assert!(control.write_offloading("").is_err());
        // No state change on rejection.
        assert_eq!(control.read_offloading(), "0");
    }

    #[test]
    fn test_parallelism_attribute() {
        let control = control();
        assert_eq!(control.read_parallelism(), "1");

        control.write_parallelism("8").unwrap();
        assert_eq!(control.read_parallelism(), "8");

        assert!(control.write_parallelism("0").is_err());
        assert!(control.write_parallelism("-3").is_err());
        assert!(control.write_parallelism("lots").is_err());
        assert_eq!(control.read_parallelism(), "8");

        // Above the engine maximum: clamped, not rejected.
        control.write_parallelism("9999").unwrap();
        assert_eq!(control.read_parallelism(), "16");
    }
}
