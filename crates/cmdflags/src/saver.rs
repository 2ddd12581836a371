use std::sync::Arc;

use tracing::warn;

use crate::descriptor::FlagDescriptor;
use crate::registry::FlagRegistry;

/// Snapshot of every flag in a registry, restored when dropped.
///
/// Values, modified bits and validators all come back. Flags registered after
/// the snapshot are left as they are.
///
/// ```ignore
/// {
///     let _saver = FlagSaver::new();
///     registry.set_value("port", "1", SetMode::Value)?;
///     // ...
/// } // "port" is back to its previous value here
/// ```
#[derive(Debug)]
#[must_use = "flags are restored when the saver is dropped"]
pub struct FlagSaver {
    registry: Arc<FlagRegistry>,
    backup: Vec<FlagDescriptor>,
}

impl FlagSaver {
    /// Snapshot the global registry.
    pub fn new() -> Self {
        Self::for_registry(FlagRegistry::global())
    }

    pub fn for_registry(registry: Arc<FlagRegistry>) -> Self {
        let backup = registry.lock().iter().map(FlagDescriptor::snapshot).collect();
        Self { registry, backup }
    }

    fn restore(&self) {
        let mut table = self.registry.lock();
        for saved in &self.backup {
            let Some(flag) = table.find_mut(saved.name()) else {
                continue;
            };
            if let Err(err) = flag.copy_from(saved) {
                warn!(flag = saved.name(), %err, "could not restore flag");
            }
        }
    }
}

impl Default for FlagSaver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FlagSaver {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SetMode;

    fn even(_: &str, v: u32) -> bool {
        v % 2 == 0
    }

    #[test]
    fn restores_values_bits_and_validators() {
        let registry = Arc::new(FlagRegistry::new());
        let size = registry.define("size", "", "saver.rs", 2u32);
        let label = registry.define("label", "", "saver.rs", String::from("a"));

        {
            let _saver = FlagSaver::for_registry(Arc::clone(&registry));
            registry.set_value("size", "10", SetMode::Value).unwrap();
            registry.set_value("label", "b", SetMode::Default).unwrap();
            size.register_validator(&registry, even).unwrap();
            assert_eq!(size.get(), 10);
            assert_eq!(label.get(), "b");
        }

        assert_eq!(size.get(), 2);
        assert_eq!(label.get(), "a");
        let info = registry.flag_info("size").unwrap();
        assert!(!info.modified);
        assert!(!info.has_validator);
        assert_eq!(registry.flag_info("label").unwrap().default_value, "a");
    }

    #[test]
    fn later_flags_are_untouched() {
        let registry = Arc::new(FlagRegistry::new());
        let saver = FlagSaver::for_registry(Arc::clone(&registry));
        let late = registry.define("late", "", "saver.rs", 1i64);
        late.set(5);
        drop(saver);
        assert_eq!(late.get(), 5);
    }
}
