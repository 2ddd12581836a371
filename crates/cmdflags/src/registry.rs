//! The process-wide flag registry.
//!
//! [`FlagRegistry`] guards a [`FlagTable`] behind a single mutex. Every
//! operation that reads or mutates descriptors goes through
//! [`FlagRegistry::lock`], so lookups and sets are serialized even when the
//! caller only wants to read. Typed handles bypass the lock for reads.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::descriptor::{FlagDescriptor, Slot};
use crate::error::FlagError;
use crate::handle::{Flag, FlagRegistration, FlagType, ValidatorRegistration};
use crate::validator::Validator;
use crate::value::{StorageId, ValueBox, ValueCell, ValueKind};

/// How [`FlagTable::set_flag`] treats the target flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetMode {
    /// Set the current value and mark the flag modified.
    #[default]
    Value,
    /// Like [`SetMode::Value`], but only while the flag is unmodified.
    IfDefault,
    /// Change the default; also the current value if the flag is unmodified.
    Default,
}

/// Serializable view of one registered flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagInfo {
    pub name: String,
    pub kind: ValueKind,
    pub description: String,
    pub current_value: String,
    pub default_value: String,
    pub origin: String,
    pub modified: bool,
    pub has_validator: bool,
}

impl FlagInfo {
    fn of(flag: &FlagDescriptor) -> Self {
        Self {
            name: flag.name().to_string(),
            kind: flag.kind(),
            description: flag.help().to_string(),
            current_value: flag.current_value(),
            default_value: flag.default_value(),
            origin: flag.origin().to_string(),
            modified: flag.modified(),
            has_validator: flag.validator().is_some(),
        }
    }

    /// Whether the current value still equals the default text.
    pub fn is_default(&self) -> bool {
        self.current_value == self.default_value
    }
}

/// A command-line token resolved to a registered flag.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitArgument {
    /// The token text before any `=`, as typed (minus leading dashes).
    pub key: String,
    /// The registered name of the resolved flag.
    pub name: String,
    /// The value to apply, or `None` when it must come from the next token.
    pub value: Option<String>,
    pub kind: ValueKind,
}

/// The locked view of the registry.
///
/// Descriptors are indexed by name (ordered) and by the address of their
/// current-value storage. Both indexes always describe the same set of flags.
#[derive(Debug, Default)]
pub struct FlagTable {
    by_name: BTreeMap<String, FlagDescriptor>,
    by_storage: HashMap<StorageId, String>,
}

impl FlagTable {
    pub fn register(&mut self, flag: FlagDescriptor) -> Result<(), FlagError> {
        if let Some(existing) = self.by_name.get(flag.name()) {
            return Err(if existing.origin() == flag.origin() {
                FlagError::RegisteredTwice {
                    name: flag.name().to_string(),
                    origin: flag.origin().to_string(),
                }
            } else {
                FlagError::DefinedTwice {
                    name: flag.name().to_string(),
                    first: existing.origin().to_string(),
                    second: flag.origin().to_string(),
                }
            });
        }
        debug!(flag = flag.name(), kind = %flag.kind(), origin = flag.origin(), "registered flag");
        self.by_storage
            .insert(flag.storage_id(), flag.name().to_string());
        self.by_name.insert(flag.name().to_string(), flag);
        Ok(())
    }

    /// Registered name for `name`, trying `-` to `_` aliasing on a miss.
    fn canonical<'a>(&'a self, name: &str) -> Option<&'a str> {
        if let Some((key, _)) = self.by_name.get_key_value(name) {
            return Some(key.as_str());
        }
        if !name.contains('-') {
            return None;
        }
        self.by_name
            .get_key_value(name.replace('-', "_").as_str())
            .map(|(key, _)| key.as_str())
    }

    pub fn find(&self, name: &str) -> Option<&FlagDescriptor> {
        self.canonical(name).and_then(|key| self.by_name.get(key))
    }

    pub(crate) fn find_mut(&mut self, name: &str) -> Option<&mut FlagDescriptor> {
        let key = self.canonical(name)?.to_string();
        self.by_name.get_mut(&key)
    }

    pub fn find_by_storage(&self, storage: StorageId) -> Option<&FlagDescriptor> {
        self.by_storage
            .get(&storage)
            .and_then(|name| self.by_name.get(name))
    }

    /// Resolve `token` (leading dashes already stripped) to a flag.
    ///
    /// Handles `name=value`, the `noNAME` negation of boolean flags, and
    /// supplies `"1"` for a bare boolean flag.
    pub fn split_argument(&self, token: &str) -> Result<SplitArgument, FlagError> {
        let (key, value) = match token.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (token, None),
        };

        if let Some(flag) = self.find(key) {
            let value = match (value, flag.kind()) {
                (None, ValueKind::Bool) => Some("1".to_string()),
                (value, _) => value.map(str::to_string),
            };
            return Ok(SplitArgument {
                key: key.to_string(),
                name: flag.name().to_string(),
                value,
                kind: flag.kind(),
            });
        }

        let negated = key.strip_prefix("no").and_then(|rest| self.find(rest));
        match negated {
            Some(flag) if flag.kind() == ValueKind::Bool => Ok(SplitArgument {
                key: key.to_string(),
                name: flag.name().to_string(),
                value: Some("0".to_string()),
                kind: ValueKind::Bool,
            }),
            Some(flag) => Err(FlagError::NegatedNonBoolean {
                key: key.to_string(),
                kind: flag.kind(),
            }),
            None => Err(FlagError::UnknownFlag {
                name: key.to_string(),
            }),
        }
    }

    /// Assign `text` to the flag called `name` according to `mode`.
    ///
    /// Storage is untouched on failure. On success the message reads
    /// `"<name> set to <value>"`.
    pub fn set_flag(&mut self, name: &str, text: &str, mode: SetMode) -> Result<String, FlagError> {
        let flag = self.find_mut(name).ok_or_else(|| FlagError::NotFound {
            name: name.to_string(),
        })?;
        flag.update_modified_bit();
        let message = match mode {
            SetMode::Value => {
                let message = flag.try_parse(Slot::Current, text)?;
                flag.mark_modified();
                message
            }
            SetMode::IfDefault if flag.modified() => {
                format!("{} set to {}", flag.name(), flag.current_value())
            }
            SetMode::IfDefault => {
                let message = flag.try_parse(Slot::Current, text)?;
                flag.mark_modified();
                message
            }
            SetMode::Default => {
                let message = flag.try_parse(Slot::Default, text)?;
                if !flag.modified() {
                    // Same text, same validator: this only fails if the
                    // validator itself is inconsistent.
                    if let Err(err) = flag.try_parse(Slot::Current, text) {
                        debug!(flag = flag.name(), %err, "current value kept after default change");
                    }
                }
                message
            }
        };
        debug!(flag = flag.name(), ?mode, "{message}");
        Ok(message)
    }

    /// Attach `validator` to the flag whose current value lives at `storage`.
    ///
    /// Re-attaching the same function is a no-op. Replacing a different one
    /// is refused.
    pub fn register_validator(
        &mut self,
        storage: StorageId,
        validator: Validator,
    ) -> Result<(), FlagError> {
        let name = self
            .by_storage
            .get(&storage)
            .ok_or(FlagError::UnknownStorage)?;
        let flag = self
            .by_name
            .get_mut(name)
            .ok_or(FlagError::UnknownStorage)?;
        if validator.kind() != flag.kind() {
            return Err(FlagError::KindMismatch {
                expected: flag.kind(),
                found: validator.kind(),
            });
        }
        match flag.validator() {
            Some(existing) if existing.same_fn(&validator) => Ok(()),
            Some(_) => Err(FlagError::ValidatorConflict {
                name: flag.name().to_string(),
            }),
            None => {
                flag.set_validator(validator);
                Ok(())
            }
        }
    }

    /// Descriptors in name order.
    pub fn iter(&self) -> impl Iterator<Item = &FlagDescriptor> {
        self.by_name.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut FlagDescriptor> {
        self.by_name.values_mut()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Drop every descriptor.
    pub fn clear(&mut self) {
        self.by_storage.clear();
        self.by_name.clear();
    }
}

/// Init lock for the global instance; separate from each registry's own lock.
static GLOBAL: Mutex<Option<Arc<FlagRegistry>>> = parking_lot::const_mutex(None);

fn fatal(err: &FlagError) -> ! {
    eprintln!("ERROR: {err}");
    error!("{err}");
    std::process::exit(1)
}

/// A lock-guarded table of flags.
#[derive(Debug, Default)]
pub struct FlagRegistry {
    table: Mutex<FlagTable>,
}

impl FlagRegistry {
    /// An empty registry, independent of the global one.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every flag and validator declared with
    /// [`define_flag!`](crate::define_flag) and
    /// [`define_validator!`](crate::define_validator).
    pub fn with_static_flags() -> Self {
        let registry = Self::new();
        for registration in inventory::iter::<FlagRegistration> {
            let statics = registration.statics;
            match FlagDescriptor::new(
                statics.name,
                statics.help,
                statics.origin,
                ValueBox::borrowed(&statics.current),
                ValueBox::borrowed(&statics.default),
            ) {
                Ok(flag) => registry.register_flag(flag),
                Err(err) => fatal(&err),
            }
        }
        for registration in inventory::iter::<ValidatorRegistration> {
            // Failures are already logged.
            let _ = registry.register_validator(
                StorageId::of(registration.storage),
                (registration.make)(),
            );
        }
        registry
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> Arc<FlagRegistry> {
        let mut global = GLOBAL.lock();
        Arc::clone(global.get_or_insert_with(|| {
            debug!("creating global flag registry");
            Arc::new(Self::with_static_flags())
        }))
    }

    /// Release the global registry and every descriptor in it.
    ///
    /// Must not race with any other flag access. A later [`global`](Self::global)
    /// call builds a fresh registry.
    pub fn shutdown_global() {
        if let Some(registry) = GLOBAL.lock().take() {
            registry.lock().clear();
            debug!("global flag registry shut down");
        }
    }

    /// Whether `registry` is the current global instance.
    pub fn is_global(registry: &Arc<FlagRegistry>) -> bool {
        GLOBAL
            .lock()
            .as_ref()
            .is_some_and(|global| Arc::ptr_eq(global, registry))
    }

    pub fn lock(&self) -> MutexGuard<'_, FlagTable> {
        self.table.lock()
    }

    /// Register `flag`, terminating the process if its name is taken.
    pub fn register_flag(&self, flag: FlagDescriptor) {
        if let Err(err) = self.try_register_flag(flag) {
            fatal(&err);
        }
    }

    pub fn try_register_flag(&self, flag: FlagDescriptor) -> Result<(), FlagError> {
        self.lock().register(flag)
    }

    /// Create owned storage for a new flag, register it, and return its handle.
    ///
    /// Like [`register_flag`](Self::register_flag), a name collision terminates
    /// the process.
    pub fn define<T: FlagType>(
        &self,
        name: &str,
        help: &str,
        origin: &str,
        default: T,
    ) -> Flag<T> {
        match self.try_define(name, help, origin, default) {
            Ok(flag) => flag,
            Err(err) => fatal(&err),
        }
    }

    pub fn try_define<T: FlagType>(
        &self,
        name: &str,
        help: &str,
        origin: &str,
        default: T,
    ) -> Result<Flag<T>, FlagError> {
        let value = default.into_value();
        let cell = Arc::new(ValueCell::from_value(value.clone()));
        let flag = FlagDescriptor::new(
            name,
            help,
            origin,
            ValueBox::shared(Arc::clone(&cell)),
            ValueBox::new(value),
        )?;
        self.try_register_flag(flag)?;
        Ok(Flag::new(cell))
    }

    /// Attach a validator; failures are logged as warnings and returned.
    pub fn register_validator(
        &self,
        storage: StorageId,
        validator: Validator,
    ) -> Result<(), FlagError> {
        let result = self.lock().register_validator(storage, validator);
        if let Err(err) = &result {
            warn!("{err}");
        }
        result
    }

    /// Current value of `name` as text.
    pub fn value_of(&self, name: &str) -> Option<String> {
        self.lock().find(name).map(FlagDescriptor::current_value)
    }

    pub fn set_value(&self, name: &str, text: &str, mode: SetMode) -> Result<String, FlagError> {
        self.lock().set_flag(name, text, mode)
    }

    /// Every flag, in name order.
    pub fn flags(&self) -> Vec<FlagInfo> {
        self.lock().iter().map(FlagInfo::of).collect()
    }

    pub fn flag_info(&self, name: &str) -> Option<FlagInfo> {
        self.lock().find(name).map(FlagInfo::of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positive(_: &str, v: i32) -> bool {
        v > 0
    }

    fn negative(_: &str, v: i32) -> bool {
        v < 0
    }

    fn registry() -> FlagRegistry {
        let registry = FlagRegistry::new();
        registry.define("verbose", "Print more", "a.rs", true);
        registry.define("count", "How many", "a.rs", 3i32);
        registry.define("my_flag", "Aliased", "a.rs", false);
        registry.define("name", "Who", "a.rs", String::from("world"));
        registry
    }

    #[test]
    fn duplicate_names_report_both_origins() {
        let registry = registry();
        let err = registry
            .try_define("count", "", "b.rs", 1i32)
            .unwrap_err();
        assert_eq!(
            err,
            FlagError::DefinedTwice {
                name: "count".to_string(),
                first: "a.rs".to_string(),
                second: "b.rs".to_string(),
            }
        );
        let err = registry.try_define("count", "", "a.rs", 1i32).unwrap_err();
        assert!(matches!(err, FlagError::RegisteredTwice { .. }));
        assert_eq!(registry.lock().len(), 4);
    }

    #[test]
    fn lookups_alias_hyphens() {
        let registry = registry();
        let table = registry.lock();
        assert_eq!(table.find("my-flag").map(FlagDescriptor::name), Some("my_flag"));
        assert!(table.find("my_flag").is_some());
        assert!(table.find("count-").is_none());
    }

    #[test]
    fn every_hyphen_is_aliased() {
        let registry = FlagRegistry::new();
        let depth = registry.define("a_b_c", "", "a.rs", 0i32);
        let dry_run = registry.define("dry_run_all", "", "a.rs", true);
        let mut table = registry.lock();

        let split = table.split_argument("a-b-c=4").unwrap();
        assert_eq!((split.key.as_str(), split.name.as_str()), ("a-b-c", "a_b_c"));
        table.set_flag(&split.name, "4", SetMode::Value).unwrap();
        assert_eq!(depth.get(), 4);

        let split = table.split_argument("nodry-run-all").unwrap();
        assert_eq!(split.name, "dry_run_all");
        table
            .set_flag(&split.name, split.value.as_deref().unwrap(), SetMode::Value)
            .unwrap();
        assert!(!dry_run.get());
        assert!(matches!(
            table.split_argument("noa-b-c"),
            Err(FlagError::NegatedNonBoolean { .. })
        ));

        // Mixed spellings resolve too.
        assert_eq!(table.find("a-b_c").map(FlagDescriptor::name), Some("a_b_c"));
    }

    #[test]
    fn storage_index_matches_name_index() {
        let registry = registry();
        let flag = registry.try_define("extra", "", "a.rs", 1u64).unwrap();
        let table = registry.lock();
        let found = table.find_by_storage(flag.storage_id()).unwrap();
        assert_eq!(found.name(), "extra");
        for descriptor in table.iter() {
            assert_eq!(
                table.find_by_storage(descriptor.storage_id()).map(FlagDescriptor::name),
                Some(descriptor.name())
            );
        }
    }

    #[test]
    fn split_handles_values_and_negation() {
        let registry = registry();
        let table = registry.lock();

        let split = table.split_argument("count=7").unwrap();
        assert_eq!((split.name.as_str(), split.value.as_deref()), ("count", Some("7")));

        let split = table.split_argument("count").unwrap();
        assert_eq!(split.value, None);

        let split = table.split_argument("verbose").unwrap();
        assert_eq!(split.value.as_deref(), Some("1"));

        let split = table.split_argument("noverbose=yes").unwrap();
        assert_eq!(split.name, "verbose");
        assert_eq!(split.value.as_deref(), Some("0"));

        let split = table.split_argument("nomy-flag").unwrap();
        assert_eq!(split.name, "my_flag");

        assert_eq!(
            table.split_argument("nocount").unwrap_err(),
            FlagError::NegatedNonBoolean {
                key: "nocount".to_string(),
                kind: ValueKind::Int32,
            }
        );
        assert_eq!(
            table.split_argument("bogus=1").unwrap_err(),
            FlagError::UnknownFlag {
                name: "bogus".to_string()
            }
        );
    }

    #[test]
    fn set_value_is_idempotent_and_marks_modified() {
        let registry = registry();
        for _ in 0..2 {
            let message = registry.set_value("count", "9", SetMode::Value).unwrap();
            assert_eq!(message, "count set to 9");
            assert!(registry.flag_info("count").unwrap().modified);
        }
        assert_eq!(registry.value_of("count").as_deref(), Some("9"));
    }

    #[test]
    fn failed_set_leaves_value_alone() {
        let registry = registry();
        let err = registry.set_value("count", "nine", SetMode::Value).unwrap_err();
        assert!(matches!(err, FlagError::IllegalValue { .. }));
        let info = registry.flag_info("count").unwrap();
        assert_eq!(info.current_value, "3");
        assert!(!info.modified);
        assert!(matches!(
            registry.set_value("missing", "1", SetMode::Value),
            Err(FlagError::NotFound { .. })
        ));
    }

    #[test]
    fn if_default_only_touches_unmodified_flags() {
        let registry = registry();
        registry.set_value("count", "4", SetMode::IfDefault).unwrap();
        assert_eq!(registry.value_of("count").as_deref(), Some("4"));
        let message = registry.set_value("count", "5", SetMode::IfDefault).unwrap();
        assert_eq!(message, "count set to 4");
        assert_eq!(registry.value_of("count").as_deref(), Some("4"));
    }

    #[test]
    fn if_default_sees_handle_writes() {
        let registry = FlagRegistry::new();
        let handle = registry.define("level", "", "a.rs", 1i32);
        handle.set(2);
        registry.set_value("level", "3", SetMode::IfDefault).unwrap();
        assert_eq!(handle.get(), 2);
        assert!(registry.flag_info("level").unwrap().modified);
    }

    #[test]
    fn default_mode_moves_current_while_unmodified() {
        let registry = registry();
        registry.set_value("count", "8", SetMode::Default).unwrap();
        let info = registry.flag_info("count").unwrap();
        assert_eq!((info.default_value.as_str(), info.current_value.as_str()), ("8", "8"));
        assert!(!info.modified);

        registry.set_value("count", "1", SetMode::Value).unwrap();
        registry.set_value("count", "2", SetMode::Default).unwrap();
        let info = registry.flag_info("count").unwrap();
        assert_eq!((info.default_value.as_str(), info.current_value.as_str()), ("2", "1"));
    }

    #[test]
    fn validator_rules() {
        let registry = FlagRegistry::new();
        let count = registry.define("count", "", "a.rs", 3i32);
        let name = registry.define("name", "", "a.rs", String::new());

        count.register_validator(&registry, positive).unwrap();
        // Same function again is fine.
        count.register_validator(&registry, positive).unwrap();
        assert_eq!(
            count.register_validator(&registry, negative).unwrap_err(),
            FlagError::ValidatorConflict {
                name: "count".to_string()
            }
        );
        assert_eq!(
            registry
                .register_validator(name.storage_id(), Validator::Int32(positive))
                .unwrap_err(),
            FlagError::KindMismatch {
                expected: ValueKind::String,
                found: ValueKind::Int32,
            }
        );
        let stray = ValueCell::from_i32(0);
        assert_eq!(
            registry
                .register_validator(StorageId::of(&stray), Validator::Int32(positive))
                .unwrap_err(),
            FlagError::UnknownStorage
        );

        let err = registry.set_value("count", "-1", SetMode::Value).unwrap_err();
        assert!(matches!(err, FlagError::ValidationFailed { .. }));
        assert_eq!(count.get(), 3);
        assert!(registry.flag_info("count").unwrap().has_validator);
    }

    #[test]
    fn flag_listing_is_sorted_and_serializable() {
        let registry = registry();
        let names: Vec<_> = registry.flags().into_iter().map(|f| f.name).collect();
        assert_eq!(names, ["count", "my_flag", "name", "verbose"]);

        let info = registry.flag_info("name").unwrap();
        assert!(info.is_default());
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["currentValue"], "world");
        assert_eq!(json["kind"], "string");
        assert_eq!(json["hasValidator"], false);
    }

    #[test]
    fn clear_empties_both_indexes() {
        let registry = FlagRegistry::new();
        let handle = registry.define("gone", "", "a.rs", 1u32);
        registry.lock().clear();
        let table = registry.lock();
        assert!(table.is_empty());
        assert!(table.find_by_storage(handle.storage_id()).is_none());
    }
}
