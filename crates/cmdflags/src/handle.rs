//! Typed handles onto flag storage.
//!
//! Handles read the current value straight from the storage cell, so reads
//! after parsing need no registry lock.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::registry::FlagRegistry;
use crate::validator::Validator;
use crate::value::{StorageId, Value, ValueCell, ValueKind};

/// A Rust type that can back a flag.
pub trait FlagType: Sized + 'static {
    const KIND: ValueKind;

    /// Signature of a validator written for this type.
    type ValidatorFn: Copy;

    fn from_value(value: Value) -> Option<Self>;

    fn into_value(self) -> Value;

    fn validator(f: Self::ValidatorFn) -> Validator;
}

macro_rules! scalar_flag_type {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FlagType for $ty {
                const KIND: ValueKind = ValueKind::$variant;
                type ValidatorFn = fn(&str, $ty) -> bool;

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn validator(f: Self::ValidatorFn) -> Validator {
                    Validator::$variant(f)
                }
            }
        )*
    };
}

scalar_flag_type! {
    bool => Bool,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f64 => Double,
}

impl FlagType for String {
    const KIND: ValueKind = ValueKind::String;
    type ValidatorFn = fn(&str, &str) -> bool;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn validator(f: Self::ValidatorFn) -> Validator {
        Validator::String(f)
    }
}

fn read<T: FlagType>(cell: &ValueCell) -> T {
    match T::from_value(cell.load()) {
        Some(v) => v,
        None => unreachable!("flag storage kind is fixed to {} at definition", T::KIND),
    }
}

fn write<T: FlagType>(cell: &ValueCell, value: T) {
    // Kinds agree by construction of the handle.
    let _ = cell.store(value.into_value());
}

/// Handle to a flag defined at runtime with [`FlagRegistry::define`].
#[derive(Debug)]
pub struct Flag<T> {
    cell: Arc<ValueCell>,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for Flag<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            _type: PhantomData,
        }
    }
}

impl<T: FlagType> Flag<T> {
    pub(crate) fn new(cell: Arc<ValueCell>) -> Self {
        Self {
            cell,
            _type: PhantomData,
        }
    }

    pub fn get(&self) -> T {
        read(&self.cell)
    }

    /// Write the current value directly, bypassing parsing and validation.
    ///
    /// The registry notices the change the next time the flag is set
    /// through it (see [`FlagDescriptor::update_modified_bit`](crate::FlagDescriptor::update_modified_bit)).
    pub fn set(&self, value: T) {
        write(&self.cell, value)
    }

    pub fn storage_id(&self) -> StorageId {
        StorageId::of(&self.cell)
    }

    /// Attach `f` as this flag's validator in `registry`.
    pub fn register_validator(
        &self,
        registry: &FlagRegistry,
        f: T::ValidatorFn,
    ) -> Result<(), crate::FlagError> {
        registry.register_validator(self.storage_id(), T::validator(f))
    }
}

/// Storage and identity of a flag declared with [`define_flag!`](crate::define_flag).
#[derive(Debug)]
pub struct FlagStatics {
    pub(crate) name: &'static str,
    pub(crate) help: &'static str,
    pub(crate) origin: &'static str,
    pub(crate) current: ValueCell,
    pub(crate) default: ValueCell,
}

/// A flag living in a `static`, created by [`define_flag!`](crate::define_flag).
#[derive(Debug)]
pub struct StaticFlag<T> {
    statics: FlagStatics,
    _type: PhantomData<fn() -> T>,
}

impl<T> StaticFlag<T> {
    const fn from_cells(
        name: &'static str,
        help: &'static str,
        origin: &'static str,
        current: ValueCell,
        default: ValueCell,
    ) -> Self {
        Self {
            statics: FlagStatics {
                name,
                help,
                origin,
                current,
                default,
            },
            _type: PhantomData,
        }
    }
}

macro_rules! static_flag_ctor {
    ($($ty:ty => $arg:ty, $cell:ident);* $(;)?) => {
        $(
            impl StaticFlag<$ty> {
                #[doc(hidden)]
                pub const fn new(
                    name: &'static str,
                    help: &'static str,
                    origin: &'static str,
                    default: $arg,
                ) -> Self {
                    Self::from_cells(
                        name,
                        help,
                        origin,
                        ValueCell::$cell(default),
                        ValueCell::$cell(default),
                    )
                }
            }
        )*
    };
}

static_flag_ctor! {
    bool => bool, from_bool;
    i32 => i32, from_i32;
    u32 => u32, from_u32;
    i64 => i64, from_i64;
    u64 => u64, from_u64;
    f64 => f64, from_f64;
    String => &'static str, from_static_str;
}

impl<T: FlagType> StaticFlag<T> {
    #[doc(hidden)]
    pub const fn statics(&'static self) -> &'static FlagStatics {
        &self.statics
    }

    #[doc(hidden)]
    pub const fn current_cell(&'static self) -> &'static ValueCell {
        &self.statics.current
    }

    pub fn name(&self) -> &'static str {
        self.statics.name
    }

    pub fn help(&self) -> &'static str {
        self.statics.help
    }

    pub fn get(&self) -> T {
        read(&self.statics.current)
    }

    /// See [`Flag::set`].
    pub fn set(&self, value: T) {
        write(&self.statics.current, value)
    }

    pub fn storage_id(&self) -> StorageId {
        StorageId::of(&self.statics.current)
    }

    #[doc(hidden)]
    pub fn validator(&self, f: T::ValidatorFn) -> Validator {
        T::validator(f)
    }
}

/// Collected by `inventory` for every [`define_flag!`](crate::define_flag).
pub struct FlagRegistration {
    pub(crate) statics: &'static FlagStatics,
}

impl FlagRegistration {
    #[doc(hidden)]
    pub const fn new(statics: &'static FlagStatics) -> Self {
        Self { statics }
    }
}

/// Collected by `inventory` for every [`define_validator!`](crate::define_validator).
pub struct ValidatorRegistration {
    pub(crate) storage: &'static ValueCell,
    pub(crate) make: fn() -> Validator,
}

impl ValidatorRegistration {
    #[doc(hidden)]
    pub const fn new(storage: &'static ValueCell, make: fn() -> Validator) -> Self {
        Self { storage, make }
    }
}

inventory::collect!(FlagRegistration);
inventory::collect!(ValidatorRegistration);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_reads_and_writes_its_cell() {
        let flag: Flag<f64> = Flag::new(Arc::new(ValueCell::from_f64(1.5)));
        assert_eq!(flag.get(), 1.5);
        flag.set(-2.25);
        assert_eq!(flag.clone().get(), -2.25);
    }

    #[test]
    fn string_handle_owns_its_text() {
        let flag: Flag<String> = Flag::new(Arc::new(ValueCell::from_static_str("abc")));
        assert_eq!(flag.get(), "abc");
        flag.set("xyz".to_string());
        assert_eq!(flag.get(), "xyz");
    }

    static PLAIN: StaticFlag<u32> = StaticFlag::<u32>::new("plain", "a static flag", file!(), 7);

    #[test]
    fn static_flag_exposes_identity() {
        assert_eq!(PLAIN.name(), "plain");
        assert_eq!(PLAIN.help(), "a static flag");
        assert_eq!(PLAIN.get(), 7);
        assert_eq!(PLAIN.storage_id(), StorageId::of(PLAIN.current_cell()));
    }
}
