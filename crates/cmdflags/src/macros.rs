/// Declare a typed flag in a `static` and register it with the global registry.
///
/// ```ignore
/// cmdflags::define_flag!(pub PORT: i32 = 8080, "port", "Port to listen on");
/// ```
///
/// Supported types are `bool`, `i32`, `u32`, `i64`, `u64`, `f64` and `String`
/// (with a `&'static str` default). The flag joins the registry when
/// [`FlagRegistry::global`](crate::FlagRegistry::global) first builds it; a name
/// clash with another flag terminates the process.
#[macro_export]
macro_rules! define_flag {
    ($(#[$attr:meta])* $vis:vis $ident:ident : $ty:ty = $default:expr, $name:expr, $help:expr $(,)?) => {
        $(#[$attr])*
        $vis static $ident: $crate::StaticFlag<$ty> =
            $crate::StaticFlag::<$ty>::new($name, $help, ::core::file!(), $default);

        $crate::__private::inventory::submit! {
            $crate::FlagRegistration::new($ident.statics())
        }
    };
}

/// Attach a validator function to a flag declared with [`define_flag!`].
///
/// ```ignore
/// fn positive(_name: &str, value: i32) -> bool { value > 0 }
/// cmdflags::define_validator!(PORT, positive);
/// ```
///
/// Conflicts are logged and otherwise ignored.
#[macro_export]
macro_rules! define_validator {
    ($flag:ident, $validator:expr $(,)?) => {
        $crate::__private::inventory::submit! {
            $crate::ValidatorRegistration::new($flag.current_cell(), || $flag.validator($validator))
        }
    };
}
