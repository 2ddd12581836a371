//! Typed command-line flags backed by a process-wide registry.
//!
//! Flags are declared statically with [`define_flag!`] or at runtime with
//! [`FlagRegistry::define`]. Parsing goes through [`FlagEnvironment`], which
//! captures the argument vector, applies every `--name=value` it finds, moves
//! positionals behind the options and finally checks validators on flags the
//! command line did not touch.
//!
//! Token grammar:
//! - `--name=value` / `-name=value`
//! - `--name value` for non-boolean flags
//! - `--name` sets a boolean flag; `--noname` clears it
//! - `--` ends option scanning; a lone `-` is positional
//! - `my-flag` resolves to `my_flag`
//!
//! ```ignore
//! use cmdflags::define_flag;
//!
//! define_flag!(PORT: i32 = 8080, "port", "Port to listen on");
//!
//! let mut args: Vec<String> = std::env::args().collect();
//! let outcome = cmdflags::parse_command_line_flags(&mut args, true);
//! outcome.report.into_result()?;
//! println!("listening on {}", PORT.get());
//! ```

mod descriptor;
mod environment;
mod error;
mod handle;
mod macros;
mod parser;
mod registry;
mod saver;
mod validator;
mod value;

pub use descriptor::FlagDescriptor;
pub use environment::{FlagEnvironment, ParseOutcome};
pub use error::{FlagError, ParseErrors};
pub use handle::{Flag, FlagRegistration, FlagStatics, FlagType, StaticFlag, ValidatorRegistration};
pub use parser::{CommandLineParser, ParseReport};
pub use registry::{FlagInfo, FlagRegistry, FlagTable, SetMode, SplitArgument};
pub use saver::FlagSaver;
pub use validator::Validator;
pub use value::{StorageId, Value, ValueBox, ValueCell, ValueKind};

#[doc(hidden)]
pub mod __private {
    pub use inventory;
}

/// Parse `args` with the global environment.
///
/// See [`FlagEnvironment::parse_command_line_flags`].
pub fn parse_command_line_flags(args: &mut Vec<String>, remove_flags: bool) -> ParseOutcome {
    FlagEnvironment::global().parse_command_line_flags(args, remove_flags)
}

/// Current value of a registered flag as text.
pub fn value_of(name: &str) -> Option<String> {
    FlagEnvironment::global().value_of(name)
}

/// Release the global registry. No flag access may follow.
pub fn shut_down_command_line_flags() {
    FlagEnvironment::global().shut_down()
}
