//! Process-level entry point: argv capture, parse and validate, usage text.

use std::sync::{Arc, LazyLock, OnceLock};

use parking_lot::RwLock;
use tracing::debug;

use crate::parser::{CommandLineParser, ParseReport};
use crate::registry::FlagRegistry;

const UNKNOWN_PROGRAM: &str = "UNKNOWN";
const USAGE_NOT_SET: &str = "Warning: set_usage_message() never called";

/// The argument vector as first seen by an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    argv0: String,
    command_line: String,
    args: Vec<String>,
    checksum: u32,
}

impl Invocation {
    fn capture(args: &[String]) -> Self {
        let command_line = args.join(" ");
        let checksum = command_line
            .bytes()
            // Bytes count as unsigned; a signed-char sum would differ above 0x7f.
            .fold(0u32, |sum, byte| sum.wrapping_add(u32::from(byte)));
        Self {
            argv0: args.first().cloned().unwrap_or_else(|| UNKNOWN_PROGRAM.to_string()),
            command_line,
            args: args.to_vec(),
            checksum,
        }
    }
}

/// Result of [`FlagEnvironment::parse_command_line_flags`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    /// Index of the first positional argument.
    pub first_positional: usize,
    pub report: ParseReport,
}

/// Ties a registry to one program invocation.
///
/// The argument vector is captured by the first parse and never replaced.
#[derive(Debug)]
pub struct FlagEnvironment {
    registry: Arc<FlagRegistry>,
    invocation: OnceLock<Invocation>,
    usage: RwLock<String>,
    version: RwLock<String>,
}

static GLOBAL: LazyLock<FlagEnvironment> = LazyLock::new(FlagEnvironment::new);

impl Default for FlagEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl FlagEnvironment {
    /// An environment over the global registry.
    pub fn new() -> Self {
        Self::with_registry(FlagRegistry::global())
    }

    pub fn with_registry(registry: Arc<FlagRegistry>) -> Self {
        Self {
            registry,
            invocation: OnceLock::new(),
            usage: RwLock::new(String::new()),
            version: RwLock::new(String::new()),
        }
    }

    /// The process-wide environment.
    pub fn global() -> &'static FlagEnvironment {
        &GLOBAL
    }

    pub fn registry(&self) -> &Arc<FlagRegistry> {
        &self.registry
    }

    /// Record `args` as the program invocation. Only the first call counts.
    pub fn set_argv(&self, args: &[String]) {
        self.invocation.get_or_init(|| {
            debug!(args = args.len(), "captured argv");
            Invocation::capture(args)
        });
    }

    /// Capture `args`, apply every flag in it, then validate the flags the
    /// command line left untouched.
    ///
    /// `args` is rebuilt with options ahead of positionals, or with options
    /// removed when `remove_flags` is set.
    pub fn parse_command_line_flags(&self, args: &mut Vec<String>, remove_flags: bool) -> ParseOutcome {
        self.set_argv(args);

        let mut table = self.registry.lock();
        let mut parser = CommandLineParser::new(&mut table);
        let first_positional = parser.parse_new_command_line_flags(args, remove_flags);
        parser.validate_unmodified_flags();
        let report = parser.into_report();
        debug!(
            first_positional,
            errors = report.errors().len(),
            undefined = report.undefined_names().len(),
            "parsed command line"
        );
        ParseOutcome {
            first_positional,
            report,
        }
    }

    pub fn value_of(&self, name: &str) -> Option<String> {
        self.registry.value_of(name)
    }

    /// argv[0] as captured, or `"UNKNOWN"` before capture.
    pub fn program_invocation_name(&self) -> String {
        self.invocation
            .get()
            .map_or(UNKNOWN_PROGRAM, |inv| inv.argv0.as_str())
            .to_string()
    }

    /// The part of argv[0] after its last `/`.
    pub fn program_invocation_short_name(&self) -> String {
        let name = self.program_invocation_name();
        match name.rsplit_once('/') {
            Some((_, base)) => base.to_string(),
            None => name,
        }
    }

    /// The captured arguments joined with single spaces.
    pub fn argv(&self) -> String {
        self.invocation
            .get()
            .map(|inv| inv.command_line.clone())
            .unwrap_or_default()
    }

    pub fn argvs(&self) -> Vec<String> {
        self.invocation
            .get()
            .map(|inv| inv.args.clone())
            .unwrap_or_default()
    }

    /// Byte sum of [`argv`](Self::argv), wrapping at `u32`.
    pub fn argv_sum(&self) -> u32 {
        self.invocation.get().map_or(0, |inv| inv.checksum)
    }

    pub fn set_usage_message(&self, usage: impl Into<String>) {
        *self.usage.write() = usage.into();
    }

    pub fn usage_message(&self) -> String {
        let usage = self.usage.read();
        if usage.is_empty() {
            USAGE_NOT_SET.to_string()
        } else {
            usage.clone()
        }
    }

    pub fn set_version_string(&self, version: impl Into<String>) {
        *self.version.write() = version.into();
    }

    pub fn version_string(&self) -> String {
        self.version.read().clone()
    }

    /// Drop every flag this environment knows about. If its registry is the
    /// global one, the global registry is released too.
    ///
    /// No other thread may touch flags during or after this call. The
    /// [`global`](Self::global) environment keeps pointing at the emptied
    /// registry, so it is unusable afterwards; a later
    /// [`FlagRegistry::global`] call builds an unrelated fresh registry.
    pub fn shut_down(&self) {
        if FlagRegistry::is_global(&self.registry) {
            FlagRegistry::shutdown_global();
        } else {
            self.registry.lock().clear();
        }
    }
}
