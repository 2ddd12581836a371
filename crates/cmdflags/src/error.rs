use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::value::ValueKind;

/// Errors produced while registering, setting or parsing flags.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlagError {
    /// No flag matches the name used on the command line.
    #[error("unknown command line flag '{name}'")]
    UnknownFlag { name: String },

    /// `--noNAME` used where `NAME` is not a boolean flag.
    #[error("boolean value ({key}) specified for {kind} command line flag")]
    NegatedNonBoolean { key: String, kind: ValueKind },

    /// A value-taking flag was the last option token.
    #[error("flag '{flag}' is missing its argument{}", describe(.help))]
    MissingArgument { flag: String, help: String },

    #[error("illegal value '{value}' specified for {kind} flag '{name}'")]
    IllegalValue {
        name: String,
        value: String,
        kind: ValueKind,
    },

    #[error("failed validation of new value '{value}' for flag '{name}'")]
    ValidationFailed { name: String, value: String },

    /// The current value fails its validator after parsing finished.
    #[error("--{name} must be set on the commandline{}", default_note(.default_fails))]
    MustBeSet { name: String, default_fails: bool },

    #[error("flag '{name}' was defined more than once (in files '{first}' and '{second}')")]
    DefinedTwice {
        name: String,
        first: String,
        second: String,
    },

    #[error(
        "something wrong with flag '{name}' in file '{origin}': it was registered twice from the same place"
    )]
    RegisteredTwice { name: String, origin: String },

    #[error("no flag named '{name}'")]
    NotFound { name: String },

    #[error("no flag is backed by the given storage")]
    UnknownStorage,

    #[error("validate-fn already registered for flag '{name}'")]
    ValidatorConflict { name: String },

    #[error("type mismatch: expected {expected} value, found {found}")]
    KindMismatch { expected: ValueKind, found: ValueKind },
}

fn describe(help: &str) -> String {
    if help.is_empty() {
        String::new()
    } else {
        format!("; flag description: {help}")
    }
}

fn default_note(default_fails: &bool) -> &'static str {
    if *default_fails {
        " (default value fails validation)"
    } else {
        ""
    }
}

/// Every error left over from a parse session, keyed by flag name.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseErrors {
    errors: BTreeMap<String, FlagError>,
}

impl ParseErrors {
    pub(crate) fn new(errors: BTreeMap<String, FlagError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &BTreeMap<String, FlagError> {
        &self.errors
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in self.errors.values() {
            if !first {
                f.write_str("\n")?;
            }
            first = false;
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_argument_mentions_help_only_when_present() {
        let with_help = FlagError::MissingArgument {
            flag: "--out".to_string(),
            help: "Where to write".to_string(),
        };
        assert_eq!(
            with_help.to_string(),
            "flag '--out' is missing its argument; flag description: Where to write"
        );
        let bare = FlagError::MissingArgument {
            flag: "--out".to_string(),
            help: String::new(),
        };
        assert_eq!(bare.to_string(), "flag '--out' is missing its argument");
    }

    #[test]
    fn must_be_set_notes_untouched_default() {
        let err = FlagError::MustBeSet {
            name: "port".to_string(),
            default_fails: true,
        };
        assert_eq!(
            err.to_string(),
            "--port must be set on the commandline (default value fails validation)"
        );
    }

    #[test]
    fn parse_errors_list_messages_in_name_order() {
        let mut errors = BTreeMap::new();
        errors.insert(
            "zeta".to_string(),
            FlagError::UnknownFlag {
                name: "zeta".to_string(),
            },
        );
        errors.insert(
            "alpha".to_string(),
            FlagError::UnknownFlag {
                name: "alpha".to_string(),
            },
        );
        let all = ParseErrors::new(errors);
        assert_eq!(
            all.to_string(),
            "unknown command line flag 'alpha'\nunknown command line flag 'zeta'"
        );
    }
}
