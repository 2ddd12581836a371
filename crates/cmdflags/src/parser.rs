//! Command-line scanning.
//!
//! The scan is a single left-to-right pass. Option tokens are applied to the
//! registry as they are met; positionals are set aside and appended after the
//! options, so the rebuilt vector reads `[prog] + options + unscanned + positionals`.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use tracing::{debug, warn};

use crate::error::{FlagError, ParseErrors};
use crate::registry::{FlagTable, SetMode};
use crate::value::ValueKind;

/// Everything a parse session collected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseReport {
    errors: BTreeMap<String, FlagError>,
    undefined_names: IndexSet<String>,
    warnings: Vec<String>,
}

impl ParseReport {
    /// Errors keyed by flag name (or by the unresolved key for unknown flags).
    pub fn errors(&self) -> &BTreeMap<String, FlagError> {
        &self.errors
    }

    /// Unresolved flag names in the order they were first seen.
    pub fn undefined_names(&self) -> &IndexSet<String> {
        &self.undefined_names
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), ParseErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ParseErrors::new(self.errors))
        }
    }
}

/// Drives one parse session against a locked [`FlagTable`].
#[derive(Debug)]
pub struct CommandLineParser<'a> {
    table: &'a mut FlagTable,
    report: ParseReport,
}

impl<'a> CommandLineParser<'a> {
    pub fn new(table: &'a mut FlagTable) -> Self {
        Self {
            table,
            report: ParseReport::default(),
        }
    }

    /// Apply every option in `args` and partition it.
    ///
    /// Returns the index of the first positional in the partitioned layout,
    /// or 0 for an empty vector. With `remove_flags`, the options are dropped
    /// and `args` becomes `[prog] + positionals`; the returned index still
    /// refers to the partitioned layout.
    pub fn parse_new_command_line_flags(
        &mut self,
        args: &mut Vec<String>,
        remove_flags: bool,
    ) -> usize {
        let mut tokens = std::mem::take(args).into_iter();
        let Some(program) = tokens.next() else {
            return 0;
        };

        let mut options = Vec::new();
        let mut unscanned = Vec::new();
        let mut positionals = Vec::new();

        while let Some(token) = tokens.next() {
            if token == "-" || !token.starts_with('-') {
                positionals.push(token);
                continue;
            }

            let body = &token[1..];
            let body = body.strip_prefix('-').unwrap_or(body);
            if body.is_empty() {
                options.push(token);
                unscanned.extend(tokens.by_ref());
                break;
            }

            let split = match self.table.split_argument(body) {
                Ok(split) => split,
                Err(err) => {
                    let key = body.split_once('=').map_or(body, |(key, _)| key).to_string();
                    debug!(key = key.as_str(), %err, "unresolved flag");
                    self.report.undefined_names.insert(key.clone());
                    self.report.errors.insert(key, err);
                    options.push(token);
                    continue;
                }
            };

            let value = match split.value {
                Some(value) => {
                    options.push(token);
                    value
                }
                None => match tokens.next() {
                    Some(value) => {
                        self.check_boolean_string(&split.name, split.kind, &value);
                        options.push(token);
                        options.push(value.clone());
                        value
                    }
                    None => {
                        let help = self
                            .table
                            .find(&split.name)
                            .map(|flag| flag.help().to_string())
                            .unwrap_or_default();
                        self.report.errors.insert(
                            split.key,
                            FlagError::MissingArgument {
                                flag: token.clone(),
                                help,
                            },
                        );
                        options.push(token);
                        break;
                    }
                },
            };

            if let Err(err) = self.table.set_flag(&split.name, &value, SetMode::Value) {
                self.report.errors.insert(split.name, err);
            }
        }

        let boundary = 1 + options.len();
        args.push(program);
        if !remove_flags {
            args.extend(options);
        }
        args.extend(unscanned);
        args.extend(positionals);
        boundary
    }

    /// `--name -x` where `name` is a string flag documented as taking
    /// true/false is most likely a forgotten boolean value.
    fn check_boolean_string(&mut self, name: &str, kind: ValueKind, value: &str) {
        if kind != ValueKind::String || !value.starts_with('-') {
            return;
        }
        let help_mentions_bool = self
            .table
            .find(name)
            .is_some_and(|flag| flag.help().contains("true") || flag.help().contains("false"));
        if help_mentions_bool {
            let warning = format!("did you really mean to set flag '{name}' to the value '{value}'?");
            warn!("{warning}");
            self.report.warnings.push(warning);
        }
    }

    /// Record a "must be set" error for every flag whose current value fails
    /// its validator. Without `all`, modified flags are skipped. A flag that
    /// already has an error keeps it.
    pub fn validate_flags(&mut self, all: bool) {
        for flag in self.table.iter_mut() {
            flag.update_modified_bit();
            if (all || !flag.modified()) && !flag.validate_current() {
                self.report
                    .errors
                    .entry(flag.name().to_string())
                    .or_insert_with(|| FlagError::MustBeSet {
                        name: flag.name().to_string(),
                        default_fails: !flag.modified(),
                    });
            }
        }
    }

    pub fn validate_unmodified_flags(&mut self) {
        self.validate_flags(false)
    }

    pub fn report(&self) -> &ParseReport {
        &self.report
    }

    pub fn into_report(self) -> ParseReport {
        self.report
    }
}
