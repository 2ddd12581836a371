use crate::error::FlagError;
use crate::validator::Validator;
use crate::value::{StorageId, Value, ValueBox, ValueKind};

/// Which of a descriptor's two boxes an assignment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Current,
    Default,
}

/// A registered flag: identity, current and default values, and validator.
///
/// The descriptor owns both value boxes. Their kinds always agree, which
/// [`FlagDescriptor::new`] checks once at construction.
#[derive(Debug)]
pub struct FlagDescriptor {
    name: String,
    help: String,
    origin: String,
    modified: bool,
    default: ValueBox,
    current: ValueBox,
    validator: Option<Validator>,
}

impl FlagDescriptor {
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        origin: impl Into<String>,
        current: ValueBox,
        default: ValueBox,
    ) -> Result<Self, FlagError> {
        if current.kind() != default.kind() {
            return Err(FlagError::KindMismatch {
                expected: default.kind(),
                found: current.kind(),
            });
        }
        Ok(Self {
            name: name.into(),
            help: help.into(),
            origin: origin.into(),
            modified: false,
            default,
            current,
            validator: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    /// Where the flag was defined, usually a source file path.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn kind(&self) -> ValueKind {
        self.default.kind()
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }

    pub fn current_value(&self) -> String {
        self.current.to_string()
    }

    pub fn default_value(&self) -> String {
        self.default.to_string()
    }

    pub fn current(&self) -> &ValueBox {
        &self.current
    }

    pub fn default_box(&self) -> &ValueBox {
        &self.default
    }

    /// Address of the current-value storage; the registry's second index.
    pub fn storage_id(&self) -> StorageId {
        self.current.storage_id()
    }

    pub fn modified(&self) -> bool {
        self.modified
    }

    pub fn validator(&self) -> Option<Validator> {
        self.validator
    }

    pub(crate) fn set_validator(&mut self, validator: Validator) {
        self.validator = Some(validator);
    }

    pub fn validate(&self, candidate: &ValueBox) -> bool {
        self.validate_value(&candidate.value())
    }

    fn validate_value(&self, candidate: &Value) -> bool {
        match &self.validator {
            None => true,
            Some(validator) => validator.check(&self.name, candidate),
        }
    }

    pub fn validate_current(&self) -> bool {
        self.validate(&self.current)
    }

    /// Mark the flag modified if its storage was written behind the
    /// registry's back (through a handle's `set`).
    pub fn update_modified_bit(&mut self) {
        if !self.modified && !self.current.equals(&self.default) {
            self.modified = true;
        }
    }

    pub(crate) fn mark_modified(&mut self) {
        self.modified = true;
    }

    /// Parse `text` into a scratch box, validate it, and only then copy it into
    /// the target slot. The slot is untouched on any failure.
    pub(crate) fn try_parse(&self, slot: Slot, text: &str) -> Result<String, FlagError> {
        let target = match slot {
            Slot::Current => &self.current,
            Slot::Default => &self.default,
        };
        let tentative = target.new_like();
        if !tentative.parse_from(text) {
            return Err(FlagError::IllegalValue {
                name: self.name.clone(),
                value: text.to_string(),
                kind: self.kind(),
            });
        }
        if !self.validate(&tentative) {
            return Err(FlagError::ValidationFailed {
                name: self.name.clone(),
                value: tentative.to_string(),
            });
        }
        target.copy_from(&tentative)?;
        Ok(format!("{} set to {}", self.name, target))
    }

    /// Copy the mutable state of `src`: modified bit, both values and validator.
    pub fn copy_from(&mut self, src: &FlagDescriptor) -> Result<(), FlagError> {
        self.modified = src.modified;
        if !self.current.equals(&src.current) {
            self.current.copy_from(&src.current)?;
        }
        if !self.default.equals(&src.default) {
            self.default.copy_from(&src.default)?;
        }
        self.validator = src.validator;
        Ok(())
    }

    /// A detached copy with its own storage, for later [`copy_from`](Self::copy_from).
    pub fn snapshot(&self) -> FlagDescriptor {
        FlagDescriptor {
            name: self.name.clone(),
            help: self.help.clone(),
            origin: self.origin.clone(),
            modified: self.modified,
            default: ValueBox::new(self.default.value()),
            current: ValueBox::new(self.current.value()),
            validator: self.validator,
        }
    }
}
