//! Typed flag storage and text coercion.
//!
//! A [`ValueCell`] is the raw storage behind one flag value. Scalars live in
//! atomics so that steady-state reads never need the registry lock; strings sit
//! behind a per-cell reader/writer lock. A [`ValueBox`] wraps a cell (owned or
//! `'static`) and performs the text⇄value conversions used by the parser.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

use crate::error::FlagError;

/// The kind of value a flag holds. Fixed when the flag is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    String,
}

impl ValueKind {
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Double => "double",
            Self::String => "string",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A detached snapshot of a flag value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
}

impl Value {
    /// The zero value of `kind`: `false`, `0`, `0.0` or the empty string.
    pub fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Self::Bool(false),
            ValueKind::Int32 => Self::Int32(0),
            ValueKind::UInt32 => Self::UInt32(0),
            ValueKind::Int64 => Self::Int64(0),
            ValueKind::UInt64 => Self::UInt64(0),
            ValueKind::Double => Self::Double(0.0),
            ValueKind::String => Self::String(String::new()),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int32(_) => ValueKind::Int32,
            Self::UInt32(_) => ValueKind::UInt32,
            Self::Int64(_) => ValueKind::Int64,
            Self::UInt64(_) => ValueKind::UInt64,
            Self::Double(_) => ValueKind::Double,
            Self::String(_) => ValueKind::String,
        }
    }

    /// Parse `text` as a value of `kind`.
    ///
    /// Returns `None` when the text is not a legal value for that kind:
    /// - bool: one of `1 t true y yes` / `0 f false n no`, any case
    /// - integers: base 10, or base 16 with a leading `0x`/`0X`; no trailing garbage
    /// - unsigned integers: a leading `-` is rejected outright
    /// - 32-bit integers: must fit after a 64-bit parse
    /// - double: Rust float grammar plus leading whitespace; overflow is rejected
    /// - string: always accepted verbatim
    ///
    /// Empty text is only legal for strings.
    pub fn parse(kind: ValueKind, text: &str) -> Option<Self> {
        match kind {
            ValueKind::Bool => parse_bool(text).map(Self::Bool),
            ValueKind::String => Some(Self::String(text.to_owned())),
            _ if text.is_empty() => None,
            ValueKind::Int32 => parse_i64(text).and_then(|v| i32::try_from(v).ok()).map(Self::Int32),
            ValueKind::UInt32 => parse_u64(text).and_then(|v| u32::try_from(v).ok()).map(Self::UInt32),
            ValueKind::Int64 => parse_i64(text).map(Self::Int64),
            ValueKind::UInt64 => parse_u64(text).map(Self::UInt64),
            ValueKind::Double => parse_f64(text).map(Self::Double),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => f.write_str(if *v { "true" } else { "false" }),
            Self::Int32(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Double(v) => f.write_str(&format_double(*v)),
            Self::String(v) => f.write_str(v),
        }
    }
}

const TRUE_WORDS: [&str; 5] = ["1", "t", "true", "y", "yes"];
const FALSE_WORDS: [&str; 5] = ["0", "f", "false", "n", "no"];

fn parse_bool(text: &str) -> Option<bool> {
    if TRUE_WORDS.iter().any(|w| w.eq_ignore_ascii_case(text)) {
        Some(true)
    } else if FALSE_WORDS.iter().any(|w| w.eq_ignore_ascii_case(text)) {
        Some(false)
    } else {
        None
    }
}

/// Split off a hex body when the text starts with `0x`/`0X`.
///
/// A leading `0` alone never means octal.
fn hex_body(text: &str) -> Option<&str> {
    text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
}

/// Parse an unsigned magnitude with no sign and no surrounding text.
fn parse_magnitude(digits: &str, radix: u32) -> Option<u64> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

fn parse_i64(text: &str) -> Option<i64> {
    if let Some(hex) = hex_body(text) {
        return parse_magnitude(hex, 16).and_then(|v| i64::try_from(v).ok());
    }
    let body = text.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let (negative, digits) = match body.as_bytes().first() {
        Some(b'-') => (true, &body[1..]),
        Some(b'+') => (false, &body[1..]),
        _ => (false, body),
    };
    let magnitude = parse_magnitude(digits, 10)?;
    if negative {
        0i64.checked_sub_unsigned(magnitude)
    } else {
        i64::try_from(magnitude).ok()
    }
}

fn parse_u64(text: &str) -> Option<u64> {
    if let Some(hex) = hex_body(text) {
        return parse_magnitude(hex, 16);
    }
    let body = text.trim_start_matches(|c: char| c.is_ascii_whitespace());
    if body.starts_with('-') {
        return None;
    }
    parse_magnitude(body.strip_prefix('+').unwrap_or(body), 10)
}

fn parse_f64(text: &str) -> Option<f64> {
    let body = text.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let value: f64 = body.parse().ok()?;
    // Rust saturates "1e999" to infinity where strtod reports a range error.
    // Underflow ("1e-400") is kept as zero or a subnormal instead.
    if value.is_infinite() && !body.to_ascii_lowercase().contains("inf") {
        return None;
    }
    Some(value)
}

/// Format a double the way `%.17g` does: 17 significant digits, trailing
/// zeros removed, exponent form outside `1e-4 ..= 1e17`.
pub(crate) fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let sci = format!("{value:.16e}");
    let Some((mantissa, exponent)) = sci.split_once('e') else {
        return value.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return value.to_string();
    };
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if !(-4..17).contains(&exponent) {
        let fraction = digits[1..].trim_end_matches('0');
        let mut out = format!("{sign}{}", &digits[..1]);
        if !fraction.is_empty() {
            out.push('.');
            out.push_str(fraction);
        }
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        out.push_str(&format!("e{exp_sign}{:02}", exponent.unsigned_abs()));
        return out;
    }

    let (int_part, fraction) = if exponent >= 0 {
        let split = exponent as usize + 1;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        let zeros = "0".repeat(exponent.unsigned_abs() as usize - 1);
        ("0".to_string(), format!("{zeros}{digits}"))
    };
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{sign}{int_part}")
    } else {
        format!("{sign}{int_part}.{fraction}")
    }
}

/// Raw storage for one flag value.
///
/// The `from_*` constructors are `const` so that `define_flag!` can place
/// cells directly in `static` items.
#[derive(Debug)]
pub enum ValueCell {
    Bool(AtomicBool),
    Int32(AtomicI32),
    UInt32(AtomicU32),
    Int64(AtomicI64),
    UInt64(AtomicU64),
    /// Bit pattern of an `f64`.
    Double(AtomicU64),
    String(RwLock<Cow<'static, str>>),
}

impl ValueCell {
    pub const fn from_bool(v: bool) -> Self {
        Self::Bool(AtomicBool::new(v))
    }

    pub const fn from_i32(v: i32) -> Self {
        Self::Int32(AtomicI32::new(v))
    }

    pub const fn from_u32(v: u32) -> Self {
        Self::UInt32(AtomicU32::new(v))
    }

    pub const fn from_i64(v: i64) -> Self {
        Self::Int64(AtomicI64::new(v))
    }

    pub const fn from_u64(v: u64) -> Self {
        Self::UInt64(AtomicU64::new(v))
    }

    pub const fn from_f64(v: f64) -> Self {
        Self::Double(AtomicU64::new(v.to_bits()))
    }

    pub const fn from_static_str(v: &'static str) -> Self {
        Self::String(parking_lot::const_rwlock(Cow::Borrowed(v)))
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Bool(v) => Self::from_bool(v),
            Value::Int32(v) => Self::from_i32(v),
            Value::UInt32(v) => Self::from_u32(v),
            Value::Int64(v) => Self::from_i64(v),
            Value::UInt64(v) => Self::from_u64(v),
            Value::Double(v) => Self::from_f64(v),
            Value::String(v) => Self::String(RwLock::new(Cow::Owned(v))),
        }
    }

    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int32(_) => ValueKind::Int32,
            Self::UInt32(_) => ValueKind::UInt32,
            Self::Int64(_) => ValueKind::Int64,
            Self::UInt64(_) => ValueKind::UInt64,
            Self::Double(_) => ValueKind::Double,
            Self::String(_) => ValueKind::String,
        }
    }

    pub fn load(&self) -> Value {
        match self {
            Self::Bool(a) => Value::Bool(a.load(Ordering::Acquire)),
            Self::Int32(a) => Value::Int32(a.load(Ordering::Acquire)),
            Self::UInt32(a) => Value::UInt32(a.load(Ordering::Acquire)),
            Self::Int64(a) => Value::Int64(a.load(Ordering::Acquire)),
            Self::UInt64(a) => Value::UInt64(a.load(Ordering::Acquire)),
            Self::Double(a) => Value::Double(f64::from_bits(a.load(Ordering::Acquire))),
            Self::String(s) => Value::String(s.read().to_string()),
        }
    }

    /// Overwrite the cell. Fails without writing when the kinds differ.
    pub fn store(&self, value: Value) -> Result<(), FlagError> {
        match (self, value) {
            (Self::Bool(a), Value::Bool(v)) => a.store(v, Ordering::Release),
            (Self::Int32(a), Value::Int32(v)) => a.store(v, Ordering::Release),
            (Self::UInt32(a), Value::UInt32(v)) => a.store(v, Ordering::Release),
            (Self::Int64(a), Value::Int64(v)) => a.store(v, Ordering::Release),
            (Self::UInt64(a), Value::UInt64(v)) => a.store(v, Ordering::Release),
            (Self::Double(a), Value::Double(v)) => a.store(v.to_bits(), Ordering::Release),
            (Self::String(s), Value::String(v)) => *s.write() = Cow::Owned(v),
            (cell, value) => {
                return Err(FlagError::KindMismatch {
                    expected: cell.kind(),
                    found: value.kind(),
                });
            }
        }
        Ok(())
    }
}

/// Identity of a storage cell, derived from its address.
///
/// Used to find the flag that owns a piece of storage (for validator
/// attachment) without going through its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageId(usize);

impl StorageId {
    pub fn of(cell: &ValueCell) -> Self {
        Self(std::ptr::from_ref(cell) as usize)
    }
}

#[derive(Debug)]
enum Backing {
    Static(&'static ValueCell),
    Shared(Arc<ValueCell>),
}

/// A typed cell with text⇄value coercion.
///
/// The kind is fixed at construction and the backing address never moves
/// while the box is alive. A box either shares an `Arc` cell (also held by a
/// [`Flag`](crate::Flag) handle) or references a `'static` cell declared by
/// [`define_flag!`](crate::define_flag).
#[derive(Debug)]
pub struct ValueBox {
    backing: Backing,
}

impl ValueBox {
    /// A box owning a fresh cell initialised to `value`.
    pub fn new(value: Value) -> Self {
        Self::shared(Arc::new(ValueCell::from_value(value)))
    }

    pub fn shared(cell: Arc<ValueCell>) -> Self {
        Self {
            backing: Backing::Shared(cell),
        }
    }

    pub fn borrowed(cell: &'static ValueCell) -> Self {
        Self {
            backing: Backing::Static(cell),
        }
    }

    fn cell(&self) -> &ValueCell {
        match &self.backing {
            Backing::Static(cell) => cell,
            Backing::Shared(cell) => cell,
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.cell().kind()
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }

    pub fn storage_id(&self) -> StorageId {
        StorageId::of(self.cell())
    }

    pub fn value(&self) -> Value {
        self.cell().load()
    }

    /// Parse `text` into this box. On failure the stored value is untouched.
    pub fn parse_from(&self, text: &str) -> bool {
        match Value::parse(self.kind(), text) {
            Some(value) => self.cell().store(value).is_ok(),
            None => false,
        }
    }

    /// A new owned box of the same kind holding the zero value.
    pub fn new_like(&self) -> Self {
        Self::new(Value::zero(self.kind()))
    }

    /// Value equality; boxes of different kinds are never equal.
    pub fn equals(&self, other: &ValueBox) -> bool {
        self.kind() == other.kind() && self.value() == other.value()
    }

    pub fn copy_from(&self, other: &ValueBox) -> Result<(), FlagError> {
        self.cell().store(other.value())
    }
}

impl fmt::Display for ValueBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}
