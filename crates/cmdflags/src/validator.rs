use std::fmt;

use crate::value::{Value, ValueKind};

/// A predicate over a candidate flag value, receiving the flag name first.
///
/// The variant is picked when the validator is built, so a validator can only
/// ever see values of the kind it was written for.
#[derive(Clone, Copy)]
pub enum Validator {
    Bool(fn(&str, bool) -> bool),
    Int32(fn(&str, i32) -> bool),
    UInt32(fn(&str, u32) -> bool),
    Int64(fn(&str, i64) -> bool),
    UInt64(fn(&str, u64) -> bool),
    Double(fn(&str, f64) -> bool),
    String(fn(&str, &str) -> bool),
}

impl Validator {
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

    /// Run the predicate. A value of another kind never passes.
    pub fn check(&self, name: &str, value: &Value) -> bool {
        match (self, value) {
            (Self::Bool(f), Value::Bool(v)) => f(name, *v),
            (Self::Int32(f), Value::Int32(v)) => f(name, *v),
            (Self::UInt32(f), Value::UInt32(v)) => f(name, *v),
            (Self::Int64(f), Value::Int64(v)) => f(name, *v),
            (Self::UInt64(f), Value::UInt64(v)) => f(name, *v),
            (Self::Double(f), Value::Double(v)) => f(name, *v),
            (Self::String(f), Value::String(v)) => f(name, v),
            _ => false,
        }
    }

    /// Whether both validators call the same function.
    pub fn same_fn(&self, other: &Validator) -> bool {
        use std::ptr::fn_addr_eq;
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => fn_addr_eq(*a, *b),
            (Self::Int32(a), Self::Int32(b)) => fn_addr_eq(*a, *b),
            (Self::UInt32(a), Self::UInt32(b)) => fn_addr_eq(*a, *b),
            (Self::Int64(a), Self::Int64(b)) => fn_addr_eq(*a, *b),
            (Self::UInt64(a), Self::UInt64(b)) => fn_addr_eq(*a, *b),
            (Self::Double(a), Self::Double(b)) => fn_addr_eq(*a, *b),
            (Self::String(a), Self::String(b)) => fn_addr_eq(*a, *b),
            _ => false,
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validator<{}>", self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positive(_: &str, v: i32) -> bool {
        v > 0
    }

    fn non_empty(_: &str, v: &str) -> bool {
        !v.is_empty()
    }

    #[test]
    fn dispatches_on_matching_kind_only() {
        let v = Validator::Int32(positive);
        assert!(v.check("n", &Value::Int32(3)));
        assert!(!v.check("n", &Value::Int32(0)));
        assert!(!v.check("n", &Value::Int64(3)));

        let s = Validator::String(non_empty);
        assert!(s.check("s", &Value::String("x".to_string())));
        assert!(!s.check("s", &Value::String(String::new())));
    }

    #[test]
    fn identity_compares_function_addresses() {
        let a = Validator::Int32(positive);
        assert!(a.same_fn(&Validator::Int32(positive)));
        assert!(!a.same_fn(&Validator::Int32(|_, v| v < 0)));
        assert!(!a.same_fn(&Validator::String(non_empty)));
    }
}
