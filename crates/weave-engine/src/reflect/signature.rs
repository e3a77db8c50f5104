//! Overload matching
//!
//! A `ReflectedArgs` describes one host overload. Matching converts the
//! supplied dynamic values into a reusable `CallData` buffer; the first
//! failing argument is recorded for error reporting.

use std::fmt;

use weave_sdk::{HostConstructor, HostMethod, HostType, HostValue};

use crate::args::ordinal;
use crate::convert::to_host;
use crate::runtime::Runtime;
use crate::value::Value;

/// What a signature invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    /// Host constructor
    Constructor,
    /// Static method (no receiver)
    Static,
    /// Instance method (receiver not among the parameters)
    Instance,
}

/// Why the last match attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgFailure {
    /// Wrong number of arguments
    Arity {
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },
    /// A positional argument did not convert
    Position(usize),
    /// A keyword-supplied argument did not convert
    Keyword {
        /// Slot index of the argument
        index: usize,
        /// Keyword used
        name: String,
    },
}

impl ArgFailure {
    /// Zero-based index of the failing argument
    pub fn index(&self) -> Option<usize> {
        match self {
            ArgFailure::Arity { .. } => None,
            ArgFailure::Position(i) => Some(*i),
            ArgFailure::Keyword { index, .. } => Some(*index),
        }
    }
}

impl fmt::Display for ArgFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgFailure::Arity { expected, got } => {
                write!(f, "expected {} arguments, got {}", expected, got)
            }
            ArgFailure::Position(i) => write!(f, "{} argument does not convert", ordinal(i + 1)),
            ArgFailure::Keyword { name, .. } => write!(f, "keyword argument '{}' does not convert", name),
        }
    }
}

/// Reusable buffer of converted host arguments.
///
/// Grows geometrically and never shrinks; `len` marks the live prefix so
/// slots left over from a longer previous call are ignored.
#[derive(Debug, Default)]
pub struct CallData {
    slots: Vec<HostValue>,
    len: usize,
    failure: Option<ArgFailure>,
    cost: u32,
}

impl CallData {
    /// Buffer with `capacity` preallocated slots
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![HostValue::Null; capacity],
            len: 0,
            failure: None,
            cost: 0,
        }
    }

    fn prepare(&mut self, len: usize) {
        if self.slots.len() < len {
            let grown = (self.slots.len() * 2).max(len);
            self.slots.resize(grown, HostValue::Null);
        }
        self.len = len;
        self.failure = None;
        self.cost = 0;
    }

    /// Converted arguments of the last successful match
    pub fn args(&self) -> &[HostValue] {
        &self.slots[..self.len]
    }

    /// Number of live arguments
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check for an empty argument list
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated slot count
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Failure recorded by the last unsuccessful match
    pub fn failure(&self) -> Option<&ArgFailure> {
        self.failure.as_ref()
    }

    /// Summed conversion cost of the last successful match
    pub fn cost(&self) -> u32 {
        self.cost
    }
}

/// One host overload
#[derive(Clone)]
pub struct ReflectedArgs {
    params: Vec<HostType>,
    kind: SignatureKind,
    index: usize,
    method: Option<HostMethod>,
}

impl ReflectedArgs {
    /// Signature of the constructor at `index` of its declaring class
    pub fn constructor(index: usize, ctor: &HostConstructor) -> Self {
        Self {
            params: ctor.params().to_vec(),
            kind: SignatureKind::Constructor,
            index,
            method: None,
        }
    }

    /// Signature of a method overload
    pub fn method(method: &HostMethod) -> Self {
        Self {
            params: method.params().to_vec(),
            kind: if method.is_static() {
                SignatureKind::Static
            } else {
                SignatureKind::Instance
            },
            index: 0,
            method: Some(method.clone()),
        }
    }

    /// Declared parameter types
    pub fn params(&self) -> &[HostType] {
        &self.params
    }

    /// Signature kind
    pub fn kind(&self) -> SignatureKind {
        self.kind
    }

    /// Whether no receiver is needed
    pub fn is_static(&self) -> bool {
        self.kind != SignatureKind::Instance
    }

    /// Constructor index in the declaring class
    pub fn index(&self) -> usize {
        self.index
    }

    /// The host method, for method signatures
    pub fn host_method(&self) -> Option<&HostMethod> {
        self.method.as_ref()
    }

    /// Check applicability and convert into `data`.
    ///
    /// Arity must match exactly. Keyword values are matched by position
    /// after the positional ones; their names were validated by the caller.
    pub fn matches(&self, rt: &Runtime, args: &[Value], kw_names: &[&str], data: &mut CallData) -> bool {
        data.prepare(self.params.len());
        if args.len() != self.params.len() {
            data.failure = Some(ArgFailure::Arity {
                expected: self.params.len(),
                got: args.len(),
            });
            return false;
        }
        let positional = args.len() - kw_names.len().min(args.len());
        for (i, (arg, ty)) in args.iter().zip(&self.params).enumerate() {
            match to_host(rt, arg, ty) {
                Some((value, cost)) => {
                    data.slots[i] = value;
                    data.cost += cost;
                }
                None => {
                    data.failure = Some(if i < positional {
                        ArgFailure::Position(i)
                    } else {
                        ArgFailure::Keyword {
                            index: i,
                            name: kw_names[i - positional].to_string(),
                        }
                    });
                    return false;
                }
            }
        }
        true
    }

    /// Parameter list rendered as `(int, string)`
    pub fn describe(&self) -> String {
        let params: Vec<String> = self.params.iter().map(HostType::name).collect();
        format!("({})", params.join(", "))
    }
}

impl fmt::Debug for ReflectedArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{}", self.kind, self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: Vec<HostType>) -> ReflectedArgs {
        ReflectedArgs::constructor(0, &HostConstructor::new(params))
    }

    #[test]
    fn test_exact_arity_required() {
        let rt = Runtime::new();
        let mut data = CallData::default();
        let s = sig(vec![HostType::Int, HostType::Int]);
        assert!(!s.matches(&rt, &[Value::Int(1)], &[], &mut data));
        assert_eq!(data.failure(), Some(&ArgFailure::Arity { expected: 2, got: 1 }));
        assert!(s.matches(&rt, &[Value::Int(1), Value::Int(2)], &[], &mut data));
        assert_eq!(data.args(), &[HostValue::Int(1), HostValue::Int(2)]);
    }

    #[test]
    fn test_records_failing_position_and_keyword() {
        let rt = Runtime::new();
        let mut data = CallData::default();
        let s = sig(vec![HostType::Int, HostType::Str]);
        assert!(!s.matches(&rt, &[Value::str("x"), Value::str("y")], &[], &mut data));
        assert_eq!(data.failure(), Some(&ArgFailure::Position(0)));

        assert!(!s.matches(&rt, &[Value::Int(1), Value::Int(2)], &["name"], &mut data));
        assert_eq!(
            data.failure(),
            Some(&ArgFailure::Keyword { index: 1, name: "name".to_string() })
        );
    }

    #[test]
    fn test_buffer_grows_and_ignores_stale_slots() {
        let rt = Runtime::new();
        let mut data = CallData::with_capacity(1);
        let three = sig(vec![HostType::Int, HostType::Int, HostType::Int]);
        assert!(three.matches(&rt, &[Value::Int(1), Value::Int(2), Value::Int(3)], &[], &mut data));
        let grown = data.capacity();
        assert!(grown >= 3);

        let one = sig(vec![HostType::Long]);
        assert!(one.matches(&rt, &[Value::Int(9)], &[], &mut data));
        assert_eq!(data.args(), &[HostValue::Long(9)]);
        assert_eq!(data.capacity(), grown);
        assert_eq!(data.cost(), crate::convert::COST_WIDEN);
    }
}
