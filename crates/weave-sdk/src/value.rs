//! Host values and declared host types

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::class::HostClass;
use crate::error::{HostError, HostResult};
use crate::object::HostObject;

/// Something the host can call back into.
///
/// Adapter fields hold these; the engine wraps dynamic callables in it.
pub trait HostCallable: Send + Sync {
    /// Invoke with host arguments
    fn call(&self, args: &[HostValue]) -> HostResult<HostValue>;

    /// Access the concrete type for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Value as seen by host code
#[derive(Clone)]
pub enum HostValue {
    /// Null reference
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 64-bit float
    Double(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Reference to a host object
    Object(HostObject),
    /// Callable handle
    Callable(Arc<dyn HostCallable>),
}

impl HostValue {
    /// Short type name used in diagnostics
    pub fn type_name(&self) -> String {
        match self {
            HostValue::Null => "null".to_string(),
            HostValue::Bool(_) => "boolean".to_string(),
            HostValue::Int(_) => "int".to_string(),
            HostValue::Long(_) => "long".to_string(),
            HostValue::Double(_) => "double".to_string(),
            HostValue::Str(_) => "string".to_string(),
            HostValue::Object(obj) => obj.class().name().to_string(),
            HostValue::Callable(_) => "callable".to_string(),
        }
    }

    /// Check for null
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i32
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            HostValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as i64, widening ints
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i as i64),
            HostValue::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Get as f64, widening integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Int(i) => Some(*i as f64),
            HostValue::Long(l) => Some(*l as f64),
            HostValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as object reference
    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            HostValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get as callable
    pub fn as_callable(&self) -> Option<&Arc<dyn HostCallable>> {
        match self {
            HostValue::Callable(c) => Some(c),
            _ => None,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Long(a), HostValue::Long(b)) => a == b,
            (HostValue::Double(a), HostValue::Double(b)) => a == b,
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => a == b,
            (HostValue::Callable(a), HostValue::Callable(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => write!(f, "null"),
            HostValue::Bool(b) => write!(f, "{}", b),
            HostValue::Int(i) => write!(f, "{}", i),
            HostValue::Long(l) => write!(f, "{}L", l),
            HostValue::Double(d) => write!(f, "{:?}", d),
            HostValue::Str(s) => write!(f, "{:?}", s),
            HostValue::Object(obj) => write!(f, "{:?}", obj),
            HostValue::Callable(_) => write!(f, "<callable>"),
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<i32> for HostValue {
    fn from(i: i32) -> Self {
        HostValue::Int(i)
    }
}

impl From<i64> for HostValue {
    fn from(l: i64) -> Self {
        HostValue::Long(l)
    }
}

impl From<f64> for HostValue {
    fn from(d: f64) -> Self {
        HostValue::Double(d)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(Arc::from(s))
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Str(Arc::from(s))
    }
}

impl From<HostObject> for HostValue {
    fn from(obj: HostObject) -> Self {
        HostValue::Object(obj)
    }
}

// ============================================================================
// Declared Types
// ============================================================================

/// Declared type of a parameter, return value or field
#[derive(Clone)]
pub enum HostType {
    /// No value (return type only)
    Void,
    /// Boolean
    Boolean,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// 64-bit float
    Double,
    /// String
    Str,
    /// Root object type: accepts any value
    Any,
    /// Callable handle
    Callable,
    /// Instance of a specific class (or any subclass)
    Object(Arc<HostClass>),
}

impl HostType {
    /// Type name used in signatures and diagnostics
    pub fn name(&self) -> String {
        match self {
            HostType::Void => "void".to_string(),
            HostType::Boolean => "boolean".to_string(),
            HostType::Int => "int".to_string(),
            HostType::Long => "long".to_string(),
            HostType::Double => "double".to_string(),
            HostType::Str => "string".to_string(),
            HostType::Any => "object".to_string(),
            HostType::Callable => "callable".to_string(),
            HostType::Object(class) => class.name().to_string(),
        }
    }

    /// Value a fresh field or unset slot of this type holds
    pub fn default_value(&self) -> HostValue {
        match self {
            HostType::Boolean => HostValue::Bool(false),
            HostType::Int => HostValue::Int(0),
            HostType::Long => HostValue::Long(0),
            HostType::Double => HostValue::Double(0.0),
            _ => HostValue::Null,
        }
    }

    /// Whether a value can be stored in a slot of this type as-is
    pub fn accepts(&self, value: &HostValue) -> bool {
        match (self, value) {
            (HostType::Void, _) => false,
            (HostType::Any, _) => true,
            (HostType::Boolean, HostValue::Bool(_)) => true,
            (HostType::Int, HostValue::Int(_)) => true,
            (HostType::Long, HostValue::Long(_)) => true,
            (HostType::Double, HostValue::Double(_)) => true,
            (HostType::Str, HostValue::Str(_) | HostValue::Null) => true,
            (HostType::Callable, HostValue::Callable(_) | HostValue::Null) => true,
            (HostType::Object(_), HostValue::Null) => true,
            (HostType::Object(class), HostValue::Object(obj)) => {
                class.is_assignable_from(obj.class())
            }
            _ => false,
        }
    }

    /// Fit a returned value to this declared type.
    ///
    /// Applies lossless numeric widening and in-range narrowing of longs;
    /// `Void` discards the value.
    pub fn coerce(&self, value: HostValue) -> HostResult<HostValue> {
        let coerced = match (self, &value) {
            (HostType::Void, _) => Some(HostValue::Null),
            (_, _) if self.accepts(&value) => Some(value.clone()),
            (HostType::Long, HostValue::Int(i)) => Some(HostValue::Long(*i as i64)),
            (HostType::Int, HostValue::Long(l)) => i32::try_from(*l).ok().map(HostValue::Int),
            (HostType::Double, HostValue::Int(i)) => Some(HostValue::Double(*i as f64)),
            (HostType::Double, HostValue::Long(l)) => Some(HostValue::Double(*l as f64)),
            _ => None,
        };
        coerced.ok_or_else(|| HostError::TypeMismatch {
            expected: self.name(),
            got: value.type_name(),
        })
    }

    /// Whether this is a primitive (non-reference) type
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            HostType::Boolean | HostType::Int | HostType::Long | HostType::Double
        )
    }
}

impl PartialEq for HostType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostType::Object(a), HostType::Object(b)) => a.id() == b.id(),
            (HostType::Void, HostType::Void)
            | (HostType::Boolean, HostType::Boolean)
            | (HostType::Int, HostType::Int)
            | (HostType::Long, HostType::Long)
            | (HostType::Double, HostType::Double)
            | (HostType::Str, HostType::Str)
            | (HostType::Any, HostType::Any)
            | (HostType::Callable, HostType::Callable) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
