//! Dynamic values
//!
//! `Value` is what dynamic code sees. Host objects appear directly as
//! `Value::Host`; reflected host members appear as descriptor values that
//! the attribute protocol in `runtime.rs` knows how to bind.

use std::fmt;
use std::sync::Arc;

use weave_sdk::{HostCallable, HostObject};

use crate::error::RuntimeResult;
use crate::object::{DynamicClass, DynamicInstance};
use crate::reflect::{BeanEventProperty, ReflectedConstructor, ReflectedField, ReflectedMethod};
use crate::runtime::Runtime;

/// Native implementation of a dynamic function.
///
/// Receives the runtime, all argument values (positional first, keyword
/// values last) and the names of the trailing keyword values.
pub type NativeFn = Arc<dyn Fn(&Runtime, &[Value], &[&str]) -> RuntimeResult<Value> + Send + Sync>;

/// A dynamic-language function
pub struct Function {
    name: String,
    body: NativeFn,
}

impl Function {
    /// Wrap a native closure
    pub fn new<F>(name: impl Into<String>, body: F) -> Arc<Self>
    where
        F: Fn(&Runtime, &[Value], &[&str]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            body: Arc::new(body),
        })
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call with the runtime's calling convention
    pub fn call(&self, rt: &Runtime, args: &[Value], kw_names: &[&str]) -> RuntimeResult<Value> {
        (self.body)(rt, args, kw_names)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name)
    }
}

/// A callable bound to its receiver
#[derive(Debug, Clone)]
pub struct BoundMethod {
    /// Receiver passed as the first argument
    pub receiver: Value,
    /// Underlying callable
    pub func: Value,
}

/// Dynamic value
#[derive(Clone, Default)]
pub enum Value {
    /// The `None` singleton
    #[default]
    None,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    Str(Arc<str>),
    /// Immutable sequence
    Tuple(Arc<[Value]>),
    /// Dynamic class (including canonical wrappers of host classes)
    Class(Arc<DynamicClass>),
    /// Instance of a dynamic class
    Instance(Arc<DynamicInstance>),
    /// Plain host object
    Host(HostObject),
    /// Dynamic function
    Function(Arc<Function>),
    /// Bound method
    Bound(Arc<BoundMethod>),
    /// Reflected host constructor set
    Constructor(Arc<ReflectedConstructor>),
    /// Reflected host method overloads
    Method(Arc<ReflectedMethod>),
    /// Reflected host field accessor
    Field(Arc<ReflectedField>),
    /// Bean event property
    Event(Arc<BeanEventProperty>),
    /// Host-side callable with no dynamic counterpart
    HostCallable(Arc<dyn HostCallable>),
}

impl Value {
    /// Type name used in diagnostics
    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::Tuple(_) => "tuple".to_string(),
            Value::Class(_) => "type".to_string(),
            Value::Instance(inst) => inst.class().name().to_string(),
            Value::Host(obj) => obj.class().simple_name().to_string(),
            Value::Function(_) => "function".to_string(),
            Value::Bound(_) => "instancemethod".to_string(),
            Value::Constructor(_) => "reflectedconstructor".to_string(),
            Value::Method(_) => "reflectedfunction".to_string(),
            Value::Field(_) => "reflectedfield".to_string(),
            Value::Event(_) => "beaneventproperty".to_string(),
            Value::HostCallable(_) => "hostcallable".to_string(),
        }
    }

    /// Build a string value
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Build a tuple value
    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Arc::from(items))
    }

    /// Check for `None`
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as dynamic class
    pub fn as_class(&self) -> Option<&Arc<DynamicClass>> {
        match self {
            Value::Class(c) => Some(c),
            _ => None,
        }
    }

    /// Get as dynamic instance
    pub fn as_instance(&self) -> Option<&Arc<DynamicInstance>> {
        match self {
            Value::Instance(i) => Some(i),
            _ => None,
        }
    }

    /// Host object behind this value: a plain host object, or the host
    /// side of a bound proxy instance
    pub fn host_object(&self) -> Option<HostObject> {
        match self {
            Value::Host(obj) => Some(obj.clone()),
            Value::Instance(inst) => inst.host().cloned(),
            _ => None,
        }
    }

    /// Whether calling this value is meaningful
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Class(_)
                | Value::Function(_)
                | Value::Bound(_)
                | Value::Constructor(_)
                | Value::Method(_)
                | Value::HostCallable(_)
        )
    }

    fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Tuple(_)
        )
    }

    /// Identity comparison for reference values, equality for scalars
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b),
            (Value::Host(a), Value::Host(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Bound(a), Value::Bound(b)) => Arc::ptr_eq(a, b),
            (Value::Constructor(a), Value::Constructor(b)) => Arc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Arc::ptr_eq(a, b),
            (Value::Field(a), Value::Field(b)) => Arc::ptr_eq(a, b),
            (Value::Event(a), Value::Event(b)) => Arc::ptr_eq(a, b),
            (Value::HostCallable(a), Value::HostCallable(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => self.is_scalar() && other.is_scalar() && self == other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            _ if self.is_scalar() || other.is_scalar() => false,
            _ => self.is(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Tuple(items) => f.debug_tuple("").field(items).finish(),
            Value::Class(c) => write!(f, "<class '{}'>", c.name()),
            Value::Instance(i) => write!(f, "<{} object #{}>", i.class().name(), i.id()),
            Value::Host(obj) => write!(f, "{:?}", obj),
            Value::Function(func) => write!(f, "{:?}", func),
            Value::Bound(b) => write!(f, "<bound {:?} of {:?}>", b.func, b.receiver),
            Value::Constructor(c) => write!(f, "<constructor {}>", c.name()),
            Value::Method(m) => write!(f, "<method {}>", m.name()),
            Value::Field(fld) => write!(f, "<field {}>", fld.name()),
            Value::Event(e) => write!(f, "<event {}>", e.name()),
            Value::HostCallable(_) => write!(f, "<host callable>"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<HostObject> for Value {
    fn from(obj: HostObject) -> Self {
        Value::Host(obj)
    }
}
