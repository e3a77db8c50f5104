//! Conversion between dynamic values and host values
//!
//! `to_host` reports a cost alongside the converted value: 0 for an exact
//! fit, higher for widening or wrapping. Overload matching only needs
//! applicability, but the cost is kept on the call data for diagnostics.

use std::any::Any;
use std::sync::Arc;

use weave_sdk::{HostCallable, HostError, HostResult, HostType, HostValue};

use crate::error::{RuntimeError, RuntimeResult};
use crate::proxy::PeerLink;
use crate::runtime::{Runtime, WeakRuntime};
use crate::value::Value;

/// Exact representation match
pub const COST_EXACT: u32 = 0;
/// Integer widened to a larger integer
pub const COST_WIDEN: u32 = 1;
/// Integer converted to floating point
pub const COST_INT_TO_FLOAT: u32 = 2;
/// Dynamic callable wrapped for the host
pub const COST_WRAP: u32 = 3;

/// Convert `value` to the declared host type.
///
/// Returns `None` when the value does not fit.
pub fn to_host(rt: &Runtime, value: &Value, ty: &HostType) -> Option<(HostValue, u32)> {
    match ty {
        HostType::Void => None,
        HostType::Any => to_host_any(rt, value),
        HostType::Object(class) if class.is_root() => to_host_any(rt, value),
        HostType::Boolean => match value {
            Value::Bool(b) => Some((HostValue::Bool(*b), COST_EXACT)),
            _ => None,
        },
        HostType::Int => match value {
            Value::Int(i) => i32::try_from(*i).ok().map(|i| (HostValue::Int(i), COST_EXACT)),
            _ => None,
        },
        HostType::Long => match value {
            Value::Int(i) => Some((HostValue::Long(*i), COST_WIDEN)),
            _ => None,
        },
        HostType::Double => match value {
            Value::Float(x) => Some((HostValue::Double(*x), COST_EXACT)),
            Value::Int(i) => Some((HostValue::Double(*i as f64), COST_INT_TO_FLOAT)),
            _ => None,
        },
        HostType::Str => match value {
            Value::Str(s) => Some((HostValue::Str(Arc::clone(s)), COST_EXACT)),
            Value::None => Some((HostValue::Null, COST_EXACT)),
            _ => None,
        },
        HostType::Callable => match value {
            Value::None => Some((HostValue::Null, COST_EXACT)),
            Value::HostCallable(c) => Some((HostValue::Callable(Arc::clone(c)), COST_EXACT)),
            v if v.is_callable() => Some((wrap_callable(rt, v), COST_WRAP)),
            _ => None,
        },
        HostType::Object(class) => match value {
            Value::None => Some((HostValue::Null, COST_EXACT)),
            other => other
                .host_object()
                .filter(|obj| obj.is_instance_of(class))
                .map(|obj| (HostValue::Object(obj), COST_EXACT)),
        },
    }
}

fn to_host_any(rt: &Runtime, value: &Value) -> Option<(HostValue, u32)> {
    let converted = match value {
        Value::None => HostValue::Null,
        Value::Bool(b) => HostValue::Bool(*b),
        Value::Int(i) => match i32::try_from(*i) {
            Ok(small) => HostValue::Int(small),
            Err(_) => HostValue::Long(*i),
        },
        Value::Float(x) => HostValue::Double(*x),
        Value::Str(s) => HostValue::Str(Arc::clone(s)),
        Value::Host(obj) => HostValue::Object(obj.clone()),
        Value::Instance(inst) => HostValue::Object(inst.host()?.clone()),
        Value::HostCallable(c) => HostValue::Callable(Arc::clone(c)),
        v if v.is_callable() => return Some((wrap_callable(rt, v), COST_WRAP)),
        _ => return None,
    };
    Some((converted, COST_EXACT))
}

/// Convert to the declared type or raise a type error
pub fn to_host_checked(rt: &Runtime, value: &Value, ty: &HostType) -> RuntimeResult<HostValue> {
    to_host(rt, value, ty)
        .map(|(v, _)| v)
        .ok_or_else(|| {
            RuntimeError::type_error(format!(
                "cannot convert {} to {}",
                value.type_name(),
                ty.name()
            ))
        })
}

/// Convert a host value back into the dynamic representation.
///
/// A proxy object whose dynamic instance is still alive maps back to that
/// instance; callables created by the runtime map back to the wrapped value.
pub fn from_host(value: HostValue) -> Value {
    match value {
        HostValue::Null => Value::None,
        HostValue::Bool(b) => Value::Bool(b),
        HostValue::Int(i) => Value::Int(i as i64),
        HostValue::Long(l) => Value::Int(l),
        HostValue::Double(d) => Value::Float(d),
        HostValue::Str(s) => Value::Str(s),
        HostValue::Object(obj) => {
            let instance = obj
                .peer()
                .and_then(|p| p.as_any().downcast_ref::<PeerLink>())
                .and_then(PeerLink::instance);
            match instance {
                Some(inst) => Value::Instance(inst),
                None => Value::Host(obj),
            }
        }
        HostValue::Callable(c) => match c.as_any().downcast_ref::<DynamicCallable>() {
            Some(dynamic) => dynamic.value.clone(),
            None => Value::HostCallable(c),
        },
    }
}

fn wrap_callable(rt: &Runtime, value: &Value) -> HostValue {
    HostValue::Callable(Arc::new(DynamicCallable {
        value: value.clone(),
        runtime: rt.downgrade(),
    }))
}

/// A dynamic callable handed to the host
pub struct DynamicCallable {
    value: Value,
    runtime: WeakRuntime,
}

impl DynamicCallable {
    /// The wrapped dynamic value
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl HostCallable for DynamicCallable {
    fn call(&self, args: &[HostValue]) -> HostResult<HostValue> {
        let rt = self
            .runtime
            .upgrade()
            .ok_or_else(|| HostError::Unloaded("runtime".to_string()))?;
        let args: Vec<Value> = args.iter().cloned().map(from_host).collect();
        let result = rt
            .call(&self.value, &args, &[])
            .map_err(|e| HostError::Thrown(e.to_string()))?;
        to_host_any(&rt, &result)
            .map(|(v, _)| v)
            .ok_or_else(|| HostError::TypeMismatch {
                expected: "object".to_string(),
                got: result.type_name(),
            })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
