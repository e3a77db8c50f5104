//! Builtin functions
//!
//! The handful of builtins the attribute protocol needs, bound through
//! `ArgParser` like any native callable.

use crate::args::ArgParser;
use crate::error::{ErrorKind, RuntimeError, RuntimeResult};
use crate::object::Namespace;
use crate::runtime::Runtime;
use crate::value::{Function, Value};

/// Add the builtins to `ns`
pub fn install(ns: &mut Namespace) {
    ns.insert("getattr".to_string(), Value::Function(Function::new("getattr", getattr)));
    ns.insert("setattr".to_string(), Value::Function(Function::new("setattr", setattr)));
    ns.insert("hasattr".to_string(), Value::Function(Function::new("hasattr", hasattr)));
    ns.insert("isinstance".to_string(), Value::Function(Function::new("isinstance", isinstance)));
}

fn getattr(rt: &Runtime, args: &[Value], kw_names: &[&str]) -> RuntimeResult<Value> {
    let ap = ArgParser::new("getattr", args, kw_names, &["object", "name", "default"])?;
    let target = ap.required(0)?;
    let name = ap.string(1)?;
    match rt.get_attr(target, &name) {
        Err(e) if e.kind() == ErrorKind::Attribute && ap.has(2) => ap.value(2),
        other => other,
    }
}

fn setattr(rt: &Runtime, args: &[Value], kw_names: &[&str]) -> RuntimeResult<Value> {
    let ap = ArgParser::new("setattr", args, kw_names, &["object", "name", "value"])?;
    let name = ap.string(1)?;
    rt.set_attr(ap.required(0)?, &name, ap.value(2)?)?;
    Ok(Value::None)
}

fn hasattr(rt: &Runtime, args: &[Value], kw_names: &[&str]) -> RuntimeResult<Value> {
    let ap = ArgParser::new("hasattr", args, kw_names, &["object", "name"])?;
    let name = ap.string(1)?;
    match rt.get_attr(ap.required(0)?, &name) {
        Ok(_) => Ok(Value::Bool(true)),
        Err(e) if e.kind() == ErrorKind::Attribute => Ok(Value::Bool(false)),
        Err(e) => Err(e),
    }
}

fn isinstance(rt: &Runtime, args: &[Value], kw_names: &[&str]) -> RuntimeResult<Value> {
    let ap = ArgParser::new("isinstance", args, kw_names, &["object", "classinfo"])?;
    let value = ap.required(0)?;
    match ap.required(1)? {
        Value::Class(class) => Ok(Value::Bool(rt.is_instance(value, class))),
        Value::Tuple(classes) => {
            for c in classes.iter() {
                let Value::Class(class) = c else {
                    return Err(not_a_class(c));
                };
                if rt.is_instance(value, class) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        other => Err(not_a_class(other)),
    }
}

fn not_a_class(value: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "isinstance() arg 2 must be a class or tuple of classes, not {}",
        value.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InterpreterState;

    fn builtin(name: &str) -> Value {
        InterpreterState::get().builtin(name).unwrap()
    }

    #[test]
    fn test_getattr_default() {
        let rt = Runtime::new();
        let class = rt.make_class("C", vec![], Namespace::default()).unwrap();
        let inst = rt.instantiate(&class, &[], &[]).unwrap();
        let getattr = builtin("getattr");
        let v = rt
            .call(&getattr, &[inst.clone(), Value::str("missing"), Value::Int(5)], &[])
            .unwrap();
        assert_eq!(v, Value::Int(5));
        let err = rt.call(&getattr, &[inst, Value::str("missing")], &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Attribute);
    }

    #[test]
    fn test_setattr_and_hasattr() {
        let rt = Runtime::new();
        let class = rt.make_class("C", vec![], Namespace::default()).unwrap();
        let inst = rt.instantiate(&class, &[], &[]).unwrap();
        let args = [inst.clone(), Value::str("x"), Value::Int(1)];
        rt.call(&builtin("setattr"), &args, &[]).unwrap();
        let has = builtin("hasattr");
        assert_eq!(rt.call(&has, &[inst.clone(), Value::str("x")], &[]).unwrap(), Value::Bool(true));
        assert_eq!(rt.call(&has, &[inst, Value::str("y")], &[]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_isinstance_through_bases() {
        let rt = Runtime::new();
        let base = rt.make_class("Base", vec![], Namespace::default()).unwrap();
        let derived = rt
            .make_class("Derived", vec![Value::Class(base.clone())], Namespace::default())
            .unwrap();
        let other = rt.make_class("Other", vec![], Namespace::default()).unwrap();
        let inst = rt.instantiate(&derived, &[], &[]).unwrap();
        let isinstance = builtin("isinstance");
        assert_eq!(
            rt.call(&isinstance, &[inst.clone(), Value::Class(base)], &[]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            rt.call(&isinstance, &[inst.clone(), Value::Class(other)], &[]).unwrap(),
            Value::Bool(false)
        );
        let err = rt.call(&isinstance, &[inst, Value::Int(1)], &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }
}
