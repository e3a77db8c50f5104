//! Reflected access to host classes
//!
//! `reflect_class` builds the namespace of a canonical wrapper: the public
//! constructors, fields, methods and bean event properties of a host class,
//! each wrapped as a descriptor value.

pub mod constructor;
pub mod event;
pub mod field;
pub mod method;
pub mod signature;

pub use constructor::ReflectedConstructor;
pub use event::BeanEventProperty;
pub use field::ReflectedField;
pub use method::ReflectedMethod;
pub use signature::{ArgFailure, CallData, ReflectedArgs, SignatureKind};

use std::sync::Arc;

use weave_sdk::{HostClass, HostMethod, HostType};

use crate::error::RuntimeResult;
use crate::object::{CanonicalBinding, DynamicClass, HostBinding, Namespace};
use crate::runtime::Runtime;
use crate::value::Value;

/// Build the canonical wrapper for `class`.
///
/// Bases are the wrappers of the host superclass and direct interfaces, so
/// the wrapper hierarchy mirrors the host one.
pub fn reflect_class(rt: &Runtime, class: &Arc<HostClass>) -> RuntimeResult<Arc<DynamicClass>> {
    let mut bases = Vec::new();
    if let Some(sup) = class.superclass() {
        bases.push(rt.canonical_wrapper(sup)?);
    }
    for iface in class.interfaces() {
        bases.push(rt.canonical_wrapper(iface)?);
    }

    let ns = reflect_members(class);
    let name = class.name();
    let module = name.rsplit_once('.').map(|(pkg, _)| pkg.to_string());
    Ok(DynamicClass::new(
        name,
        module,
        bases,
        ns,
        HostBinding::Canonical(CanonicalBinding::new(class)),
    ))
}

fn reflect_members(class: &Arc<HostClass>) -> Namespace {
    let mut ns = Namespace::default();

    if !class.is_interface() {
        ns.insert(
            "__init__".to_string(),
            Value::Constructor(Arc::new(ReflectedConstructor::from_class(class))),
        );
    }

    // Fields, most-derived first
    let mut owner = Some(class);
    while let Some(c) = owner {
        add_fields(&mut ns, c);
        owner = c.superclass();
    }
    for iface in class.all_interfaces() {
        add_fields(&mut ns, &iface);
    }

    // Methods grouped by name, in first-seen order
    let visible: Vec<HostMethod> = class
        .visible_methods()
        .into_iter()
        .filter(HostMethod::is_public)
        .collect();
    let mut names: Vec<&str> = Vec::new();
    for m in &visible {
        if !names.contains(&m.name()) {
            names.push(m.name());
        }
    }
    for name in names {
        if ns.contains_key(name) {
            continue;
        }
        let overloads: Vec<HostMethod> = visible.iter().filter(|m| m.name() == name).cloned().collect();
        ns.insert(
            name.to_string(),
            Value::Method(Arc::new(ReflectedMethod::new(name, class, &overloads))),
        );
    }

    for m in &visible {
        let Some(listener) = listener_param(m) else {
            continue;
        };
        for lm in listener.visible_methods() {
            if lm.is_static() || ns.contains_key(lm.name()) {
                continue;
            }
            ns.insert(
                lm.name().to_string(),
                Value::Event(Arc::new(BeanEventProperty::new(lm.name(), listener, m.name()))),
            );
        }
    }
    ns
}

fn add_fields(ns: &mut Namespace, class: &Arc<HostClass>) {
    for f in class.declared_fields().iter().filter(|f| f.is_public()) {
        if !ns.contains_key(f.name()) {
            ns.insert(
                f.name().to_string(),
                Value::Field(Arc::new(ReflectedField::new(class, f.clone()))),
            );
        }
    }
}

/// The listener interface of an `add…Listener(iface)` registration method
fn listener_param(m: &HostMethod) -> Option<&Arc<HostClass>> {
    if m.is_static() || !m.name().starts_with("add") || !m.name().ends_with("Listener") {
        return None;
    }
    match m.params() {
        [HostType::Object(iface)] if iface.is_interface() => Some(iface),
        _ => None,
    }
}
