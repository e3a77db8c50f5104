//! Proxy-backed classes, bean events and loader generations

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use weave_engine::proxy::descriptor::DescriptorKind;
use weave_engine::{ErrorKind, Function, Namespace, Runtime, RuntimeError, RuntimeOptions, TypeDescriptor, Value};
use weave_sdk::{
    ClassKind, HostClass, HostClassBuilder, HostConstructor, HostError, HostField, HostMethod, HostType, HostValue,
};

fn greeter() -> Arc<HostClass> {
    HostClassBuilder::new("demo.Greeter")
        .constructor(
            HostConstructor::new(vec![]).with_init(|obj, _| obj.set_field("greeting", HostValue::from("hello"))),
        )
        .field(HostField::new("greeting", HostType::Str))
        .method(HostMethod::new("greet", vec![], HostType::Str).with_body(|this, _| {
            let obj = this.ok_or_else(|| HostError::IllegalAccess("receiver".into()))?;
            obj.get_field("greeting")
        }))
        .method(HostMethod::new("shout", vec![], HostType::Str).with_body(|this, _| {
            let obj = this.ok_or_else(|| HostError::IllegalAccess("receiver".into()))?;
            let greeting = obj.invoke("greet", &[])?;
            Ok(HostValue::from(greeting.as_str().unwrap_or_default().to_uppercase()))
        }))
        .build()
        .unwrap()
}

fn returning(name: &str, text: &'static str) -> Value {
    Value::Function(Function::new(name, move |_, _, _| Ok(Value::str(text))))
}

fn dict(entries: Vec<(&str, Value)>) -> Namespace {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn call_method(rt: &Runtime, target: &Value, name: &str) -> Result<Value, RuntimeError> {
    let method = rt.get_attr(target, name)?;
    rt.call(&method, &[], &[])
}

// ============================================================================
// Proxy subclassing
// ============================================================================

#[test]
fn test_proxy_of_proxy_backed_base() {
    let rt = Runtime::new();
    let host = greeter();
    let wrapper = rt.canonical_wrapper(&host).unwrap();
    let base = rt
        .make_class("Base", vec![Value::Class(wrapper)], dict(vec![("greet", returning("greet", "base"))]))
        .unwrap();
    let sub = rt
        .make_class("Sub", vec![Value::Class(Arc::clone(&base))], dict(vec![("greet", returning("greet", "sub"))]))
        .unwrap();

    let sub_inst = rt.instantiate(&sub, &[], &[]).unwrap();
    let base_inst = rt.instantiate(&base, &[], &[]).unwrap();
    assert_eq!(call_method(&rt, &sub_inst, "shout").unwrap(), Value::str("SUB"));
    assert_eq!(call_method(&rt, &base_inst, "shout").unwrap(), Value::str("BASE"));

    let base_proxy = rt.proxy_for(&base).unwrap();
    let sub_proxy = rt.proxy_for(&sub).unwrap();
    assert_eq!(sub_proxy.superclass().map(|c| c.id()), Some(base_proxy.id()));
    assert!(host.is_assignable_from(&sub_proxy));
    assert_eq!(rt.stats().proxies_synthesized, 2);
}

#[test]
fn test_interface_only_proxy() {
    let rt = Runtime::new();
    let runnable = HostClassBuilder::interface("demo.Task")
        .method(HostMethod::new("run", vec![], HostType::Int))
        .method(HostMethod::new("cancel", vec![], HostType::Boolean))
        .build()
        .unwrap();
    let iface = rt.canonical_wrapper(&runnable).unwrap();
    let run = Value::Function(Function::new("run", |_, _, _| Ok(Value::Int(42))));
    let class = rt
        .make_class("Job", vec![Value::Class(iface)], dict(vec![("run", run)]))
        .unwrap();

    let inst = rt.instantiate(&class, &[], &[]).unwrap();
    let obj = inst.host_object().unwrap();
    assert!(runnable.is_assignable_from(obj.class()));
    assert_eq!(obj.invoke("run", &[]).unwrap(), HostValue::Int(42));
    assert!(matches!(obj.invoke("cancel", &[]), Err(HostError::AbstractMethod(_))));
}

#[test]
fn test_init_without_super_call_default_constructs() {
    let rt = Runtime::new();
    let host = greeter();
    let wrapper = rt.canonical_wrapper(&host).unwrap();
    let init = Value::Function(Function::new("__init__", |rt, args, _| {
        rt.set_attr(&args[0], "tag", Value::Int(5))?;
        Ok(Value::None)
    }));
    let class = rt
        .make_class("Quiet", vec![Value::Class(wrapper)], dict(vec![("__init__", init)]))
        .unwrap();

    let inst = rt.instantiate(&class, &[], &[]).unwrap();
    assert!(inst.host_object().is_some());
    assert_eq!(rt.get_attr(&inst, "tag").unwrap(), Value::Int(5));
    assert_eq!(call_method(&rt, &inst, "greet").unwrap(), Value::str("hello"));
}

#[test]
fn test_dynamic_error_surfaces_to_host_caller() {
    let rt = Runtime::new();
    let host = greeter();
    let wrapper = rt.canonical_wrapper(&host).unwrap();
    let failing = Value::Function(Function::new("greet", |_, _, _| {
        Err(RuntimeError::invalid_argument("no greeting today"))
    }));
    let class = rt
        .make_class("Grumpy", vec![Value::Class(wrapper)], dict(vec![("greet", failing)]))
        .unwrap();
    let inst = rt.instantiate(&class, &[], &[]).unwrap();

    let err = call_method(&rt, &inst, "shout").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ForeignInterop);
    let info = rt.thread_state().take_exception().unwrap();
    assert_eq!(info.kind, ErrorKind::InvalidArgument);
    assert!(info.message.contains("no greeting today"));
}

#[test]
fn test_host_constructor_reaches_dynamic_override() {
    let rt = Runtime::new();
    let host = HostClassBuilder::new("demo.Widget")
        .kind(ClassKind::Abstract)
        .field(HostField::new("label", HostType::Str))
        .method(HostMethod::new("defaultLabel", vec![], HostType::Str))
        .constructor(HostConstructor::new(vec![]).with_init(|obj, _| {
            let label = obj.invoke("defaultLabel", &[])?;
            obj.set_field("label", label)
        }))
        .build()
        .unwrap();
    let wrapper = rt.canonical_wrapper(&host).unwrap();
    let class = rt
        .make_class(
            "Fancy",
            vec![Value::Class(wrapper)],
            dict(vec![("defaultLabel", returning("defaultLabel", "dyn"))]),
        )
        .unwrap();

    let inst = rt.instantiate(&class, &[], &[]).unwrap();
    let obj = inst.host_object().unwrap();
    assert_eq!(obj.get_field("label").unwrap(), HostValue::from("dyn"));
    assert!(obj.peer().is_some());
    assert!(rt.thread_state().initializing().is_none());
}

#[test]
fn test_concurrent_instantiation_shares_proxy() {
    let rt = Runtime::new();
    let host = greeter();
    let wrapper = rt.canonical_wrapper(&host).unwrap();
    let class = rt
        .make_class("Busy", vec![Value::Class(wrapper)], dict(vec![("greet", returning("greet", "busy"))]))
        .unwrap();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let (rt, class) = (rt.clone(), Arc::clone(&class));
            thread::spawn(move || {
                let inst = rt.instantiate(&class, &[], &[]).unwrap();
                inst.host_object().unwrap().class().name().to_string()
            })
        })
        .collect();
    let names: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(names.iter().all(|n| n == &names[0]));
    assert_eq!(rt.stats().proxies_synthesized, 1);
}

// ============================================================================
// Bean events
// ============================================================================

fn button(registrations: Arc<AtomicUsize>) -> (Arc<HostClass>, Arc<HostClass>) {
    let listener = HostClassBuilder::interface("demo.ActionListener")
        .method(HostMethod::new("actionPerformed", vec![HostType::Str], HostType::Void))
        .build()
        .unwrap();
    let button = HostClassBuilder::new("demo.Button")
        .constructor(HostConstructor::new(vec![]))
        .field(HostField::new("listener", HostType::Object(Arc::clone(&listener))).private())
        .method(
            HostMethod::new("addActionListener", vec![HostType::Object(Arc::clone(&listener))], HostType::Void)
                .with_body(move |this, args| {
                    let obj = this.ok_or_else(|| HostError::IllegalAccess("receiver".into()))?;
                    registrations.fetch_add(1, Ordering::SeqCst);
                    obj.set_field("listener", args[0].clone())?;
                    Ok(HostValue::Null)
                }),
        )
        .method(HostMethod::new("click", vec![], HostType::Void).with_body(|this, _| {
            let obj = this.ok_or_else(|| HostError::IllegalAccess("receiver".into()))?;
            if let HostValue::Object(l) = obj.get_field("listener")? {
                l.invoke("actionPerformed", &[HostValue::from("clicked")])?;
            }
            Ok(HostValue::Null)
        }))
        .build()
        .unwrap();
    (listener, button)
}

#[test]
fn test_event_property_routes_listener_calls() {
    let rt = Runtime::new();
    let registrations = Arc::new(AtomicUsize::new(0));
    let (_listener, button) = button(Arc::clone(&registrations));
    let source = Value::Host(button.instantiate(&[]).unwrap());

    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let handler = {
        let seen = Arc::clone(&seen);
        Value::Function(Function::new("on_action", move |_, args, _| {
            seen.lock().push(args[0].as_str().unwrap_or_default().to_string());
            Ok(Value::None)
        }))
    };
    assert_eq!(rt.get_attr(&source, "actionPerformed").unwrap(), Value::None);

    rt.set_attr(&source, "actionPerformed", handler.clone()).unwrap();
    call_method(&rt, &source, "click").unwrap();
    assert_eq!(*seen.lock(), vec!["clicked".to_string()]);
    assert!(rt.get_attr(&source, "actionPerformed").unwrap().is(&handler));

    // Reassigning reuses the registered adapter
    let other = Value::Function(Function::new("other", |_, _, _| Ok(Value::None)));
    rt.set_attr(&source, "actionPerformed", other.clone()).unwrap();
    call_method(&rt, &source, "click").unwrap();
    assert_eq!(seen.lock().len(), 1);
    assert!(rt.get_attr(&source, "actionPerformed").unwrap().is(&other));

    assert_eq!(registrations.load(Ordering::SeqCst), 1);
    assert_eq!(rt.stats().adapters_synthesized, 1);
    assert_eq!(rt.stats().tables.adapters, 1);
}

#[test]
fn test_adapter_entries_follow_source_lifetime() {
    let rt = Runtime::new();
    let (_listener, button) = button(Arc::new(AtomicUsize::new(0)));
    let source = Value::Host(button.instantiate(&[]).unwrap());
    let noop = Value::Function(Function::new("noop", |_, _, _| Ok(Value::None)));
    rt.set_attr(&source, "actionPerformed", noop).unwrap();
    assert_eq!(rt.stats().tables.adapters, 1);

    drop(source);
    rt.tables().force_cleanup();
    assert_eq!(rt.stats().tables.adapters, 0);
}

#[test]
fn test_adapter_class_released_with_listener() {
    let rt = Runtime::new();
    let (listener, button) = button(Arc::new(AtomicUsize::new(0)));
    let source = Value::Host(button.instantiate(&[]).unwrap());
    let noop = Value::Function(Function::new("noop", |_, _, _| Ok(Value::None)));
    rt.set_attr(&source, "actionPerformed", noop).unwrap();
    assert_eq!(rt.stats().tables.adapter_classes, 1);

    let listener_ref = Arc::downgrade(&listener);
    drop(source);
    drop(button);
    drop(listener);
    rt.tables().force_cleanup();
    // The loader holds the adapter type until its generation ends
    rt.flush_generation();
    rt.tables().force_cleanup();
    assert!(listener_ref.upgrade().is_none());
    assert_eq!(rt.stats().tables.adapter_classes, 0);
}

// ============================================================================
// Image dumps and generations
// ============================================================================

#[test]
fn test_proxy_images_dumped_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let rt = Runtime::with_options(RuntimeOptions::default().with_proxy_debug_dir(dir.path()));
    let host = greeter();
    let wrapper = rt.canonical_wrapper(&host).unwrap();
    let class = rt
        .make_class("Dumped", vec![Value::Class(wrapper)], dict(vec![("greet", returning("greet", "x"))]))
        .unwrap();
    let proxy = rt.proxy_for(&class).unwrap();

    let image = std::fs::read(dir.path().join(format!("{}.wty", proxy.name()))).unwrap();
    let desc = TypeDescriptor::decode(&image).unwrap();
    assert_eq!(desc.kind, DescriptorKind::Proxy);
    assert_eq!(desc.origin, "Dumped");
    assert_eq!(desc.superclass.as_deref(), Some("demo.Greeter"));
}

#[test]
fn test_new_generation_defines_into_fresh_loader() {
    let rt = Runtime::new();
    let host = greeter();
    let wrapper = rt.canonical_wrapper(&host).unwrap();
    let before = rt
        .make_class("Old", vec![Value::Class(Arc::clone(&wrapper))], Namespace::default())
        .unwrap();
    let old_inst = rt.instantiate(&before, &[], &[]).unwrap();
    let old_loader = rt.class_loader();
    assert_eq!(old_loader.defined_count(), 1);

    rt.flush_generation();
    assert!(old_loader.is_discarded());
    assert_eq!(rt.stats().generation, 1);
    // Existing instances keep working
    assert_eq!(call_method(&rt, &old_inst, "greet").unwrap(), Value::str("hello"));

    let after = rt
        .make_class("New", vec![Value::Class(wrapper)], Namespace::default())
        .unwrap();
    rt.instantiate(&after, &[], &[]).unwrap();
    assert_eq!(rt.class_loader().defined_count(), 1);
    assert!(!Arc::ptr_eq(&old_loader, &rt.class_loader()));
}
