//! End-to-end checks of the core runtime guarantees

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use weave_engine::tables::ReferenceTables;
use weave_engine::{
    ArgParser, DynamicInstance, ErrorKind, InternalTables, Namespace, ProxyRequest, ProxySynthesizer, Retention, Runtime,
    RuntimeError, RuntimeOptions, Stability, TableItem, Value,
};
use weave_sdk::{HostClass, HostClassBuilder, HostConstructor, HostError, HostField, HostMethod, HostType, HostValue};

fn plain_class(name: &str) -> Arc<HostClass> {
    HostClassBuilder::new(name)
        .constructor(HostConstructor::new(vec![]))
        .method(HostMethod::new("size", vec![], HostType::Int).with_body(|_, _| Ok(HostValue::Int(1))))
        .build()
        .unwrap()
}

fn canonical_names(tables: &dyn InternalTables) -> Vec<String> {
    tables.begin_canonical(Stability::Plain);
    let names = std::iter::from_fn(|| tables.next())
        .filter_map(|item| match item {
            TableItem::Canonical { class, .. } => Some(class.name().to_string()),
            _ => None,
        })
        .collect();
    tables.end();
    names
}

// ============================================================================
// Canonical uniqueness
// ============================================================================

#[test]
fn test_canonical_wrapper_unique_across_threads() {
    let rt = Runtime::new();
    let class = plain_class("demo.Shared");
    // Build the root wrapper up front so only `class` is counted
    rt.canonical_wrapper(&HostClass::object()).unwrap();
    let before = rt.stats().canonical_built;

    const THREADS: usize = 8;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let (rt, class, barrier) = (rt.clone(), Arc::clone(&class), Arc::clone(&barrier));
            thread::spawn(move || {
                barrier.wait();
                rt.canonical_wrapper(&class).unwrap()
            })
        })
        .collect();
    let wrappers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for w in &wrappers[1..] {
        assert!(Arc::ptr_eq(w, &wrappers[0]));
    }
    assert_eq!(rt.stats().canonical_built, before + 1);
}

// ============================================================================
// Weak reclamation
// ============================================================================

#[test]
fn test_weak_entry_gone_after_key_dropped() {
    let rt = Runtime::with_options(RuntimeOptions::default().with_tables("weak"));
    let keep = plain_class("demo.Kept");
    let doomed = plain_class("demo.Doomed");
    rt.canonical_wrapper(&keep).unwrap();
    rt.canonical_wrapper(&doomed).unwrap();
    assert!(canonical_names(rt.tables().as_ref()).contains(&"demo.Doomed".to_string()));

    drop(doomed);
    rt.tables().force_cleanup();

    let names = canonical_names(rt.tables().as_ref());
    assert!(!names.contains(&"demo.Doomed".to_string()));
    assert!(names.contains(&"demo.Kept".to_string()));
    assert!(rt.tables().stats().reclaimed >= 1);
}

#[test]
fn test_pinned_entry_survives_until_forced() {
    let rt = Runtime::with_options(RuntimeOptions::default().with_tables("pinned"));
    let class = plain_class("demo.Pinned");
    rt.canonical_wrapper(&class).unwrap();
    drop(class);
    assert!(canonical_names(rt.tables().as_ref()).contains(&"demo.Pinned".to_string()));

    rt.tables().force_cleanup();
    assert!(!canonical_names(rt.tables().as_ref()).contains(&"demo.Pinned".to_string()));
}

// ============================================================================
// Iteration stability
// ============================================================================

#[test]
fn test_reclamation_during_plain_iteration() {
    let tables = ReferenceTables::new(Retention::Weak);
    let wrapper = |name: &str| {
        weave_engine::DynamicClass::new(name, None, vec![], Namespace::default(), weave_engine::HostBinding::None)
    };
    let kept: Vec<_> = (0..3).map(|i| plain_class(&format!("demo.K{i}"))).collect();
    for c in &kept {
        tables.put_canonical(c, wrapper(c.name()));
    }
    let doomed = vec![plain_class("demo.D0"), plain_class("demo.D1")];
    for c in &doomed {
        tables.put_canonical(c, wrapper(c.name()));
    }

    tables.begin_canonical(Stability::Plain);
    let first = tables.next().unwrap();
    let first_name = match &first {
        TableItem::Canonical { class, .. } => class.name().to_string(),
        other => panic!("unexpected {other:?}"),
    };
    drop(doomed);
    let rest: Vec<String> = std::iter::from_fn(|| tables.next())
        .map(|item| match item {
            TableItem::Canonical { class, .. } => class.name().to_string(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    tables.end();

    assert!(rest.iter().all(|n| !n.starts_with("demo.D")));
    assert!(!rest.contains(&first_name));
    let kept_seen = rest.len() + usize::from(first_name.starts_with("demo.K"));
    assert_eq!(kept_seen, 3);
}

#[test]
fn test_flush_current_during_iteration() {
    let tables = ReferenceTables::new(Retention::Weak);
    let classes: Vec<_> = (0..4).map(|i| plain_class(&format!("demo.F{i}"))).collect();
    for c in &classes {
        let w = weave_engine::DynamicClass::new(c.name(), None, vec![], Namespace::default(), weave_engine::HostBinding::None);
        tables.put_canonical(c, w);
    }
    tables.begin_canonical(Stability::GlobalStable);
    let mut flushed = 0;
    while let Some(item) = tables.next() {
        if let TableItem::Canonical { class, .. } = item {
            if class.name().ends_with('0') || class.name().ends_with('2') {
                tables.flush_current();
                flushed += 1;
            }
        }
    }
    tables.end();
    assert_eq!(flushed, 2);
    assert_eq!(tables.stats().canonical, 2);
}

// ============================================================================
// Overload first-match
// ============================================================================

#[test]
fn test_first_registered_overload_wins() {
    let rt = Runtime::new();
    let which = |n: i32| move |obj: &weave_sdk::HostObject, _: &[HostValue]| obj.set_field("which", HostValue::Int(n));
    let class = HostClassBuilder::new("demo.Overloaded")
        .field(HostField::new("which", HostType::Int))
        .constructor(HostConstructor::new(vec![HostType::Int]).with_init(which(1)))
        .constructor(HostConstructor::new(vec![HostType::Int, HostType::Int]).with_init(which(2)))
        .constructor(HostConstructor::new(vec![HostType::Any]).with_init(which(3)))
        .build()
        .unwrap();
    let wrapper = Value::Class(rt.canonical_wrapper(&class).unwrap());

    let one = rt.call(&wrapper, &[Value::Int(7)], &[]).unwrap();
    assert_eq!(rt.get_attr(&one, "which").unwrap(), Value::Int(1));
    let two = rt.call(&wrapper, &[Value::Int(7), Value::Int(8)], &[]).unwrap();
    assert_eq!(rt.get_attr(&two, "which").unwrap(), Value::Int(2));
    let object = rt.call(&wrapper, &[Value::str("s")], &[]).unwrap();
    assert_eq!(rt.get_attr(&object, "which").unwrap(), Value::Int(3));
}

// ============================================================================
// Double construction
// ============================================================================

#[test]
fn test_second_construction_rejected() {
    let rt = Runtime::new();
    let host = plain_class("demo.Base");
    let wrapper = rt.canonical_wrapper(&host).unwrap();
    let class = rt
        .make_class("Derived", vec![Value::Class(Arc::clone(&wrapper))], Namespace::default())
        .unwrap();
    let inst = rt.instantiate(&class, &[], &[]).unwrap();
    let first = inst.host_object().unwrap();

    let init = rt.get_attr(&Value::Class(wrapper), "__init__").unwrap();
    let err = rt.call(&init, &[inst.clone()], &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert!(inst.host_object().unwrap().ptr_eq(&first));
}

fn counted_base(name: &str, runs: &Arc<AtomicUsize>, fail_first: bool) -> Arc<HostClass> {
    let runs = Arc::clone(runs);
    HostClassBuilder::new(name)
        .constructor(HostConstructor::new(vec![]).with_init(move |_, _| {
            let attempt = runs.fetch_add(1, Ordering::SeqCst);
            if fail_first && attempt == 0 {
                return Err(HostError::Thrown("not ready".to_string()));
            }
            thread::sleep(Duration::from_millis(20));
            Ok(())
        }))
        .build()
        .unwrap()
}

#[test]
fn test_concurrent_init_constructs_once() {
    let rt = Runtime::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let host = counted_base("demo.Slow", &runs, false);
    let wrapper = rt.canonical_wrapper(&host).unwrap();
    let class = rt
        .make_class("Raced", vec![Value::Class(Arc::clone(&wrapper))], Namespace::default())
        .unwrap();
    let this = Value::Instance(DynamicInstance::new(class));
    let init = rt.get_attr(&Value::Class(wrapper), "__init__").unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let (rt, init, this, barrier) = (rt.clone(), init.clone(), this.clone(), Arc::clone(&barrier));
            thread::spawn(move || {
                barrier.wait();
                rt.call(&init, &[this], &[]).map(drop).map_err(|e| e.kind())
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.contains(&Err(ErrorKind::IllegalState)));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(this.host_object().is_some());
}

#[test]
fn test_failed_host_constructor_leaves_instance_retryable() {
    let rt = Runtime::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let host = counted_base("demo.Flaky", &runs, true);
    let wrapper = rt.canonical_wrapper(&host).unwrap();
    let class = rt
        .make_class("Retried", vec![Value::Class(Arc::clone(&wrapper))], Namespace::default())
        .unwrap();
    let inst = DynamicInstance::new(class);
    let this = Value::Instance(Arc::clone(&inst));
    let init = rt.get_attr(&Value::Class(wrapper), "__init__").unwrap();

    let err = rt.call(&init, &[this.clone()], &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ForeignInterop);
    assert!(inst.host().is_none());
    assert!(rt.thread_state().initializing().is_none());

    rt.call(&init, &[this], &[]).unwrap();
    assert!(inst.host().is_some());
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Argument parser
// ============================================================================

#[test]
fn test_missing_argument_ordinals() {
    let parser = ArgParser::new("f", &[], &[], &["a", "b", "c", "d"]).unwrap();
    assert!(parser.required(0).unwrap_err().to_string().ends_with("1st argument is required"));
    assert!(parser.required(3).unwrap_err().to_string().ends_with("4th argument is required"));
}

#[test]
fn test_unknown_keyword_rejected_before_access() {
    let args = [Value::Int(1), Value::Int(2)];
    let err = ArgParser::new("f", &args, &["c"], &["a", "b"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("'c'"));
}

// ============================================================================
// Proxy synthesis round trip
// ============================================================================

#[test]
fn test_repeated_synthesis_yields_distinct_types() {
    let rt = Runtime::new();
    let i1 = HostClassBuilder::interface("demo.I1")
        .method(HostMethod::new("one", vec![], HostType::Int))
        .build()
        .unwrap();
    let i2 = HostClassBuilder::interface("demo.I2")
        .method(HostMethod::new("two", vec![], HostType::Int))
        .build()
        .unwrap();
    let interfaces = [Arc::clone(&i1), Arc::clone(&i2)];
    let synthesizer = ProxySynthesizer::default();
    let request = ProxyRequest {
        superclass: None,
        interfaces: &interfaces,
        class_name: "Foo",
        module: None,
        members: &[],
    };
    let loader = rt.class_loader();
    let a = synthesizer.synthesize_proxy(&loader, &request).unwrap();
    let b = synthesizer.synthesize_proxy(&loader, &request).unwrap();

    assert_ne!(a.id(), b.id());
    assert_ne!(a.name(), b.name());
    for proxy in [&a, &b] {
        assert!(i1.is_assignable_from(proxy));
        assert!(i2.is_assignable_from(proxy));
    }
    // Unimplemented interface methods stay abstract behind the stub
    let obj = a.instantiate(&[]).unwrap();
    let err: RuntimeError = obj.invoke("one", &[]).unwrap_err().into();
    assert!(matches!(err, RuntimeError::ForeignInterop(HostError::AbstractMethod(_))));
}
