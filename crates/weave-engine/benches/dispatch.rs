use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use weave_engine::{ArgParser, Function, Namespace, Runtime, Value};
use weave_sdk::{HostClass, HostClassBuilder, HostConstructor, HostField, HostMethod, HostType, HostValue};

fn overloaded() -> Arc<HostClass> {
    HostClassBuilder::new("bench.Point")
        .field(HostField::new("x", HostType::Long))
        .constructor(HostConstructor::new(vec![]))
        .constructor(HostConstructor::new(vec![HostType::Long]).with_init(|obj, args| obj.set_field("x", args[0].clone())))
        .method(HostMethod::new("scale", vec![HostType::Int], HostType::Long).with_body(|_, args| {
            Ok(HostValue::Long(args[0].as_i64().unwrap_or_default() * 2))
        }))
        .method(HostMethod::new("scale", vec![HostType::Double], HostType::Double).with_body(|_, args| {
            Ok(HostValue::Double(args[0].as_f64().unwrap_or_default() * 2.0))
        }))
        .method(HostMethod::new("scale", vec![HostType::Str], HostType::Str).with_body(|_, args| {
            Ok(HostValue::from(args[0].as_str().unwrap_or_default().repeat(2)))
        }))
        .build()
        .unwrap()
}

fn bench_method_overloads(c: &mut Criterion) {
    let rt = Runtime::new();
    let host = overloaded();
    let class = Value::Class(rt.canonical_wrapper(&host).unwrap());
    let point = rt.call(&class, &[], &[]).unwrap();
    let scale = rt.get_attr(&point, "scale").unwrap();

    let mut group = c.benchmark_group("overloads");
    for (label, arg) in [
        ("first", Value::Int(21)),
        ("second", Value::Float(1.5)),
        ("third", Value::str("ab")),
    ] {
        group.bench_with_input(BenchmarkId::new("scale", label), &arg, |b, arg| {
            b.iter(|| rt.call(&scale, std::slice::from_ref(black_box(arg)), &[]).unwrap());
        });
    }
    group.finish();
}

fn bench_construction(c: &mut Criterion) {
    let rt = Runtime::new();
    let host = overloaded();
    let wrapper = rt.canonical_wrapper(&host).unwrap();
    let class = Value::Class(Arc::clone(&wrapper));

    c.bench_function("construct_plain", |b| {
        b.iter(|| rt.call(&class, &[black_box(Value::Int(3))], &[]).unwrap());
    });

    let scale = Value::Function(Function::new("scale", |_, _, _| Ok(Value::Int(0))));
    let dict: Namespace = [("scale".to_string(), scale)].into_iter().collect();
    let dynamic = rt.make_class("Scaled", vec![Value::Class(wrapper)], dict).unwrap();
    c.bench_function("construct_proxy", |b| {
        b.iter(|| rt.instantiate(&dynamic, &[], &[]).unwrap());
    });
}

fn bench_canonical_lookup(c: &mut Criterion) {
    let rt = Runtime::new();
    let host = overloaded();
    rt.canonical_wrapper(&host).unwrap();

    c.bench_function("canonical_hit", |b| {
        b.iter(|| rt.canonical_wrapper(black_box(&host)).unwrap());
    });
}

fn bench_arg_parser(c: &mut Criterion) {
    let args = [Value::Int(1), Value::str("two"), Value::Int(3)];
    let params = ["a", "b", "c", "d"];

    c.bench_function("arg_parser_keywords", |b| {
        b.iter(|| {
            let parser = ArgParser::new("f", black_box(&args), &["c"], &params).unwrap();
            (parser.int(0).unwrap(), parser.int_or(3, 0).unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_method_overloads,
    bench_construction,
    bench_canonical_lookup,
    bench_arg_parser
);

criterion_main!(benches);
