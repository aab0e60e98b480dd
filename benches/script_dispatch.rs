//! Benchmarks for script loading and hook dispatch
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use scriptnode::pipeline::{DataflowNode, Message, NodeId, PortRegistry, ScriptNode, SharedPorts};
use scriptnode::scripting::{exists, invoke, load, templates, Session};

const ADDER: &str = r#"
fn process() {
    let total = 0;
    for h in inputs {
        total += read_int(h);
    }
    write(outputs[0], total);
}
"#;

fn ports_with_inputs(count: usize) -> SharedPorts {
    let ports = PortRegistry::shared();
    {
        let mut p = ports.write().unwrap();
        for i in 0..count {
            p.add_input(&format!("in{}", i), false);
        }
        p.add_output("out");
    }
    ports
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");

    for (name, code) in templates::all() {
        let mut session = Session::create(NodeId(1), ports_with_inputs(1)).unwrap();
        group.bench_with_input(BenchmarkId::new("template", name), &code, |b, code| {
            b.iter(|| black_box(load(&mut session, code).unwrap()));
        });
    }

    group.finish();
}

fn bench_invoke(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoke");

    let mut session = Session::create(NodeId(2), ports_with_inputs(1)).unwrap();
    load(&mut session, "fn tick() { 1 }").unwrap();

    group.throughput(Throughput::Elements(1));
    group.bench_function("empty_tick", |b| {
        b.iter(|| black_box(invoke(&mut session, "tick", None).unwrap()));
    });
    group.bench_function("exists", |b| {
        b.iter(|| black_box(exists(&mut session, "tick")));
    });

    group.finish();
}

fn bench_process_inputs(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_inputs");

    for count in [1usize, 8, 32].iter() {
        let ports = ports_with_inputs(*count);
        let mut node = ScriptNode::new(NodeId(3), "adder").with_code(ADDER);
        node.setup(ports.clone()).unwrap();
        {
            let mut p = ports.write().unwrap();
            for i in 0..*count {
                p.deliver_to(&format!("in{}", i), Message::value(i as i64));
            }
        }

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("adder", count), count, |b, _| {
            b.iter(|| node.process());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_load, bench_invoke, bench_process_inputs);

criterion_main!(benches);
