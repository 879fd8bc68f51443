use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use lantern_analyzer::{Assembler, MemoryGraph, Options, SourceBundle};
use lantern_core::CancelHandle;
use lantern_parser::PythonParser;
use std::hint::black_box;

/// A module with `n` classes, each calling into the previous one
fn synthetic_module(n: usize) -> String {
    let mut source = String::from("class Node0:\n    def value(self):\n        return 0\n");
    for i in 1..n {
        source.push_str(&format!(
            "class Node{i}(Node{prev}):\n    def __init__(self, child):\n        self.child = child\n\
             \n    def value(self):\n        return [c for c in [self.child.value()]]\n",
            prev = i - 1
        ));
        source.push_str(&format!("node{i} = Node{i}(Node{prev}())\n", prev = i - 1));
    }
    source
}

fn parse(files: &[(String, String)]) -> Vec<SourceBundle> {
    let mut parser = PythonParser::new().unwrap();
    files.iter().map(|(path, source)| SourceBundle::parse(path, source, &mut parser).unwrap()).collect()
}

fn build(bundles: &[SourceBundle], options: &Options) {
    let mut assembler = Assembler::new(MemoryGraph::bundled(), options.clone());
    for bundle in bundles {
        assembler.add_source(bundle.clone());
    }
    assembler.build(&CancelHandle::new()).unwrap();
    black_box(assembler.assembly().work_items());
}

/// Benchmark a single module of growing size
fn bench_module_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("module_size");
    let options = Options::default();
    for size in [10, 50, 200] {
        let bundles = parse(&[("/bench/app.py".to_string(), synthetic_module(size))]);
        group.bench_with_input(BenchmarkId::from_parameter(size), &bundles, |b, bundles| {
            b.iter(|| build(black_box(bundles), &options))
        });
    }
    group.finish();
}

/// Benchmark the cost of extra passes and capability refinement
fn bench_passes(c: &mut Criterion) {
    let bundles = parse(&[("/bench/app.py".to_string(), synthetic_module(50))]);
    let mut group = c.benchmark_group("passes");
    for passes in [1, 3, 6] {
        let options = Options { passes, use_capabilities: false, ..Options::default() };
        group.bench_with_input(BenchmarkId::new("plain", passes), &options, |b, options| {
            b.iter(|| build(black_box(&bundles), options))
        });
    }
    let refined = Options { passes: 3, use_capabilities: true, ..Options::default() };
    group.bench_function("refined_3", |b| b.iter(|| build(black_box(&bundles), &refined)));
    group.finish();
}

/// Benchmark star imports across a chain of modules
fn bench_import_chain(c: &mut Criterion) {
    let mut files = vec![("/bench/pkg/m0.py".to_string(), "value = 0\n".to_string())];
    for i in 1..30 {
        files.push((format!("/bench/pkg/m{i}.py"), format!("from m{} import *\nvalue{i} = value\n", i - 1)));
    }
    let bundles = parse(&files);
    let options = Options::default();
    c.bench_function("import_chain_30", |b| b.iter(|| build(black_box(&bundles), &options)));
}

criterion_group!(benches, bench_module_size, bench_passes, bench_import_chain);
criterion_main!(benches);
