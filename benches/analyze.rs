//! Benchmarks for class decoding and bundle analysis
//!
//! Synthesizes bundles of increasing size where every class refers to
//! classes of neighbouring packages and a few external APIs.

use bundlescope::analysis::Analyzer;
use bundlescope::classfile::builder::ClassFileBuilder;
use bundlescope::classfile::{decode, DecodeOptions};
use bundlescope::config::AnalyzerConfig;
use bundlescope::graph::PackageModel;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Class files for `packages` packages with `classes_per_package` classes each.
fn create_bundle(packages: usize, classes_per_package: usize) -> Vec<(String, Vec<u8>)> {
    let mut classes = Vec::with_capacity(packages * classes_per_package);
    for p in 0..packages {
        for c in 0..classes_per_package {
            let name = format!("com/acme/p{}/C{}", p, c);
            let mut builder = ClassFileBuilder::new(&name);
            builder
                .add_interface(&format!("org/external/api{}/Service", p % 7))
                .add_field(0x0001, "next", &format!("Lcom/acme/p{}/C0;", (p + 1) % packages), Vec::new())
                .add_field(0x0002, "log", "Lorg/slf4j/Logger;", Vec::new())
                .add_default_constructor();
            classes.push((format!("{}.class", name), builder.build()));
        }
    }
    classes
}

fn analyzer() -> Analyzer {
    let mut config = AnalyzerConfig::new();
    config
        .set("Export-Package", "com.acme.p1*;version=1.0")
        .and_then(|c| c.set("Bundle-Version", "2.0.0"))
        .expect("valid settings");
    Analyzer::new(config)
}

fn load(analyzer: &Analyzer, classes: &[(String, Vec<u8>)]) -> PackageModel {
    let mut model = analyzer.model();
    for (path, bytes) in classes {
        model.add_class_bytes(path, bytes);
    }
    model
}

/// Benchmark decoding single class files
fn bench_decode(c: &mut Criterion) {
    let classes = create_bundle(1, 1);
    let bytes = &classes[0].1;
    let options = DecodeOptions::default();

    c.bench_function("decode_class", |b| {
        b.iter(|| black_box(decode(black_box(bytes), &options)))
    });
}

/// Benchmark building the package model
fn bench_model(c: &mut Criterion) {
    let mut group = c.benchmark_group("package_model");
    let analyzer = analyzer();

    for size in [10, 50, 200].iter() {
        let classes = create_bundle(*size, 10);
        group.bench_with_input(BenchmarkId::new("packages", size), &classes, |b, classes| {
            b.iter(|| black_box(load(&analyzer, classes)));
        });
    }

    group.finish();
}

/// Benchmark the full analysis over an already loaded model
fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    let analyzer = analyzer();

    for size in [10, 50, 200].iter() {
        let mut model = load(&analyzer, &create_bundle(*size, 10));
        group.bench_with_input(BenchmarkId::new("packages", size), size, |b, _| {
            b.iter(|| black_box(analyzer.analyze(&mut model)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_model, bench_analyze);
criterion_main!(benches);
