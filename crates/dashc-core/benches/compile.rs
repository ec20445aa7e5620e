//! End-to-end compile benchmarks.
//!
//! Measures the full gate + codegen + sandbox load path at several document
//! sizes, plus the pre-filter and placeholder resolution on their own.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dashc_core::{prefilter, resolve, Compiler, InputState};

fn document(charts: usize) -> String {
    let mut source = String::from(
        "<Toggle name=\"showCharts\" value=\"true\" />\n<Dropdown name=\"region\" options=\"North,South\" value=\"North\" />\n<Grid cols=\"3\">\n",
    );
    for i in 0..charts {
        source.push_str(&format!(
            "  <BarChart title=\"Chart {i}\" source=\"salesData\" filter=\"{{inputs.region}}\" visible=\"{{inputs.showCharts}}\" />\n"
        ));
    }
    source.push_str("</Grid>\n");
    source
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile/document");
    let compiler = Compiler::default();

    for charts in [1usize, 10, 100] {
        let source = document(charts);
        group.bench_with_input(BenchmarkId::from_parameter(charts), &source, |b, source| {
            b.iter(|| compiler.compile(black_box(source), "Dashboard.dash"));
        });
    }

    group.finish();
}

fn bench_prefilter(c: &mut Criterion) {
    let source = document(100);
    c.bench_function("prefilter/scan", |b| {
        b.iter(|| prefilter::scan(black_box(&source)));
    });
}

fn bench_resolve(c: &mut Criterion) {
    let state: InputState = [
        ("region".to_string(), serde_json::json!("North")),
        ("showCharts".to_string(), serde_json::json!(true)),
    ]
    .into_iter()
    .collect();
    c.bench_function("expression/resolve", |b| {
        b.iter(|| resolve(black_box("{inputs.region}"), &state));
    });
}

criterion_group!(benches, bench_compile, bench_prefilter, bench_resolve);
criterion_main!(benches);
