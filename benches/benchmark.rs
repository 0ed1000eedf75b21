use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parley::config::ExpressionConfig;
use parley::eval::{ExpressionEvaluator, SimpleMemory};
use parley::functions::FunctionTable;
use serde_json::json;

const EXPRESSION: &str =
    "join(select(where(items, x, x.price > 2), x, concat(x.name, ' ', addOrdinal(x.price))), ', ')";

fn bench_parse(c: &mut Criterion) {
    let config = ExpressionConfig {
        cache_enabled: false,
        ..Default::default()
    };
    let evaluator = ExpressionEvaluator::new(Arc::new(FunctionTable::builtin()), &config);
    c.bench_function("parse and bind", |b| {
        b.iter(|| evaluator.parse(black_box(EXPRESSION)))
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let evaluator =
        ExpressionEvaluator::new(Arc::new(FunctionTable::builtin()), &ExpressionConfig::default());
    let items: Vec<_> = (0..50)
        .map(|i| json!({"name": format!("item{}", i), "price": i % 7}))
        .collect();
    let memory = SimpleMemory::from(json!({ "items": items }));
    c.bench_function("evaluate cached", |b| {
        b.iter(|| evaluator.evaluate_text(black_box(EXPRESSION), &memory))
    });
}

criterion_group!(benches, bench_parse, bench_evaluate);
criterion_main!(benches);
