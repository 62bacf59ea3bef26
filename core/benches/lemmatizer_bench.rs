use criterion::{criterion_group, criterion_main, Criterion};
use sitesearch_core::lemmatizer::lemmatize;

fn bench_lemmatize(c: &mut Criterion) {
    let text = include_str!("../src/lemmatizer.rs");
    c.bench_function("lemmatize_source", |b| b.iter(|| lemmatize(text)));
}

criterion_group!(benches, bench_lemmatize);
criterion_main!(benches);
