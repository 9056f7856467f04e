//! Attribute resolution benchmarks
//!
//! Measures a full resolution over chains of simple definitions fed by one
//! static connector, and the result cache lookup path.

use attrflow_core::{AttributeMap, AttributeRequestContext};
use attrflow_resolver::{
    AttributeResolver, CacheConfig, ConnectorConfig, DefinitionConfig, PluginRegistry, ResultCache,
    SimpleAttributeDefinition, StaticDataConnector,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn create_registry(definitions: usize) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry
        .add_data_connector(Arc::new(
            StaticDataConnector::new(ConnectorConfig::new("static"))
                .with_attribute("attr-0", ["a", "b", "c", "a"]),
        ))
        .unwrap();

    // attr-i depends on attr-(i-1); attr-0 reads the connector
    for i in 0..definitions {
        let dependency = if i == 0 { "static".to_string() } else { format!("attr-{}", i - 1) };
        registry
            .add_attribute_definition(Arc::new(SimpleAttributeDefinition::new(
                DefinitionConfig::new(format!("attr-{}", i)).depends_on(dependency),
            )))
            .unwrap();
    }
    registry
}

fn bench_resolve_attributes(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("resolve_attributes");

    for count in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::new("definitions", count), count, |b, &count| {
            let resolver = AttributeResolver::new("bench", create_registry(count));
            let request = AttributeRequestContext::new().with_principal("jdoe");

            b.to_async(&rt).iter(|| async {
                black_box(resolver.resolve_attributes(&request).await.unwrap());
            });
        });
    }

    group.finish();
}

fn bench_result_cache(c: &mut Criterion) {
    let cache = ResultCache::new(CacheConfig::default());
    for i in 0..100 {
        cache.put(&format!("(uid=user{})", i), AttributeMap::new());
    }

    c.bench_function("result_cache_hit", |b| {
        b.iter(|| black_box(cache.get("(uid=user42)")));
    });
    c.bench_function("result_cache_miss", |b| {
        b.iter(|| black_box(cache.get("(uid=nobody)")));
    });
}

criterion_group!(benches, bench_resolve_attributes, bench_result_cache);
criterion_main!(benches);
