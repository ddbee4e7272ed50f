// Criterion benchmarks for the hatchway-common hot paths
//
// Run benchmarks with:
//   cargo bench -p hatchway-common

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hatchway_common::routes::RouteTable;
use hatchway_common::scope::ScopeTemplate;
use serde_json::{json, Map};
use std::sync::Arc;

fn bench_route_resolve(c: &mut Criterion) {
    let table = RouteTable::new()
        .route("/", Some("home"), true)
        .route("/card/new", Some("card-create"), true)
        .route("/card/:cardId", Some("card-view"), true)
        .route("/card/:cardId/edit", Some("card-edit"), true)
        .route("/user/:userId", Some("user-view"), true)
        .route("/login", Some("login"), true);

    let mut group = c.benchmark_group("route_resolve");

    group.bench_function("static_path", |b| {
        b.iter(|| table.resolve(black_box("/login")));
    });

    group.bench_function("param_path_with_query", |b| {
        b.iter(|| table.resolve(black_box("/user/123?tab=cards&page=2")));
    });

    group.bench_function("not_found", |b| {
        b.iter(|| table.resolve(black_box("/no/such/path")).is_err());
    });

    group.finish();
}

fn bench_scope_fork(c: &mut Criterion) {
    let mut defaults = Map::new();
    for i in 0..32 {
        defaults.insert(format!("store{i}"), json!({"value": i, "loaded": false}));
    }
    let template = Arc::new(ScopeTemplate::new(defaults).unwrap());

    let mut group = c.benchmark_group("scope");

    group.bench_function("fork", |b| {
        b.iter(|| template.fork(black_box("sid=abc; theme=dark")));
    });

    group.bench_function("fork_and_serialize", |b| {
        b.iter(|| {
            let scope = template.fork("sid=abc");
            scope.insert("store3", json!({"value": 3, "loaded": true}));
            black_box(scope.serialize())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_route_resolve, bench_scope_fork);
criterion_main!(benches);
