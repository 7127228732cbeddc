//! Resolution benchmarks for ferry-core.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ferry_core::{Context, Entrypoint, Resolver, RouteMap};
use ferry_protocol::{parse_route, RenderMethod, Route};

fn site() -> Entrypoint {
    let docs: Entrypoint = (0..50)
        .fold(RouteMap::new(), |map, i| map.route(&format!("/page{i}"), format!("page {i}")))
        .into();
    RouteMap::new()
        .route("/", "home")
        .route("/docs", docs)
        .route("/users/:id/*", Entrypoint::preset(RenderMethod::Hybrid, "profile"))
        .into()
}

fn bench_resolve(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let resolver = Resolver::default();
    let site = site();
    let ctx = Context::new(Route::root());

    for (name, path) in [
        ("resolve_literal", "/docs/page42"),
        ("resolve_pattern", "/users/7/posts/1"),
        ("resolve_miss", "/missing/route"),
    ] {
        let route = parse_route(path).unwrap();
        c.bench_function(name, |b| {
            b.iter(|| {
                runtime
                    .block_on(resolver.resolve(black_box(&site), black_box(&route), &ctx, false))
                    .unwrap()
            })
        });
    }
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
