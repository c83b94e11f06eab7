use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use webrouter::{
    pattern::PathPattern, Exception, HttpRequestMethod, Request, Route, RouteTable, Router,
};

fn build_table(size: usize) -> RouteTable {
    let mut table = RouteTable::new();
    for i in 0..size {
        let route = Route::new(&format!("/static{}/items", i))
            .get(|_ctx| async { Ok::<_, Exception>("s") });
        table.add_route(&route, "").unwrap();
        let route = Route::new(&format!("/param{}/:id/detail", i))
            .get(|_ctx| async { Ok::<_, Exception>("p") });
        table.add_route(&route, "").unwrap();
    }
    table
}

fn pattern_compile_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_compile");

    let templates = [
        ("literal", "/users/list"),
        ("one_param", "/users/:id"),
        ("many_params", "/orgs/:org/repos/:repo/issues/:number"),
    ];

    for (name, template) in templates.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), template, |b, template| {
            b.iter(|| PathPattern::compile(black_box(template)).unwrap());
        });
    }

    group.finish();
}

fn table_resolve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_resolve");

    for size in [10, 100, 1000].iter() {
        let table = build_table(*size);
        let last = size - 1;
        let static_path = format!("/static{}/items", last);
        let param_path = format!("/param{}/42/detail", last);

        group.bench_with_input(BenchmarkId::new("static", size), &static_path, |b, path| {
            b.iter(|| table.resolve(black_box(path), HttpRequestMethod::Get).unwrap());
        });
        // 参数路由按注册顺序扫描，最后一条为最坏情况
        group.bench_with_input(BenchmarkId::new("param_worst", size), &param_path, |b, path| {
            b.iter(|| table.resolve(black_box(path), HttpRequestMethod::Get).unwrap());
        });
    }

    group.finish();
}

fn router_cached_resolve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("router_resolve");
    let runtime = Runtime::new().unwrap();

    for (name, capacity) in [("cache_disabled", 0), ("cache_enabled", 1024)] {
        let router = Router::with_cache_capacity(capacity);
        for i in 0..1000 {
            let route = Route::new(&format!("/param{}/:id", i))
                .get(|_ctx| async { Ok::<_, Exception>("p") });
            router.add(&[route]).unwrap();
        }
        let path = "/param999/7";
        runtime.block_on(router.handle(Request::new(HttpRequestMethod::Get, path)));

        group.bench_function(name, |b| {
            b.iter(|| router.resolve(black_box(path), HttpRequestMethod::Get).unwrap());
        });
    }

    group.finish();
}

fn router_handle_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let router = Router::default();
    router
        .add(&[Route::new("/users/:id").get(|ctx: webrouter::Context| async move {
            Ok::<_, Exception>(serde_json::json!({ "id": ctx.param("id") }))
        })])
        .unwrap();

    c.bench_function("router_handle", |b| {
        b.iter(|| {
            let request = Request::new(HttpRequestMethod::Get, black_box("/users/42?x=1"));
            runtime.block_on(router.handle(request))
        });
    });
}

criterion_group!(
    benches,
    pattern_compile_benchmark,
    table_resolve_benchmark,
    router_cached_resolve_benchmark,
    router_handle_benchmark
);
criterion_main!(benches);
