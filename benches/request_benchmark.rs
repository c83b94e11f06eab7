use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use webrouter::{
    body::decode_bytes, context::parse_query, request::Request, HttpEncoding, HttpRequestMethod,
    ResponseWriter,
};

fn request_parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse");

    let requests = [
        (
            "simple",
            b"GET / HTTP/1.1\r\nHost: localhost:7878\r\nUser-Agent: Test\r\n\r\n".as_slice(),
        ),
        (
            "with_query",
            b"GET /users/42?sort=asc&page=3 HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: gzip, deflate, br\r\n\r\n".as_slice(),
        ),
        (
            "json_body",
            b"POST /users HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 23\r\n\r\n{\"name\":\"maya\",\"age\":3}".as_slice(),
        ),
    ];

    for (name, request) in requests.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), request, |b, request| {
            b.iter(|| {
                let buffer = black_box(request.to_vec());
                let _ = Request::try_from(&buffer, 0).unwrap();
            });
        });
    }

    group.finish();
}

fn request_parse_methods_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_methods");

    for method in ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "HEAD"] {
        let request = format!("{} /resource HTTP/1.1\r\nHost: localhost\r\n\r\n", method);
        group.bench_with_input(BenchmarkId::from_parameter(method), &request, |b, request| {
            b.iter(|| {
                let buffer = black_box(request.as_bytes().to_vec());
                let _ = Request::try_from(&buffer, 0).unwrap();
            });
        });
    }

    group.finish();
}

fn query_parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_parse");

    let queries = [
        ("empty", ""),
        ("short", "a=1"),
        ("long", "param1=value1&param2=value2&param3=value3&flag&expr=a=b&param4=value4"),
    ];

    for (name, query) in queries.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), query, |b, query| {
            b.iter(|| parse_query(black_box(query)));
        });
    }

    group.finish();
}

fn body_decode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("body_decode");

    let bodies = [
        ("text", "text/plain", "hello world".as_bytes()),
        (
            "json",
            "application/json",
            br#"{"name":"maya","tags":["a","b","c"],"nested":{"x":1}}"#.as_slice(),
        ),
        (
            "urlencoded",
            "application/x-www-form-urlencoded",
            b"name=maya&city=new+york&flag".as_slice(),
        ),
    ];

    for (name, content_type, raw) in bodies.iter() {
        group.bench_function(*name, |b| {
            b.iter(|| {
                let content_type = black_box(content_type);
                decode_bytes(HttpRequestMethod::Post, content_type, black_box(raw)).unwrap()
            });
        });
    }

    group.finish();
}

fn response_serialize_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_serialize");

    let writer = ResponseWriter::new(0);
    writer.send(serde_json::json!({ "message": "x".repeat(2048) }), 200);
    let response = writer.snapshot();

    let encodings = [
        ("identity", vec![]),
        ("gzip", vec![HttpEncoding::Gzip]),
        ("deflate", vec![HttpEncoding::Deflate]),
    ];

    for (name, accept) in encodings.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), accept, |b, accept| {
            b.iter(|| response.as_bytes(black_box(accept)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    request_parse_benchmark,
    request_parse_methods_benchmark,
    query_parse_benchmark,
    body_decode_benchmark,
    response_serialize_benchmark
);
criterion_main!(benches);
