use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use proto_core::{analyze, lexer::Lexer, parser::parse_source};

// ============================================================================
// Test Data: Varying Complexity and Size
// ============================================================================

const TINY_PROTO: &str = r#"message Tiny { optional int32 value = 1; }"#;

const SMALL_PROTO: &str = r#"
syntax = "proto3";
package bench.small;

message User {
    string name = 1;
    int64 id = 2;
    repeated string tags = 3;
    bool enabled = 4;
}
"#;

const MEDIUM_PROTO: &str = r#"
syntax = "proto3";
package bench.medium;

import "google/protobuf/timestamp.proto";

enum Status {
    STATUS_UNSPECIFIED = 0;
    STATUS_ACTIVE = 1;
    STATUS_INACTIVE = 2;
}

message Server {
    string host = 1;
    uint32 port = 2;
    bool ssl = 3;
    Status status = 4;
    map<string, string> labels = 5;
    google.protobuf.Timestamp started_at = 6;
    oneof endpoint {
        string dns = 7;
        bytes ipv4 = 8;
    }
}

message Fleet {
    repeated Server servers = 1;
    optional string region = 2;
}

service FleetService {
    rpc Get (Fleet) returns (Fleet);
    rpc Watch (Fleet) returns (stream Server);
}
"#;

const LARGE_PROTO: &str = r#"
syntax = "proto2";
package bench.large;

import "google/protobuf/descriptor.proto";

message Validation {
    optional int64 min = 1;
    optional int64 max = 2;
    optional string pattern = 3;
    repeated string allowed = 4;
}

extend google.protobuf.FieldOptions {
    optional Validation rules = 60000;
    optional bool secret = 60001;
}

extend google.protobuf.MessageOptions {
    optional string table = 60100;
}

enum Permission {
    READ = 1;
    WRITE = 2;
    EXECUTE = 3;
    ADMIN = 4;
}

message User {
    option (table) = "users";

    required int64 id = 1 [(rules).min = 1];
    optional string name = 2 [(rules) = { max: 64 pattern: "^[a-z]+$" }];
    optional string email = 3 [(secret) = true];
    repeated Permission permissions = 4 [packed = true];
    optional int32 age = 5 [default = 18, (rules).min = 0, (rules).max = 150];

    message Address {
        optional string street = 1;
        optional string city = 2;
        optional string country = 3 [default = "NL"];
    }
    repeated Address addresses = 6;

    reserved 7 to 9;
    reserved "legacy_id";
    extensions 100 to 199;
}

message Resource {
    option (table) = "resources";

    optional string path = 1 [(rules) = { allowed: ["/a", "/b", "/c"] }];
    repeated Permission permissions = 2;
    optional User owner = 3;
    repeated group Tag = 4 {
        optional string key = 5;
        optional string value = 6;
    }
}

extend User {
    optional string nickname = 100;
}

service Directory {
    rpc Lookup (User) returns (User) { option deprecated = true; }
    rpc ListResources (User) returns (stream Resource);
}
"#;

// Generate a schema with `count` messages that reference each other
fn generate_xlarge_proto(count: usize) -> String {
    let mut source = String::from("syntax = \"proto3\";\npackage bench.generated;\n\n");
    for i in 0..count {
        source.push_str(&format!("message Message{i} {{\n"));
        source.push_str(&format!("    string name_{i} = 1;\n"));
        source.push_str(&format!("    repeated int64 values_{i} = 2;\n"));
        if i > 0 {
            source.push_str(&format!("    Message{} previous = 3;\n", i - 1));
        }
        source.push_str("    map<string, int32> counters = 4;\n");
        source.push_str("}\n\n");
    }
    source
}

// ============================================================================
// Lexer Benchmarks
// ============================================================================

fn bench_lexer_tiny(c: &mut Criterion) {
    c.bench_function("lexer_tiny", |b| {
        b.iter(|| Lexer::new(black_box(TINY_PROTO), "tiny.proto").lex())
    });
}

fn bench_lexer_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_by_size");

    for (name, source) in [
        ("tiny", TINY_PROTO),
        ("small", SMALL_PROTO),
        ("medium", MEDIUM_PROTO),
        ("large", LARGE_PROTO),
    ] {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, src| {
            b.iter(|| Lexer::new(black_box(src), "bench.proto").lex())
        });
    }

    group.finish();
}

// ============================================================================
// Parser Benchmarks
// ============================================================================

fn bench_parser_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_by_size");

    for (name, source) in [
        ("tiny", TINY_PROTO),
        ("small", SMALL_PROTO),
        ("medium", MEDIUM_PROTO),
        ("large", LARGE_PROTO),
    ] {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, src| {
            b.iter(|| parse_source(black_box(src), "bench.proto"))
        });
    }

    group.finish();
}

fn bench_parser_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_message_scaling");

    for size in [10, 50, 100, 500] {
        let source = generate_xlarge_proto(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, src| {
            b.iter(|| parse_source(black_box(src), "generated.proto"))
        });
    }

    group.finish();
}

// ============================================================================
// End-to-End Analysis Benchmarks
// ============================================================================

fn bench_e2e_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("e2e_analysis");

    for (name, source) in [
        ("small", SMALL_PROTO),
        ("medium", MEDIUM_PROTO),
        ("large", LARGE_PROTO),
    ] {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, src| {
            b.iter(|| analyze(black_box(src), "bench.proto"))
        });
    }

    group.finish();
}

fn bench_e2e_with_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("e2e_with_json");

    for (name, source) in [("medium", MEDIUM_PROTO), ("large", LARGE_PROTO)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, src| {
            b.iter(|| {
                let result = analyze(black_box(src), "bench.proto").unwrap();
                result.to_json().unwrap()
            })
        });
    }

    group.finish();
}

fn bench_e2e_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("e2e_message_scaling");

    for size in [10, 50, 100, 500] {
        let source = generate_xlarge_proto(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, src| {
            b.iter(|| analyze(black_box(src), "generated.proto"))
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(lexer_benches, bench_lexer_tiny, bench_lexer_sizes);

criterion_group!(parser_benches, bench_parser_sizes, bench_parser_scaling);

criterion_group!(
    e2e_benches,
    bench_e2e_analysis,
    bench_e2e_with_serialization,
    bench_e2e_scaling
);

criterion_main!(lexer_benches, parser_benches, e2e_benches);
