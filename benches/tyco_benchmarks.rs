use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tyco::{load_text, Registry};

// ============================================================================
// Test Data: Varying Complexity and Size
// ============================================================================

const TINY_TYCO: &str = "int value: 42\n";

const SMALL_TYCO: &str = r#"str name: test
float version: 1.0
bool enabled: true
str[] tags: [a, b, c]
"#;

const MEDIUM_TYCO: &str = r#"str environment: production
str domain: example.com

Host:
 *str hostname:
  int cores:
  bool hyperthreaded: true
  - prod-01, 64
  - prod-02, 32, false

Service:
 *str name:
  Host host:
  int port: 8080
  str url: "https://{name}.{global.domain}:{port}"
  - api, Host(prod-01)
  - web, Host(prod-02), 443
  - worker, Host(prod-01), 9000
"#;

const LARGE_TYCO: &str = r#"#  Deployment inventory
str environment: production
str region: eu-west-1
?str owner: null
decimal budget: 12500.50
date started: 2024-01-15
datetime deployed: 2024-03-01T12:30:00Z

Team:
 *str name:
  str contact: "{name}@example.com"
  - platform
  - data
  - edge

Region:
 *str code:
  str label:
  - eu-west-1, Ireland
  - us-east-1, Virginia

Database:
 *str name:
  str host:
  int port: 5432
  Region region: Region(eu-west-1)
  str dsn: "postgres://{host}:{port}/{name}"
  - primary, db1.internal
  - replica, db2.internal
  - analytics, db3.internal, 5433, Region(us-east-1)

Service:
 *str name:
  Team team:
  Database database:
  int replicas: 2
  str[] tags: []
  str image: "registry/{name}:{global.environment}"
  - auth, Team(platform), Database(primary), 3, [critical, public]
  - billing, Team(platform), Database(primary)
  - reports, Team(data), Database(analytics), 1, [batch]
  - cdn, Team(edge), Database(replica), 8, [public]
  - search, Team(data), Database(replica), 4
"#;

// Generate a very large document for stress testing
fn generate_xlarge_tyco(rows: usize) -> String {
    let mut tyco = String::from("Item:\n *int id:\n  str name:\n  int value:\n  bool active:\n");
    for i in 0..rows {
        tyco.push_str(&format!(
            "  - {}, \"Item {}\", {}, {}\n",
            i,
            i,
            i * 100,
            i % 2 == 0
        ));
    }
    tyco
}

// Rows whose strings interpolate their own fields and a referenced instance.
fn generate_template_tyco(rows: usize) -> String {
    let mut tyco = String::from("str suffix: internal\nOwner:\n *str name:\n  - ops\nNode:\n *int id:\n  Owner owner: Owner(ops)\n  str fqdn: \"node-{id}.{owner.name}.{global.suffix}\"\n");
    for i in 0..rows {
        tyco.push_str(&format!("  - {i}\n"));
    }
    tyco
}

// ============================================================================
// End-to-End Load Benchmarks
// ============================================================================

fn bench_load_tiny(c: &mut Criterion) {
    c.bench_function("load_tiny", |b| b.iter(|| load_text(black_box(TINY_TYCO))));
}

fn bench_load_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_by_size");

    for (name, source) in [
        ("tiny", TINY_TYCO),
        ("small", SMALL_TYCO),
        ("medium", MEDIUM_TYCO),
        ("large", LARGE_TYCO),
    ] {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, src| {
            b.iter(|| load_text(black_box(src)))
        });
    }

    group.finish();
}

fn bench_load_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_row_scaling");

    for size in [10, 50, 100, 500, 1000] {
        let source = generate_xlarge_tyco(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, src| {
            b.iter(|| load_text(black_box(src)))
        });
    }

    group.finish();
}

fn bench_template_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("template_scaling");

    for size in [10, 100, 1000] {
        let source = generate_template_tyco(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, src| {
            b.iter(|| load_text(black_box(src)))
        });
    }

    group.finish();
}

// ============================================================================
// Projection Benchmarks
// ============================================================================

fn bench_load_with_serialization(c: &mut Criterion) {
    c.bench_function("load_to_json_large", |b| {
        b.iter(|| {
            let ctx = load_text(black_box(LARGE_TYCO)).unwrap();
            ctx.to_json().unwrap()
        })
    });
}

fn bench_materialize(c: &mut Criterion) {
    let ctx = load_text(LARGE_TYCO).unwrap();
    let registry = Registry::new();
    c.bench_function("materialize_large", |b| {
        b.iter(|| ctx.materialize(black_box(&registry)).unwrap())
    });
}

criterion_group!(
    load_benches,
    bench_load_tiny,
    bench_load_sizes,
    bench_load_scaling,
    bench_template_scaling
);

criterion_group!(projection_benches, bench_load_with_serialization, bench_materialize);

criterion_main!(load_benches, projection_benches);
