use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

use eureka_search::{
    AnalyzerConfig, Document, IndexConfig, IndexWriter, QueryStringParser, SearchService,
    Searcher,
};

const WORDS: &[&str] = &[
    "rust", "programming", "language", "memory", "safety", "compiler", "borrow", "checker",
    "thread", "async", "segment", "index", "query", "search", "merge", "posting",
];

struct BenchEnv {
    _tmp: TempDir,
    service: SearchService,
}

fn make_body(id: u64) -> String {
    let mut words = Vec::with_capacity(12);
    let mut state = id.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    for _ in 0..12 {
        state ^= state >> 29;
        state = state.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        words.push(WORDS[(state % WORDS.len() as u64) as usize]);
    }
    words.join(" ")
}

fn make_doc(id: u64) -> Document {
    Document::new()
        .number("id", id as f64)
        .text("body", make_body(id))
        .number("year", (2000 + id % 25) as f64)
}

fn config() -> IndexConfig {
    IndexConfig::default().with_analyzer(AnalyzerConfig::simple())
}

fn build_env(doc_count: usize) -> BenchEnv {
    let tmp = TempDir::new().unwrap();
    let service = SearchService::open(tmp.path(), config()).unwrap();
    for i in 1..=doc_count as u64 {
        service.add_document(&make_doc(i)).unwrap();
        if i % 1_000 == 0 {
            service.flush().unwrap();
        }
    }
    service.flush().unwrap();
    BenchEnv { _tmp: tmp, service }
}

fn bench_indexing(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexing");
    group.sample_size(10);
    for count in [1_000usize, 5_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let tmp = TempDir::new().unwrap();
                let writer = IndexWriter::open(tmp.path(), config()).unwrap();
                for i in 1..=count as u64 {
                    writer.add_document(&make_doc(i)).unwrap();
                }
                black_box(writer.commit().unwrap());
            });
        });
    }
    group.finish();
}

fn bench_query_string(c: &mut Criterion) {
    let counts = [1_000usize, 10_000];
    let envs: Vec<(usize, BenchEnv)> = counts.iter().map(|&n| (n, build_env(n))).collect();

    let queries = [
        ("term", "rust"),
        ("and", "rust programming"),
        ("or", "memory OR thread"),
        ("phrase", "\"borrow checker\""),
        ("prefix", "seg*"),
        ("range", "year:[2005 TO 2010]"),
    ];

    for (name, text) in queries {
        let mut group = c.benchmark_group(format!("query_{}", name));
        for (count, env) in &envs {
            group.bench_with_input(BenchmarkId::from_parameter(count), env, |b, env| {
                b.iter(|| black_box(env.service.query(text, 10).unwrap()));
            });
        }
        group.finish();
    }
}

fn bench_searcher_only(c: &mut Criterion) {
    let env = build_env(10_000);
    let writer = env.service.writer();
    let snapshot = writer.snapshot();
    let query = QueryStringParser::new(writer.analyzer(), snapshot.schema())
        .parse("rust -async")
        .unwrap();

    c.bench_function("searcher_rust_not_async", |b| {
        b.iter(|| {
            let searcher = Searcher::new(snapshot.clone());
            black_box(searcher.search(&query, 10).unwrap())
        });
    });
}

fn bench_force_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("force_merge");
    group.sample_size(10);
    group.bench_function("10_segments_of_500", |b| {
        b.iter(|| {
            let tmp = TempDir::new().unwrap();
            let writer = IndexWriter::open(tmp.path(), config()).unwrap();
            for i in 1..=5_000u64 {
                writer.add_document(&make_doc(i)).unwrap();
                if i % 500 == 0 {
                    writer.commit().unwrap();
                }
            }
            black_box(writer.force_merge().unwrap());
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_indexing,
    bench_query_string,
    bench_searcher_only,
    bench_force_merge
);
criterion_main!(benches);
