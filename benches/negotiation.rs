//! Benchmarks for variant selection

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::fs;
use tempfile::TempDir;

use conneg::config::DirectoryConfig;
use conneg::directory::DirectoryResource;
use conneg::metadata::{Language, MediaType, Variant};
use conneg::negotiation::{ClientPreferences, Negotiator};

const LANGUAGES: [&str; 5] = ["en", "fr", "de", "es", "it"];
const MEDIA_TYPES: [&str; 3] = ["text/html", "text/plain", "application/json"];

fn variants(count: usize) -> Vec<Variant> {
    (0..count)
        .map(|i| {
            Variant::new()
                .with_language(Language::parse(LANGUAGES[i % LANGUAGES.len()]).unwrap())
                .with_media_type(MediaType::parse(MEDIA_TYPES[i % MEDIA_TYPES.len()]).unwrap())
        })
        .collect()
}

fn bench_preferred_variant(c: &mut Criterion) {
    let mut group = c.benchmark_group("preferred_variant");
    let prefs = ClientPreferences::from_headers(
        Some("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        Some("fr-CH, fr;q=0.9, en;q=0.8, de;q=0.7, *;q=0.5"),
        None,
    );
    let negotiator = Negotiator::default();

    for count in [2, 8, 32] {
        let variants = variants(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &variants, |b, variants| {
            b.iter(|| negotiator.preferred_variant(black_box(variants), black_box(&prefs), None));
        });
    }

    group.finish();
}

fn bench_header_parsing(c: &mut Criterion) {
    c.bench_function("parse_accept_headers", |b| {
        b.iter(|| {
            ClientPreferences::from_headers(
                black_box(Some("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")),
                black_box(Some("fr-CH, fr;q=0.9, en;q=0.8, de;q=0.7, *;q=0.5")),
                black_box(Some("utf-8, iso-8859-1;q=0.5")),
            )
        });
    });
}

fn bench_directory_get(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    for language in LANGUAGES {
        fs::write(dir.path().join(format!("index.{language}.html")), language).unwrap();
    }

    let config = DirectoryConfig::new(dir.path().to_path_buf());
    let resource = DirectoryResource::from_config(&config, Negotiator::default()).unwrap();
    let prefs = ClientPreferences::from_headers(Some("text/html"), Some("de, en;q=0.5"), None);

    c.bench_function("directory_get", |b| {
        b.iter(|| resource.get(black_box("/index"), None, black_box(&prefs)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_preferred_variant,
    bench_header_parsing,
    bench_directory_get
);
criterion_main!(benches);
