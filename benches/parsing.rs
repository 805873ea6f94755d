use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

use mailsift::ingest::{DedupEngine, Importer, SenderPolicy};
use mailsift::source::{read_eml, read_mbox};
use mailsift::EmailStore;

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn bench_parse_mime(c: &mut Criterion) {
    let raw = read_eml(fixture("decision.eml")).unwrap().normalized().contents;

    c.bench_function("parse_mime_decision", |b| {
        b.iter(|| mailsift::parser::parse_mime(&raw).unwrap())
    });
}

fn bench_alternatives(c: &mut Criterion) {
    let raw = read_eml(fixture("decision.eml")).unwrap().normalized().contents;
    let email = mailsift::parser::parse_mime(&raw).unwrap();

    c.bench_function("multipart_alternatives_decision", |b| {
        b.iter(|| email.multipart_alternatives().unwrap())
    });
}

fn bench_import(c: &mut Criterion) {
    let messages: Vec<_> = read_mbox(fixture("batch.mbox"))
        .unwrap()
        .into_iter()
        .map(|m| m.normalized())
        .collect();
    let mut policy = SenderPolicy::new();
    policy.allow("notices@portal.example.com");
    let importer = Importer::new(DedupEngine::new(policy));

    c.bench_function("import_batch_in_memory", |b| {
        b.iter(|| {
            let mut store = EmailStore::in_memory();
            importer
                .import(&mut store, messages.clone(), None)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_parse_mime, bench_alternatives, bench_import);
criterion_main!(benches);
