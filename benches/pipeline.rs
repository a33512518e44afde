//! Performance benchmarks for a3s-tos-monitor
//!
//! Run with: cargo bench

use a3s_tos_monitor::detect::line_changes;
use a3s_tos_monitor::{
    normalize, normalize_and_hash, ChangeDetector, EvidenceLog, MemoryEvidenceLog, RuleTable,
    Snapshot,
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn terms_document(clauses: usize, extra: &str) -> String {
    let mut html = String::from("<html><head><style>p { margin: 0 }</style></head><body>");
    for i in 0..clauses {
        html.push_str(&format!(
            "<p>Clause {}: The customer agrees to pay &amp; settle all invoices within   30 days.</p>\n",
            i
        ));
    }
    html.push_str(&format!("<p>{}</p></body></html>", extra));
    html
}

fn bench_normalize(c: &mut Criterion) {
    let doc = terms_document(200, "Final clause.");

    c.bench_function("normalize html (200 clauses)", |b| {
        b.iter(|| normalize(doc.as_bytes()).unwrap());
    });

    c.bench_function("normalize_and_hash html (200 clauses)", |b| {
        b.iter(|| normalize_and_hash(doc.as_bytes()).unwrap());
    });
}

fn bench_classification(c: &mut Criterion) {
    let rules = RuleTable::default();
    let (old, _) = normalize_and_hash(terms_document(200, "No arbitration clause.").as_bytes()).unwrap();
    let (new, _) = normalize_and_hash(
        terms_document(200, "Disputes are resolved by mandatory arbitration.").as_bytes(),
    )
    .unwrap();

    c.bench_function("RuleTable::newly_introduced", |b| {
        b.iter(|| rules.newly_introduced(&old, &new));
    });

    c.bench_function("line_changes", |b| {
        b.iter(|| line_changes(&old, &new));
    });

    let detector = ChangeDetector::new(Arc::new(RuleTable::default()));
    let prior = Snapshot::new("c1", old.clone());
    let current = Snapshot::new("c1", new.clone());
    c.bench_function("ChangeDetector::detect", |b| {
        b.iter(|| detector.detect(Some(&prior), &current));
    });
}

fn bench_evidence_append(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let snapshot = Snapshot::new("c1", "Clause 1: terms.\nClause 2: more terms.");

    c.bench_function("MemoryEvidenceLog append + latest", |b| {
        b.to_async(&rt).iter(|| async {
            let log = MemoryEvidenceLog::new();
            log.append_snapshot(&snapshot).await.unwrap();
            log.latest_snapshot("c1").await.unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_normalize,
    bench_classification,
    bench_evidence_append
);
criterion_main!(benches);
