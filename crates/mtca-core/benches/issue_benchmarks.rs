//! Benchmarks for the hot path of batch issuance: assertion keying and
//! Merkle tree construction.

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ed25519_dalek::SigningKey;
use mtca_core::assertion::{Assertion, Claims, Subject, TlsSubject};
use mtca_core::crypto::SignatureScheme;
use mtca_core::tree::Tree;

fn test_assertion(i: u32) -> Assertion {
    let key = SigningKey::from_bytes(&[(i % 251) as u8; 32]);
    let subject = Subject::Tls(
        TlsSubject::new(
            SignatureScheme::ED25519,
            key.verifying_key().to_bytes().to_vec(),
        )
        .unwrap(),
    );
    let claims = Claims::new(
        vec![format!("host-{i}.example.com")],
        Vec::new(),
        Vec::new(),
        Vec::new(),
        Vec::new(),
    );
    Assertion::new(subject, claims)
}

fn bench_assertion_key(c: &mut Criterion) {
    let assertion = test_assertion(0);
    c.bench_function("assertion/key", |b| {
        b.iter(|| black_box(&assertion).key().unwrap());
    });
}

fn bench_tree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree/build");

    for leaf_count in [100usize, 1_000, 10_000] {
        let leaves: Vec<Vec<u8>> = (0..leaf_count)
            .map(|i| test_assertion(i as u32).abridge().to_bytes().unwrap())
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(leaf_count),
            &leaves,
            |b, leaves| {
                b.iter(|| Tree::build(black_box(0), black_box(leaves)));
            },
        );
    }

    group.finish();
}

fn bench_authentication_path(c: &mut Criterion) {
    let leaves: Vec<Vec<u8>> = (0..10_000u32)
        .map(|i| test_assertion(i).abridge().to_bytes().unwrap())
        .collect();
    let tree = Tree::build(0, &leaves);

    c.bench_function("tree/authentication_path", |b| {
        b.iter(|| tree.authentication_path(black_box(4_321)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_assertion_key,
    bench_tree_build,
    bench_authentication_path
);
criterion_main!(benches);
