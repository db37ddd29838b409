//! End-to-end tests of the batch issuance pipeline and certificate flow.

use std::fs;

use ed25519_dalek::SigningKey;
use mtca_core::assertion::{Assertion, CheckError, Claims, Subject, TlsSubject};
use mtca_core::ca::{Ca, CaError, NewOpts, QueuedAssertion};
use mtca_core::cert::VerifyError;
use mtca_core::crypto::{SignatureScheme, ZERO_HASH};
use mtca_core::tree::{Tree, compute_root, empty_leaf_hash};
use mtca_core::window::SignedValidityWindow;
use tempfile::TempDir;

const START_TIME: u64 = 1_700_000_000;

fn new_ca(dir: &TempDir) -> Ca {
    Ca::new(
        dir.path().join("ca"),
        NewOpts {
            issuer_id: "acme".to_string(),
            http_server: "example.org".to_string(),
            batch_duration: Some(60),
            lifetime: Some(300),
            storage_duration: Some(600),
            start_time: Some(START_TIME),
        },
    )
    .unwrap()
}

fn assertion(seed: u8, dns: &str) -> Assertion {
    let key = SigningKey::from_bytes(&[seed; 32]);
    let subject = Subject::Tls(
        TlsSubject::new(
            SignatureScheme::ED25519,
            key.verifying_key().to_bytes().to_vec(),
        )
        .unwrap(),
    );
    let claims = Claims::new(
        vec![dns.to_string()],
        Vec::new(),
        Vec::new(),
        Vec::new(),
        Vec::new(),
    );
    Assertion::new(subject, claims)
}

fn read_signed_window(ca: &Ca, batch: u32) -> SignedValidityWindow {
    let bytes = fs::read(ca.batch_path(batch).join("signed-validity-window")).unwrap();
    SignedValidityWindow::from_bytes(&bytes, ca.params()).unwrap()
}

#[test]
fn empty_batch_roots_the_empty_leaf() {
    let dir = TempDir::new().unwrap();
    let ca = new_ca(&dir);

    assert_eq!(ca.issue().unwrap(), 0);

    let tree = Tree::from_bytes(&fs::read(ca.batch_path(0).join("tree")).unwrap()).unwrap();
    assert_eq!(tree.leaf_count(), 0);
    assert_eq!(tree.root(), empty_leaf_hash(0, 0));

    let signed = read_signed_window(&ca, 0);
    let heads = signed.window().tree_heads();
    assert_eq!(heads.len(), 5);
    assert_eq!(&heads[..4], &[ZERO_HASH; 4]);
    assert_eq!(heads[4], tree.root());
}

#[test]
fn single_assertion_proof_recomputes_the_newest_head() {
    let dir = TempDir::new().unwrap();
    let ca = new_ca(&dir);
    let assertion = assertion(1, "example.com");

    ca.queue(QueuedAssertion::new(assertion.clone(), None))
        .unwrap();
    ca.issue().unwrap();

    let cert = ca.certificate_for(&assertion).unwrap();
    let signed = read_signed_window(&ca, 0);

    cert.verify(ca.params(), &signed).unwrap();

    let mtca_core::cert::Proof::MerkleTree(proof) = cert.proof() else {
        panic!("expected a merkle tree proof");
    };
    let leaf = assertion.abridge().to_bytes().unwrap();
    let root = compute_root(0, proof.index(), proof.path(), &leaf).unwrap();
    assert_eq!(root, signed.window().tree_heads()[4]);
}

#[test]
fn repeated_assertions_collapse_to_one_leaf() {
    let dir = TempDir::new().unwrap();
    let ca = new_ca(&dir);
    let assertion = assertion(2, "example.com");

    for _ in 0..10 {
        ca.queue(QueuedAssertion::new(assertion.clone(), None))
            .unwrap();
    }
    ca.issue().unwrap();

    let tree = Tree::from_bytes(&fs::read(ca.batch_path(0).join("tree")).unwrap()).unwrap();
    assert_eq!(tree.leaf_count(), 1);
}

#[test]
fn leaf_order_is_independent_of_enqueue_order() {
    let assertions: Vec<Assertion> = (0..8)
        .map(|i| assertion(10 + i, &format!("host-{i}.example.com")))
        .collect();

    let dir_a = TempDir::new().unwrap();
    let ca_a = new_ca(&dir_a);
    for a in &assertions {
        ca_a.queue(QueuedAssertion::new(a.clone(), None)).unwrap();
    }
    ca_a.issue().unwrap();

    let dir_b = TempDir::new().unwrap();
    let ca_b = new_ca(&dir_b);
    for a in assertions.iter().rev() {
        ca_b.queue(QueuedAssertion::new(a.clone(), None)).unwrap();
    }
    ca_b.issue().unwrap();

    for artifact in ["abridged-assertions", "tree"] {
        let a = fs::read(ca_a.batch_path(0).join(artifact)).unwrap();
        let b = fs::read(ca_b.batch_path(0).join(artifact)).unwrap();
        assert_eq!(a, b, "artifact {artifact} differs");
    }
}

#[test]
fn tampered_path_fails_with_root_mismatch() {
    let dir = TempDir::new().unwrap();
    let ca = new_ca(&dir);
    let assertion = assertion(3, "example.com");

    ca.queue(QueuedAssertion::new(assertion.clone(), None))
        .unwrap();
    // A second leaf so the authentication path is non-empty.
    ca.queue(QueuedAssertion::new(
        self::assertion(4, "other.example.com"),
        None,
    ))
    .unwrap();
    ca.issue().unwrap();

    let cert = ca.certificate_for(&assertion).unwrap();
    let signed = read_signed_window(&ca, 0);
    cert.verify(ca.params(), &signed).unwrap();

    let mut bytes = cert.to_bytes().unwrap();
    let at = bytes.len() - 1; // inside the authentication path
    bytes[at] ^= 0x01;
    let tampered = mtca_core::cert::Certificate::from_bytes(&bytes).unwrap();
    assert_eq!(
        tampered.verify(ca.params(), &signed).unwrap_err(),
        VerifyError::RootMismatch
    );
}

#[test]
fn old_batches_age_out_of_the_window_but_stay_on_disk() {
    let dir = TempDir::new().unwrap();
    let ca = new_ca(&dir);
    let assertion = assertion(5, "example.com");

    ca.queue(QueuedAssertion::new(assertion.clone(), None))
        .unwrap();
    ca.issue().unwrap();
    let cert = ca.certificate_for(&assertion).unwrap();

    // Issue past the validity window: batches 1..=6, window now covers 2..=6.
    for _ in 0..6 {
        ca.issue().unwrap();
    }

    let signed = read_signed_window(&ca, 6);
    assert_eq!(
        cert.verify(ca.params(), &signed).unwrap_err(),
        VerifyError::WindowStale { batch: 0 }
    );

    // Outside the validity window, no certificate can be assembled.
    assert!(matches!(
        ca.certificate_for(&assertion),
        Err(CaError::NotIssued)
    ));

    // Inside the storage window, the artifacts stay on disk.
    assert!(ca.batch_path(0).join("tree").exists());
}

#[test]
fn rolled_window_keeps_each_batch_root() {
    let dir = TempDir::new().unwrap();
    let ca = new_ca(&dir);

    let mut roots = Vec::new();
    for batch in 0..3u32 {
        ca.queue(QueuedAssertion::new(
            assertion(20 + batch as u8, &format!("b{batch}.example.com")),
            None,
        ))
        .unwrap();
        ca.issue().unwrap();
        let tree =
            Tree::from_bytes(&fs::read(ca.batch_path(batch).join("tree")).unwrap()).unwrap();
        roots.push(tree.root());
    }

    let signed = read_signed_window(&ca, 2);
    let heads = signed.window().tree_heads();
    assert_eq!(&heads[..2], &[ZERO_HASH; 2]);
    assert_eq!(&heads[2..], roots.as_slice());
}

#[test]
fn bad_checksum_leaves_the_queue_untouched() {
    let dir = TempDir::new().unwrap();
    let ca = new_ca(&dir);
    let assertion = assertion(6, "example.com");

    let mut wrong = assertion.key().unwrap();
    wrong[0] ^= 0xff;
    let err = ca
        .queue(QueuedAssertion::new(assertion, Some(wrong)))
        .unwrap_err();
    assert!(matches!(
        err,
        CaError::Check(CheckError::ChecksumMismatch)
    ));
    assert!(!dir.path().join("ca").join("queue").exists());
}

#[test]
fn issue_refuses_when_another_writer_holds_the_lock() {
    let dir = TempDir::new().unwrap();
    let ca = new_ca(&dir);

    let lock = fs::File::open(dir.path().join("ca").join("lock")).unwrap();
    fs2::FileExt::lock_exclusive(&lock).unwrap();

    assert!(matches!(ca.issue(), Err(CaError::LockHeld { .. })));

    fs2::FileExt::unlock(&lock).unwrap();
    ca.issue().unwrap();
}

#[test]
fn reopen_recovers_the_latest_batch() {
    let dir = TempDir::new().unwrap();
    let path = {
        let ca = new_ca(&dir);
        ca.issue().unwrap();
        ca.issue().unwrap();
        ca.root().to_path_buf()
    };

    let ca = Ca::open(&path).unwrap();
    assert_eq!(ca.latest_batch().unwrap(), Some(1));
    assert_eq!(ca.issue().unwrap(), 2);
}

#[test]
fn open_rejects_a_missing_ca() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Ca::open(dir.path().join("nothing-here")),
        Err(CaError::NotInitialized { .. })
    ));
}

#[test]
fn invalid_records_are_skipped_at_issue_time() {
    let dir = TempDir::new().unwrap();
    let ca = new_ca(&dir);

    ca.queue(QueuedAssertion::new(assertion(7, "example.com"), None))
        .unwrap();

    // Corrupt the tail of the queue: a torn record must not break issuance.
    let queue_path = dir.path().join("ca").join("queue");
    let mut bytes = fs::read(&queue_path).unwrap();
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0xff, 0x01, 0x02]);
    fs::write(&queue_path, &bytes).unwrap();

    ca.issue().unwrap();
    let tree = Tree::from_bytes(&fs::read(ca.batch_path(0).join("tree")).unwrap()).unwrap();
    assert_eq!(tree.leaf_count(), 1);
}

#[test]
fn batches_past_the_storage_window_are_pruned() {
    let dir = TempDir::new().unwrap();
    // storage_duration = 600s -> 10 batches kept.
    let ca = new_ca(&dir);

    for _ in 0..12 {
        ca.issue().unwrap();
    }

    assert!(!ca.batch_path(0).exists());
    assert!(!ca.batch_path(1).exists());
    assert!(ca.batch_path(2).exists());
    assert!(ca.batch_path(11).exists());
}
