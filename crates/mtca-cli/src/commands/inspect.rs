//! `inspect` subcommands: human-readable views of the stored artifacts.

use std::path::Path;

use anyhow::{Context, Result, bail};
use mtca_core::assertion::{AbridgedAssertion, Assertion};
use mtca_core::ca::read_index;
use mtca_core::cert::{Certificate, Proof};
use mtca_core::codec::Decoder;
use mtca_core::crypto::{HASH_SIZE, hash_bytes};
use mtca_core::params::CAParams;
use mtca_core::tree::{Tree, compute_root};
use mtca_core::window::SignedValidityWindow;

use super::{Table, ca::write_abridged_rows, read_from_file_or_stdin};

fn load_ca_params(path: Option<&Path>) -> Result<CAParams> {
    let Some(path) = path else {
        bail!("missing --ca-params flag");
    };
    let buf = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    CAParams::from_bytes(&buf).with_context(|| format!("parsing {}", path.display()))
}

/// `inspect ca-params`.
pub fn ca_params(path: Option<&Path>) -> Result<()> {
    let buf = read_from_file_or_stdin(path)?;
    let params = CAParams::from_bytes(&buf)?;

    let mut table = Table::new();
    table.add("issuer_id", params.issuer_id());
    table.add("start_time", params.start_time());
    table.add("batch_duration", format!("{}s", params.batch_duration()));
    table.add("life_time", format!("{}s", params.life_time()));
    table.add("storage_window_size", params.storage_window_size());
    table.add("validity_window_size", params.validity_window_size());
    table.add("http_server", params.http_server());
    table.add(
        "public_key fingerprint",
        hex::encode(hash_bytes(params.public_key())),
    );
    table.print();
    Ok(())
}

/// `inspect signed-validity-window`. Needs `--ca-params` to know the head
/// count and check the signature.
pub fn signed_validity_window(path: Option<&Path>, params_path: Option<&Path>) -> Result<()> {
    let buf = read_from_file_or_stdin(path)?;
    let params = load_ca_params(params_path)?;

    // Decoding also verifies the signature.
    let signed = SignedValidityWindow::from_bytes(&buf, &params)?;
    let window = signed.window();

    let mut table = Table::new();
    table.add("signature", "ok");
    table.add("batch_number", window.batch_number());
    let size = i64::from(params.validity_window_size());
    for (i, head) in window.tree_heads().iter().enumerate() {
        let batch = i64::from(window.batch_number()) + i as i64 - size + 1;
        table.add(&format!("tree_heads[{batch}]"), hex::encode(head));
    }
    table.print();
    Ok(())
}

/// `inspect abridged-assertions`.
pub fn abridged_assertions(path: Option<&Path>) -> Result<()> {
    let buf = read_from_file_or_stdin(path)?;
    let mut dec = Decoder::new(&buf);
    let mut count = 0u64;
    while !dec.is_empty() {
        let entry = dec.vec::<3>()?;
        let abridged = AbridgedAssertion::from_bytes(entry)?;
        count += 1;

        let mut table = Table::new();
        table.add("key", hex::encode(abridged.key()?));
        write_abridged_rows(&mut table, &abridged);
        table.print();
        println!();
    }
    println!("Total number of abridged assertions: {count}");
    Ok(())
}

/// `inspect assertion`.
pub fn assertion(path: Option<&Path>) -> Result<()> {
    let buf = read_from_file_or_stdin(path)?;
    let assertion = Assertion::from_bytes(&buf)?;

    let mut table = Table::new();
    write_abridged_rows(&mut table, &assertion.abridge());
    table.print();
    Ok(())
}

/// `inspect tree`.
pub fn tree(path: Option<&Path>) -> Result<()> {
    let buf = read_from_file_or_stdin(path)?;
    let tree = Tree::from_bytes(&buf)?;

    let mut table = Table::new();
    table.add("number of leaves", tree.leaf_count());
    table.add("number of nodes", tree.node_count());
    table.add("root", hex::encode(tree.root()));
    table.print();
    Ok(())
}

/// `inspect index`.
pub fn index(path: Option<&Path>) -> Result<()> {
    let buf = read_from_file_or_stdin(path)?;
    let records = read_index(&buf)?;

    println!("{:<64} {:>7} {:>7}", "key", "seqno", "offset");
    for (key, seqno, offset) in &records {
        println!("{:<64} {seqno:>7} {offset:>7}", hex::encode(key));
    }
    println!();
    println!("total number of entries: {}", records.len());
    Ok(())
}

/// `inspect cert`. With `--ca-params`, also recomputes the root from the
/// authentication path.
pub fn cert(path: Option<&Path>, params_path: Option<&Path>) -> Result<()> {
    let buf = read_from_file_or_stdin(path)?;
    let certificate = Certificate::from_bytes(&buf)?;

    let mut table = Table::new();
    write_abridged_rows(&mut table, &certificate.assertion().abridge());
    table.print();
    println!();

    let mut table = Table::new();
    let proof_type = match certificate.proof() {
        Proof::MerkleTree(_) => "merkle_tree_sha256".to_string(),
        other => format!("{:#06x}", other.proof_type()),
    };
    table.add("proof_type", proof_type);
    match certificate.proof() {
        Proof::MerkleTree(proof) => {
            table.add("issuer_id", proof.anchor().issuer_id());
            table.add("batch", proof.anchor().batch_number());
            table.add("index", proof.index());

            if params_path.is_some() {
                let params = load_ca_params(params_path)?;
                if proof.anchor().issuer_id() != params.issuer_id() {
                    bail!(
                        "issuer id doesn't match: {} != {}",
                        params.issuer_id(),
                        proof.anchor().issuer_id(),
                    );
                }
                let leaf = certificate.assertion().abridge().to_bytes()?;
                let root = compute_root(
                    proof.anchor().batch_number(),
                    proof.index(),
                    proof.path(),
                    &leaf,
                )
                .context("computing root")?;
                table.add("recomputed root", hex::encode(root));
            }
            table.print();

            println!("authentication path");
            for sibling in proof.path().chunks_exact(HASH_SIZE) {
                println!(" {}", hex::encode(sibling));
            }
        },
        _ => {
            table.print();
        },
    }
    Ok(())
}
