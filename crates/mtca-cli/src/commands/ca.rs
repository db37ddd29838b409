//! `ca` subcommands: new, queue, show-queue, issue, cert.

use std::path::Path;

use anyhow::{Context, Result};
use mtca_core::assertion::{AbridgedSubject, Assertion, Claims};
use mtca_core::ca::{Ca, NewOpts, QueuedAssertion};

use crate::AssertionFlags;

use super::{Table, claim_list, write_to_file_or_stdout};

/// `ca new`: creates a CA.
pub fn new(
    ca_path: &Path,
    issuer_id: &str,
    http_server: &str,
    batch_duration: Option<u64>,
    lifetime: Option<u64>,
    storage_duration: Option<u64>,
) -> Result<()> {
    Ca::new(
        ca_path,
        NewOpts {
            issuer_id: issuer_id.to_string(),
            http_server: http_server.to_string(),
            batch_duration,
            lifetime,
            storage_duration,
            start_time: None,
        },
    )?;
    Ok(())
}

/// `ca queue`: validates an assertion and appends it to the queue.
pub fn queue(
    ca_path: &Path,
    flags: &AssertionFlags,
    in_file: Option<&Path>,
    debug_repeat: u32,
    debug_vary: bool,
) -> Result<()> {
    let qa = super::assertion::from_flags(flags, in_file)?;
    let ca = Ca::open(ca_path)?;

    let mut items = Vec::with_capacity(debug_repeat as usize);
    for i in 0..debug_repeat {
        if debug_vary {
            items.push(vary_assertion(&qa, i));
        } else {
            items.push(qa.clone());
        }
    }
    ca.queue_multiple(items)?;
    Ok(())
}

/// Derives a slightly different assertion per repetition, for load testing.
fn vary_assertion(qa: &QueuedAssertion, i: u32) -> QueuedAssertion {
    let assertion = qa.assertion();
    let mut dns = assertion.claims().dns().to_vec();
    dns.push(format!("{i}.example.com"));
    let claims = Claims::new(
        dns,
        assertion.claims().dns_wildcard().to_vec(),
        assertion.claims().ens().to_vec(),
        assertion.claims().ipv4().to_vec(),
        assertion.claims().ipv6().to_vec(),
    );
    QueuedAssertion::new(Assertion::new(assertion.subject().clone(), claims), None)
}

/// `ca show-queue`: prints every queued assertion.
pub fn show_queue(ca_path: &Path) -> Result<()> {
    let ca = Ca::open(ca_path)?;
    let mut count = 0u64;
    ca.walk_queue(|qa| {
        count += 1;
        let mut table = Table::new();
        if let Some(checksum) = qa.checksum() {
            table.add("checksum", hex::encode(checksum));
        }
        let abridged = qa.assertion().abridge();
        write_abridged_rows(&mut table, &abridged);
        table.print();
        println!();
        Ok(())
    })?;
    println!("Total number of assertions in queue: {count}");
    Ok(())
}

/// `ca issue`: certifies and issues the queued assertions.
pub fn issue(ca_path: &Path) -> Result<()> {
    let ca = Ca::open(ca_path)?;
    ca.issue()?;
    Ok(())
}

/// `ca cert`: builds a certificate for a previously issued assertion.
pub fn cert(
    ca_path: &Path,
    flags: &AssertionFlags,
    in_file: Option<&Path>,
    out_file: Option<&Path>,
) -> Result<()> {
    let qa = super::assertion::from_flags(flags, in_file)?;
    let ca = Ca::open(ca_path)?;
    let certificate = ca.certificate_for(qa.assertion())?;
    let buf = certificate.to_bytes().context("encoding certificate")?;
    write_to_file_or_stdout(out_file, &buf)?;
    Ok(())
}

/// Adds the subject and claim rows shared by queue and inspect output.
pub(crate) fn write_abridged_rows(
    table: &mut Table,
    abridged: &mtca_core::assertion::AbridgedAssertion,
) {
    let subject = abridged.subject();
    table.add("subject_type", subject.type_name());
    match subject {
        AbridgedSubject::Tls(tls) => {
            table.add("signature_scheme", tls.scheme());
            table.add("public_key_hash", hex::encode(tls.public_key_hash()));
        },
        _ => {},
    }

    let claims = abridged.claims();
    if !claims.dns().is_empty() {
        table.add("dns", claim_list(claims.dns()));
    }
    if !claims.dns_wildcard().is_empty() {
        table.add("dns_wildcard", claim_list(claims.dns_wildcard()));
    }
    if !claims.ens().is_empty() {
        table.add("ens", claim_list(claims.ens()));
    }
    if !claims.ipv4().is_empty() {
        table.add("ip4", claim_list(claims.ipv4()));
    }
    if !claims.ipv6().is_empty() {
        table.add("ip6", claim_list(claims.ipv6()));
    }
}
