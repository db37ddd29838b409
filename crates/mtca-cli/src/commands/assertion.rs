//! Building assertions from command-line flags.

use std::path::Path;

use anyhow::{Context, Result, bail};
use mtca_core::assertion::{Assertion, Claims, Subject, TlsSubject};
use mtca_core::ca::QueuedAssertion;
use mtca_core::crypto::{
    HASH_SIZE, Hash, SignatureScheme, subject_key_from_der, subject_key_from_pem,
};

use crate::AssertionFlags;

use super::write_to_file_or_stdout;

/// Builds a queued assertion from flags, or from `--in-file`, and validates
/// it.
pub(crate) fn from_flags(
    flags: &AssertionFlags,
    in_file: Option<&Path>,
) -> Result<QueuedAssertion> {
    let checksum = parse_checksum(flags.checksum.as_deref())?;

    let assertion = match in_file {
        Some(path) => {
            reject_flags_with_in_file(flags)?;
            let buf = std::fs::read(path)
                .with_context(|| format!("reading assertion {}", path.display()))?;
            Assertion::from_bytes(&buf)
                .with_context(|| format!("parsing assertion {}", path.display()))?
        },
        None => assertion_from_flags(flags)?,
    };

    let qa = QueuedAssertion::new(assertion, checksum);
    qa.check()?;
    Ok(qa)
}

fn parse_checksum(checksum: Option<&str>) -> Result<Option<Hash>> {
    let Some(hex_str) = checksum else {
        return Ok(None);
    };
    let bytes = hex::decode(hex_str).context("parsing checksum")?;
    let hash: Hash = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("checksum must be {HASH_SIZE} bytes"))?;
    Ok(Some(hash))
}

fn reject_flags_with_in_file(flags: &AssertionFlags) -> Result<()> {
    let conflicting = [
        ("dns", !flags.dns.is_empty()),
        ("dns-wildcard", !flags.dns_wildcard.is_empty()),
        ("ens", !flags.ens.is_empty()),
        ("ip4", !flags.ip4.is_empty()),
        ("ip6", !flags.ip6.is_empty()),
        ("tls-pem", flags.tls_pem.is_some()),
        ("tls-der", flags.tls_der.is_some()),
    ];
    for (name, set) in conflicting {
        if set {
            bail!("can't specify --in-file and --{name} together");
        }
    }
    Ok(())
}

fn assertion_from_flags(flags: &AssertionFlags) -> Result<Assertion> {
    let claims = Claims::from_strings(
        flags.dns.clone(),
        flags.dns_wildcard.clone(),
        flags.ens.clone(),
        &flags.ip4,
        &flags.ip6,
    )?;

    let scheme = flags
        .tls_scheme
        .as_deref()
        .map(SignatureScheme::from_name)
        .transpose()?;

    let (scheme, public_key) = match (&flags.tls_pem, &flags.tls_der) {
        (Some(path), None) => {
            let buf = std::fs::read_to_string(path)
                .with_context(|| format!("reading subject {}", path.display()))?;
            subject_key_from_pem(&buf, scheme)
                .with_context(|| format!("parsing subject {}", path.display()))?
        },
        (None, Some(path)) => {
            let buf = std::fs::read(path)
                .with_context(|| format!("reading subject {}", path.display()))?;
            subject_key_from_der(&buf, scheme)
                .with_context(|| format!("parsing subject {}", path.display()))?
        },
        _ => bail!("expect either the tls-pem or the tls-der flag"),
    };

    let subject = TlsSubject::new(scheme, public_key).context("creating subject")?;
    Ok(Assertion::new(Subject::Tls(subject), claims))
}

/// `new-assertion`: builds an assertion, writes it out, and reports its
/// checksum on stderr.
pub fn new_assertion(flags: &AssertionFlags, out_file: Option<&Path>) -> Result<()> {
    let qa = from_flags(flags, None)?;
    let buf = qa.assertion().to_bytes()?;
    write_to_file_or_stdout(out_file, &buf)?;
    eprintln!("checksum: {}", hex::encode(qa.key()?));
    Ok(())
}
