//! The append-only queue of assertions awaiting the next batch.
//!
//! The queue file is a concatenation of `{length, assertion bytes, checksum}`
//! records. Appends happen under the CA's exclusive lock and are fsynced;
//! readers take no lock and accept a torn record at the tail, which can only
//! be the remnant of an interrupted append.

use crate::assertion::{Assertion, CheckError};
use crate::codec::{CodecError, Decoder, Encoder};
use crate::crypto::{HASH_SIZE, Hash};

/// An assertion waiting in the queue, with its enqueue-time checksum.
///
/// The checksum is optional on the way in (batch scripts pass one to guard
/// against building a different assertion than intended); the queue file
/// always stores the computed key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedAssertion {
    assertion: Assertion,
    checksum: Option<Hash>,
}

impl QueuedAssertion {
    /// Wraps an assertion for enqueueing.
    #[must_use]
    pub const fn new(assertion: Assertion, checksum: Option<Hash>) -> Self {
        Self {
            assertion,
            checksum,
        }
    }

    /// The assertion.
    #[must_use]
    pub const fn assertion(&self) -> &Assertion {
        &self.assertion
    }

    /// The caller-supplied checksum, when present.
    #[must_use]
    pub const fn checksum(&self) -> Option<&Hash> {
        self.checksum.as_ref()
    }

    /// The assertion's computed key.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the assertion exceeds wire bounds.
    pub fn key(&self) -> Result<Hash, CodecError> {
        self.assertion.key()
    }

    /// Validates the assertion and, when a checksum was supplied, requires
    /// it to equal the computed key.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::ChecksumMismatch`] on checksum disagreement, or
    /// whatever [`Assertion::check`] reports.
    pub fn check(&self) -> Result<(), CheckError> {
        self.assertion.check()?;
        if let Some(expected) = &self.checksum {
            let key = self.key().map_err(|_| CheckError::ChecksumMismatch)?;
            if key != *expected {
                return Err(CheckError::ChecksumMismatch);
            }
        }
        Ok(())
    }
}

/// A raw record read back from the queue file.
#[derive(Debug, Clone)]
pub(crate) struct QueueRecord {
    /// Encoded assertion bytes, not yet validated.
    pub assertion: Vec<u8>,
    /// The key stored at enqueue time.
    pub checksum: Hash,
}

/// Encodes one queue record: length, assertion bytes, checksum.
pub(crate) fn encode_record(assertion: &[u8], checksum: &Hash) -> Result<Vec<u8>, CodecError> {
    let length = u32::try_from(assertion.len()).map_err(|_| CodecError::LengthOverflow {
        length: assertion.len(),
        max: u32::MAX as usize,
    })?;
    let mut enc = Encoder::with_capacity(4 + assertion.len() + HASH_SIZE);
    enc.u32(length);
    enc.bytes(assertion);
    enc.bytes(checksum);
    Ok(enc.into_bytes())
}

/// Parses every complete record in a queue file.
///
/// A truncated record at the tail is ignored; truncation anywhere else is
/// indistinguishable from it and is treated the same way.
pub(crate) fn read_records(bytes: &[u8]) -> Vec<QueueRecord> {
    let mut records = Vec::new();
    let mut dec = Decoder::new(bytes);
    loop {
        let Ok(length) = dec.u32() else { break };
        let Ok(assertion) = dec.take(length as usize) else {
            break;
        };
        let Ok(checksum) = dec.array::<HASH_SIZE>() else {
            break;
        };
        records.push(QueueRecord {
            assertion: assertion.to_vec(),
            checksum,
        });
    }
    records
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;

    use crate::assertion::{Claims, Subject, TlsSubject};
    use crate::crypto::SignatureScheme;

    use super::*;

    fn test_assertion(dns: &str) -> Assertion {
        let key = SigningKey::from_bytes(&[8u8; 32]);
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

    #[test]
    fn record_round_trip() {
        let a = test_assertion("a.example.com").to_bytes().unwrap();
        let b = test_assertion("b.example.com").to_bytes().unwrap();
        let mut file = encode_record(&a, &[1u8; 32]).unwrap();
        file.extend(encode_record(&b, &[2u8; 32]).unwrap());

        let records = read_records(&file);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].assertion, a);
        assert_eq!(records[0].checksum, [1u8; 32]);
        assert_eq!(records[1].assertion, b);
    }

    #[test]
    fn torn_tail_is_dropped() {
        let a = test_assertion("a.example.com").to_bytes().unwrap();
        let mut file = encode_record(&a, &[1u8; 32]).unwrap();
        let whole = encode_record(&a, &[2u8; 32]).unwrap();
        file.extend_from_slice(&whole[..whole.len() - 7]);

        let records = read_records(&file);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].checksum, [1u8; 32]);
    }

    #[test]
    fn checksum_gate() {
        let assertion = test_assertion("a.example.com");
        let key = assertion.key().unwrap();

        QueuedAssertion::new(assertion.clone(), Some(key))
            .check()
            .unwrap();
        QueuedAssertion::new(assertion.clone(), None).check().unwrap();

        let mut wrong = key;
        wrong[0] ^= 0xff;
        assert_eq!(
            QueuedAssertion::new(assertion, Some(wrong)).check(),
            Err(CheckError::ChecksumMismatch)
        );
    }
}
