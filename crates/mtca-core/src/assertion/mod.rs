//! Assertions: the bindings the CA certifies.
//!
//! An assertion binds a subject public key to a claim set. Before an
//! assertion enters the Merkle tree it is *abridged*: the subject's key is
//! replaced by its hash, which keeps batch artifacts small while letting a
//! relying party that holds the full assertion recompute everything. The
//! abridged assertion's key is the stable identity used for deduplication
//! and leaf ordering.

mod claims;
mod subject;

pub use claims::Claims;
pub use subject::{
    AbridgedSubject, AbridgedTlsSubject, SUBJECT_TYPE_TLS, Subject, TlsSubject,
};

use thiserror::Error;

use crate::codec::{CodecError, Decoder, Encoder};
use crate::crypto::{Hash, Hasher, SignatureScheme};

/// Domain separator for abridged assertion keys.
const ASSERTION_KEY_LABEL: &[u8] = b"mtc/assertion-key";

/// Validation errors for assertions and queue records.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CheckError {
    /// The assertion carries no claims at all.
    #[error("assertion carries no claims")]
    EmptyClaims,

    /// A DNS, wildcard, or ENS name is malformed.
    #[error("bad label in {name:?}: {reason}")]
    BadLabel {
        /// The offending name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// An IP address does not parse under its family.
    #[error("bad address: {value:?}")]
    BadAddress {
        /// The offending input.
        value: String,
    },

    /// The subject declares a scheme this registry does not know.
    #[error("unknown signature scheme: {0}")]
    UnknownScheme(SignatureScheme),

    /// The subject's key does not parse under its declared scheme.
    #[error("public key does not parse under {scheme}")]
    SchemeKeyMismatch {
        /// The declared scheme.
        scheme: SignatureScheme,
    },

    /// A queued assertion's computed key differs from the stated checksum.
    #[error("assertion key does not match checksum")]
    ChecksumMismatch,
}

/// A subject bound to a set of claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    subject: Subject,
    claims: Claims,
}

impl Assertion {
    /// Creates an assertion.
    #[must_use]
    pub const fn new(subject: Subject, claims: Claims) -> Self {
        Self { subject, claims }
    }

    /// The assertion's subject.
    #[must_use]
    pub const fn subject(&self) -> &Subject {
        &self.subject
    }

    /// The assertion's claims.
    #[must_use]
    pub const fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Produces the abridged form placed in the Merkle tree.
    #[must_use]
    pub fn abridge(&self) -> AbridgedAssertion {
        AbridgedAssertion {
            subject: self.subject.abridge(),
            claims: self.claims.clone(),
        }
    }

    /// Validates the assertion: claims well-formed and non-empty, subject
    /// key parses under its declared scheme.
    ///
    /// # Errors
    ///
    /// Returns the first [`CheckError`] encountered.
    pub fn check(&self) -> Result<(), CheckError> {
        self.claims.check()?;
        self.subject.check()
    }

    /// Computes the abridged assertion's key.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when a claim entry exceeds its wire bounds.
    pub fn key(&self) -> Result<Hash, CodecError> {
        self.abridge().key()
    }

    pub(crate) fn encode(&self, enc: &mut Encoder) -> Result<(), CodecError> {
        self.subject.encode(enc)?;
        enc.length_prefixed::<2>(|e| self.claims.encode(e))
    }

    pub(crate) fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let subject = Subject::decode(dec)?;
        let mut body = dec.nested_vec::<2>()?;
        let claims = Claims::decode(&mut body)?;
        body.finish()?;
        Ok(Self { subject, claims })
    }

    /// Encodes to canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when a claim entry exceeds its wire bounds.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut enc = Encoder::new();
        self.encode(&mut enc)?;
        Ok(enc.into_bytes())
    }

    /// Decodes from canonical bytes, rejecting trailing input.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] for malformed or non-canonical input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(bytes);
        let assertion = Self::decode(&mut dec)?;
        dec.finish()?;
        Ok(assertion)
    }
}

/// An assertion whose subject key has been replaced by its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbridgedAssertion {
    subject: AbridgedSubject,
    claims: Claims,
}

impl AbridgedAssertion {
    /// The abridged subject.
    #[must_use]
    pub const fn subject(&self) -> &AbridgedSubject {
        &self.subject
    }

    /// The claims.
    #[must_use]
    pub const fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Computes the assertion key: the domain-separated hash of the
    /// canonical encoding, used for deduplication and leaf ordering.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when a claim entry exceeds its wire bounds.
    pub fn key(&self) -> Result<Hash, CodecError> {
        let mut hasher = Hasher::new();
        hasher.update(ASSERTION_KEY_LABEL);
        hasher.update(&self.to_bytes()?);
        Ok(hasher.finalize())
    }

    pub(crate) fn encode(&self, enc: &mut Encoder) -> Result<(), CodecError> {
        self.subject.encode(enc)?;
        enc.length_prefixed::<2>(|e| self.claims.encode(e))
    }

    pub(crate) fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let subject = AbridgedSubject::decode(dec)?;
        let mut body = dec.nested_vec::<2>()?;
        let claims = Claims::decode(&mut body)?;
        body.finish()?;
        Ok(Self { subject, claims })
    }

    /// Encodes to canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when a claim entry exceeds its wire bounds.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut enc = Encoder::new();
        self.encode(&mut enc)?;
        Ok(enc.into_bytes())
    }

    /// Decodes from canonical bytes, rejecting trailing input.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] for malformed or non-canonical input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(bytes);
        let assertion = Self::decode(&mut dec)?;
        dec.finish()?;
        Ok(assertion)
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;

    use super::*;

    fn test_assertion(dns: &str) -> Assertion {
        let key = SigningKey::from_bytes(&[5u8; 32]);
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
    fn assertion_round_trip() {
        let assertion = test_assertion("example.com");
        let bytes = assertion.to_bytes().unwrap();
        assert_eq!(Assertion::from_bytes(&bytes).unwrap(), assertion);
        // Canonical bytes re-encode to themselves.
        assert_eq!(
            Assertion::from_bytes(&bytes).unwrap().to_bytes().unwrap(),
            bytes
        );
    }

    #[test]
    fn abridged_round_trip() {
        let abridged = test_assertion("example.com").abridge();
        let bytes = abridged.to_bytes().unwrap();
        assert_eq!(AbridgedAssertion::from_bytes(&bytes).unwrap(), abridged);
    }

    #[test]
    fn from_bytes_rejects_trailing_garbage() {
        let mut bytes = test_assertion("example.com").to_bytes().unwrap();
        bytes.push(0);
        assert!(matches!(
            Assertion::from_bytes(&bytes),
            Err(CodecError::TrailingGarbage { .. })
        ));
    }

    #[test]
    fn key_is_stable_and_distinguishes_claims() {
        let a = test_assertion("example.com");
        let b = test_assertion("example.org");
        assert_eq!(a.key().unwrap(), a.key().unwrap());
        assert_ne!(a.key().unwrap(), b.key().unwrap());
        // Key is computed over the abridged form.
        assert_eq!(a.key().unwrap(), a.abridge().key().unwrap());
    }

    #[test]
    fn check_accepts_valid_assertion() {
        test_assertion("example.com").check().unwrap();
    }
}
