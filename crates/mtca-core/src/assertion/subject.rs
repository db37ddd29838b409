//! Assertion subjects.
//!
//! A subject binds the claims to key material. Subjects are a tagged union
//! on the wire; the TLS variant carries a signature scheme plus the raw
//! public key, and its abridged form replaces the key with its hash.

use crate::codec::{CodecError, Decoder, Encoder};
use crate::crypto::{HASH_SIZE, Hash, SchemeError, SignatureScheme, hash_bytes};

use super::CheckError;

/// Wire tag for TLS subjects.
pub const SUBJECT_TYPE_TLS: u16 = 0x0001;

/// A subject with full key material.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Subject {
    /// A TLS subject: signature scheme plus public key.
    Tls(TlsSubject),
}

impl Subject {
    /// The subject's wire tag.
    #[must_use]
    pub const fn subject_type(&self) -> u16 {
        match self {
            Self::Tls(_) => SUBJECT_TYPE_TLS,
        }
    }

    /// Human-readable subject type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Tls(_) => "tls",
        }
    }

    /// Produces the abridged form placed in the Merkle tree.
    #[must_use]
    pub fn abridge(&self) -> AbridgedSubject {
        match self {
            Self::Tls(subject) => AbridgedSubject::Tls(subject.abridge()),
        }
    }

    /// Validates the subject's key under its declared scheme.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::UnknownScheme`] or
    /// [`CheckError::SchemeKeyMismatch`].
    pub fn check(&self) -> Result<(), CheckError> {
        match self {
            Self::Tls(subject) => subject.check(),
        }
    }

    pub(crate) fn encode(&self, enc: &mut Encoder) -> Result<(), CodecError> {
        enc.u16(self.subject_type());
        enc.length_prefixed::<2>(|e| match self {
            Self::Tls(subject) => {
                e.u16(subject.scheme.wire_value());
                e.vec::<2>(&subject.public_key)
            },
        })
    }

    pub(crate) fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let tag = dec.u16()?;
        let mut body = dec.nested_vec::<2>()?;
        let subject = match tag {
            SUBJECT_TYPE_TLS => {
                let scheme = SignatureScheme::from_wire(body.u16()?);
                let public_key = body.vec::<2>()?.to_vec();
                Self::Tls(TlsSubject { scheme, public_key })
            },
            _ => return Err(CodecError::UnknownTag { tag }),
        };
        body.finish()?;
        Ok(subject)
    }
}

/// A TLS subject: the key a relying party will verify handshakes under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSubject {
    scheme: SignatureScheme,
    public_key: Vec<u8>,
}

impl TlsSubject {
    /// Creates a TLS subject, checking the key parses under `scheme`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::KeyMismatch`] or [`SchemeError::Unknown`].
    pub fn new(scheme: SignatureScheme, public_key: Vec<u8>) -> Result<Self, SchemeError> {
        scheme.check_public_key(&public_key)?;
        Ok(Self { scheme, public_key })
    }

    /// The declared signature scheme.
    #[must_use]
    pub const fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// The raw public key bytes.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Produces the abridged form: same scheme, key replaced by its hash.
    #[must_use]
    pub fn abridge(&self) -> AbridgedTlsSubject {
        AbridgedTlsSubject {
            scheme: self.scheme,
            public_key_hash: hash_bytes(&self.public_key),
        }
    }

    fn check(&self) -> Result<(), CheckError> {
        self.scheme
            .check_public_key(&self.public_key)
            .map_err(|err| match err {
                SchemeError::Unknown(_) | SchemeError::NoMatchingScheme => {
                    CheckError::UnknownScheme(self.scheme)
                },
                SchemeError::KeyMismatch { scheme } => CheckError::SchemeKeyMismatch { scheme },
            })
    }
}

/// A subject with the key material replaced by its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AbridgedSubject {
    /// Abridged TLS subject.
    Tls(AbridgedTlsSubject),
}

impl AbridgedSubject {
    /// The subject's wire tag (shared with the full form).
    #[must_use]
    pub const fn subject_type(&self) -> u16 {
        match self {
            Self::Tls(_) => SUBJECT_TYPE_TLS,
        }
    }

    /// Human-readable subject type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Tls(_) => "tls",
        }
    }

    /// Abridging an already-abridged subject is the identity.
    #[must_use]
    pub fn abridge(&self) -> Self {
        self.clone()
    }

    pub(crate) fn encode(&self, enc: &mut Encoder) -> Result<(), CodecError> {
        enc.u16(self.subject_type());
        enc.length_prefixed::<2>(|e| match self {
            Self::Tls(subject) => {
                e.u16(subject.scheme.wire_value());
                e.bytes(&subject.public_key_hash);
                Ok(())
            },
        })
    }

    pub(crate) fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let tag = dec.u16()?;
        let mut body = dec.nested_vec::<2>()?;
        let subject = match tag {
            SUBJECT_TYPE_TLS => {
                let scheme = SignatureScheme::from_wire(body.u16()?);
                let public_key_hash: Hash = body.array::<HASH_SIZE>()?;
                Self::Tls(AbridgedTlsSubject {
                    scheme,
                    public_key_hash,
                })
            },
            _ => return Err(CodecError::UnknownTag { tag }),
        };
        body.finish()?;
        Ok(subject)
    }
}

/// An abridged TLS subject: scheme plus key hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbridgedTlsSubject {
    scheme: SignatureScheme,
    public_key_hash: Hash,
}

impl AbridgedTlsSubject {
    /// The declared signature scheme.
    #[must_use]
    pub const fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// Hash of the subject's public key.
    #[must_use]
    pub const fn public_key_hash(&self) -> &Hash {
        &self.public_key_hash
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;

    use super::*;

    fn test_subject() -> Subject {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        Subject::Tls(
            TlsSubject::new(
                SignatureScheme::ED25519,
                key.verifying_key().to_bytes().to_vec(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn constructor_rejects_mismatched_key() {
        assert!(TlsSubject::new(SignatureScheme::ED25519, vec![0u8; 7]).is_err());
    }

    #[test]
    fn subject_round_trip() {
        let subject = test_subject();
        let mut enc = Encoder::new();
        subject.encode(&mut enc).unwrap();
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes);
        let decoded = Subject::decode(&mut dec).unwrap();
        dec.finish().unwrap();
        assert_eq!(decoded, subject);
    }

    #[test]
    fn abridged_round_trip() {
        let abridged = test_subject().abridge();
        let mut enc = Encoder::new();
        abridged.encode(&mut enc).unwrap();
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes);
        let decoded = AbridgedSubject::decode(&mut dec).unwrap();
        dec.finish().unwrap();
        assert_eq!(decoded, abridged);
    }

    #[test]
    fn unknown_subject_tag_rejected() {
        let mut enc = Encoder::new();
        enc.u16(0x7fff);
        enc.vec::<2>(&[]).unwrap();
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes);
        assert_eq!(
            Subject::decode(&mut dec).unwrap_err(),
            CodecError::UnknownTag { tag: 0x7fff }
        );
    }

    #[test]
    fn abridge_is_idempotent() {
        let abridged = test_subject().abridge();
        assert_eq!(abridged.abridge(), abridged);
    }

    #[test]
    fn abridged_hash_matches_key() {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let raw = key.verifying_key().to_bytes();
        let Subject::Tls(subject) = test_subject();
        let abridged = subject.abridge();
        assert_eq!(*abridged.public_key_hash(), hash_bytes(&raw));
    }

    #[test]
    fn unknown_scheme_decodes_but_fails_check() {
        let mut enc = Encoder::new();
        enc.u16(SUBJECT_TYPE_TLS);
        enc.length_prefixed::<2>(|e| {
            e.u16(0x0403);
            e.vec::<2>(&[0u8; 32])
        })
        .unwrap();
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes);
        let subject = Subject::decode(&mut dec).unwrap();
        assert!(matches!(
            subject.check(),
            Err(CheckError::UnknownScheme(_))
        ));
    }
}
