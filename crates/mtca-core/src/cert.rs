//! Certificates: an assertion plus a self-contained inclusion proof.
//!
//! The proof carries its trust anchor by value, so a certificate can be
//! checked against any parameter set that matches the anchor's issuer. Only
//! the Merkle-tree proof kind is defined; the union leaves room for others.

use thiserror::Error;

use crate::assertion::Assertion;
use crate::codec::{CodecError, Decoder, Encoder};
use crate::params::CAParams;
use crate::tree::{TreeError, compute_root};
use crate::window::{SignedValidityWindow, WindowError};

/// Wire tag (and `CAParams.proof_type`) for SHA-256 Merkle tree proofs.
pub const PROOF_TYPE_MERKLE_TREE_SHA256: u16 = 0x0001;

/// Errors verifying a certificate against a signed validity window.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerifyError {
    /// The authentication path is structurally unusable.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// The window signature does not verify under the CA public key.
    #[error("window signature verification failed")]
    BadSignature,

    /// The proof names a different issuer than the parameters.
    #[error("issuer mismatch: certificate names {anchor:?}, parameters name {params:?}")]
    IssuerMismatch {
        /// Issuer id in the trust anchor.
        anchor: String,
        /// Issuer id in the CA parameters.
        params: String,
    },

    /// The batch has aged out of the validity window.
    #[error("batch {batch} predates the validity window")]
    WindowStale {
        /// The stale batch number.
        batch: u32,
    },

    /// The batch is not covered by the validity window.
    #[error("batch {batch} is not covered by the validity window")]
    UnknownBatch {
        /// The uncovered batch number.
        batch: u32,
    },

    /// The recomputed root differs from the window's tree head.
    #[error("recomputed root does not match the validity window")]
    RootMismatch,

    /// The assertion could not be encoded for hashing.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Identifies the tree head a proof refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    issuer_id: String,
    batch_number: u32,
}

impl TrustAnchor {
    /// Creates a trust anchor.
    #[must_use]
    pub const fn new(issuer_id: String, batch_number: u32) -> Self {
        Self {
            issuer_id,
            batch_number,
        }
    }

    /// The issuing CA's id.
    #[must_use]
    pub fn issuer_id(&self) -> &str {
        &self.issuer_id
    }

    /// The batch whose tree contains the assertion.
    #[must_use]
    pub const fn batch_number(&self) -> u32 {
        self.batch_number
    }
}

/// An inclusion proof; a tagged union keyed by proof type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Proof {
    /// SHA-256 Merkle inclusion proof.
    MerkleTree(MerkleTreeProof),
}

impl Proof {
    /// The proof's wire tag.
    #[must_use]
    pub const fn proof_type(&self) -> u16 {
        match self {
            Self::MerkleTree(_) => PROOF_TYPE_MERKLE_TREE_SHA256,
        }
    }

    /// The proof's trust anchor.
    #[must_use]
    pub const fn trust_anchor(&self) -> &TrustAnchor {
        match self {
            Self::MerkleTree(proof) => &proof.anchor,
        }
    }

    fn encode(&self, enc: &mut Encoder) -> Result<(), CodecError> {
        enc.u16(self.proof_type());
        enc.length_prefixed::<2>(|e| match self {
            Self::MerkleTree(proof) => {
                e.vec::<1>(proof.anchor.issuer_id.as_bytes())?;
                e.u32(proof.anchor.batch_number);
                e.u64(proof.index);
                e.vec::<2>(&proof.path)
            },
        })
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let tag = dec.u16()?;
        let mut body = dec.nested_vec::<2>()?;
        let proof = match tag {
            PROOF_TYPE_MERKLE_TREE_SHA256 => {
                let issuer_bytes = body.vec::<1>()?;
                let issuer_id = std::str::from_utf8(issuer_bytes)
                    .map_err(|_| body.non_canonical("issuer id is not valid UTF-8"))?
                    .to_string();
                let batch_number = body.u32()?;
                let index = body.u64()?;
                let path = body.vec::<2>()?.to_vec();
                if path.len() % 32 != 0 {
                    return Err(body.non_canonical("path is not a whole number of hashes"));
                }
                Self::MerkleTree(MerkleTreeProof {
                    anchor: TrustAnchor::new(issuer_id, batch_number),
                    index,
                    path,
                })
            },
            _ => return Err(CodecError::UnknownTag { tag }),
        };
        body.finish()?;
        Ok(proof)
    }
}

/// A Merkle inclusion proof: leaf index plus authentication path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTreeProof {
    anchor: TrustAnchor,
    index: u64,
    path: Vec<u8>,
}

impl MerkleTreeProof {
    /// Creates a Merkle proof.
    #[must_use]
    pub const fn new(anchor: TrustAnchor, index: u64, path: Vec<u8>) -> Self {
        Self {
            anchor,
            index,
            path,
        }
    }

    /// The proof's trust anchor.
    #[must_use]
    pub const fn anchor(&self) -> &TrustAnchor {
        &self.anchor
    }

    /// The leaf index of the assertion in its batch.
    #[must_use]
    pub const fn index(&self) -> u64 {
        self.index
    }

    /// The concatenated sibling hashes, leaf level first.
    #[must_use]
    pub fn path(&self) -> &[u8] {
        &self.path
    }
}

/// A self-contained certificate: assertion plus proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    assertion: Assertion,
    proof: Proof,
}

impl Certificate {
    /// Creates a certificate.
    #[must_use]
    pub const fn new(assertion: Assertion, proof: Proof) -> Self {
        Self { assertion, proof }
    }

    /// The certified assertion.
    #[must_use]
    pub const fn assertion(&self) -> &Assertion {
        &self.assertion
    }

    /// The inclusion proof.
    #[must_use]
    pub const fn proof(&self) -> &Proof {
        &self.proof
    }

    /// Verifies the certificate against CA parameters and a signed validity
    /// window.
    ///
    /// Checks, in order: the window signature, the anchor's issuer, window
    /// coverage of the anchored batch, and root equality.
    ///
    /// # Errors
    ///
    /// Returns the [`VerifyError`] for the first failed step.
    pub fn verify(
        &self,
        params: &CAParams,
        signed_window: &SignedValidityWindow,
    ) -> Result<(), VerifyError> {
        signed_window.verify(params).map_err(|err| match err {
            WindowError::BadSignature => VerifyError::BadSignature,
            WindowError::Codec(codec) => VerifyError::Codec(codec),
        })?;

        let Proof::MerkleTree(proof) = &self.proof;
        if proof.anchor.issuer_id() != params.issuer_id() {
            return Err(VerifyError::IssuerMismatch {
                anchor: proof.anchor.issuer_id().to_string(),
                params: params.issuer_id().to_string(),
            });
        }

        let window = signed_window.window();
        let batch = proof.anchor.batch_number();
        let Some(head) = window.head_for_batch(batch) else {
            if batch < window.batch_number() {
                return Err(VerifyError::WindowStale { batch });
            }
            return Err(VerifyError::UnknownBatch { batch });
        };

        let leaf = self.assertion.abridge().to_bytes()?;
        let root = compute_root(batch, proof.index(), proof.path(), &leaf)?;
        if root != *head {
            return Err(VerifyError::RootMismatch);
        }
        Ok(())
    }

    /// Encodes to canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when a field exceeds its wire bounds.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut enc = Encoder::new();
        self.assertion.encode(&mut enc)?;
        self.proof.encode(&mut enc)?;
        Ok(enc.into_bytes())
    }

    /// Decodes from canonical bytes, rejecting trailing input.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] for malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(bytes);
        let assertion = Assertion::decode(&mut dec)?;
        let proof = Proof::decode(&mut dec)?;
        dec.finish()?;
        Ok(Self { assertion, proof })
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;

    use crate::assertion::{Claims, Subject, TlsSubject};
    use crate::crypto::SignatureScheme;

    use super::*;

    fn test_assertion() -> Assertion {
        let key = SigningKey::from_bytes(&[2u8; 32]);
        let subject = Subject::Tls(
            TlsSubject::new(
                SignatureScheme::ED25519,
                key.verifying_key().to_bytes().to_vec(),
            )
            .unwrap(),
        );
        let claims = Claims::new(
            vec!["example.com".to_string()],
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        Assertion::new(subject, claims)
    }

    fn test_certificate() -> Certificate {
        let anchor = TrustAnchor::new("acme".to_string(), 4);
        let proof = Proof::MerkleTree(MerkleTreeProof::new(anchor, 2, vec![0xaa; 96]));
        Certificate::new(test_assertion(), proof)
    }

    #[test]
    fn round_trip() {
        let cert = test_certificate();
        let bytes = cert.to_bytes().unwrap();
        assert_eq!(Certificate::from_bytes(&bytes).unwrap(), cert);
    }

    #[test]
    fn unknown_proof_tag_rejected() {
        let mut enc = Encoder::new();
        test_assertion().encode(&mut enc).unwrap();
        enc.u16(0x7f00);
        enc.vec::<2>(&[]).unwrap();
        let bytes = enc.into_bytes();
        assert_eq!(
            Certificate::from_bytes(&bytes).unwrap_err(),
            CodecError::UnknownTag { tag: 0x7f00 }
        );
    }

    #[test]
    fn ragged_path_rejected_at_decode() {
        let anchor = TrustAnchor::new("acme".to_string(), 0);
        let proof = Proof::MerkleTree(MerkleTreeProof::new(anchor, 0, vec![0xaa; 33]));
        let cert = Certificate::new(test_assertion(), proof);
        let bytes = cert.to_bytes().unwrap();
        assert!(matches!(
            Certificate::from_bytes(&bytes),
            Err(CodecError::NonCanonical { .. })
        ));
    }
}
