//! TLS signature scheme registry for subject keys.
//!
//! Subjects declare the scheme their public key is to be used with, tagged
//! by the TLS `SignatureScheme` codepoint. The codepoint is carried opaquely
//! on the wire, so assertions with unregistered schemes still decode and can
//! be inspected; they fail validation instead. Ed25519 is the one fully
//! wired scheme, and new schemes are added by extending the registry tables.

use std::fmt;

use ed25519_dalek::VerifyingKey;
use ed25519_dalek::pkcs8::DecodePublicKey;
use thiserror::Error;

/// Errors from scheme lookup and key/scheme agreement checks.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchemeError {
    /// A scheme name or codepoint this registry does not know.
    #[error("unknown signature scheme: {0}")]
    Unknown(String),

    /// The public key bytes do not parse under the declared scheme.
    #[error("public key does not parse under {scheme}")]
    KeyMismatch {
        /// The declared scheme.
        scheme: SignatureScheme,
    },

    /// The SPKI structure parsed, but no registered scheme accepts the key.
    #[error("no registered signature scheme for that public key")]
    NoMatchingScheme,
}

/// A TLS `SignatureScheme` codepoint.
///
/// Unregistered codepoints are representable so that decoded artifacts can
/// be inspected; [`SignatureScheme::check_public_key`] rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureScheme(u16);

impl SignatureScheme {
    /// Ed25519 (TLS codepoint `0x0807`).
    pub const ED25519: Self = Self(0x0807);

    /// Wraps a wire codepoint. Never fails; unregistered codepoints fail
    /// validation later.
    #[must_use]
    pub const fn from_wire(value: u16) -> Self {
        Self(value)
    }

    /// The TLS codepoint carried on the wire.
    #[must_use]
    pub const fn wire_value(self) -> u16 {
        self.0
    }

    /// Whether this registry can validate keys of this scheme.
    #[must_use]
    pub const fn is_registered(self) -> bool {
        matches!(self, Self::ED25519)
    }

    /// Looks a scheme up by its lowercase name, as used on the command line.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::Unknown`] for unregistered names.
    pub fn from_name(name: &str) -> Result<Self, SchemeError> {
        match name {
            "ed25519" => Ok(Self::ED25519),
            _ => Err(SchemeError::Unknown(name.to_string())),
        }
    }

    /// Checks that `key` parses as a public key of this scheme.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::Unknown`] for unregistered schemes and
    /// [`SchemeError::KeyMismatch`] when the key bytes do not parse.
    pub fn check_public_key(self, key: &[u8]) -> Result<(), SchemeError> {
        match self {
            Self::ED25519 => {
                let bytes: [u8; 32] = key
                    .try_into()
                    .map_err(|_| SchemeError::KeyMismatch { scheme: self })?;
                VerifyingKey::from_bytes(&bytes)
                    .map(|_| ())
                    .map_err(|_| SchemeError::KeyMismatch { scheme: self })
            },
            _ => Err(SchemeError::Unknown(self.to_string())),
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ED25519 => f.write_str("ed25519"),
            Self(value) => write!(f, "unknown({value:#06x})"),
        }
    }
}

/// Parses a DER-encoded SubjectPublicKeyInfo into the scheme that admits it
/// plus the raw public key bytes.
///
/// When `scheme` is given it overrides inference; otherwise the key must be
/// admitted by exactly one registered scheme.
///
/// # Errors
///
/// Returns [`SchemeError::NoMatchingScheme`] when no registered scheme
/// accepts the key, or [`SchemeError::KeyMismatch`] when an explicit scheme
/// rejects it.
pub fn subject_key_from_der(
    der: &[u8],
    scheme: Option<SignatureScheme>,
) -> Result<(SignatureScheme, Vec<u8>), SchemeError> {
    let parsed = VerifyingKey::from_public_key_der(der)
        .map(|vk| (SignatureScheme::ED25519, vk.to_bytes().to_vec()));
    resolve_subject_key(parsed, scheme)
}

/// PEM variant of [`subject_key_from_der`].
///
/// # Errors
///
/// Same as [`subject_key_from_der`].
pub fn subject_key_from_pem(
    pem: &str,
    scheme: Option<SignatureScheme>,
) -> Result<(SignatureScheme, Vec<u8>), SchemeError> {
    let parsed = VerifyingKey::from_public_key_pem(pem)
        .map(|vk| (SignatureScheme::ED25519, vk.to_bytes().to_vec()));
    resolve_subject_key(parsed, scheme)
}

fn resolve_subject_key(
    parsed: Result<(SignatureScheme, Vec<u8>), ed25519_dalek::pkcs8::spki::Error>,
    requested: Option<SignatureScheme>,
) -> Result<(SignatureScheme, Vec<u8>), SchemeError> {
    match (parsed, requested) {
        (Ok((inferred, key)), None) => Ok((inferred, key)),
        (Ok((inferred, key)), Some(scheme)) if scheme == inferred => Ok((scheme, key)),
        (Ok(_) | Err(_), Some(scheme)) => Err(SchemeError::KeyMismatch { scheme }),
        (Err(_), None) => Err(SchemeError::NoMatchingScheme),
    }
}
