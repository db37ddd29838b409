//! Cryptographic primitives for the CA.
//!
//! This module provides the hash and signature layer under the batch
//! machinery:
//!
//! - **SHA-256 hashing**: assertion keys, Merkle nodes, parameter digests
//! - **Ed25519 signatures**: validity-window signing and verification
//! - **Signature scheme registry**: TLS codepoints for subject keys
//! - **Key management**: on-disk signing key with restrictive permissions
//!
//! Subject public keys are opaque to the batch machinery; the registry only
//! checks that a key parses under its declared scheme. The CA's own signing
//! key is Ed25519, held in memory inside zeroizing containers.

mod hash;
mod keys;
mod scheme;

pub use hash::{HASH_SIZE, Hash, Hasher, ZERO_HASH, hash_bytes};
pub use keys::{
    KeyError, SignatureError, generate_signing_key, read_signing_key, sign_message,
    verify_signature, write_signing_key,
};
pub use scheme::{SchemeError, SignatureScheme, subject_key_from_der, subject_key_from_pem};
