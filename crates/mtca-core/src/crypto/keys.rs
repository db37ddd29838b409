//! CA signing key storage and use.
//!
//! The signing key lives in a single file under the CA root, holding the raw
//! 32-byte Ed25519 seed with 0600 permissions. Key material passes through
//! [`Zeroizing`] buffers so seeds are wiped when handles are dropped.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::Zeroizing;

/// Errors that can occur during key file operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeyError {
    /// I/O error reading or writing a key file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A key file did not hold a valid Ed25519 seed.
    #[error("invalid key format in {path}")]
    InvalidKeyFormat {
        /// The offending file.
        path: String,
    },

    /// A key file is readable by other users.
    #[error("insecure permissions on key file: {path}")]
    InsecurePermissions {
        /// The offending file.
        path: String,
    },
}

/// Errors from signing and signature verification.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SignatureError {
    /// The signature does not verify under the given public key.
    #[error("signature verification failed")]
    BadSignature,

    /// The signing operation could not be performed.
    #[error("signing failed: {0}")]
    SigningFailed(String),
}

/// Generates a fresh Ed25519 signing key from the OS RNG.
#[must_use]
pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Writes the signing key seed to `path` with 0600 permissions.
///
/// # Errors
///
/// Returns [`KeyError::Io`] on filesystem failures.
pub fn write_signing_key(path: &Path, key: &SigningKey) -> Result<(), KeyError> {
    let seed = Zeroizing::new(key.to_bytes());
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(seed.as_ref())?;
    file.sync_all()?;
    Ok(())
}

/// Reads the signing key seed from `path`.
///
/// The file must be exactly 32 bytes and must not be accessible to group or
/// other users.
///
/// # Errors
///
/// Returns [`KeyError::InsecurePermissions`] when the file mode admits other
/// users, or [`KeyError::InvalidKeyFormat`] when the contents are not a
/// 32-byte seed.
pub fn read_signing_key(path: &Path) -> Result<SigningKey, KeyError> {
    let mut file = OpenOptions::new().read(true).open(path)?;

    let mode = file.metadata()?.permissions().mode();
    if mode & 0o077 != 0 {
        return Err(KeyError::InsecurePermissions {
            path: path.display().to_string(),
        });
    }

    let mut seed = Zeroizing::new([0u8; 32]);
    let n = file.read(seed.as_mut())?;
    let mut overflow = [0u8; 1];
    if n != 32 || file.read(&mut overflow)? != 0 {
        return Err(KeyError::InvalidKeyFormat {
            path: path.display().to_string(),
        });
    }

    Ok(SigningKey::from_bytes(&seed))
}

/// Signs `message` with the CA key, returning the raw signature bytes.
#[must_use]
pub fn sign_message(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    key.sign(message).to_bytes().to_vec()
}

/// Verifies `signature` over `message` under a raw Ed25519 public key.
///
/// # Errors
///
/// Returns [`SignatureError::BadSignature`] when the key or signature bytes
/// are malformed, or the signature does not verify.
pub fn verify_signature(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let key_bytes: [u8; 32] = public_key
        .try_into()
        .map_err(|_| SignatureError::BadSignature)?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| SignatureError::BadSignature)?;
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| SignatureError::BadSignature)?;
    let sig = Signature::from_bytes(&sig_bytes);
    key.verify(message, &sig)
        .map_err(|_| SignatureError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing-key");

        let key = generate_signing_key();
        write_signing_key(&path, &key).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let loaded = read_signing_key(&path).unwrap();
        assert_eq!(loaded.to_bytes(), key.to_bytes());
    }

    #[test]
    fn rejects_world_readable_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing-key");
        let key = generate_signing_key();
        write_signing_key(&path, &key).unwrap();

        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o644);
        std::fs::set_permissions(&path, perms).unwrap();

        assert!(matches!(
            read_signing_key(&path),
            Err(KeyError::InsecurePermissions { .. })
        ));
    }

    #[test]
    fn rejects_short_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing-key");
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
            .unwrap();
        file.write_all(&[1u8; 16]).unwrap();
        drop(file);

        assert!(matches!(
            read_signing_key(&path),
            Err(KeyError::InvalidKeyFormat { .. })
        ));
    }

    #[test]
    fn sign_verify_round_trip() {
        let key = generate_signing_key();
        let message = b"window bytes";
        let sig = sign_message(&key, message);
        verify_signature(&key.verifying_key().to_bytes(), message, &sig).unwrap();

        assert_eq!(
            verify_signature(&key.verifying_key().to_bytes(), b"other", &sig),
            Err(SignatureError::BadSignature)
        );
    }
}
