//! Validity windows: the rolling set of batch roots the CA vouches for.
//!
//! A window always holds exactly `validity_window_size` tree heads, oldest
//! first. Batches that were never issued (before batch 0, or dropped off the
//! left edge) are represented by the all-zero hash. The signed form carries
//! one signature over the whole window, domain-separated and bound to the
//! CA's parameter hash.

use ed25519_dalek::SigningKey;
use thiserror::Error;

use crate::codec::{CodecError, Decoder, Encoder};
use crate::crypto::{HASH_SIZE, Hash, ZERO_HASH, sign_message, verify_signature};
use crate::params::CAParams;

/// Domain separator for validity window signatures.
const VALIDITY_WINDOW_LABEL: &[u8] = b"mtc/validity-window";

/// Errors decoding or verifying signed validity windows.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum WindowError {
    /// Wire-level decode failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The window signature does not verify under the CA public key.
    #[error("window signature verification failed")]
    BadSignature,
}

/// The tree heads of the most recent `validity_window_size` batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityWindow {
    batch_number: u32,
    tree_heads: Vec<Hash>,
}

impl ValidityWindow {
    /// The window after issuing batch 0: zero heads padded on the left,
    /// `root` in the newest slot.
    #[must_use]
    pub fn genesis(params: &CAParams, root: Hash) -> Self {
        let size = usize::from(params.validity_window_size());
        let mut tree_heads = vec![ZERO_HASH; size];
        tree_heads[size - 1] = root;
        Self {
            batch_number: 0,
            tree_heads,
        }
    }

    /// The window after issuing the next batch: heads shift left one slot,
    /// the oldest drops out, `root` enters the newest slot.
    #[must_use]
    pub fn roll(&self, root: Hash) -> Self {
        let mut tree_heads = self.tree_heads.clone();
        tree_heads.rotate_left(1);
        if let Some(last) = tree_heads.last_mut() {
            *last = root;
        }
        Self {
            batch_number: self.batch_number + 1,
            tree_heads,
        }
    }

    /// The newest covered batch number.
    #[must_use]
    pub const fn batch_number(&self) -> u32 {
        self.batch_number
    }

    /// All tree heads, oldest first.
    #[must_use]
    pub fn tree_heads(&self) -> &[Hash] {
        &self.tree_heads
    }

    /// The tree head for `batch`, when the window covers it.
    ///
    /// Returns `None` for batches newer than the window or older than its
    /// left edge.
    #[must_use]
    pub fn head_for_batch(&self, batch: u32) -> Option<&Hash> {
        if batch > self.batch_number {
            return None;
        }
        let age = (self.batch_number - batch) as usize;
        if age >= self.tree_heads.len() {
            return None;
        }
        Some(&self.tree_heads[self.tree_heads.len() - 1 - age])
    }

    /// Encodes to canonical bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(4 + self.tree_heads.len() * HASH_SIZE);
        enc.u32(self.batch_number);
        for head in &self.tree_heads {
            enc.bytes(head);
        }
        enc.into_bytes()
    }

    fn decode(dec: &mut Decoder<'_>, params: &CAParams) -> Result<Self, CodecError> {
        let batch_number = dec.u32()?;
        let mut tree_heads = Vec::with_capacity(usize::from(params.validity_window_size()));
        for _ in 0..params.validity_window_size() {
            tree_heads.push(dec.array::<HASH_SIZE>()?);
        }
        Ok(Self {
            batch_number,
            tree_heads,
        })
    }

    /// Decodes from canonical bytes; the head count comes from `params`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] for malformed input.
    pub fn from_bytes(bytes: &[u8], params: &CAParams) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(bytes);
        let window = Self::decode(&mut dec, params)?;
        dec.finish()?;
        Ok(window)
    }

    /// The message a window signature covers.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the parameter encoding fails.
    pub fn signed_message(&self, params: &CAParams) -> Result<Vec<u8>, CodecError> {
        let mut message =
            Vec::with_capacity(VALIDITY_WINDOW_LABEL.len() + HASH_SIZE + 4 + self.tree_heads.len() * HASH_SIZE);
        message.extend_from_slice(VALIDITY_WINDOW_LABEL);
        message.extend_from_slice(&params.params_hash()?);
        message.extend_from_slice(&self.to_bytes());
        Ok(message)
    }
}

/// A validity window plus the CA's signature over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedValidityWindow {
    window: ValidityWindow,
    signature: Vec<u8>,
}

impl SignedValidityWindow {
    /// Signs `window` with the CA key.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the signed message cannot be encoded.
    pub fn sign(
        window: ValidityWindow,
        params: &CAParams,
        key: &SigningKey,
    ) -> Result<Self, CodecError> {
        let message = window.signed_message(params)?;
        let signature = sign_message(key, &message);
        Ok(Self { window, signature })
    }

    /// The signed window.
    #[must_use]
    pub const fn window(&self) -> &ValidityWindow {
        &self.window
    }

    /// The raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Verifies the signature under the CA public key.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::BadSignature`] when verification fails.
    pub fn verify(&self, params: &CAParams) -> Result<(), WindowError> {
        let message = self.window.signed_message(params)?;
        verify_signature(params.public_key(), &message, &self.signature)
            .map_err(|_| WindowError::BadSignature)
    }

    /// Encodes to canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the signature exceeds its wire bounds.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut enc = Encoder::new();
        enc.bytes(&self.window.to_bytes());
        enc.vec::<2>(&self.signature)?;
        Ok(enc.into_bytes())
    }

    /// Decodes from canonical bytes and verifies the signature.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError`] for malformed input or a bad signature.
    pub fn from_bytes(bytes: &[u8], params: &CAParams) -> Result<Self, WindowError> {
        let mut dec = Decoder::new(bytes);
        let window = ValidityWindow::decode(&mut dec, params)?;
        let signature = dec.vec::<2>()?.to_vec();
        dec.finish()?;
        let signed = Self { window, signature };
        signed.verify(params)?;
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use crate::crypto::generate_signing_key;

    use super::*;

    fn test_setup() -> (CAParams, SigningKey) {
        let key = generate_signing_key();
        let params = CAParams::new(
            "acme".to_string(),
            key.verifying_key().to_bytes().to_vec(),
            0x0001,
            1_700_000_000,
            60,
            300,
            10,
            "example.org".to_string(),
        )
        .unwrap();
        (params, key)
    }

    fn root(n: u8) -> Hash {
        [n; HASH_SIZE]
    }

    #[test]
    fn genesis_pads_left_with_zero_heads() {
        let (params, _) = test_setup();
        let window = ValidityWindow::genesis(&params, root(1));
        assert_eq!(window.batch_number(), 0);
        assert_eq!(window.tree_heads().len(), 5);
        assert_eq!(&window.tree_heads()[..4], &[ZERO_HASH; 4]);
        assert_eq!(window.tree_heads()[4], root(1));
    }

    #[test]
    fn roll_shifts_and_appends() {
        let (params, _) = test_setup();
        let mut window = ValidityWindow::genesis(&params, root(1));
        for n in 2..=7u8 {
            window = window.roll(root(n));
        }
        assert_eq!(window.batch_number(), 6);
        // Batches 2..=6 remain; older heads have dropped out.
        assert_eq!(
            window.tree_heads(),
            &[root(3), root(4), root(5), root(6), root(7)]
        );
    }

    #[test]
    fn head_lookup_covers_exactly_the_window() {
        let (params, _) = test_setup();
        let mut window = ValidityWindow::genesis(&params, root(1));
        for n in 2..=7u8 {
            window = window.roll(root(n));
        }
        assert_eq!(window.head_for_batch(6), Some(&root(7)));
        assert_eq!(window.head_for_batch(2), Some(&root(3)));
        assert_eq!(window.head_for_batch(1), None); // aged out
        assert_eq!(window.head_for_batch(7), None); // not issued yet
    }

    #[test]
    fn signed_round_trip() {
        let (params, key) = test_setup();
        let window = ValidityWindow::genesis(&params, root(9));
        let signed = SignedValidityWindow::sign(window, &params, &key).unwrap();
        let bytes = signed.to_bytes().unwrap();

        let decoded = SignedValidityWindow::from_bytes(&bytes, &params).unwrap();
        assert_eq!(decoded, signed);
    }

    #[test]
    fn tampered_window_fails_signature() {
        let (params, key) = test_setup();
        let window = ValidityWindow::genesis(&params, root(9));
        let signed = SignedValidityWindow::sign(window, &params, &key).unwrap();
        let mut bytes = signed.to_bytes().unwrap();
        bytes[5] ^= 0x01; // inside the first tree head
        assert_eq!(
            SignedValidityWindow::from_bytes(&bytes, &params).unwrap_err(),
            WindowError::BadSignature
        );
    }

    #[test]
    fn signature_is_bound_to_params() {
        let (params, key) = test_setup();
        let window = ValidityWindow::genesis(&params, root(9));
        let signed = SignedValidityWindow::sign(window, &params, &key).unwrap();

        // Same key, different issuer id: the params hash changes, so the
        // signature must not carry over.
        let other = CAParams::new(
            "evil".to_string(),
            key.verifying_key().to_bytes().to_vec(),
            0x0001,
            1_700_000_000,
            60,
            300,
            10,
            "example.org".to_string(),
        )
        .unwrap();
        assert_eq!(signed.verify(&other).unwrap_err(), WindowError::BadSignature);
    }
}
