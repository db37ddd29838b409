//! CA parameters: the public description of a CA.
//!
//! `CAParams` is published verbatim (the `ca-params` artifact) and is the
//! root of trust for relying parties: it names the issuer, carries the
//! window-signing public key, and fixes the batch schedule. Its canonical
//! hash binds validity-window signatures to one parameter set.

use thiserror::Error;

use crate::codec::{CodecError, Decoder, Encoder};
use crate::crypto::{Hash, SignatureScheme, hash_bytes};

/// Longest issuer id accepted, in bytes.
pub const MAX_ISSUER_ID: usize = 32;

/// Errors constructing or decoding CA parameters.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParamsError {
    /// Wire-level decode failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The issuer id is empty or exceeds [`MAX_ISSUER_ID`] bytes.
    #[error("issuer id must be 1..={MAX_ISSUER_ID} bytes, got {len}")]
    BadIssuerId {
        /// Actual length in bytes.
        len: usize,
    },

    /// A duration field is zero.
    #[error("batch duration and lifetime must be non-zero")]
    ZeroDuration,

    /// The lifetime is not a whole number of batch durations.
    #[error("lifetime {life_time}s is not a multiple of batch duration {batch_duration}s")]
    LifetimeNotMultiple {
        /// Configured lifetime in seconds.
        life_time: u64,
        /// Configured batch duration in seconds.
        batch_duration: u64,
    },

    /// The validity window size disagrees with lifetime / batch duration.
    #[error("validity window size {got} does not equal lifetime/batch-duration {expected}")]
    WindowSizeMismatch {
        /// Encoded window size.
        got: u16,
        /// `life_time / batch_duration`.
        expected: u64,
    },

    /// The storage window is smaller than the validity window.
    #[error("storage window size {storage} is smaller than validity window size {validity}")]
    StorageWindowTooSmall {
        /// Configured storage window size, in batches.
        storage: u64,
        /// Validity window size, in batches.
        validity: u16,
    },

    /// The public key does not parse under the CA signature scheme.
    #[error("CA public key does not parse")]
    BadPublicKey,
}

/// Public parameters of a CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CAParams {
    issuer_id: String,
    public_key: Vec<u8>,
    proof_type: u16,
    start_time: u64,
    batch_duration: u64,
    life_time: u64,
    storage_window_size: u64,
    validity_window_size: u16,
    http_server: String,
}

impl CAParams {
    /// Creates validated CA parameters.
    ///
    /// `validity_window_size` is derived as `life_time / batch_duration`.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`ParamsError`] invariant.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        issuer_id: String,
        public_key: Vec<u8>,
        proof_type: u16,
        start_time: u64,
        batch_duration: u64,
        life_time: u64,
        storage_window_size: u64,
        http_server: String,
    ) -> Result<Self, ParamsError> {
        let validity = derived_window_size(life_time, batch_duration)?;
        let params = Self {
            issuer_id,
            public_key,
            proof_type,
            start_time,
            batch_duration,
            life_time,
            storage_window_size,
            validity_window_size: validity,
            http_server,
        };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), ParamsError> {
        if self.issuer_id.is_empty() || self.issuer_id.len() > MAX_ISSUER_ID {
            return Err(ParamsError::BadIssuerId {
                len: self.issuer_id.len(),
            });
        }
        let expected = derived_window_size(self.life_time, self.batch_duration)?;
        if u64::from(self.validity_window_size) != u64::from(expected) {
            return Err(ParamsError::WindowSizeMismatch {
                got: self.validity_window_size,
                expected: u64::from(expected),
            });
        }
        if self.storage_window_size < u64::from(self.validity_window_size) {
            return Err(ParamsError::StorageWindowTooSmall {
                storage: self.storage_window_size,
                validity: self.validity_window_size,
            });
        }
        SignatureScheme::ED25519
            .check_public_key(&self.public_key)
            .map_err(|_| ParamsError::BadPublicKey)?;
        Ok(())
    }

    /// The issuer id.
    #[must_use]
    pub fn issuer_id(&self) -> &str {
        &self.issuer_id
    }

    /// The CA's window-signing public key.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// The proof type this CA issues.
    #[must_use]
    pub const fn proof_type(&self) -> u16 {
        self.proof_type
    }

    /// Unix time at which batch 0 begins.
    #[must_use]
    pub const fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Seconds between batches.
    #[must_use]
    pub const fn batch_duration(&self) -> u64 {
        self.batch_duration
    }

    /// Assertion lifetime in seconds.
    #[must_use]
    pub const fn life_time(&self) -> u64 {
        self.life_time
    }

    /// Number of batches kept on disk.
    #[must_use]
    pub const fn storage_window_size(&self) -> u64 {
        self.storage_window_size
    }

    /// Number of tree heads in a validity window.
    #[must_use]
    pub const fn validity_window_size(&self) -> u16 {
        self.validity_window_size
    }

    /// Base URL of the publication server.
    #[must_use]
    pub fn http_server(&self) -> &str {
        &self.http_server
    }

    /// Unix time at which `batch_number`'s timespan begins.
    #[must_use]
    pub const fn batch_start(&self, batch_number: u32) -> u64 {
        self.start_time + batch_number as u64 * self.batch_duration
    }

    /// The batch number whose timespan contains `now`, or `None` before
    /// `start_time`.
    #[must_use]
    pub const fn expected_batch_number(&self, now: u64) -> Option<u32> {
        if now < self.start_time {
            None
        } else {
            Some(((now - self.start_time) / self.batch_duration) as u32)
        }
    }

    /// Hash of the canonical encoding, mixed into window signatures.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when a field exceeds its wire bounds.
    pub fn params_hash(&self) -> Result<Hash, CodecError> {
        Ok(hash_bytes(&self.to_bytes()?))
    }

    /// Encodes to canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when a field exceeds its wire bounds.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut enc = Encoder::new();
        enc.vec::<1>(self.issuer_id.as_bytes())?;
        enc.vec::<2>(&self.public_key)?;
        enc.u16(self.proof_type);
        enc.u64(self.start_time);
        enc.u64(self.batch_duration);
        enc.u64(self.life_time);
        enc.u64(self.storage_window_size);
        enc.u16(self.validity_window_size);
        enc.vec::<2>(self.http_server.as_bytes())?;
        Ok(enc.into_bytes())
    }

    /// Decodes from canonical bytes and re-validates every invariant.
    ///
    /// # Errors
    ///
    /// Returns [`ParamsError`] for wire or invariant failures.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParamsError> {
        let mut dec = Decoder::new(bytes);

        let issuer_bytes = dec.vec::<1>()?;
        let issuer_id = std::str::from_utf8(issuer_bytes)
            .map_err(|_| dec.non_canonical("issuer id is not valid UTF-8"))?
            .to_string();
        let public_key = dec.vec::<2>()?.to_vec();
        let proof_type = dec.u16()?;
        let start_time = dec.u64()?;
        let batch_duration = dec.u64()?;
        let life_time = dec.u64()?;
        let storage_window_size = dec.u64()?;
        let validity_window_size = dec.u16()?;
        let server_bytes = dec.vec::<2>()?;
        let http_server = std::str::from_utf8(server_bytes)
            .map_err(|_| dec.non_canonical("http server is not valid UTF-8"))?
            .to_string();
        dec.finish()?;

        let params = Self {
            issuer_id,
            public_key,
            proof_type,
            start_time,
            batch_duration,
            life_time,
            storage_window_size,
            validity_window_size,
            http_server,
        };
        params.validate()?;
        Ok(params)
    }
}

fn derived_window_size(life_time: u64, batch_duration: u64) -> Result<u16, ParamsError> {
    if batch_duration == 0 || life_time == 0 {
        return Err(ParamsError::ZeroDuration);
    }
    if life_time % batch_duration != 0 {
        return Err(ParamsError::LifetimeNotMultiple {
            life_time,
            batch_duration,
        });
    }
    let size = life_time / batch_duration;
    u16::try_from(size).map_err(|_| ParamsError::WindowSizeMismatch {
        got: u16::MAX,
        expected: size,
    })
}
