//! CA state: the on-disk directory, its queue, and batch issuance.
//!
//! Layout under the CA root:
//!
//! ```text
//! ca-params                 canonical CAParams encoding
//! signing-key               Ed25519 seed, mode 0600
//! lock                      advisory lock file
//! queue                     append-only log of queued assertions
//! batches/<NNNNNNNN>/       one directory per issued batch
//!   abridged-assertions
//!   index
//!   tree
//!   signed-validity-window
//! latest                    ASCII number of the newest issued batch
//! tmp/                      scratch for atomic finalization
//! ```
//!
//! Writers (enqueue, issue) take an exclusive advisory lock on `lock` for
//! the duration of the operation. Readers take a shared lock on the batch
//! directory they read, which is safe because published batch directories
//! are immutable.

mod issue;
mod queue;

pub use queue::QueuedAssertion;

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use thiserror::Error;
use tracing::info;

use crate::assertion::{Assertion, CheckError};
use crate::cert::{Certificate, MerkleTreeProof, Proof, TrustAnchor};
use crate::codec::{CodecError, Decoder};
use crate::crypto::{
    HASH_SIZE, Hash, KeyError, generate_signing_key, read_signing_key, write_signing_key,
};
use crate::params::{CAParams, ParamsError};
use crate::tree::Tree;
use crate::window::WindowError;

pub(crate) const CA_PARAMS_FILE: &str = "ca-params";
pub(crate) const SIGNING_KEY_FILE: &str = "signing-key";
pub(crate) const QUEUE_FILE: &str = "queue";
pub(crate) const LOCK_FILE: &str = "lock";
pub(crate) const LATEST_FILE: &str = "latest";
pub(crate) const BATCHES_DIR: &str = "batches";
pub(crate) const TMP_DIR: &str = "tmp";
pub(crate) const ABRIDGED_ASSERTIONS_FILE: &str = "abridged-assertions";
pub(crate) const TREE_FILE: &str = "tree";
pub(crate) const INDEX_FILE: &str = "index";
pub(crate) const SIGNED_WINDOW_FILE: &str = "signed-validity-window";

/// Bytes per `index` record: key, seqno, offset.
pub(crate) const INDEX_RECORD_SIZE: usize = HASH_SIZE + 8 + 8;

/// Default seconds between batches (one hour).
pub const DEFAULT_BATCH_DURATION: u64 = 60 * 60;

/// Default assertion lifetime (fourteen days).
pub const DEFAULT_LIFETIME: u64 = 14 * 24 * 60 * 60;

/// Errors from CA state operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CaError {
    /// The CA root does not hold an initialized CA.
    #[error("no CA at {path}: run `ca new` first")]
    NotInitialized {
        /// The inspected path.
        path: String,
    },

    /// A CA already exists where `new` was asked to create one.
    #[error("a CA already exists at {path}")]
    AlreadyExists {
        /// The inspected path.
        path: String,
    },

    /// Another process holds the CA lock.
    #[error("CA at {path} is locked by another process")]
    LockHeld {
        /// The CA root.
        path: String,
    },

    /// A persisted artifact is unreadable or inconsistent.
    #[error("corrupt {artifact}: {reason}")]
    Corrupt {
        /// The artifact name.
        artifact: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A batch directory inside the validity window is missing.
    #[error("batch {batch} is missing from storage")]
    BatchMissing {
        /// The missing batch number.
        batch: u32,
    },

    /// The assertion was not found in any batch of the validity window.
    #[error("assertion has not been issued")]
    NotIssued,

    /// The signing key could not be used.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire-level failure encoding or decoding an artifact.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Invalid CA parameters.
    #[error(transparent)]
    Params(#[from] ParamsError),

    /// Signing key file failure.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// An assertion failed validation.
    #[error(transparent)]
    Check(#[from] CheckError),

    /// A signed validity window failed to decode or verify.
    #[error(transparent)]
    Window(#[from] WindowError),
}

/// Options for creating a new CA.
#[derive(Debug, Clone)]
pub struct NewOpts {
    /// Issuer id (at most 32 bytes).
    pub issuer_id: String,
    /// Base URL the batch artifacts will be served from.
    pub http_server: String,
    /// Seconds between batches; defaults to [`DEFAULT_BATCH_DURATION`].
    pub batch_duration: Option<u64>,
    /// Assertion lifetime in seconds; defaults to [`DEFAULT_LIFETIME`].
    pub lifetime: Option<u64>,
    /// Seconds batches stay on disk; defaults to twice the lifetime.
    pub storage_duration: Option<u64>,
    /// Unix time of batch 0; defaults to now.
    pub start_time: Option<u64>,
}

/// A batch within one CA's schedule.
///
/// Borrows the parameters; exists mostly for path and timespan arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    params: &'a CAParams,
    number: u32,
}

impl<'a> Batch<'a> {
    /// Creates a batch handle.
    #[must_use]
    pub const fn new(params: &'a CAParams, number: u32) -> Self {
        Self { params, number }
    }

    /// The batch number.
    #[must_use]
    pub const fn number(&self) -> u32 {
        self.number
    }

    /// The half-open unix-seconds interval this batch certifies.
    #[must_use]
    pub const fn timespan(&self) -> (u64, u64) {
        let start = self.params.batch_start(self.number);
        (start, start + self.params.batch_duration())
    }

    /// The batch's directory name: 8-digit zero-padded decimal.
    #[must_use]
    pub fn dir_name(&self) -> String {
        format!("{:08}", self.number)
    }
}

/// Handle on a CA root directory.
#[derive(Debug)]
pub struct Ca {
    root: PathBuf,
    params: CAParams,
}

impl Ca {
    /// Creates a new CA at `root`.
    ///
    /// Generates a signing key, writes `ca-params`, and lays out the
    /// directory structure. The directory may exist but must not already
    /// hold a CA.
    ///
    /// # Errors
    ///
    /// Returns [`CaError::AlreadyExists`] when `ca-params` is present, or
    /// the underlying failure.
    pub fn new(root: impl Into<PathBuf>, opts: NewOpts) -> Result<Self, CaError> {
        let root = root.into();
        if root.join(CA_PARAMS_FILE).exists() {
            return Err(CaError::AlreadyExists {
                path: root.display().to_string(),
            });
        }

        let batch_duration = opts.batch_duration.unwrap_or(DEFAULT_BATCH_DURATION);
        let lifetime = opts.lifetime.unwrap_or(DEFAULT_LIFETIME);
        let storage_duration = opts.storage_duration.unwrap_or(2 * lifetime);
        let storage_window_size = if batch_duration == 0 {
            0
        } else {
            storage_duration / batch_duration
        };
        let start_time = match opts.start_time {
            Some(t) => t,
            None => unix_now(),
        };

        fs::create_dir_all(&root)?;
        fs::create_dir_all(root.join(BATCHES_DIR))?;
        fs::create_dir_all(root.join(TMP_DIR))?;

        let key = generate_signing_key();
        let params = CAParams::new(
            opts.issuer_id,
            key.verifying_key().to_bytes().to_vec(),
            crate::cert::PROOF_TYPE_MERKLE_TREE_SHA256,
            start_time,
            batch_duration,
            lifetime,
            storage_window_size,
            opts.http_server,
        )?;

        write_signing_key(&root.join(SIGNING_KEY_FILE), &key)?;
        fs::write(root.join(CA_PARAMS_FILE), params.to_bytes()?)?;
        File::create(root.join(LOCK_FILE))?;
        sync_dir(&root)?;

        info!(
            issuer_id = params.issuer_id(),
            batch_duration = params.batch_duration(),
            validity_window_size = params.validity_window_size(),
            "created CA"
        );

        Ok(Self { root, params })
    }

    /// Opens an existing CA at `root`.
    ///
    /// Validates that `ca-params` matches the signing key's public half and
    /// that `latest`, when present, parses.
    ///
    /// # Errors
    ///
    /// Returns [`CaError::NotInitialized`] when no CA lives at `root`, or
    /// [`CaError::Corrupt`] for inconsistent state.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CaError> {
        let root = root.into();
        let params_path = root.join(CA_PARAMS_FILE);
        let params_bytes = match fs::read(&params_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(CaError::NotInitialized {
                    path: root.display().to_string(),
                });
            },
            Err(err) => return Err(err.into()),
        };
        let params = CAParams::from_bytes(&params_bytes).map_err(|err| CaError::Corrupt {
            artifact: CA_PARAMS_FILE,
            reason: err.to_string(),
        })?;

        let key = read_signing_key(&root.join(SIGNING_KEY_FILE))?;
        if key.verifying_key().to_bytes().as_slice() != params.public_key() {
            return Err(CaError::Corrupt {
                artifact: CA_PARAMS_FILE,
                reason: "public key does not match signing key".to_string(),
            });
        }
        drop(key);

        let ca = Self { root, params };
        // Surface a mangled `latest` now rather than at first use.
        ca.latest_batch()?;
        Ok(ca)
    }

    /// The CA's parameters.
    #[must_use]
    pub const fn params(&self) -> &CAParams {
        &self.params
    }

    /// The CA root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The newest issued batch number, or `None` before the first issue.
    ///
    /// # Errors
    ///
    /// Returns [`CaError::Corrupt`] when `latest` does not parse.
    pub fn latest_batch(&self) -> Result<Option<u32>, CaError> {
        let raw = match fs::read_to_string(self.root.join(LATEST_FILE)) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        raw.trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|err| CaError::Corrupt {
                artifact: LATEST_FILE,
                reason: err.to_string(),
            })
    }

    /// Path of batch `number`'s directory.
    #[must_use]
    pub fn batch_path(&self, number: u32) -> PathBuf {
        self.root
            .join(BATCHES_DIR)
            .join(Batch::new(&self.params, number).dir_name())
    }

    /// Queues a single assertion.
    ///
    /// # Errors
    ///
    /// Same as [`Ca::queue_multiple`].
    pub fn queue(&self, qa: QueuedAssertion) -> Result<(), CaError> {
        self.queue_multiple(std::iter::once(qa))
    }

    /// Queues a batch of assertions under one lock acquisition.
    ///
    /// Every assertion is validated (including the checksum gate) before
    /// anything is appended, so a failing item leaves the queue untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError`] for invalid assertions, [`CaError::LockHeld`]
    /// when another writer is active, or the underlying I/O failure.
    pub fn queue_multiple(
        &self,
        items: impl IntoIterator<Item = QueuedAssertion>,
    ) -> Result<(), CaError> {
        let mut encoded = Vec::new();
        for qa in items {
            qa.check()?;
            let bytes = qa.assertion().to_bytes()?;
            let key = qa.key()?;
            encoded.push(queue::encode_record(&bytes, &key)?);
        }
        if encoded.is_empty() {
            return Ok(());
        }

        let _lock = self.lock_exclusive()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(QUEUE_FILE))?;
        for record in &encoded {
            file.write_all(record)?;
        }
        file.sync_all()?;
        Ok(())
    }

    /// Walks the queue in enqueue order.
    ///
    /// Records that fail to decode are skipped; a torn tail record is
    /// ignored. Runs without a lock.
    ///
    /// # Errors
    ///
    /// Returns the first error `f` reports, or an I/O failure reading the
    /// queue.
    pub fn walk_queue(
        &self,
        mut f: impl FnMut(QueuedAssertion) -> Result<(), CaError>,
    ) -> Result<(), CaError> {
        let bytes = match fs::read(self.root.join(QUEUE_FILE)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        for record in queue::read_records(&bytes) {
            let Ok(assertion) = Assertion::from_bytes(&record.assertion) else {
                continue;
            };
            f(QueuedAssertion::new(assertion, Some(record.checksum)))?;
        }
        Ok(())
    }

    /// Builds a certificate for a previously issued assertion.
    ///
    /// Scans from the newest batch down through the validity window,
    /// binary-searching each batch's index by assertion key.
    ///
    /// # Errors
    ///
    /// Returns [`CaError::NotIssued`] when no live batch contains the
    /// assertion.
    pub fn certificate_for(&self, assertion: &Assertion) -> Result<Certificate, CaError> {
        let key = assertion.key()?;
        let Some(latest) = self.latest_batch()? else {
            return Err(CaError::NotIssued);
        };

        let window = u32::from(self.params.validity_window_size());
        let oldest = latest.saturating_sub(window - 1);
        for number in (oldest..=latest).rev() {
            if let Some(index) = self.find_in_batch(number, &key)? {
                let dir = self.batch_path(number);
                let tree = Tree::from_bytes(&fs::read(dir.join(TREE_FILE))?)?;
                let path = tree
                    .authentication_path(index)
                    .map_err(|err| CaError::Corrupt {
                        artifact: INDEX_FILE,
                        reason: err.to_string(),
                    })?;
                let anchor = TrustAnchor::new(self.params.issuer_id().to_string(), number);
                let proof = Proof::MerkleTree(MerkleTreeProof::new(anchor, index, path));
                return Ok(Certificate::new(assertion.clone(), proof));
            }
        }
        Err(CaError::NotIssued)
    }

    /// Binary-searches batch `number`'s index for `key`, returning the leaf
    /// index on a hit.
    fn find_in_batch(&self, number: u32, key: &Hash) -> Result<Option<u64>, CaError> {
        let dir = self.batch_path(number);
        let _shared = match lock_shared_dir(&dir) {
            Ok(lock) => lock,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(CaError::BatchMissing { batch: number });
            },
            Err(err) => return Err(err.into()),
        };

        let bytes = fs::read(dir.join(INDEX_FILE))?;
        if bytes.len() % INDEX_RECORD_SIZE != 0 {
            return Err(CaError::Corrupt {
                artifact: INDEX_FILE,
                reason: format!("length {} is not a whole number of records", bytes.len()),
            });
        }

        let records = bytes.len() / INDEX_RECORD_SIZE;
        let record_key =
            |i: usize| -> &[u8] { &bytes[i * INDEX_RECORD_SIZE..i * INDEX_RECORD_SIZE + HASH_SIZE] };

        let (mut lo, mut hi) = (0usize, records);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match record_key(mid).cmp(key.as_slice()) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => {
                    // The leaf index equals the record position: the index
                    // file and the tree share the sorted order.
                    return Ok(Some(mid as u64));
                },
            }
        }
        Ok(None)
    }

    /// Takes the exclusive writer lock.
    pub(crate) fn lock_exclusive(&self) -> Result<LockGuard, CaError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.root.join(LOCK_FILE))?;
        file.try_lock_exclusive().map_err(|err| {
            if err.kind() == std::io::ErrorKind::WouldBlock {
                CaError::LockHeld {
                    path: self.root.display().to_string(),
                }
            } else {
                CaError::Io(err)
            }
        })?;
        Ok(LockGuard { _file: file })
    }
}

/// Holds the advisory lock until dropped.
#[derive(Debug)]
pub(crate) struct LockGuard {
    _file: File,
}

/// Takes a shared lock on a batch directory handle.
fn lock_shared_dir(dir: &Path) -> std::io::Result<File> {
    let file = File::open(dir)?;
    file.lock_shared()?;
    Ok(file)
}

/// Reads an `index` artifact into `(key, seqno, offset)` records.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] for partial records.
pub fn read_index(bytes: &[u8]) -> Result<Vec<(Hash, u64, u64)>, CodecError> {
    let mut dec = Decoder::new(bytes);
    let mut records = Vec::with_capacity(bytes.len() / INDEX_RECORD_SIZE);
    while !dec.is_empty() {
        let key = dec.array::<HASH_SIZE>()?;
        let seqno = dec.u64()?;
        let offset = dec.u64()?;
        records.push((key, seqno, offset));
    }
    Ok(records)
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Fsyncs a directory so renames and creates inside it are durable.
pub(crate) fn sync_dir(path: &Path) -> std::io::Result<()> {
    File::open(path)?.sync_all()
}
