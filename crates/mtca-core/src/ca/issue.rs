//! Batch issuance: drain, validate, order, build, sign, publish.
//!
//! The pipeline is deterministic given the drained queue and the CA
//! parameters: the same multiset of valid assertions produces byte-identical
//! batch artifacts. Everything is staged under `tmp/` and renamed into place
//! only after all artifacts are fsynced, so a crash at any point leaves the
//! published state untouched.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::{info, warn};

use crate::assertion::Assertion;
use crate::codec::Encoder;
use crate::crypto::{Hash, read_signing_key};
use crate::tree::Tree;
use crate::window::{SignedValidityWindow, ValidityWindow};

use super::{
    ABRIDGED_ASSERTIONS_FILE, BATCHES_DIR, Ca, CaError, INDEX_FILE, QUEUE_FILE,
    SIGNED_WINDOW_FILE, SIGNING_KEY_FILE, TMP_DIR, TREE_FILE, queue, sync_dir, unix_now,
};

/// One assertion headed into the batch.
struct BatchEntry {
    key: Hash,
    /// First-seen position in the drained queue.
    seqno: u64,
    /// Canonical abridged assertion bytes.
    abridged: Vec<u8>,
}

impl Ca {
    /// Issues the next batch from the queued assertions.
    ///
    /// Always produces a batch, even when the queue is empty or the
    /// wall-clock schedule has not reached the next batch yet (the latter
    /// logs a warning). Returns the issued batch number.
    ///
    /// # Errors
    ///
    /// Returns [`CaError::LockHeld`] when another writer is active, or the
    /// underlying failure. A failed attempt leaves `tmp/` behind and never
    /// advances `latest`.
    pub fn issue(&self) -> Result<u32, CaError> {
        let _lock = self.lock_exclusive()?;

        let next = match self.latest_batch()? {
            Some(latest) => latest + 1,
            None => 0,
        };

        match self.params.expected_batch_number(unix_now()) {
            Some(expected) if next > expected => {
                warn!(batch = next, expected, "issuing ahead of the batch schedule");
            },
            None => {
                warn!(batch = next, "issuing before the CA start time");
            },
            Some(_) => {},
        }

        let tmp = self.root.join(TMP_DIR);
        let drained = tmp.join(format!("queue.{next}"));
        self.reset_tmp(&tmp, &drained)?;

        let records = self.drain_queue(&drained)?;
        let entries = build_entries(&records);

        let batch_tmp = tmp.join(format!("batch.{next}"));
        fs::create_dir_all(&batch_tmp)?;
        let tree = self.write_batch_artifacts(&batch_tmp, next, &entries)?;
        self.write_signed_window(&batch_tmp, next, &tree)?;
        sync_dir(&batch_tmp)?;

        // Publish: rename the staged directory into place, then move
        // `latest` forward. Advancing `latest` is the commit point; a
        // leftover directory from a crash between the two steps was never
        // committed and is replaced.
        let final_dir = self.batch_path(next);
        if final_dir.exists() {
            fs::remove_dir_all(&final_dir)?;
        }
        fs::rename(&batch_tmp, &final_dir)?;
        sync_dir(&self.root.join(BATCHES_DIR))?;

        let latest_tmp = tmp.join("latest");
        write_file(&latest_tmp, next.to_string().as_bytes())?;
        fs::rename(&latest_tmp, self.root.join(super::LATEST_FILE))?;
        sync_dir(&self.root)?;

        let _ = fs::remove_file(&drained);
        self.prune_batches(next)?;

        info!(batch = next, leaves = entries.len(), "issued batch");
        Ok(next)
    }

    /// Clears stale batch staging from `tmp/`, keeping a drained queue left
    /// behind by an interrupted attempt so its assertions are not lost.
    fn reset_tmp(&self, tmp: &Path, drained: &Path) -> Result<(), CaError> {
        fs::create_dir_all(tmp)?;
        for entry in fs::read_dir(tmp)? {
            let entry = entry?;
            if entry.path() == drained {
                continue;
            }
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Moves the live queue out of the way and reads every complete record,
    /// leftovers from an interrupted attempt first.
    fn drain_queue(&self, drained: &Path) -> Result<Vec<queue::QueueRecord>, CaError> {
        let mut records = Vec::new();
        if drained.exists() {
            records.extend(queue::read_records(&fs::read(drained)?));
        }

        let queue_path = self.root.join(QUEUE_FILE);
        match fs::metadata(&queue_path) {
            Ok(_) => {
                let fresh = fs::read(&queue_path)?;
                if records.is_empty() {
                    fs::rename(&queue_path, drained)?;
                } else {
                    // Merge the leftover drain with the fresh queue into one
                    // drained file, then retire the live queue.
                    let mut merged = fs::read(drained)?;
                    merged.extend_from_slice(&fresh);
                    write_file(drained, &merged)?;
                    fs::remove_file(&queue_path)?;
                }
                records.extend(queue::read_records(&fresh));
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
            Err(err) => return Err(err.into()),
        }
        sync_dir(&self.root)?;
        Ok(records)
    }

    /// Writes `abridged-assertions`, `index`, and `tree`, returning the
    /// tree.
    fn write_batch_artifacts(
        &self,
        dir: &Path,
        batch_number: u32,
        entries: &[BatchEntry],
    ) -> Result<Tree, CaError> {
        let mut abridged = Encoder::new();
        let mut index = Encoder::new();
        let mut offset = 0u64;
        for entry in entries {
            abridged.vec::<3>(&entry.abridged)?;
            index.bytes(&entry.key);
            index.u64(entry.seqno);
            index.u64(offset);
            offset += 3 + entry.abridged.len() as u64;
        }
        write_file(&dir.join(ABRIDGED_ASSERTIONS_FILE), &abridged.into_bytes())?;
        write_file(&dir.join(INDEX_FILE), &index.into_bytes())?;

        let leaves: Vec<&[u8]> = entries.iter().map(|e| e.abridged.as_slice()).collect();
        let tree = Tree::build(batch_number, &leaves);
        write_file(&dir.join(TREE_FILE), &tree.to_bytes())?;
        Ok(tree)
    }

    /// Rolls the validity window forward over the new root and signs it.
    fn write_signed_window(
        &self,
        dir: &Path,
        batch_number: u32,
        tree: &Tree,
    ) -> Result<(), CaError> {
        let window = if batch_number == 0 {
            ValidityWindow::genesis(&self.params, tree.root())
        } else {
            let prev_path = self
                .batch_path(batch_number - 1)
                .join(SIGNED_WINDOW_FILE);
            let prev_bytes = match fs::read(&prev_path) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Err(CaError::BatchMissing {
                        batch: batch_number - 1,
                    });
                },
                Err(err) => return Err(err.into()),
            };
            let prev = SignedValidityWindow::from_bytes(&prev_bytes, &self.params)?;
            prev.window().roll(tree.root())
        };

        let key = read_signing_key(&self.root.join(SIGNING_KEY_FILE))?;
        let signed = SignedValidityWindow::sign(window, &self.params, &key)
            .map_err(|err| CaError::SigningFailed(err.to_string()))?;
        drop(key);

        write_file(&dir.join(SIGNED_WINDOW_FILE), &signed.to_bytes()?)?;
        Ok(())
    }

    /// Removes batches that have fallen out of the storage window.
    fn prune_batches(&self, latest: u32) -> Result<(), CaError> {
        let keep = self.params.storage_window_size();
        let cutoff = u64::from(latest) + 1 - keep.min(u64::from(latest) + 1);

        let batches = self.root.join(BATCHES_DIR);
        for entry in fs::read_dir(&batches)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(number) = name.to_str().and_then(|s| s.parse::<u64>().ok()) else {
                continue;
            };
            if number < cutoff {
                fs::remove_dir_all(entry.path())?;
                info!(batch = number, "pruned batch outside storage window");
            }
        }
        Ok(())
    }
}

/// Validates, abridges, deduplicates, and sorts the drained records.
fn build_entries(records: &[queue::QueueRecord]) -> Vec<BatchEntry> {
    let mut entries = Vec::with_capacity(records.len());
    for (seqno, record) in records.iter().enumerate() {
        let assertion = match Assertion::from_bytes(&record.assertion) {
            Ok(assertion) => assertion,
            Err(err) => {
                warn!(
                    checksum = %hex::encode(record.checksum),
                    %err,
                    "skipping undecodable queue record"
                );
                continue;
            },
        };
        if let Err(err) = assertion.check() {
            warn!(
                checksum = %hex::encode(record.checksum),
                %err,
                "skipping invalid assertion"
            );
            continue;
        }
        let abridged = assertion.abridge();
        let (key, bytes) = match (abridged.key(), abridged.to_bytes()) {
            (Ok(key), Ok(bytes)) => (key, bytes),
            _ => {
                warn!(
                    checksum = %hex::encode(record.checksum),
                    "skipping unencodable assertion"
                );
                continue;
            },
        };
        entries.push(BatchEntry {
            key,
            seqno: seqno as u64,
            abridged: bytes,
        });
    }

    // First occurrence wins; the later sort is stable in `key` because keys
    // are unique after deduplication.
    let mut seen = HashSet::with_capacity(entries.len());
    entries.retain(|entry| seen.insert(entry.key));
    entries.sort_unstable_by(|a, b| a.key.cmp(&b.key));
    entries
}

/// Writes a file and fsyncs it.
fn write_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
