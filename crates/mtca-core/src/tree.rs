//! The Merkle tree over a batch's abridged assertions.
//!
//! The tree is complete: the leaf level is padded to the next power of two
//! with *empty leaves*, so every internal node has two children. All three
//! node kinds hash under distinct domain separators, and every hash mixes in
//! the batch number and the node's position, so a node cannot be replayed in
//! another batch or at another position.
//!
//! Nodes are stored level-order in one flat byte buffer, leaves first and
//! the root last, which is also the `tree` artifact's wire layout (behind a
//! leaf-count header).

use thiserror::Error;

use crate::codec::{CodecError, Decoder, Encoder};
use crate::crypto::{HASH_SIZE, Hash, Hasher};

/// Domain separator for leaf hashes.
const PREFIX_LEAF: u8 = 0x00;

/// Domain separator for internal node hashes.
const PREFIX_INTERNAL: u8 = 0x01;

/// Domain separator for empty (padding) leaf hashes.
const PREFIX_EMPTY_LEAF: u8 = 0x02;

/// Errors from authentication path handling.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TreeError {
    /// An authentication path is not a whole number of hashes, or implies a
    /// tree deeper than supported.
    #[error("authentication path length {length} is not valid")]
    PathLengthMismatch {
        /// Path length in bytes.
        length: usize,
    },

    /// A leaf index lies outside the tree.
    #[error("leaf index {index} out of range (limit {limit})")]
    IndexOutOfRange {
        /// The requested index.
        index: u64,
        /// One past the largest valid index.
        limit: u64,
    },
}

/// Hashes a real leaf at `index` in `batch_number`.
#[must_use]
pub fn leaf_hash(batch_number: u32, index: u64, abridged_assertion: &[u8]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(&[PREFIX_LEAF]);
    hasher.update(&batch_number.to_be_bytes());
    hasher.update(&index.to_be_bytes());
    hasher.update(abridged_assertion);
    hasher.finalize()
}

/// Hashes an internal node at `(level, index)` in `batch_number`.
///
/// Leaves are level 0, so the first internal level is 1.
#[must_use]
pub fn internal_hash(batch_number: u32, level: u8, index: u64, left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(&[PREFIX_INTERNAL]);
    hasher.update(&batch_number.to_be_bytes());
    hasher.update(&[level]);
    hasher.update(&index.to_be_bytes());
    hasher.update(left);
    hasher.update(right);
    hasher.finalize()
}

/// Hashes the empty leaf padding position `index` in `batch_number`.
#[must_use]
pub fn empty_leaf_hash(batch_number: u32, index: u64) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(&[PREFIX_EMPTY_LEAF]);
    hasher.update(&batch_number.to_be_bytes());
    hasher.update(&index.to_be_bytes());
    hasher.finalize()
}

/// A batch's complete Merkle tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    n_leaves: u64,
    /// `node_count * HASH_SIZE` bytes, level-order, root last.
    nodes: Vec<u8>,
}

impl Tree {
    /// Builds the tree for `batch_number` over the encoded abridged
    /// assertions, in their final (sorted) leaf order.
    #[must_use]
    pub fn build<L: AsRef<[u8]>>(batch_number: u32, leaves: &[L]) -> Self {
        let n = leaves.len() as u64;
        let width = leaf_width(n);
        let node_count = 2 * width - 1;
        let mut nodes = vec![0u8; (node_count * HASH_SIZE as u64) as usize];

        // Level 0: real leaves, then empty-leaf padding.
        for index in 0..width {
            let hash = match leaves.get(index as usize) {
                Some(leaf) => leaf_hash(batch_number, index, leaf.as_ref()),
                None => empty_leaf_hash(batch_number, index),
            };
            write_node(&mut nodes, index, &hash);
        }

        // Upper levels, bottom-up in level order.
        let mut level_base = 0u64; // first node of the level below
        let mut level_width = width;
        let mut level = 1u8;
        while level_width > 1 {
            let next_base = level_base + level_width;
            let next_width = level_width / 2;
            for index in 0..next_width {
                let left = read_node(&nodes, level_base + 2 * index);
                let right = read_node(&nodes, level_base + 2 * index + 1);
                let hash = internal_hash(batch_number, level, index, &left, &right);
                write_node(&mut nodes, next_base + index, &hash);
            }
            level_base = next_base;
            level_width = next_width;
            level += 1;
        }

        Self { n_leaves: n, nodes }
    }

    /// Number of real (non-padding) leaves.
    #[must_use]
    pub const fn leaf_count(&self) -> u64 {
        self.n_leaves
    }

    /// Total number of nodes, padding included.
    #[must_use]
    pub fn node_count(&self) -> u64 {
        (self.nodes.len() / HASH_SIZE) as u64
    }

    /// The tree root.
    #[must_use]
    pub fn root(&self) -> Hash {
        read_node(&self.nodes, self.node_count() - 1)
    }

    /// Extracts the authentication path for leaf `index`: the sibling hash
    /// at every level from the leaves up, concatenated.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::IndexOutOfRange`] when `index` is not a real
    /// leaf.
    pub fn authentication_path(&self, index: u64) -> Result<Vec<u8>, TreeError> {
        if index >= self.n_leaves.max(1) {
            return Err(TreeError::IndexOutOfRange {
                index,
                limit: self.n_leaves.max(1),
            });
        }

        let width = leaf_width(self.n_leaves);
        let mut path = Vec::with_capacity((width.trailing_zeros() as usize) * HASH_SIZE);
        let mut level_base = 0u64;
        let mut level_width = width;
        let mut cursor = index;
        while level_width > 1 {
            let sibling = read_node(&self.nodes, level_base + (cursor ^ 1));
            path.extend_from_slice(&sibling);
            level_base += level_width;
            level_width /= 2;
            cursor /= 2;
        }
        Ok(path)
    }

    /// Encodes the `tree` artifact: leaf count, then all nodes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(8 + self.nodes.len());
        enc.u64(self.n_leaves);
        enc.bytes(&self.nodes);
        enc.into_bytes()
    }

    /// Decodes the `tree` artifact, checking the node buffer matches the
    /// leaf count exactly.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] for short or oversized node buffers.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(bytes);
        let n_leaves = dec.u64()?;
        let node_count = 2 * leaf_width(n_leaves) - 1;
        let nodes = dec.take((node_count * HASH_SIZE as u64) as usize)?.to_vec();
        dec.finish()?;
        Ok(Self { n_leaves, nodes })
    }
}

/// Recomputes the root from a leaf and its authentication path.
///
/// The tree width is reconstructed from the path length.
///
/// # Errors
///
/// Returns [`TreeError::PathLengthMismatch`] for paths that are not a whole
/// number of hashes (or deeper than 63 levels), and
/// [`TreeError::IndexOutOfRange`] when `index` does not fit the implied
/// width.
pub fn compute_root(
    batch_number: u32,
    index: u64,
    path: &[u8],
    abridged_assertion: &[u8],
) -> Result<Hash, TreeError> {
    if path.len() % HASH_SIZE != 0 {
        return Err(TreeError::PathLengthMismatch { length: path.len() });
    }
    let height = path.len() / HASH_SIZE;
    if height > 63 {
        return Err(TreeError::PathLengthMismatch { length: path.len() });
    }
    let width = 1u64 << height;
    if index >= width {
        return Err(TreeError::IndexOutOfRange {
            index,
            limit: width,
        });
    }

    let mut hash = leaf_hash(batch_number, index, abridged_assertion);
    let mut cursor = index;
    for (step, sibling_bytes) in path.chunks_exact(HASH_SIZE).enumerate() {
        let mut sibling = [0u8; HASH_SIZE];
        sibling.copy_from_slice(sibling_bytes);
        let level = (step + 1) as u8;
        let parent = cursor / 2;
        hash = if cursor % 2 == 0 {
            internal_hash(batch_number, level, parent, &hash, &sibling)
        } else {
            internal_hash(batch_number, level, parent, &sibling, &hash)
        };
        cursor = parent;
    }
    Ok(hash)
}

/// Leaf-level width: the leaf count rounded up to a power of two, with a
/// minimum of one so empty batches still root a single empty leaf.
const fn leaf_width(n_leaves: u64) -> u64 {
    let n = if n_leaves == 0 { 1 } else { n_leaves };
    n.next_power_of_two()
}

fn write_node(nodes: &mut [u8], position: u64, hash: &Hash) {
    let at = (position * HASH_SIZE as u64) as usize;
    nodes[at..at + HASH_SIZE].copy_from_slice(hash);
}

fn read_node(nodes: &[u8], position: u64) -> Hash {
    let at = (position * HASH_SIZE as u64) as usize;
    let mut hash = [0u8; HASH_SIZE];
    hash.copy_from_slice(&nodes[at..at + HASH_SIZE]);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("leaf-{i}").into_bytes()).collect()
    }

    #[test]
    fn empty_batch_roots_single_empty_leaf() {
        let tree = Tree::build(0, &leaves(0));
        assert_eq!(tree.leaf_count(), 0);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.root(), empty_leaf_hash(0, 0));
    }

    #[test]
    fn node_count_follows_padding_rule() {
        for (n, expect) in [(1usize, 1u64), (2, 3), (3, 7), (4, 7), (5, 15)] {
            let tree = Tree::build(7, &leaves(n));
            assert_eq!(tree.node_count(), expect, "n = {n}");
        }
    }

    #[test]
    fn root_invariance_for_all_leaves() {
        for n in 0..=9usize {
            let batch = 3;
            let items = leaves(n);
            let tree = Tree::build(batch, &items);
            for (i, leaf) in items.iter().enumerate() {
                let path = tree.authentication_path(i as u64).unwrap();
                let root = compute_root(batch, i as u64, &path, leaf).unwrap();
                assert_eq!(root, tree.root(), "n = {n}, i = {i}");
            }
        }
    }

    #[test]
    fn domain_separation_binds_batch_and_position() {
        let value = b"same-bytes";
        assert_ne!(leaf_hash(0, 0, value), leaf_hash(1, 0, value));
        assert_ne!(leaf_hash(0, 0, value), leaf_hash(0, 1, value));
        assert_ne!(leaf_hash(0, 0, value), empty_leaf_hash(0, 0));
        assert_ne!(empty_leaf_hash(0, 0), empty_leaf_hash(0, 1));
    }

    #[test]
    fn tampered_path_changes_root() {
        let items = leaves(4);
        let tree = Tree::build(0, &items);
        let mut path = tree.authentication_path(2).unwrap();
        path[0] ^= 0x01;
        let root = compute_root(0, 2, &path, &items[2]).unwrap();
        assert_ne!(root, tree.root());
    }

    #[test]
    fn path_length_must_be_whole_hashes() {
        assert_eq!(
            compute_root(0, 0, &[0u8; 31], b"leaf").unwrap_err(),
            TreeError::PathLengthMismatch { length: 31 }
        );
    }

    #[test]
    fn index_must_fit_reconstructed_width() {
        // A 2-hash path implies width 4.
        assert_eq!(
            compute_root(0, 4, &[0u8; 64], b"leaf").unwrap_err(),
            TreeError::IndexOutOfRange { index: 4, limit: 4 }
        );
    }

    #[test]
    fn authentication_path_rejects_padding_indices() {
        let tree = Tree::build(0, &leaves(3));
        assert!(tree.authentication_path(2).is_ok());
        assert_eq!(
            tree.authentication_path(3).unwrap_err(),
            TreeError::IndexOutOfRange { index: 3, limit: 3 }
        );
    }

    #[test]
    fn artifact_round_trip() {
        let tree = Tree::build(2, &leaves(5));
        let bytes = tree.to_bytes();
        assert_eq!(Tree::from_bytes(&bytes).unwrap(), tree);

        let mut truncated = bytes.clone();
        truncated.pop();
        assert!(matches!(
            Tree::from_bytes(&truncated),
            Err(CodecError::Truncated { .. })
        ));

        let mut extended = bytes;
        extended.push(0);
        assert!(matches!(
            Tree::from_bytes(&extended),
            Err(CodecError::TrailingGarbage { .. })
        ));
    }

    #[test]
    fn construction_is_deterministic() {
        let a = Tree::build(1, &leaves(6));
        let b = Tree::build(1, &leaves(6));
        assert_eq!(a.to_bytes(), b.to_bytes());
    }
}
