//! Merkle signature scheme: many signatures from one-time keys.
//!
//! ```text
//!             root  ←  public key / address
//!            /    \
//!          n4      n5
//!         /  \    /  \
//!       l0   l1  l2   l3   ← digests of WOTS public keys
//! ```
//!
//! The tree is stored flattened, leaves first, then each level above, so the
//! root is the last of its `2L - 1` slots and node `L + i` hashes slots `2i`
//! and `2i + 1`.
//!
//! Signing is stateful. Each call consumes the next leaf and the tree can sign
//! exactly `L` digests; after that every call fails with `KeyExhausted` and
//! the identity has to be replaced by a fresh tree.

use crate::crypto::{Address, CryptoError};
use crate::hash::{hash_concat, Hash};
use crate::wots::{self, OneTimeSig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default tree height. 2^10 = 1024 signatures per address.
pub const DEFAULT_HEIGHT: u32 = 10;

/// Max supported height. 2^20 ≈ 1M leaves.
pub const MAX_HEIGHT: u32 = 20;

pub type Result<T> = std::result::Result<T, CryptoError>;

/// The MSS secret key: hash tree, WOTS leaves and the next unused leaf.
///
/// Not `Clone`; two copies would sign with the same one-time leaves.
///
/// ```compile_fail
/// let tree = wotschain_core::MerkleSigTree::generate(1).unwrap();
/// let copy = tree.clone();
/// ```
#[derive(Serialize, Deserialize)]
#[serde(try_from = "TreeRecord")]
pub struct MerkleSigTree {
    hash_tree: Vec<Hash>,
    leaves: Vec<OneTimeSig>,
    traversal_index: usize,
}

/// An MSS signature over a digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MssSignature {
    /// Leaf that produced the signature.
    pub index: u64,
    /// WOTS signature by that leaf.
    pub ots_signature: Vec<Hash>,
    /// WOTS public key of that leaf.
    pub ots_public_key: Vec<Hash>,
    /// Sibling digests from the leaf up to the root.
    pub auth_path: Vec<Hash>,
}

impl MerkleSigTree {
    /// Generate `2^height` WOTS leaves and the tree above them.
    pub fn generate(height: u32) -> Result<Self> {
        if height == 0 || height > MAX_HEIGHT {
            return Err(CryptoError::InvalidTreeHeight(height));
        }

        let capacity = 1usize << height;
        let leaves: Vec<OneTimeSig> = (0..capacity).map(|_| OneTimeSig::generate()).collect();

        let mut hash_tree = Vec::with_capacity(2 * capacity - 1);
        hash_tree.extend(leaves.iter().map(OneTimeSig::public_key_digest));
        for i in 0..capacity - 1 {
            let node = hash_concat(&[hash_tree[2 * i].as_ref(), hash_tree[2 * i + 1].as_ref()]);
            hash_tree.push(node);
        }

        Ok(Self {
            hash_tree,
            leaves,
            traversal_index: 0,
        })
    }

    /// The root digest, which is the signer's address.
    pub fn public_key(&self) -> Address {
        Address::from(self.root())
    }

    fn root(&self) -> Hash {
        self.hash_tree[self.hash_tree.len() - 1]
    }

    /// Tree height (`log2` of the leaf count).
    pub fn height(&self) -> u32 {
        self.leaves.len().trailing_zeros()
    }

    /// Total number of signatures this tree can produce.
    pub fn capacity(&self) -> usize {
        self.leaves.len()
    }

    /// Next leaf to be consumed.
    pub fn traversal_index(&self) -> usize {
        self.traversal_index
    }

    /// Signatures left before exhaustion.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.traversal_index
    }

    pub fn is_exhausted(&self) -> bool {
        self.traversal_index >= self.capacity()
    }

    /// Sign a digest with the next unused leaf.
    pub fn sign(&mut self, digest: &Hash) -> Result<MssSignature> {
        if self.is_exhausted() {
            return Err(CryptoError::KeyExhausted(self.capacity()));
        }

        let leaf_index = self.traversal_index;
        let leaf = &self.leaves[leaf_index];
        let signature = MssSignature {
            index: leaf_index as u64,
            ots_signature: leaf.sign(digest),
            ots_public_key: leaf.public_key().to_vec(),
            auth_path: self.auth_path(leaf_index),
        };

        self.traversal_index += 1;
        Ok(signature)
    }

    /// Siblings of every node on the path from `leaf_index` to the root.
    fn auth_path(&self, leaf_index: usize) -> Vec<Hash> {
        let height = self.height() as usize;
        let mut path = Vec::with_capacity(height);
        let mut level_start = 0;
        let mut level_width = self.capacity();
        let mut node = leaf_index;

        for _ in 0..height {
            path.push(self.hash_tree[level_start + (node ^ 1)]);
            level_start += level_width;
            level_width >>= 1;
            node >>= 1;
        }
        path
    }
}

impl fmt::Debug for MerkleSigTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerkleSigTree")
            .field("address", &self.public_key())
            .field("height", &self.height())
            .field("traversal_index", &self.traversal_index)
            .finish()
    }
}

/// Serialized form of a key, checked before it becomes a `MerkleSigTree`.
#[derive(Deserialize)]
struct TreeRecord {
    hash_tree: Vec<Hash>,
    leaves: Vec<OneTimeSig>,
    traversal_index: usize,
}

impl TryFrom<TreeRecord> for MerkleSigTree {
    type Error = CryptoError;

    fn try_from(record: TreeRecord) -> Result<Self> {
        let capacity = record.leaves.len();
        if !capacity.is_power_of_two() || capacity < 2 || capacity.trailing_zeros() > MAX_HEIGHT {
            return Err(CryptoError::MalformedKey("leaf count is not a supported power of two"));
        }
        if record.hash_tree.len() != 2 * capacity - 1 {
            return Err(CryptoError::MalformedKey("hash tree size does not match leaf count"));
        }
        if record.traversal_index > capacity {
            return Err(CryptoError::MalformedKey("traversal index beyond leaf count"));
        }
        if !record.leaves.iter().all(OneTimeSig::is_well_formed) {
            return Err(CryptoError::MalformedKey("WOTS leaf with wrong chain count"));
        }

        Ok(Self {
            hash_tree: record.hash_tree,
            leaves: record.leaves,
            traversal_index: record.traversal_index,
        })
    }
}

impl MssSignature {
    /// Verify this signature against a signer's address.
    pub fn verify(&self, signer: &Address, digest: &Hash) -> Result<()> {
        verify(self, signer, digest)
    }
}

/// Verify an MSS signature: the WOTS signature first, then the path to the root.
pub fn verify(signature: &MssSignature, signer: &Address, digest: &Hash) -> Result<()> {
    let height = signature.auth_path.len();
    if height == 0 || height > MAX_HEIGHT as usize {
        return Err(CryptoError::MalformedSignature("authentication path length"));
    }
    if signature.index >= 1u64 << height {
        return Err(CryptoError::MalformedSignature("leaf index outside the tree"));
    }

    wots::verify(&signature.ots_signature, &signature.ots_public_key, digest)?;

    let mut node = wots::public_key_digest(&signature.ots_public_key);
    for (level, sibling) in signature.auth_path.iter().enumerate() {
        node = if (signature.index >> level) & 1 == 0 {
            hash_concat(&[node.as_ref(), sibling.as_ref()])
        } else {
            hash_concat(&[sibling.as_ref(), node.as_ref()])
        };
    }

    if node == signer.as_hash() {
        Ok(())
    } else {
        Err(CryptoError::InvalidSignature)
    }
}
