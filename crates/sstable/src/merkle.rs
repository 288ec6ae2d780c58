//! Merkle tree over a table's encoded entries.
//!
//! ```text
//!                root
//!              /      \
//!          h(01)       h(2e)
//!          /   \       /   \
//!       h(e0) h(e1) h(e2)  h("")   <- an odd node is paired with h("")
//! ```
//!
//! Node hashes are 128-bit XXH3. A parent hashes the big-endian bytes of its
//! two children concatenated. The root is stored as 32 lowercase hex digits.
use xxhash_rust::xxh3::xxh3_128;

#[derive(Debug, Default, Clone)]
pub struct MerkleTree {
    leaves: Vec<u128>,
}

impl MerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the next leaf (one encoded entry).
    pub fn add_leaf(&mut self, bytes: &[u8]) {
        self.leaves.push(xxh3_128(bytes));
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Root hash; an empty tree hashes the empty input.
    #[must_use]
    pub fn root(&self) -> u128 {
        if self.leaves.is_empty() {
            return xxh3_128(&[]);
        }
        let mut level = self.leaves.clone();
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).copied().unwrap_or_else(|| xxh3_128(&[]));
                    hash_pair(pair[0], right)
                })
                .collect();
        }
        level[0]
    }

    #[must_use]
    pub fn root_hex(&self) -> String {
        format!("{:032x}", self.root())
    }
}

fn hash_pair(left: u128, right: u128) -> u128 {
    let mut buf = [0u8; 32];
    buf[..16].copy_from_slice(&left.to_be_bytes());
    buf[16..].copy_from_slice(&right.to_be_bytes());
    xxh3_128(&buf)
}
