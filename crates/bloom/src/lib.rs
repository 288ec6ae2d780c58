//! # Bloom Filter
//!
//! A space-efficient probabilistic data structure for set membership testing.
//!
//! A bloom filter can tell you with certainty that a key is **not** in the set
//! (no false negatives), but may occasionally report that a key **is** in the
//! set when it isn't (false positives).
//!
//! ## Usage in StrataKV
//!
//! Every table embeds a filter built from its keys. A point lookup asks the
//! filter first; a "not present" answer skips the table without touching its
//! summary, index or data zones.
//!
//! ## Hash Functions
//!
//! The filter owns `k` independent hash functions. Function `i` is FNV-1a 64
//! run over its own 8-byte seed followed by the key, so the functions survive
//! serialization as nothing more than their seeds.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(1000, 0.01);
//! bf.insert(b"hello");
//! assert!(bf.may_contain(b"hello"));
//! ```
use std::io::{self, Read, Write};

/// Safety cap: a serialized filter never exceeds 128 MiB.
const MAX_BLOOM_BYTES: usize = 128 * 1024 * 1024;
/// Upper bound on hash functions accepted from disk.
const MAX_HASHES: usize = 64;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const SEED_STEP: u64 = 0x9e37_79b9_7f4a_7c15;

/// A bloom filter backed by an MSB-first bit vector and `k` seeded hashes.
pub struct BloomFilter {
    /// The bit vector; bit `i` lives at `bits[i / 8] & (0x80 >> (i % 8))`.
    bits: Vec<u8>,
    /// Number of bits in the filter (m).
    num_bits: u32,
    /// Element count the filter was sized for (n).
    expected_items: u32,
    /// One seed per hash function; `seeds.len()` is k.
    seeds: Vec<[u8; 8]>,
}

impl BloomFilter {
    /// Creates a new bloom filter sized for `expected_items` with the given
    /// target `false_positive_rate`.
    ///
    /// `m = ceil(n * |ln p| / ln(2)^2)` and `k = ceil(m / n * ln 2)`.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in `(0, 1)`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        let n = expected_items as f64;
        let m = (n * false_positive_rate.ln().abs() / std::f64::consts::LN_2.powi(2)).ceil();
        let num_bits = (m as u32).max(8);

        let k = ((num_bits as f64 / n) * std::f64::consts::LN_2).ceil() as usize;
        let k = k.clamp(1, MAX_HASHES);

        let seeds = (1..=k as u64)
            .map(|i| i.wrapping_mul(SEED_STEP).to_be_bytes())
            .collect();

        Self {
            bits: vec![0u8; (num_bits as usize + 7) / 8],
            num_bits,
            expected_items: expected_items as u32,
            seeds,
        }
    }

    /// Inserts a key into the bloom filter.
    pub fn insert(&mut self, key: &[u8]) {
        for i in 0..self.seeds.len() {
            let idx = self.bit_index(i, key);
            self.bits[idx / 8] |= 0x80 >> (idx % 8);
        }
    }

    /// Returns `true` if the key **might** be in the set, `false` if it is
    /// **definitely not** in the set.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        (0..self.seeds.len()).all(|i| {
            let idx = self.bit_index(i, key);
            self.bits[idx / 8] & (0x80 >> (idx % 8)) != 0
        })
    }

    /// Returns the number of bits in the filter.
    #[must_use]
    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    /// Returns the number of hash functions.
    #[must_use]
    pub fn num_hashes(&self) -> usize {
        self.seeds.len()
    }

    /// Returns the element count the filter was sized for.
    #[must_use]
    pub fn expected_items(&self) -> u32 {
        self.expected_items
    }

    /// Returns the size of the serialized bloom filter in bytes.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        16 + self.bits.len() + self.seeds.iter().map(|s| 4 + s.len()).sum::<usize>()
    }

    /// Serializes the bloom filter to a writer.
    ///
    /// Wire format (all big-endian):
    /// ```text
    /// [k: u32][n: u32][m: u32][bits_len: u32][bits]
    /// k times: [seed_len: u32][seed]
    /// ```
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&(self.seeds.len() as u32).to_be_bytes())?;
        w.write_all(&self.expected_items.to_be_bytes())?;
        w.write_all(&self.num_bits.to_be_bytes())?;
        w.write_all(&(self.bits.len() as u32).to_be_bytes())?;
        w.write_all(&self.bits)?;
        for seed in &self.seeds {
            w.write_all(&(seed.len() as u32).to_be_bytes())?;
            w.write_all(seed)?;
        }
        Ok(())
    }

    /// Deserializes a bloom filter from a reader.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let num_hashes = read_u32(r)? as usize;
        let expected_items = read_u32(r)?;
        let num_bits = read_u32(r)?;
        let bits_len = read_u32(r)? as usize;

        if bits_len > MAX_BLOOM_BYTES {
            return Err(invalid(format!("bloom filter too large: {bits_len} bytes")));
        }
        if num_hashes == 0 || num_hashes > MAX_HASHES {
            return Err(invalid(format!("bad hash function count {num_hashes}")));
        }
        if num_bits == 0 || (num_bits as usize + 7) / 8 != bits_len {
            return Err(invalid(format!(
                "bit count {num_bits} does not match {bits_len} bytes"
            )));
        }

        let mut bits = vec![0u8; bits_len];
        r.read_exact(&mut bits)?;

        let mut seeds = Vec::with_capacity(num_hashes);
        for _ in 0..num_hashes {
            let len = read_u32(r)? as usize;
            if len != 8 {
                return Err(invalid(format!("unsupported seed length {len}")));
            }
            let mut seed = [0u8; 8];
            r.read_exact(&mut seed)?;
            seeds.push(seed);
        }

        Ok(Self {
            bits,
            num_bits,
            expected_items,
            seeds,
        })
    }

    // ---- Internal helpers ----

    fn bit_index(&self, i: usize, key: &[u8]) -> usize {
        let h = fnv1a_64(FNV_OFFSET_BASIS, &self.seeds[i]);
        (fnv1a_64(h, key) % self.num_bits as u64) as usize
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.seeds.len())
            .field("expected_items", &self.expected_items)
            .finish()
    }
}

/// FNV-1a 64-bit hash continuing from `state`.
fn fnv1a_64(state: u64, data: &[u8]) -> u64 {
    const FNV_PRIME: u64 = 0x00000100000001b3;
    let mut hash = state;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests;
