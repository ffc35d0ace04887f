//! Sized Bloom filter used to deduplicate discovered URLs per site.
//!
//! The filter is sized once from `(max_entries, probability)` and only ever
//! gains bits. It is persisted next to its site as `(m, k, words)`.

use crate::error::{Result, SiteCrawlError};

/// Largest filter accepted, in bits (512 MiB of words).
pub const MAX_BITS: u64 = 1 << 32;

/// Probabilistic set of already-seen URLs.
///
/// `test` may return a false positive, never a false negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    m: u64,
    k: u32,
    words: Vec<u64>,
}

impl BloomFilter {
    /// Size a filter for `max_entries` items at the given false positive rate.
    ///
    /// Sizes above [`MAX_BITS`] are rejected before anything is allocated.
    pub fn with_capacity(max_entries: u64, probability: f64) -> Result<Self> {
        if max_entries == 0 {
            return Err(SiteCrawlError::validation("maxEntries must be positive"));
        }
        if !(probability > 0.0 && probability < 1.0) {
            return Err(SiteCrawlError::validation(format!(
                "probability must be in (0, 1), got {probability}"
            )));
        }

        let n = max_entries as f64;
        let ln2 = std::f64::consts::LN_2;
        let bits = (-(n * probability.ln()) / (ln2 * ln2)).ceil().max(64.0);
        if !bits.is_finite() || bits > MAX_BITS as f64 {
            return Err(SiteCrawlError::validation(format!(
                "dedup filter for {max_entries} entries at p={probability} needs {bits} bits, \
                 above the {MAX_BITS} bit limit"
            )));
        }
        let m = bits as u64;
        let k = ((m as f64 / n) * ln2).round().clamp(1.0, f64::from(u32::MAX)) as u32;

        Ok(Self {
            m,
            k,
            words: vec![0; m.div_ceil(64) as usize],
        })
    }

    /// Rebuild a filter from its persisted parts.
    pub fn from_parts(m: u64, k: u32, bytes: &[u8]) -> Result<Self> {
        let expected = m.div_ceil(64) as usize * 8;
        if m == 0 || k == 0 || bytes.len() != expected {
            return Err(SiteCrawlError::Storage(format!(
                "corrupt bloom filter: m={m} k={k} bytes={}",
                bytes.len()
            )));
        }
        let words = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                u64::from_le_bytes(buf)
            })
            .collect();
        Ok(Self { m, k, words })
    }

    /// Number of bits.
    pub fn bit_count(&self) -> u64 {
        self.m
    }

    /// Number of hash functions.
    pub fn hash_count(&self) -> u32 {
        self.k
    }

    /// Little-endian serialization of the bit words.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// Whether `item` may have been added before.
    pub fn test(&self, item: &str) -> bool {
        self.indexes(item.as_bytes()).all(|idx| {
            let (word, mask) = locate(idx);
            self.words[word] & mask != 0
        })
    }

    /// Record `item`. Returns `true` if any bit changed.
    pub fn add(&mut self, item: &str) -> bool {
        let indexes: Vec<u64> = self.indexes(item.as_bytes()).collect();
        let mut changed = false;
        for idx in indexes {
            let (word, mask) = locate(idx);
            if self.words[word] & mask == 0 {
                self.words[word] |= mask;
                changed = true;
            }
        }
        changed
    }

    // Kirsch–Mitzenmacher double hashing: h1 + i·h2.
    fn indexes(&self, data: &[u8]) -> impl Iterator<Item = u64> + use<> {
        let h1 = mix_hash(data, HASH_SEEDS[0]);
        let h2 = mix_hash(data, HASH_SEEDS[1]) | 1;
        let m = self.m;
        (0..u64::from(self.k)).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
    }
}

fn locate(idx: u64) -> (usize, u64) {
    ((idx / 64) as usize, 1u64 << (idx % 64))
}

const HASH_SEEDS: [u64; 2] = [0x517c_c1b7_2722_0a95, 0x9e37_79b1_85eb_ca87];

fn mix_hash(data: &[u8], seed: u64) -> u64 {
    let mut hash = seed ^ data.len() as u64;
    for &byte in data {
        hash ^= u64::from(byte).wrapping_mul(0x1000_0000_01b3);
        hash = hash.rotate_left(13).wrapping_mul(0xff51_afd7_ed55_8ccd);
    }
    hash ^ (hash >> 33)
}
