//! Bloom prefilter over indexed domains.
//!
//! Sized from the expected element count at a 1e-3 false-positive target.
//! Double hashing: `h_i = h1 + i*h2 mod m`, with FNV-1a as `h1` and a
//! Murmur-style 64-bit finalizer of it as `h2`.
//!
//! Keys are the *reversed-label* rendering of a domain (`example.com` is
//! keyed as `com.example`). A lookup then extends one running FNV state
//! label by label and probes at every boundary, so a query hits the filter
//! whenever any of its ancestor suffixes was indexed. That keeps the filter
//! sound for wildcard rules: a Bloom reject implies a trie reject.

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Bits per element for a 1e-3 false-positive rate: -ln(p)/ln(2)^2 ~= 14.38.
const BITS_PER_ELEMENT_MILLI: u64 = 14_378;
/// Probe count for that rate: ln(2) * bits-per-element ~= 10.
const NUM_PROBES: u32 = 10;

/// Fixed-size bit array with double-hashed probes.
#[derive(Debug)]
pub struct BloomFilter {
    words: Box<[u64]>,
    num_bits: u64,
}

impl BloomFilter {
    /// Size the filter for `expected` elements at the 1e-3 target.
    pub fn with_capacity(expected: usize) -> Self {
        let expected = expected.max(1) as u64;
        let num_bits = (expected * BITS_PER_ELEMENT_MILLI / 1000).max(64);
        let words = vec![0u64; num_bits.div_ceil(64) as usize];
        Self {
            words: words.into_boxed_slice(),
            num_bits,
        }
    }

    /// Insert a key given its FNV-1a state.
    pub fn insert_hash(&mut self, h1: u64) {
        let h2 = probe_stride(h1, self.num_bits);
        let mut bit = h1 % self.num_bits;
        for _ in 0..NUM_PROBES {
            self.words[(bit / 64) as usize] |= 1 << (bit % 64);
            bit = (bit + h2) % self.num_bits;
        }
    }

    /// Test a key given its FNV-1a state. `false` is definite absence.
    pub fn contains_hash(&self, h1: u64) -> bool {
        let h2 = probe_stride(h1, self.num_bits);
        let mut bit = h1 % self.num_bits;
        for _ in 0..NUM_PROBES {
            if self.words[(bit / 64) as usize] & (1 << (bit % 64)) == 0 {
                return false;
            }
            bit = (bit + h2) % self.num_bits;
        }
        true
    }

    /// Insert a byte-string key.
    pub fn insert(&mut self, key: &[u8]) {
        self.insert_hash(fnv1a(FNV_OFFSET, key));
    }

    /// Test a byte-string key.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.contains_hash(fnv1a(FNV_OFFSET, key))
    }

    /// Total bits in the filter.
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }
}

/// Second hash for double hashing, forced non-zero so probes always advance.
fn probe_stride(h1: u64, num_bits: u64) -> u64 {
    let h2 = fmix64(h1) % num_bits;
    h2.max(1)
}

/// Advance an FNV-1a state over `bytes`.
pub fn fnv1a(mut state: u64, bytes: &[u8]) -> u64 {
    for &b in bytes {
        state ^= u64::from(b);
        state = state.wrapping_mul(FNV_PRIME);
    }
    state
}

/// MurmurHash3 64-bit finalizer.
fn fmix64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}

/// Running FNV state over a domain's labels in reverse order.
///
/// Feeding `com`, then `example`, then `www` yields the states for the keys
/// `com`, `com.example` and `com.example.www` without rehashing prefixes.
#[derive(Debug, Clone, Copy)]
pub struct SuffixHasher {
    state: u64,
    first: bool,
}

impl SuffixHasher {
    /// Fresh state, no labels fed yet.
    pub const fn new() -> Self {
        Self {
            state: FNV_OFFSET,
            first: true,
        }
    }

    /// Feed the next label (in TLD-first order); returns the state for the
    /// suffix ending at this label.
    pub fn feed_label(&mut self, label: &str) -> u64 {
        if self.first {
            self.first = false;
        } else {
            self.state = fnv1a(self.state, b".");
        }
        self.state = fnv1a(self.state, label.as_bytes());
        self.state
    }
}

impl Default for SuffixHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a full domain name into its reversed-label key state.
pub fn domain_key_hash(name: &str) -> u64 {
    let mut hasher = SuffixHasher::new();
    let mut state = FNV_OFFSET;
    for label in name.rsplit('.') {
        state = hasher.feed_label(label);
    }
    state
}
