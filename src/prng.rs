//! Reproducible operand generator for differential testing.
//!
//! Each 32-byte refill is one domain-separated BLAKE2b-256 digest of the seed
//! and a counter, split into two 128-bit operands.  Because pair `i` depends
//! only on `(seed, i)`, a parallel sweep can regenerate exactly the pairs the
//! sequential harness would have drawn, and any failure is replayable from
//! the logged seed.

use blake2::digest::{consts::U32, Digest};

type Blake2b256 = blake2::Blake2b<U32>;

const OPERAND_DOMAIN: &[u8] = b"UMAC_MULMOD_OPERANDS";

fn expand(seed: u64, counter: u64) -> (u128, u128) {
    let mut hasher = Blake2b256::new();
    hasher.update(OPERAND_DOMAIN);
    hasher.update(seed.to_be_bytes());
    hasher.update(counter.to_be_bytes());
    let digest = hasher.finalize();
    let mut a = [0u8; 16];
    let mut b = [0u8; 16];
    a.copy_from_slice(&digest[..16]);
    b.copy_from_slice(&digest[16..]);
    (u128::from_be_bytes(a), u128::from_be_bytes(b))
}

/// A deterministic stream of uniformly distributed 128-bit operand pairs.
#[derive(Debug, Clone)]
pub struct OperandStream {
    seed: u64,
    counter: u64,
}

impl OperandStream {
    /// Creates a stream from `seed`.
    pub fn new(seed: u64) -> Self {
        Self { seed, counter: 0 }
    }

    /// Returns the seed this stream was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the pair at position `index` without advancing any stream.
    pub fn pair_at(seed: u64, index: u64) -> (u128, u128) {
        expand(seed, index)
    }

    /// Advances the stream and returns the next operand pair.
    pub fn next_pair(&mut self) -> (u128, u128) {
        let pair = expand(self.seed, self.counter);
        self.counter = self.counter.wrapping_add(1);
        pair
    }
}

impl Iterator for OperandStream {
    type Item = (u128, u128);

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_pair())
    }
}

#[cfg(test)]
mod tests {
    use super::OperandStream;

    #[test]
    fn test_stream_is_reproducible() {
        let a: Vec<_> = OperandStream::new(7).take(16).collect();
        let b: Vec<_> = OperandStream::new(7).take(16).collect();
        assert_eq!(a, b);
        let c: Vec<_> = OperandStream::new(8).take(16).collect();
        assert_ne!(a, c);
    }

    #[test]
    fn test_random_access_matches_sequence() {
        let mut stream = OperandStream::new(42);
        for index in 0..10 {
            assert_eq!(stream.next_pair(), OperandStream::pair_at(42, index));
        }
    }

    #[test]
    fn test_operands_use_full_width() {
        let high = OperandStream::new(1)
            .take(64)
            .flat_map(|(a, b)| [a, b])
            .filter(|v| v >> 127 == 1)
            .count();
        assert!(high > 0 && high < 128);
    }
}
