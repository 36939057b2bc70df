//! Counter-mode key derivation.
//!
//! A [`Kdf`] stretches one master key into any number of independent byte
//! streams.  Each stream is selected by a [`StreamIndex`]; block `i` of stream
//! `s` is the encryption of the 16-byte big-endian pair `(s, i)` under the
//! master key, with `i` counting from 1.

use std::fmt;

use crate::cipher::{Aes128Oracle, Block, BlockCipher, BLOCK_LEN};
use crate::DeriveError;

/// Tag selecting one logically distinct derived stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamIndex(u64);

impl StreamIndex {
    /// Stream keying the pad cipher.
    pub const PAD: StreamIndex = StreamIndex(0);
    /// Stream holding the L1 (NH) key.
    pub const LAYER1: StreamIndex = StreamIndex(1);
    /// Stream holding the L2 (polynomial) keys.
    pub const LAYER2: StreamIndex = StreamIndex(2);
    /// Stream holding the first L3 key (inner-product multipliers).
    pub const LAYER3A: StreamIndex = StreamIndex(3);
    /// Stream holding the second L3 key (output whitening words).
    pub const LAYER3B: StreamIndex = StreamIndex(4);

    /// Wraps an arbitrary stream number.
    pub const fn new(index: u64) -> Self {
        StreamIndex(index)
    }

    /// Returns the raw stream number.
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Builds the cipher input for block `counter` of stream `index`.
fn counter_block(index: StreamIndex, counter: u64) -> Block {
    let mut block = [0u8; BLOCK_LEN];
    block[..8].copy_from_slice(&index.0.to_be_bytes());
    block[8..].copy_from_slice(&counter.to_be_bytes());
    block
}

/// Key derivation function bound to one master key.
///
/// The master key is validated and expanded once at construction; only the
/// keyed cipher is retained.  All derivation methods take `&self` and are
/// pure, so a `Kdf` can be shared freely between threads.
#[derive(Clone)]
pub struct Kdf<C = Aes128Oracle> {
    cipher: C,
}

impl<C> fmt::Debug for Kdf<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kdf").finish_non_exhaustive()
    }
}

impl Kdf<Aes128Oracle> {
    /// Creates an AES-128 based derivation function.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::KeyLength`] unless `key` is exactly 16 bytes.
    pub fn aes128(key: &[u8]) -> Result<Self, DeriveError> {
        Self::new(key)
    }
}

impl<C: BlockCipher> Kdf<C> {
    /// Creates a derivation function over an arbitrary block cipher.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::KeyLength`] if `key` does not match
    /// `C::KEY_LEN`.
    pub fn new(key: &[u8]) -> Result<Self, DeriveError> {
        if key.len() != C::KEY_LEN {
            return Err(DeriveError::KeyLength {
                expected: C::KEY_LEN,
                actual: key.len(),
            });
        }
        Ok(Self {
            cipher: C::with_key(key)?,
        })
    }

    /// Derives `num_bytes` bytes of stream `index`.
    ///
    /// `num_bytes / 16 + 1` cipher blocks are always produced, so an exact
    /// multiple of the block size still costs one extra invocation; the
    /// accumulated output is then truncated.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::EmptyRequest`] for a zero length,
    /// [`DeriveError::RequestTooLarge`] when the block-rounded length cannot
    /// be allocated, and propagates cipher failures.
    pub fn derive(&self, index: StreamIndex, num_bytes: usize) -> Result<Vec<u8>, DeriveError> {
        if num_bytes == 0 {
            return Err(DeriveError::EmptyRequest);
        }
        let blocks = num_bytes / BLOCK_LEN + 1;
        let capacity = blocks
            .checked_mul(BLOCK_LEN)
            .filter(|&bytes| bytes <= isize::MAX as usize)
            .ok_or(DeriveError::RequestTooLarge(num_bytes))?;
        let mut out = Vec::with_capacity(capacity);
        for counter in 1..=blocks as u64 {
            let block = self.cipher.encrypt(&counter_block(index, counter))?;
            out.extend_from_slice(&block);
        }
        out.truncate(num_bytes);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::TagLength;
    use proptest::prelude::*;

    const KEY: &[u8] = b"abcdefghijklmnop";

    #[test]
    fn test_known_streams() {
        let kdf = Kdf::aes128(KEY).unwrap();
        assert_eq!(
            hex::encode(kdf.derive(StreamIndex::PAD, 16).unwrap()),
            "78dc489d32a9c8a132bb4b6832c5359e"
        );
        assert_eq!(
            hex::encode(kdf.derive(StreamIndex::LAYER1, 32).unwrap()),
            "acd79b4f6eda0d0e1625b60384f9fc93c6dfeca2964a710dad7ede4da1d3935e"
        );
    }

    #[test]
    fn test_counter_block_layout() {
        let block = counter_block(StreamIndex::new(0x0102), 7);
        assert_eq!(
            hex::encode(block),
            "00000000000001020000000000000007"
        );
    }

    #[test]
    fn test_streams_are_distinct() {
        let kdf = Kdf::aes128(KEY).unwrap();
        let a = kdf.derive(StreamIndex::LAYER2, 48).unwrap();
        let b = kdf.derive(StreamIndex::LAYER3A, 48).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_empty_request() {
        let kdf = Kdf::aes128(KEY).unwrap();
        assert_eq!(
            kdf.derive(StreamIndex::PAD, 0),
            Err(DeriveError::EmptyRequest)
        );
    }

    #[test]
    fn test_rejects_wrong_key_length() {
        let err = Kdf::aes128(b"short").unwrap_err();
        assert_eq!(
            err,
            DeriveError::KeyLength {
                expected: 16,
                actual: 5
            }
        );
    }

    #[test]
    fn test_rejects_unaddressable_request() {
        let kdf = Kdf::aes128(KEY).unwrap();
        assert_eq!(
            kdf.derive(StreamIndex::LAYER1, usize::MAX),
            Err(DeriveError::RequestTooLarge(usize::MAX))
        );
        let huge = isize::MAX as usize;
        assert_eq!(
            kdf.derive(StreamIndex::LAYER1, huge),
            Err(DeriveError::RequestTooLarge(huge))
        );
    }

    thread_local! {
        static SETUPS: Cell<usize> = Cell::new(0);
        static BLOCKS: Cell<usize> = Cell::new(0);
    }

    /// AES-128 that records how often it is keyed and invoked.
    struct CountingCipher(Aes128Oracle);

    impl BlockCipher for CountingCipher {
        const KEY_LEN: usize = 16;

        fn with_key(key: &[u8]) -> Result<Self, DeriveError> {
            SETUPS.with(|n| n.set(n.get() + 1));
            Aes128Oracle::with_key(key).map(CountingCipher)
        }

        fn encrypt(&self, block: &Block) -> Result<Block, DeriveError> {
            BLOCKS.with(|n| n.set(n.get() + 1));
            self.0.encrypt(block)
        }
    }

    #[test]
    fn test_key_schedule_built_once_per_key() {
        let kdf = Kdf::<CountingCipher>::new(KEY).unwrap();
        assert_eq!(SETUPS.with(Cell::get), 1);
        let l1 = kdf.derive(StreamIndex::LAYER1, 1072).unwrap();
        assert_eq!(SETUPS.with(Cell::get), 1);
        assert_eq!(BLOCKS.with(Cell::get), 68);
        assert_eq!(l1, Kdf::aes128(KEY).unwrap().derive(StreamIndex::LAYER1, 1072).unwrap());

        // One derived block for k2, one schedule for it, one pad block.
        kdf.pad(b"bcdefghi", TagLength::Bits128).unwrap();
        assert_eq!(SETUPS.with(Cell::get), 2);
        assert_eq!(BLOCKS.with(Cell::get), 68 + 2 + 1);
    }

    #[test]
    fn test_debug_hides_key() {
        let kdf = Kdf::aes128(KEY).unwrap();
        let rendered = format!("{kdf:?}");
        assert!(!rendered.contains("abcdefghijklmnop"));
        assert!(!rendered.contains("97, 98"));
    }

    proptest! {
        #[test]
        fn prop_derive_is_deterministic(
            key in proptest::array::uniform16(any::<u8>()),
            index in 0u64..8,
            len in 1usize..200,
        ) {
            let kdf = Kdf::aes128(&key).unwrap();
            let first = kdf.derive(StreamIndex::new(index), len).unwrap();
            let second = kdf.derive(StreamIndex::new(index), len).unwrap();
            prop_assert_eq!(first.len(), len);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_shorter_stream_is_prefix(
            key in proptest::array::uniform16(any::<u8>()),
            index in 0u64..8,
            short in 1usize..100,
            extra in 0usize..100,
        ) {
            let kdf = Kdf::aes128(&key).unwrap();
            let long = kdf.derive(StreamIndex::new(index), short + extra).unwrap();
            let head = kdf.derive(StreamIndex::new(index), short).unwrap();
            prop_assert_eq!(&long[..short], &head[..]);
        }
    }
}
