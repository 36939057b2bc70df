//! Per-layer UHASH subkeys.
//!
//! One master key feeds four independent streams, one per hash layer.  The
//! byte length of every stream grows linearly with the number of 32-bit
//! iterations a tag length needs, and the streams are always read from the
//! start, so the subkeys of a short tag are a prefix of those of a longer tag.

use serde::Serialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::BlockCipher;
use crate::field::{P128, P64};
use crate::kdf::{Kdf, StreamIndex};
use crate::DeriveError;

/// Words of L1 key consumed by one NH block (1024 message bytes).
pub const L1_KEY_WORDS: usize = 256;

/// Extra L1 words per additional iteration (the Toeplitz shift of 16 bytes).
pub const L1_KEY_STRIDE_WORDS: usize = 4;

/// Bytes of L2 stream consumed per iteration: one 64-bit and one 128-bit key.
pub const L2_KEY_BYTES: usize = 24;

/// Mask applied to every 64-bit half of an L2 key.
///
/// Keeps bits `[0, 25)` and `[32, 57)`, so each masked word is below
/// `2^57 < P64 = 2^64 - 59` and a pair of them is below `P128 = 2^128 - 159`.
pub const L2_KEY_MASK: u64 = 0x01FF_FFFF_01FF_FFFF;

/// The L3 prime, `2^36 - 5`.  Every L3 multiplier is reduced modulo this.
pub const L3_PRIME: u64 = (1 << 36) - 5;

/// Number of L3 multipliers consumed per iteration.
pub const L3_KEYS_PER_ITER: usize = 8;

const _: () = assert!(L2_KEY_MASK < P64 && (L2_KEY_MASK as u128) << 64 < P128);

/// One of the four supported UMAC tag lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TagLength {
    /// 32-bit tag.
    Bits32,
    /// 64-bit tag.
    Bits64,
    /// 96-bit tag.
    Bits96,
    /// 128-bit tag.
    Bits128,
}

impl TagLength {
    /// All variants in ascending order.
    pub const ALL: [TagLength; 4] = [
        TagLength::Bits32,
        TagLength::Bits64,
        TagLength::Bits96,
        TagLength::Bits128,
    ];

    /// Parses a tag length given in bits.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::UnsupportedTagLength`] for anything other than
    /// 32, 64, 96 or 128.
    pub fn from_bits(bits: u32) -> Result<Self, DeriveError> {
        match bits {
            32 => Ok(TagLength::Bits32),
            64 => Ok(TagLength::Bits64),
            96 => Ok(TagLength::Bits96),
            128 => Ok(TagLength::Bits128),
            other => Err(DeriveError::UnsupportedTagLength(other)),
        }
    }

    /// Tag length in bits.
    pub const fn bits(self) -> u32 {
        match self {
            TagLength::Bits32 => 32,
            TagLength::Bits64 => 64,
            TagLength::Bits96 => 96,
            TagLength::Bits128 => 128,
        }
    }

    /// Tag length in bytes.
    pub const fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Number of 32-bit hash iterations (`bits / 32`).
    pub const fn iters(self) -> usize {
        self.bits() as usize / 32
    }

    /// Number of L1 key words: `256 + (iters - 1) * 4`.
    pub const fn l1_words(self) -> usize {
        L1_KEY_WORDS + (self.iters() - 1) * L1_KEY_STRIDE_WORDS
    }
}

/// One L2 key: a 64-bit polynomial key plus a 128-bit one, both masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Zeroize)]
pub struct L2Key {
    /// Key for the 64-bit polynomial hash.
    pub k64: u64,
    /// Key for the 128-bit polynomial hash, most significant word first.
    pub k128: [u64; 2],
}

impl L2Key {
    fn from_chunk(chunk: &[u8]) -> Self {
        let k64 = be_u64(&chunk[0..8]) & L2_KEY_MASK;
        let hi = be_u64(&chunk[8..16]) & L2_KEY_MASK;
        let lo = be_u64(&chunk[16..24]) & L2_KEY_MASK;
        L2Key {
            k64,
            k128: [hi, lo],
        }
    }

    /// Returns the 128-bit key as a single integer.
    pub fn k128_value(&self) -> u128 {
        (u128::from(self.k128[0]) << 64) | u128::from(self.k128[1])
    }
}

/// Complete key material for one tag length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Zeroize, ZeroizeOnDrop)]
pub struct SubkeySet {
    #[zeroize(skip)]
    tag: TagLength,
    /// L1 (NH) key words.
    pub l1: Vec<u32>,
    /// L2 polynomial keys, one per iteration.
    pub l2: Vec<L2Key>,
    /// L3 multipliers, eight per iteration, each below [`L3_PRIME`].
    pub l3a: Vec<u64>,
    /// L3 whitening words, one per iteration.
    pub l3b: Vec<u32>,
}

impl SubkeySet {
    /// Tag length this key set was derived for.
    pub fn tag(&self) -> TagLength {
        self.tag
    }

    /// The eight L3 multipliers used by iteration `iter`, or `None` when
    /// `iter` is not below `self.tag().iters()`.
    pub fn l3a_for(&self, iter: usize) -> Option<&[u64; L3_KEYS_PER_ITER]> {
        let start = iter.checked_mul(L3_KEYS_PER_ITER)?;
        let keys = self.l3a.get(start..start.checked_add(L3_KEYS_PER_ITER)?)?;
        keys.try_into().ok()
    }
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(bytes);
    u64::from_be_bytes(word)
}

fn be_u32(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    u32::from_be_bytes(word)
}

impl<C: BlockCipher> Kdf<C> {
    /// Derives the subkeys for one tag length.
    ///
    /// # Errors
    ///
    /// Propagates cipher failures.
    pub fn subkeys(&self, tag: TagLength) -> Result<SubkeySet, DeriveError> {
        let iters = tag.iters();

        let l1 = self
            .derive(StreamIndex::LAYER1, 4 * tag.l1_words())?
            .chunks_exact(4)
            .map(be_u32)
            .collect();

        let l2 = self
            .derive(StreamIndex::LAYER2, iters * L2_KEY_BYTES)?
            .chunks_exact(L2_KEY_BYTES)
            .map(L2Key::from_chunk)
            .collect();

        let l3a = self
            .derive(StreamIndex::LAYER3A, iters * L3_KEYS_PER_ITER * 8)?
            .chunks_exact(8)
            .map(|chunk| be_u64(chunk) % L3_PRIME)
            .collect();

        let l3b = self
            .derive(StreamIndex::LAYER3B, iters * 4)?
            .chunks_exact(4)
            .map(be_u32)
            .collect();

        Ok(SubkeySet {
            tag,
            l1,
            l2,
            l3a,
            l3b,
        })
    }

    /// Derives the subkeys for every tag length, shortest first.
    pub fn subkeys_all(&self) -> Result<Vec<SubkeySet>, DeriveError> {
        TagLength::ALL.iter().map(|&tag| self.subkeys(tag)).collect()
    }
}
