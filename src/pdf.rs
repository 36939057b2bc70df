//! Pad derivation from a nonce.
//!
//! The pad key `k2` is the first block of stream 0.  The pad is a prefix (or,
//! for 32- and 64-bit tags, an aligned slice) of `AES(k2, nonce ‖ 0*)`.
//!
//! Short tags fit several times into one cipher block.  Their low nonce bits
//! select the slice and are cleared before encryption, so up to four
//! consecutive nonces share a single block: a caller walking a counter nonce
//! can cache [`Kdf::pad_block`] and slice it.

use zeroize::Zeroizing;

use crate::cipher::{Block, BlockCipher, BLOCK_LEN};
use crate::kdf::{Kdf, StreamIndex};
use crate::subkeys::TagLength;
use crate::DeriveError;

/// Length of the nonce required by 32- and 64-bit tags.
pub const SHORT_TAG_NONCE_LEN: usize = 8;

/// Working nonce and slice position for one pad request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PadSelection {
    block: Block,
    sub_index: usize,
}

fn select(nonce: &[u8], tag: TagLength) -> Result<PadSelection, DeriveError> {
    let tag_bytes = tag.bytes();
    let mut block = [0u8; BLOCK_LEN];
    match tag {
        TagLength::Bits32 | TagLength::Bits64 => {
            if nonce.len() != SHORT_TAG_NONCE_LEN {
                return Err(DeriveError::NonceLength {
                    tag_bits: tag.bits(),
                    expected: "exactly 8 bytes",
                    actual: nonce.len(),
                });
            }
            let mut word = [0u8; 8];
            word.copy_from_slice(nonce);
            let n = u64::from_be_bytes(word);
            let divisor = (BLOCK_LEN / tag_bytes) as u64;
            let sub_index = n % divisor;
            block[..8].copy_from_slice(&(n ^ sub_index).to_be_bytes());
            Ok(PadSelection {
                block,
                sub_index: sub_index as usize,
            })
        }
        TagLength::Bits96 | TagLength::Bits128 => {
            if !fits_block(nonce) {
                return Err(DeriveError::NonceLength {
                    tag_bits: tag.bits(),
                    expected: "1 to 16 bytes",
                    actual: nonce.len(),
                });
            }
            block[..nonce.len()].copy_from_slice(nonce);
            Ok(PadSelection {
                block,
                sub_index: 0,
            })
        }
    }
}

fn fits_block(nonce: &[u8]) -> bool {
    (1..=BLOCK_LEN).contains(&nonce.len())
}

impl<C: BlockCipher> Kdf<C> {
    /// Derives the one-time pad for `nonce` at the given tag length.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::NonceLength`] if the nonce is not 8 bytes for
    /// a 32/64-bit tag, or not 1 to 16 bytes otherwise.
    pub fn pad(&self, nonce: &[u8], tag: TagLength) -> Result<Vec<u8>, DeriveError> {
        let selection = select(nonce, tag)?;
        let block = self.encrypt_pad_block(&selection.block)?;
        let width = tag.bytes();
        let start = selection.sub_index * width;
        Ok(block[start..start + width].to_vec())
    }

    /// Encrypts `nonce`, zero-padded on the right, under the pad key.
    ///
    /// No sub-block selection is applied: pass the nonce with its low bits
    /// already cleared to get the block shared by a group of short tags.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::BlockNonceLength`] if the nonce is empty or
    /// longer than one block.
    pub fn pad_block(&self, nonce: &[u8]) -> Result<Block, DeriveError> {
        if !fits_block(nonce) {
            return Err(DeriveError::BlockNonceLength(nonce.len()));
        }
        let mut block = [0u8; BLOCK_LEN];
        block[..nonce.len()].copy_from_slice(nonce);
        self.encrypt_pad_block(&block)
    }

    fn encrypt_pad_block(&self, block: &Block) -> Result<Block, DeriveError> {
        let k2 = Zeroizing::new(self.derive(StreamIndex::PAD, C::KEY_LEN)?);
        C::with_key(&k2)?.encrypt(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"abcdefghijklmnop";
    const NONCE: &[u8] = b"bcdefghi";

    fn kdf() -> Kdf {
        Kdf::aes128(KEY).unwrap()
    }

    #[test]
    fn test_fixture_pads() {
        let kdf = kdf();
        let pads: Vec<String> = TagLength::ALL
            .iter()
            .map(|&tag| hex::encode(kdf.pad(NONCE, tag).unwrap()))
            .collect();
        assert_eq!(
            pads,
            vec![
                "ae135f82",
                "d13745d4304f1842",
                "8ddcc1691aa6befbf01a2661",
                "8ddcc1691aa6befbf01a2661b7760af8",
            ]
        );
    }

    #[test]
    fn test_short_tags_slice_one_block() {
        let kdf = kdf();
        let block = kdf.pad_block(b"bcdefghh").unwrap();
        for (offset, last) in [0x68u8, 0x69, 0x6a, 0x6b].iter().enumerate() {
            let mut nonce = *b"bcdefghh";
            nonce[7] = *last;
            let pad = kdf.pad(&nonce, TagLength::Bits32).unwrap();
            assert_eq!(pad, block[offset * 4..offset * 4 + 4].to_vec());
        }
        let low = kdf.pad(b"bcdefghh", TagLength::Bits64).unwrap();
        let high = kdf.pad(b"bcdefghi", TagLength::Bits64).unwrap();
        assert_eq!(low, block[..8].to_vec());
        assert_eq!(high, block[8..].to_vec());
        assert_ne!(low, high);
    }

    #[test]
    fn test_sub_index_bits_wrap_per_tag() {
        // 'k' = 0x6b: index 3 of 4 for 32-bit tags, index 1 of 2 for 64-bit.
        let sel32 = select(b"bcdefghk", TagLength::Bits32).unwrap();
        let sel64 = select(b"bcdefghk", TagLength::Bits64).unwrap();
        assert_eq!(sel32.sub_index, 3);
        assert_eq!(&sel32.block[..8], b"bcdefghh");
        assert_eq!(sel64.sub_index, 1);
        assert_eq!(&sel64.block[..8], b"bcdefghj");
        assert!(sel32.block[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_long_tag_nonce_padded_on_right() {
        let kdf = kdf();
        let pad = kdf.pad(b"abc", TagLength::Bits128).unwrap();
        let mut padded = [0u8; 16];
        padded[..3].copy_from_slice(b"abc");
        assert_eq!(pad, kdf.pad_block(&padded).unwrap().to_vec());
        let mut left = [0u8; 16];
        left[13..].copy_from_slice(b"abc");
        assert_ne!(pad, kdf.pad_block(&left).unwrap().to_vec());
    }

    #[test]
    fn test_96_is_prefix_of_128() {
        let kdf = kdf();
        let nonce = b"0123456789abcdef";
        let p96 = kdf.pad(nonce, TagLength::Bits96).unwrap();
        let p128 = kdf.pad(nonce, TagLength::Bits128).unwrap();
        assert_eq!(&p128[..12], &p96[..]);
    }

    #[test]
    fn test_nonce_length_errors() {
        let kdf = kdf();
        assert_eq!(
            kdf.pad(b"short", TagLength::Bits32),
            Err(DeriveError::NonceLength {
                tag_bits: 32,
                expected: "exactly 8 bytes",
                actual: 5,
            })
        );
        assert!(kdf.pad(b"0123456789", TagLength::Bits64).is_err());
        assert!(kdf.pad(b"", TagLength::Bits96).is_err());
        assert!(kdf.pad(&[0u8; 17], TagLength::Bits128).is_err());
    }

    #[test]
    fn test_pad_block_nonce_errors_name_no_tag() {
        let kdf = kdf();
        assert_eq!(
            kdf.pad_block(&[0u8; 17]),
            Err(DeriveError::BlockNonceLength(17))
        );
        assert_eq!(kdf.pad_block(b""), Err(DeriveError::BlockNonceLength(0)));
        let message = DeriveError::BlockNonceLength(17).to_string();
        assert!(!message.contains("bit tag"), "{message}");
        assert_eq!(
            kdf.pad(&[0u8; 17], TagLength::Bits96),
            Err(DeriveError::NonceLength {
                tag_bits: 96,
                expected: "1 to 16 bytes",
                actual: 17,
            })
        );
    }

    #[test]
    fn test_pad_is_deterministic() {
        let a = kdf().pad(NONCE, TagLength::Bits64).unwrap();
        let b = kdf().pad(NONCE, TagLength::Bits64).unwrap();
        assert_eq!(a, b);
    }
}
