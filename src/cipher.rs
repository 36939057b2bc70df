//! Block cipher oracle.
//!
//! Derivation only ever needs one operation from its cipher: encrypt a single
//! 16-byte block under a key, without padding or chaining.  The
//! [`BlockCipher`] trait captures exactly that, and [`Aes128Oracle`] provides
//! it with AES-128.  A cipher is keyed once and then encrypts any number of
//! blocks, so the key schedule is expanded a single time per key.

use std::fmt;

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::DeriveError;

/// Size of every cipher block handled by this crate, in bytes.
pub const BLOCK_LEN: usize = 16;

/// One cipher block.
pub type Block = [u8; BLOCK_LEN];

/// A keyed pseudorandom permutation over 16-byte blocks.
pub trait BlockCipher: Sized {
    /// Fixed key length accepted by [`BlockCipher::with_key`].
    const KEY_LEN: usize;

    /// Expands `key` into a cipher instance.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::KeyLength`] unless `key` is `KEY_LEN` bytes.
    fn with_key(key: &[u8]) -> Result<Self, DeriveError>;

    /// Encrypts one block under the instance's key.
    fn encrypt(&self, block: &Block) -> Result<Block, DeriveError>;
}

/// AES-128 in raw single-block (codebook) mode.
///
/// The expanded key schedule is wiped when the oracle is dropped.
#[derive(Clone)]
pub struct Aes128Oracle {
    cipher: Aes128,
}

impl fmt::Debug for Aes128Oracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Aes128Oracle { .. }")
    }
}

impl BlockCipher for Aes128Oracle {
    const KEY_LEN: usize = 16;

    fn with_key(key: &[u8]) -> Result<Self, DeriveError> {
        let cipher = Aes128::new_from_slice(key).map_err(|_| DeriveError::KeyLength {
            expected: Self::KEY_LEN,
            actual: key.len(),
        })?;
        Ok(Self { cipher })
    }

    fn encrypt(&self, block: &Block) -> Result<Block, DeriveError> {
        let mut out = *block;
        self.cipher.encrypt_block((&mut out).into());
        Ok(out)
    }
}
