//! Error types shared by the derivation functions.
//!
//! Every variant here is an input-contract violation (or a failing cipher
//! oracle).  Derivations never truncate or wrap silently; they surface one of
//! these instead.

use thiserror::Error;

/// Errors raised by key, subkey and pad derivation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeriveError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    /// The master key does not match the cipher's fixed key length.
    KeyLength {
        /// Key length required by the cipher.
        expected: usize,
        /// Length of the key that was supplied.
        actual: usize,
    },
    #[error("requested derivation length must be non-zero")]
    /// A zero-length stream was requested.
    EmptyRequest,
    #[error("requested derivation length {0} exceeds the addressable stream size")]
    /// The requested stream would not fit in memory.
    RequestTooLarge(usize),
    #[error("unsupported tag length: {0} bits (expected 32, 64, 96 or 128)")]
    /// The tag length is not one of the four supported variants.
    UnsupportedTagLength(u32),
    #[error("invalid nonce length for {tag_bits}-bit tag: {actual} bytes ({expected})")]
    /// The nonce length is not valid for the requested tag length.
    NonceLength {
        /// Tag length the pad was requested for.
        tag_bits: u32,
        /// Human-readable description of the accepted lengths.
        expected: &'static str,
        /// Length of the nonce that was supplied.
        actual: usize,
    },
    #[error("invalid pad block nonce length: {0} bytes (1 to 16 bytes)")]
    /// A raw pad block nonce is empty or longer than one cipher block.
    BlockNonceLength(usize),
    #[error("block cipher failure: {0}")]
    /// The block cipher oracle failed to encrypt.
    Cipher(String),
}
