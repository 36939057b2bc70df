#![deny(missing_docs)]

//! # umac_derive
//!
//! **umac_derive** implements the key-setup half of UMAC (RFC 4418): the
//! counter-mode key derivation function, the per-layer subkeys of the
//! UHASH cascade for 32, 64, 96 and 128-bit tags, and the nonce-driven pad.
//! It also carries the pseudo-Mersenne arithmetic the hash layers run on and
//! a differential harness for checking other `2^128 - 159` multipliers
//! against an independent reference.
//!
//! ## Features
//!
//! * **Key derivation** via [`Kdf`], generic over a [`BlockCipher`]
//!   (AES-128 by default).
//! * **Subkeys**: [`Kdf::subkeys`] returns a [`SubkeySet`] with the L1 words,
//!   masked L2 polynomial keys and the two L3 key arrays.
//! * **Pads**: [`Kdf::pad`] derives the one-time pad, slicing one cipher
//!   block between consecutive nonces for short tags.
//! * **Field arithmetic** over `2^64 - 59` and `2^128 - 159` in [`field`],
//!   plus the POLY and L3 steps that consume the subkeys in [`poly`].
//! * **Artifacts**: the C key headers and tag vectors in [`artifact`].
//! * **Differential testing** of `mulmod` candidates, linked in-process or
//!   spawned as a subprocess, in [`harness`] and [`process`].
//!
//! ## Usage
//!
//! ```rust
//! use umac_derive::{Kdf, TagLength};
//!
//! let kdf = Kdf::aes128(b"abcdefghijklmnop").unwrap();
//! let keys = kdf.subkeys(TagLength::Bits64).unwrap();
//! assert_eq!(keys.l1.len(), 260);
//! assert_eq!(keys.l1[0], 0xACD7_9B4F);
//!
//! let pad = kdf.pad(b"bcdefghi", TagLength::Bits32).unwrap();
//! assert_eq!(pad, [0xAE, 0x13, 0x5F, 0x82]);
//! ```
//!
//! The message-absorbing hash cascade itself is not part of this crate;
//! [`artifact::UniversalHash`] is the seam where one plugs in.

pub mod artifact;
pub mod cipher;
pub mod config;
mod error;
pub mod field;
pub mod harness;
mod kdf;
mod pdf;
pub mod poly;
mod prng;
pub mod process;
pub mod subkeys;

pub use artifact::{ArtifactError, ArtifactSink, DirectorySink, MemorySink};
pub use cipher::{Aes128Oracle, BlockCipher};
pub use config::{ConfigError, ConfigLayer, GeneratorConfig, HarnessConfig};
pub use error::DeriveError;
pub use field::{FieldArithmetic, Prime128, Prime64, ShiftAddField, P128, P64};
pub use harness::{DifferentialHarness, HarnessError, HarnessReport, MulModCandidate};
pub use kdf::{Kdf, StreamIndex};
pub use pdf::SHORT_TAG_NONCE_LEN;
pub use prng::OperandStream;
pub use process::ExternalMulMod;
pub use subkeys::{L2Key, SubkeySet, TagLength};
