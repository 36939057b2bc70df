//! Hash-layer steps that consume derived subkeys.
//!
//! These are the arithmetic kernels of the L2 polynomial hash and the L3
//! inner-product hash.  The message-absorption loop that drives them is not
//! part of this crate.

use crate::field::{FieldArithmetic, Prime128, Prime64, P128, P128_OFFSET, P64, P64_OFFSET};
use crate::subkeys::{L3_KEYS_PER_ITER, L3_PRIME};

/// Words at or above this value take the two-step escape path in POLY-64.
pub const POLY64_MAX_WORD: u64 = 0xFFFF_FFFF_0000_0000;

/// Words at or above this value take the two-step escape path in POLY-128.
pub const POLY128_MAX_WORD: u128 = 0xFFFF_FFFF_0000_0000_0000_0000_0000_0000;

/// One POLY iteration over `2^64 - 59`.
///
/// Computes `key * y + m`.  Words too close to the prime are split into a
/// marker (`p - 1`) followed by `m - 59`, so every word encodes uniquely.
pub fn poly64_step(key: u64, y: u64, m: u64) -> u64 {
    let f = Prime64;
    if m >= POLY64_MAX_WORD {
        let y = f.add(f.mul(key, y), P64 - 1);
        f.add(f.mul(key, y), m - P64_OFFSET)
    } else {
        f.add(f.mul(key, y), m)
    }
}

/// One POLY iteration over `2^128 - 159`, with the same escape rule.
pub fn poly128_step(key: u128, y: u128, m: u128) -> u128 {
    let f = Prime128;
    if m >= POLY128_MAX_WORD {
        let y = f.add_mod(f.mul_mod(key, y), P128 - 1);
        f.add_mod(f.mul_mod(key, y), m - P128_OFFSET)
    } else {
        f.add_mod(f.mul_mod(key, y), m)
    }
}

/// The L3 hash of one 128-bit L2 output.
///
/// `m` is split into eight big-endian 16-bit chunks, each weighted by the
/// matching L3 multiplier modulo `2^36 - 5`; the low 32 bits of the sum are
/// whitened with `k2`.  [`SubkeySet::l3a_for`] yields `k1` for one
/// iteration.
///
/// [`SubkeySet::l3a_for`]: crate::SubkeySet::l3a_for
pub fn l3_hash(k1: &[u64; L3_KEYS_PER_ITER], k2: u32, m: u128) -> u32 {
    // Each term is below 2^16 * 2^36, so eight of them cannot overflow.
    let y = k1.iter().enumerate().fold(0u64, |acc, (i, &k)| {
        let chunk = ((m >> (16 * (7 - i))) & 0xFFFF) as u64;
        acc + chunk * (k % L3_PRIME)
    });
    ((y % L3_PRIME) as u32) ^ k2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::ShiftAddField;
    use crate::{Kdf, TagLength};
    use proptest::prelude::*;

    #[test]
    fn test_poly64_escape_path() {
        assert_eq!(poly64_step(2, 3, u64::MAX), 9);
        assert_eq!(poly64_step(2, 3, POLY64_MAX_WORD - 1), 6 + POLY64_MAX_WORD - 1);
    }

    #[test]
    fn test_poly128_escape_path() {
        assert_eq!(poly128_step(2, 3, u128::MAX), 9);
        assert_eq!(
            poly128_step(2, 3, POLY128_MAX_WORD - 1),
            6 + POLY128_MAX_WORD - 1
        );
    }

    #[test]
    fn test_l3_hash_fixture_keys() {
        let kdf = Kdf::aes128(b"abcdefghijklmnop").unwrap();
        let keys = kdf.subkeys(TagLength::Bits32).unwrap();
        let m = 0x0123_4567_89ab_cdef_fedc_ba98_7654_3210;
        let k1 = keys.l3a_for(0).unwrap();
        assert_eq!(l3_hash(k1, keys.l3b[0], m), 0x560b_c695);
        assert_eq!(l3_hash(k1, keys.l3b[0], 0), keys.l3b[0]);
    }

    #[test]
    fn test_l3_hash_reduces_multipliers() {
        // 2^36 - 5 is congruent to zero, 2^36 - 4 to one.
        let mut k1 = [L3_PRIME; L3_KEYS_PER_ITER];
        k1[7] = L3_PRIME + 1;
        assert_eq!(l3_hash(&k1, 0, 0xFFFF_FFFF_FFFF_FFFF_FFFF_FFFF_FFFF_1234), 0x1234);
        assert_eq!(l3_hash(&k1, 0x1234, 0x1234), 0);
    }

    proptest! {
        #[test]
        fn prop_poly128_plain_words(key in any::<u128>(), y in any::<u128>(), m in 0..POLY128_MAX_WORD) {
            let reference = ShiftAddField::new(P128);
            let expected = reference.add_mod(reference.mul_mod(key, y), m);
            prop_assert_eq!(poly128_step(key, y, m), expected);
        }

        #[test]
        fn prop_poly64_plain_words(key in any::<u64>(), y in any::<u64>(), m in 0..POLY64_MAX_WORD) {
            let expected = (u128::from(key) * u128::from(y) + u128::from(m)) % u128::from(P64);
            prop_assert_eq!(u128::from(poly64_step(key, y, m)), expected);
        }
    }
}
