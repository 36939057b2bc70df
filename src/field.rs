//! Prime field arithmetic for the UHASH polynomial layer.
//!
//! The two polynomial primes are pseudo-Mersenne: `P64 = 2^64 - 59` and
//! `P128 = 2^128 - 159`.  A double-width product `hi * 2^w + lo` is congruent
//! to `hi * c + lo` where `p = 2^w - c`, so reduction folds the high word back
//! into the low word until it vanishes, then subtracts `p` at most once.
//!
//! [`ShiftAddField`] is a deliberately different construction (double and add
//! over exact modular addition) that works for any odd modulus.  It serves as
//! the reference when checking the fast paths.

/// Offset of the 64-bit prime below `2^64`.
pub const P64_OFFSET: u64 = 59;
/// The 64-bit polynomial prime, `2^64 - 59`.
pub const P64: u64 = 0u64.wrapping_sub(P64_OFFSET);

/// Offset of the 128-bit prime below `2^128`.
pub const P128_OFFSET: u128 = 159;
/// The 128-bit polynomial prime, `2^128 - 159`.
pub const P128: u128 = 0u128.wrapping_sub(P128_OFFSET);

const LOW_64: u128 = u64::MAX as u128;

/// Multiplies two 128-bit integers into a 256-bit `(hi, lo)` pair.
pub fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    let (a1, a0) = (a >> 64, a & LOW_64);
    let (b1, b0) = (b >> 64, b & LOW_64);

    let low = a0 * b0;
    let high = a1 * b1;
    let (mid, mid_carry) = (a0 * b1).overflowing_add(a1 * b0);

    let (lo, lo_carry) = low.overflowing_add(mid << 64);
    let hi = high + (mid >> 64) + (u128::from(mid_carry) << 64) + u128::from(lo_carry);
    (hi, lo)
}

/// Modular arithmetic over a fixed prime that fits in 128 bits.
///
/// Implementations accept any `u128` operand, reducing it first, and always
/// return a value in `[0, modulus)`.
pub trait FieldArithmetic {
    /// Returns the field modulus.
    fn modulus(&self) -> u128;

    /// Computes `(a + b) mod p`.
    fn add_mod(&self, a: u128, b: u128) -> u128;

    /// Computes `(a * b) mod p` without truncating the product.
    fn mul_mod(&self, a: u128, b: u128) -> u128;
}

/// The field `Z / (2^128 - 159)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Prime128;

impl Prime128 {
    /// Reduces a 256-bit value `hi * 2^128 + lo`.
    #[inline]
    pub fn reduce_wide(&self, mut hi: u128, mut lo: u128) -> u128 {
        while hi != 0 {
            let (fold_hi, fold_lo) = mul_wide(hi, P128_OFFSET);
            let (sum, carry) = fold_lo.overflowing_add(lo);
            hi = fold_hi + u128::from(carry);
            lo = sum;
        }
        if lo >= P128 {
            lo - P128
        } else {
            lo
        }
    }

    /// Reduces a single 128-bit value.
    #[inline]
    pub fn reduce(&self, a: u128) -> u128 {
        if a >= P128 {
            a - P128
        } else {
            a
        }
    }

    /// Subtracts `b` from `a`.
    #[inline]
    pub fn sub_mod(&self, a: u128, b: u128) -> u128 {
        let a = self.reduce(a);
        let b = self.reduce(b);
        if a >= b {
            a - b
        } else {
            P128 - (b - a)
        }
    }

    /// Exponentiates `a` by `e`.
    pub fn pow(&self, a: u128, mut e: u128) -> u128 {
        let mut base = self.reduce(a);
        let mut result = 1u128;
        while e > 0 {
            if e & 1 == 1 {
                result = self.mul_mod(result, base);
            }
            base = self.mul_mod(base, base);
            e >>= 1;
        }
        result
    }
}

impl FieldArithmetic for Prime128 {
    fn modulus(&self) -> u128 {
        P128
    }

    #[inline]
    fn add_mod(&self, a: u128, b: u128) -> u128 {
        let (sum, carry) = self.reduce(a).overflowing_add(self.reduce(b));
        if carry {
            // 2^128 = P128_OFFSET (mod p), and the true sum is below 2p.
            sum + P128_OFFSET
        } else {
            self.reduce(sum)
        }
    }

    #[inline]
    fn mul_mod(&self, a: u128, b: u128) -> u128 {
        let (hi, lo) = mul_wide(a, b);
        self.reduce_wide(hi, lo)
    }
}

/// The field `Z / (2^64 - 59)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Prime64;

impl Prime64 {
    /// Returns the modulus.
    #[inline]
    pub fn modulus(&self) -> u64 {
        P64
    }

    #[inline]
    fn reduce(&self, a: u64) -> u64 {
        if a >= P64 {
            a - P64
        } else {
            a
        }
    }

    /// Adds two field elements.
    #[inline]
    pub fn add(&self, a: u64, b: u64) -> u64 {
        let (sum, carry) = self.reduce(a).overflowing_add(self.reduce(b));
        if carry {
            sum + P64_OFFSET
        } else {
            self.reduce(sum)
        }
    }

    /// Multiplies two field elements.
    #[inline]
    pub fn mul(&self, a: u64, b: u64) -> u64 {
        let product = u128::from(a) * u128::from(b);
        let mut hi = (product >> 64) as u64;
        let mut lo = product as u64;
        while hi != 0 {
            let fold = u128::from(hi) * u128::from(P64_OFFSET) + u128::from(lo);
            hi = (fold >> 64) as u64;
            lo = fold as u64;
        }
        self.reduce(lo)
    }
}

/// Reference field over any odd modulus, using only modular addition.
///
/// Multiplication walks the bits of `b` from the top, doubling and adding.
/// It is slow but shares no reduction logic with [`Prime128`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftAddField {
    p: u128,
}

impl ShiftAddField {
    /// Creates a reference field with the given modulus.
    ///
    /// # Panics
    ///
    /// Panics if the modulus is less than 3 or even.
    pub fn new(p: u128) -> Self {
        assert!(p >= 3 && p % 2 == 1, "p must be an odd modulus >= 3");
        ShiftAddField { p }
    }
}

impl FieldArithmetic for ShiftAddField {
    fn modulus(&self) -> u128 {
        self.p
    }

    fn add_mod(&self, a: u128, b: u128) -> u128 {
        let (sum, carry) = (a % self.p).overflowing_add(b % self.p);
        if carry || sum >= self.p {
            sum.wrapping_sub(self.p)
        } else {
            sum
        }
    }

    fn mul_mod(&self, a: u128, b: u128) -> u128 {
        let a = a % self.p;
        let mut acc = 0u128;
        for bit in (0..128).rev() {
            acc = self.add_mod(acc, acc);
            if (b >> bit) & 1 == 1 {
                acc = self.add_mod(acc, a);
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAX: u128 = u128::MAX;

    #[test]
    fn test_constants() {
        assert_eq!(P64, 0xFFFF_FFFF_FFFF_FFC5);
        assert_eq!(P128, 0xFFFF_FFFF_FFFF_FFFF_FFFF_FFFF_FFFF_FF61);
    }

    #[test]
    fn test_mul_wide_extremes() {
        assert_eq!(mul_wide(MAX, MAX), (MAX - 1, 1));
        assert_eq!(mul_wide(MAX, 1), (0, MAX));
        assert_eq!(mul_wide(1 << 64, 1 << 64), (1, 0));
        assert_eq!(mul_wide(0, MAX), (0, 0));
    }

    #[test]
    fn test_prime128_boundary_values() {
        let f = Prime128;
        assert_eq!(f.mul_mod(MAX, 1), 0x9e);
        assert_eq!(f.mul_mod(MAX - 5, 1), 0x99);
        assert_eq!(f.mul_mod(MAX - 5, 2), 0x132);
        assert_eq!(f.mul_mod(P128, 1), 0);
        assert_eq!(f.mul_mod(MAX, MAX), 0x6184);
        assert_eq!(f.mul_mod(P128 - 1, P128 - 1), 1);
        assert_eq!(f.mul_mod(P128 - 1, 1), P128 - 1);
        assert_eq!(f.mul_mod(0, P128 - 1), 0);
    }

    #[test]
    fn test_prime128_near_multiples() {
        // Products one above and one below p itself.
        let f = Prime128;
        let half_up = (P128 >> 1) + 1;
        assert_eq!(f.mul_mod(half_up, 2), 1);
        assert_eq!(f.mul_mod(P128 >> 1, 2), P128 - 1);
    }

    #[test]
    fn test_prime128_add_sub() {
        let f = Prime128;
        assert_eq!(f.add_mod(P128 - 1, 1), 0);
        assert_eq!(f.add_mod(P128 - 1, P128 - 1), P128 - 2);
        assert_eq!(f.add_mod(MAX, MAX), f.mul_mod(MAX, 2));
        assert_eq!(f.sub_mod(0, 1), P128 - 1);
        assert_eq!(f.sub_mod(5, 3), 2);
    }

    #[test]
    fn test_prime128_fermat() {
        let f = Prime128;
        assert_eq!(f.pow(3, P128 - 1), 1);
        assert_eq!(f.pow(12345, 0), 1);
        let inv = f.pow(7, P128 - 2);
        assert_eq!(f.mul_mod(inv, 7), 1);
    }

    #[test]
    fn test_prime64_values() {
        let f = Prime64;
        assert_eq!(f.mul(u64::MAX, u64::MAX), 0xd24);
        assert_eq!(f.mul(P64 - 1, P64 - 1), 1);
        assert_eq!(f.mul(P64, 12), 0);
        assert_eq!(f.add(P64 - 1, 1), 0);
        assert_eq!(f.add(u64::MAX, u64::MAX), f.mul(u64::MAX, 2));
        assert_eq!(f.modulus(), P64);
    }

    #[test]
    fn test_shift_add_matches_small_field() {
        let f = ShiftAddField::new(101);
        assert_eq!(f.mul_mod(57, 99), (57 * 99) % 101);
        assert_eq!(f.add_mod(100, 100), 99);
    }

    #[test]
    #[should_panic(expected = "odd modulus")]
    fn test_shift_add_rejects_even_modulus() {
        let _ = ShiftAddField::new(1u128 << 64);
    }

    proptest! {
        #[test]
        fn prop_prime128_matches_reference(a in any::<u128>(), b in any::<u128>()) {
            let fast = Prime128.mul_mod(a, b);
            let reference = ShiftAddField::new(P128).mul_mod(a, b);
            prop_assert!(fast < P128);
            prop_assert_eq!(fast, reference);
        }

        #[test]
        fn prop_prime128_add_matches_reference(a in any::<u128>(), b in any::<u128>()) {
            prop_assert_eq!(Prime128.add_mod(a, b), ShiftAddField::new(P128).add_mod(a, b));
        }

        #[test]
        fn prop_prime64_matches_u128(a in any::<u64>(), b in any::<u64>()) {
            let expected = ((u128::from(a) * u128::from(b)) % u128::from(P64)) as u64;
            prop_assert_eq!(Prime64.mul(a, b), expected);
            let sum = ((u128::from(a) + u128::from(b)) % u128::from(P64)) as u64;
            prop_assert_eq!(Prime64.add(a, b), sum);
        }
    }
}
