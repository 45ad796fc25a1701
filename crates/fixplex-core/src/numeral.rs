//! Machine-width unsigned numerals modulo a power of two.
//!
//! All solver arithmetic happens in the ring Z/2^BITS: addition, subtraction
//! and multiplication wrap, division is plain unsigned division, and the two
//! ring-specific operations are the trailing-zeros count (the "parity" of a
//! coefficient) and the inverse of an odd element.
//!
//! The trait is a thin capability layer over the `num-traits` primitive
//! integer traits so the solver can be instantiated at 8, 16, 32, 64 or 128
//! bits. The rational boundary (`from_rational` / `to_rational`) is exact:
//! rationals with odd denominators have a unique image in the ring, rationals
//! with even non-unit denominators have none.

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, PrimInt, ToPrimitive, WrappingAdd, WrappingMul, WrappingNeg, WrappingSub};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use thiserror::Error;

/// Errors from the rational conversion boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumeralError {
    /// The denominator is even (and not 1), so it has no inverse in the ring.
    #[error("denominator {denom} has no inverse modulo 2^{bits}")]
    NonInvertibleDenominator {
        /// The offending denominator.
        denom: BigInt,
        /// Bit width of the modulus.
        bits: u32,
    },
}

/// An unsigned machine integer used as a numeral modulo `2^BITS`.
///
/// `PrimInt` supplies comparisons, shifts, division and `trailing_zeros`
/// (which already reports the full bit width for zero, the convention the
/// parity tests rely on); the `Wrapping*` traits supply the ring arithmetic.
pub trait Numeral:
    PrimInt
    + WrappingAdd
    + WrappingSub
    + WrappingMul
    + WrappingNeg
    + Hash
    + Debug
    + Display
    + Default
{
    /// Bit width of the modulus.
    const BITS: u32;

    /// The modulus `2^BITS` as a big integer.
    fn modulus() -> BigInt {
        BigInt::one() << Self::BITS as usize
    }

    /// Multiplicative inverse of an odd numeral.
    ///
    /// The receiver must be odd; even numerals have no inverse in the ring.
    fn odd_inverse(self) -> Self;

    /// Reduce a big integer modulo `2^BITS`.
    fn from_bigint(v: &BigInt) -> Self;

    /// Map a rational into the ring.
    ///
    /// The numerator is reduced modulo `2^BITS`; an odd denominator is folded
    /// in through its inverse.
    fn from_rational(q: &BigRational) -> Result<Self, NumeralError> {
        let numer = Self::from_bigint(q.numer());
        if q.denom().is_one() {
            return Ok(numer);
        }
        let denom = Self::from_bigint(q.denom());
        if denom & Self::one() == Self::one() {
            Ok(numer.wrapping_mul(&denom.odd_inverse()))
        } else {
            Err(NumeralError::NonInvertibleDenominator {
                denom: q.denom().clone(),
                bits: Self::BITS,
            })
        }
    }

    /// The numeral as an exact (non-negative) rational.
    fn to_rational(self) -> BigRational;

    /// Truncating conversion, i.e. reduction of `v` modulo `2^BITS`.
    fn from_u64(v: u64) -> Self;
}

macro_rules! impl_numeral {
    ($($t:ty),*) => {$(
        impl Numeral for $t {
            const BITS: u32 = (std::mem::size_of::<$t>() * 8) as u32;

            fn odd_inverse(self) -> Self {
                debug_assert!(self & 1 == 1, "odd_inverse of even numeral");
                // Newton iteration x := x(2 - ax) doubles the number of
                // correct low bits each round; x = a is correct modulo 8.
                let mut x = self;
                let mut bits = 3;
                while bits < Self::BITS {
                    x = x.wrapping_mul((2 as $t).wrapping_sub(self.wrapping_mul(x)));
                    bits *= 2;
                }
                x
            }

            fn from_bigint(v: &BigInt) -> Self {
                let r = v.mod_floor(&Self::modulus());
                r.to_u128().expect("value reduced below 2^128") as $t
            }

            fn to_rational(self) -> BigRational {
                BigRational::from_integer(BigInt::from(self))
            }

            fn from_u64(v: u64) -> Self {
                v as $t
            }
        }
    )*};
}

impl_numeral!(u8, u16, u32, u64, u128);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trailing_zeros_of_zero_is_bit_width() {
        assert_eq!(0u8.trailing_zeros(), 8);
        assert_eq!(0u64.trailing_zeros(), 64);
        assert_eq!(12u8.trailing_zeros(), 2);
    }

    #[test]
    fn modulus_matches_bit_width() {
        assert_eq!(u8::modulus(), BigInt::from(256));
        assert_eq!(u32::modulus(), BigInt::from(1u64 << 32));
    }

    #[test]
    fn from_bigint_reduces_negatives() {
        assert_eq!(u8::from_bigint(&BigInt::from(-1)), 255u8);
        assert_eq!(u8::from_bigint(&BigInt::from(257)), 1u8);
    }

    #[test]
    fn from_rational_odd_denominator() {
        // 1/3 mod 256 is the inverse of 3: 3 * 171 = 513 = 2*256 + 1.
        let q = BigRational::new(BigInt::from(1), BigInt::from(3));
        assert_eq!(u8::from_rational(&q).unwrap(), 171u8);
    }

    #[test]
    fn from_rational_even_denominator_fails() {
        let q = BigRational::new(BigInt::from(1), BigInt::from(2));
        assert!(u8::from_rational(&q).is_err());
    }

    proptest! {
        #[test]
        fn prop_odd_inverse_u8(a in any::<u8>()) {
            let a = a | 1;
            prop_assert_eq!(a.wrapping_mul(a.odd_inverse()), 1u8);
        }

        #[test]
        fn prop_odd_inverse_u64(a in any::<u64>()) {
            let a = a | 1;
            prop_assert_eq!(a.wrapping_mul(a.odd_inverse()), 1u64);
        }

        #[test]
        fn prop_rational_roundtrip_u8(v in any::<u8>()) {
            let q = v.to_rational();
            prop_assert_eq!(u8::from_rational(&q).unwrap(), v);
        }
    }
}
