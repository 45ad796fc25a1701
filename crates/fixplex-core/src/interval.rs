//! Half-open intervals over the ring of integers modulo `2^BITS`.
//!
//! An interval `[lo, hi)` denotes `{x : lo <= x < hi}` when `lo < hi` and the
//! wrapped set `{x : x >= lo} ∪ {x : x < hi}` when `lo > hi`. Equal endpoints
//! mark either the whole ring ("free") or the empty set, distinguished by an
//! explicit flag.
//!
//! The arithmetic is a sound over-approximation: the sum, scalar multiple and
//! intersection of intervals always contain every value the corresponding
//! pointwise operation can produce. Results that would cover the ring (or
//! whose width cannot be represented) collapse to the free interval.

use crate::numeral::Numeral;
use std::fmt;
use std::ops::{Add, AddAssign, BitAnd, BitAndAssign, Mul, Neg, Sub};

/// A half-open, possibly wrapping interval modulo `2^BITS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModInterval<N> {
    /// Inclusive lower endpoint.
    pub lo: N,
    /// Exclusive upper endpoint.
    pub hi: N,
    empty: bool,
}

impl<N: Numeral> Default for ModInterval<N> {
    fn default() -> Self {
        Self::free()
    }
}

impl<N: Numeral> ModInterval<N> {
    /// The interval `[lo, hi)`; equal endpoints denote the whole ring.
    pub fn new(lo: N, hi: N) -> Self {
        ModInterval {
            lo,
            hi,
            empty: false,
        }
    }

    /// The whole ring.
    pub fn free() -> Self {
        Self::new(N::zero(), N::zero())
    }

    /// The empty set.
    pub fn empty() -> Self {
        ModInterval {
            lo: N::zero(),
            hi: N::zero(),
            empty: true,
        }
    }

    /// Does the interval denote the whole ring?
    pub fn is_free(&self) -> bool {
        !self.empty && self.lo == self.hi
    }

    /// Is the interval empty?
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Does the interval hold exactly one value?
    pub fn is_fixed(&self) -> bool {
        !self.empty && self.hi == self.lo.wrapping_add(&N::one())
    }

    /// Membership test.
    pub fn contains(&self, v: N) -> bool {
        if self.empty {
            false
        } else if self.lo == self.hi {
            true
        } else if self.lo < self.hi {
            self.lo <= v && v < self.hi
        } else {
            v >= self.lo || v < self.hi
        }
    }

    /// The member of the interval nearest to `n` in wrapped distance,
    /// i.e. `lo` when stepping up to `lo` is shorter than stepping down
    /// past `hi - 1`, otherwise `hi - 1`.
    pub fn closest_value(&self, n: N) -> N {
        debug_assert!(!self.empty);
        if self.contains(n) {
            return n;
        }
        if self.lo.wrapping_sub(&n) < n.wrapping_sub(&self.hi) {
            self.lo
        } else {
            self.hi.wrapping_sub(&N::one())
        }
    }
}

impl<N: Numeral> Add for ModInterval<N> {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        if self.is_empty() {
            return self;
        }
        if other.is_empty() {
            return other;
        }
        if self.is_free() {
            return self;
        }
        if other.is_free() {
            return other;
        }
        let w1 = self.hi.wrapping_sub(&self.lo);
        let w2 = other.hi.wrapping_sub(&other.lo);
        let sz = w1.wrapping_add(&w2);
        if sz < w1 {
            return Self::free();
        }
        Self::new(
            self.lo.wrapping_add(&other.lo),
            self.hi.wrapping_add(&other.hi).wrapping_sub(&N::one()),
        )
    }
}

impl<N: Numeral> AddAssign for ModInterval<N> {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl<N: Numeral> Neg for ModInterval<N> {
    type Output = Self;

    fn neg(self) -> Self {
        if self.is_empty() || self.is_free() {
            return self;
        }
        Self::new(
            N::one().wrapping_sub(&self.hi),
            N::one().wrapping_sub(&self.lo),
        )
    }
}

impl<N: Numeral> Sub for ModInterval<N> {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + (-other)
    }
}

impl<N: Numeral> Mul<N> for ModInterval<N> {
    type Output = Self;

    fn mul(self, n: N) -> Self {
        if self.is_empty() {
            return self;
        }
        if n.is_zero() {
            return Self::new(N::zero(), N::one());
        }
        if n.is_one() {
            return self;
        }
        if self.is_free() {
            return self;
        }
        let steps = self.hi.wrapping_sub(&self.lo).wrapping_sub(&N::one());
        // Multiplication walks the interval in steps of n; a scalar above
        // half the ring walks downwards in steps of -n, starting from the
        // image of the topmost member.
        let (start, step) = if n.wrapping_neg() < n {
            (
                self.hi.wrapping_sub(&N::one()).wrapping_mul(&n),
                n.wrapping_neg(),
            )
        } else {
            (self.lo.wrapping_mul(&n), n)
        };
        let span = steps.wrapping_mul(&step);
        if !steps.is_zero() && span / step != steps {
            return Self::free();
        }
        Self::new(start, start.wrapping_add(&span).wrapping_add(&N::one()))
    }
}

impl<N: Numeral> BitAnd for ModInterval<N> {
    type Output = Self;

    /// Intersection. The result is always a sub-arc of `self` containing
    /// the true intersection; when the true intersection is a union of two
    /// arcs (which no single interval inside `self` can hold), `self` is
    /// returned unchanged. Intersecting therefore never grows an interval.
    fn bitand(self, other: Self) -> Self {
        if self.is_empty() || other.is_free() {
            return self;
        }
        if other.is_empty() || self.is_free() {
            return other;
        }
        let lo = if self.contains(other.lo) {
            other.lo
        } else if other.contains(self.lo) {
            self.lo
        } else {
            return Self::empty();
        };
        let one = N::one();
        let hi = if self.contains(other.hi.wrapping_sub(&one)) {
            other.hi
        } else if other.contains(self.hi.wrapping_sub(&one)) {
            self.hi
        } else {
            return Self::empty();
        };
        // The picked arc [lo, hi) must stay inside self; it escapes exactly
        // when the overlap wraps around both ends of self.
        let offset = lo.wrapping_sub(&self.lo);
        let width = hi.wrapping_sub(&lo);
        let self_width = self.hi.wrapping_sub(&self.lo);
        let escapes = match offset.checked_add(&width) {
            Some(end) => end > self_width,
            None => true,
        };
        if escapes {
            return self;
        }
        Self::new(lo, hi)
    }
}

impl<N: Numeral> BitAndAssign for ModInterval<N> {
    fn bitand_assign(&mut self, other: Self) {
        *self = *self & other;
    }
}

impl<N: Numeral> fmt::Display for ModInterval<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "empty")
        } else if self.is_free() {
            write!(f, "free")
        } else {
            write!(f, "[{}, {})", self.lo, self.hi)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn iv(lo: u8, hi: u8) -> ModInterval<u8> {
        ModInterval::new(lo, hi)
    }

    #[test]
    fn contains_proper_and_wrapping() {
        assert!(iv(10, 20).contains(10));
        assert!(iv(10, 20).contains(19));
        assert!(!iv(10, 20).contains(20));
        assert!(iv(250, 10).contains(255));
        assert!(iv(250, 10).contains(0));
        assert!(!iv(250, 10).contains(10));
        assert!(ModInterval::<u8>::free().contains(123));
        assert!(!ModInterval::<u8>::empty().contains(0));
    }

    #[test]
    fn fixed_recognition() {
        assert!(iv(42, 43).is_fixed());
        assert!(iv(255, 0).is_fixed());
        assert!(!iv(42, 44).is_fixed());
        assert!(!ModInterval::<u8>::free().is_fixed());
    }

    #[test]
    fn sum_goes_free_on_overflow() {
        let a = iv(0, 200);
        let b = iv(0, 100);
        assert!((a + b).is_free());
    }

    #[test]
    fn sum_of_proper_intervals() {
        assert_eq!(iv(10, 20) + iv(15, 25), iv(25, 44));
        // [7, 8) + [2, 3) is the singleton {9}.
        assert_eq!(iv(7, 8) + iv(2, 3), iv(9, 10));
    }

    #[test]
    fn scalar_multiplication_by_minus_one() {
        // 255 = -1 mod 256: -[15, 25) = {232 .. 241}.
        assert_eq!(iv(15, 25) * 255, iv(232, 242));
    }

    #[test]
    fn negation_matches_multiplication() {
        assert_eq!(-iv(10, 20), iv(237, 247));
        assert_eq!(-iv(10, 20), iv(10, 20) * 255);
    }

    #[test]
    fn intersection_cases() {
        assert_eq!(iv(10, 20) & iv(15, 25), iv(15, 20));
        assert!((iv(10, 20) & iv(25, 35)).is_empty());
        assert_eq!(iv(250, 10) & iv(5, 15), iv(5, 10));
        assert_eq!(iv(250, 10) & iv(255, 3), iv(255, 3));
        assert_eq!(iv(3, 7) & ModInterval::free(), iv(3, 7));
    }

    #[test]
    fn intersection_two_arc_overlap_keeps_self() {
        // [0,10) and [8,2) overlap at both ends; no sub-arc of [0,10)
        // holds {8,9} and {0,1} at once, so the left operand stands.
        assert_eq!(iv(0, 10) & iv(8, 2), iv(0, 10));
    }

    proptest! {
        #[test]
        fn prop_sum_sound(a_lo in any::<u8>(), a_hi in any::<u8>(),
                          b_lo in any::<u8>(), b_hi in any::<u8>(),
                          x in any::<u8>(), y in any::<u8>()) {
            let a = iv(a_lo, a_hi);
            let b = iv(b_lo, b_hi);
            prop_assume!(a.contains(x) && b.contains(y));
            prop_assert!((a + b).contains(x.wrapping_add(y)));
        }

        #[test]
        fn prop_scalar_mul_sound(lo in any::<u8>(), hi in any::<u8>(),
                                 k in any::<u8>(), x in any::<u8>()) {
            let a = iv(lo, hi);
            prop_assume!(a.contains(x));
            prop_assert!((a * k).contains(x.wrapping_mul(k)));
        }

        #[test]
        fn prop_intersection_sound(a_lo in any::<u8>(), a_hi in any::<u8>(),
                                   b_lo in any::<u8>(), b_hi in any::<u8>(),
                                   x in any::<u8>()) {
            let a = iv(a_lo, a_hi);
            let b = iv(b_lo, b_hi);
            prop_assume!(a.contains(x) && b.contains(x));
            prop_assert!((a & b).contains(x));
        }

        #[test]
        fn prop_intersection_shrinks(a_lo in any::<u8>(), a_hi in any::<u8>(),
                                     b_lo in any::<u8>(), b_hi in any::<u8>(),
                                     x in any::<u8>()) {
            let a = iv(a_lo, a_hi);
            let b = iv(b_lo, b_hi);
            prop_assume!((a & b).contains(x));
            prop_assert!(a.contains(x));
        }

        #[test]
        fn prop_neg_sound(lo in any::<u8>(), hi in any::<u8>(), x in any::<u8>()) {
            let a = iv(lo, hi);
            prop_assume!(a.contains(x));
            prop_assert!((-a).contains(x.wrapping_neg()));
        }

        #[test]
        fn prop_closest_value_is_member(lo in any::<u8>(), hi in any::<u8>(), n in any::<u8>()) {
            let a = iv(lo, hi);
            prop_assert!(a.contains(a.closest_value(n)));
        }
    }
}
