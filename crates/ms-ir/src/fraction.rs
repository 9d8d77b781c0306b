//! Exact rational arithmetic for tick-to-seconds conversion.

use core::ops::Mul;

/// An unsigned rational number kept in lowest terms.
///
/// Tempo is stored as seconds-per-tick, which is rarely representable in
/// floating point. Keeping it as a fraction lets the timeline multiply long
/// tick runs without accumulating rounding drift.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MidiFraction {
    num: u64,
    den: u64,
}

impl MidiFraction {
    /// The zero fraction.
    pub const ZERO: Self = Self { num: 0, den: 1 };

    /// Create a fraction and reduce it.
    ///
    /// A zero denominator is kept as-is and evaluates to infinity.
    pub fn new(num: u64, den: u64) -> Self {
        let mut f = Self { num, den };
        f.reduce();
        f
    }

    /// Create a whole-number fraction.
    pub const fn from_integer(value: u64) -> Self {
        Self { num: value, den: 1 }
    }

    /// Numerator in lowest terms.
    pub const fn numerator(&self) -> u64 {
        self.num
    }

    /// Denominator in lowest terms.
    pub const fn denominator(&self) -> u64 {
        self.den
    }

    /// Floating-point value of the fraction.
    pub fn value(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    fn reduce(&mut self) {
        let g = gcd(self.num, self.den);
        if g > 1 {
            self.num /= g;
            self.den /= g;
        }
    }

    /// Build from 128-bit intermediates, dropping precision only if the
    /// reduced terms still don't fit in 64 bits.
    fn from_wide(mut num: u128, mut den: u128) -> Self {
        let g = gcd_wide(num, den);
        if g > 1 {
            num /= g;
            den /= g;
        }
        while num > u64::MAX as u128 || den > u64::MAX as u128 {
            num >>= 1;
            den >>= 1;
        }
        if den == 0 && num != 0 {
            den = 1;
        }
        Self {
            num: num as u64,
            den: den as u64,
        }
    }
}

impl Default for MidiFraction {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Mul for MidiFraction {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::from_wide(
            self.num as u128 * rhs.num as u128,
            self.den as u128 * rhs.den as u128,
        )
    }
}

impl Mul<u64> for MidiFraction {
    type Output = Self;

    fn mul(self, rhs: u64) -> Self {
        Self::from_wide(self.num as u128 * rhs as u128, self.den as u128)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn gcd_wide(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_reduces_to_lowest_terms() {
        let f = MidiFraction::new(500_000, 96_000_000);
        assert_eq!(f.numerator(), 1);
        assert_eq!(f.denominator(), 192);
    }

    #[test]
    fn multiply_by_ticks_is_exact() {
        // 500000 us per quarter note at 96 ticks per quarter
        let tempo = MidiFraction::new(1, 96_000_000) * MidiFraction::from_integer(500_000);
        let t = tempo * 96;
        assert_eq!(t, MidiFraction::new(1, 2));
        assert_eq!(t.value(), 0.5);
    }

    #[test]
    fn zero_times_anything_is_zero() {
        let f = MidiFraction::ZERO * MidiFraction::new(3, 7);
        assert_eq!(f.value(), 0.0);
        assert_eq!(MidiFraction::new(5, 9) * 0, MidiFraction::ZERO);
    }

    #[test]
    fn large_products_stay_finite() {
        let f = MidiFraction::new(u64::MAX - 1, 3) * MidiFraction::new(u64::MAX - 5, 7);
        assert!(f.value().is_finite());
        assert!(f.value() > 0.0);
    }
}
