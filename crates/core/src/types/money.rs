//! Money amounts using decimal arithmetic.
//!
//! Checkout amounts are Vietnamese dong, which has no minor unit. Amounts are
//! kept as [`Decimal`] so percentage discounts computed server-side round-trip
//! without float error, and are displayed with `.` thousands separators.

use std::iter::Sum;
use std::ops::{Add, Mul, Sub};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// An amount of money in VND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero dong.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create an amount from a decimal value.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create an amount from a whole number of dong.
    #[must_use]
    pub fn from_dong(amount: i64) -> Self {
        Self(Decimal::from(amount))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whole dong, rounded, for request bodies that expect an integer amount.
    ///
    /// Saturates at the `i64` bounds.
    #[must_use]
    pub fn to_dong(&self) -> i64 {
        let rounded = self.0.round();
        rounded.to_i64().unwrap_or(if rounded.is_sign_negative() {
            i64::MIN
        } else {
            i64::MAX
        })
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Format for display (e.g., `"1.250.000 ₫"`).
    #[must_use]
    pub fn display(&self) -> String {
        let rounded = self.0.round();
        let negative = rounded.is_sign_negative() && !rounded.is_zero();
        let digits = rounded.abs().trunc().to_string();

        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }

        if negative {
            format!("-{grouped} ₫")
        } else {
            format!("{grouped} ₫")
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<i64> for Money {
    fn from(amount: i64) -> Self {
        Self::from_dong(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self {
        Self(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Self> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Money::from_dong(0).display(), "0 ₫");
        assert_eq!(Money::from_dong(999).display(), "999 ₫");
        assert_eq!(Money::from_dong(50_000).display(), "50.000 ₫");
        assert_eq!(Money::from_dong(1_250_000).display(), "1.250.000 ₫");
        assert_eq!(Money::from_dong(-30_000).display(), "-30.000 ₫");
    }

    #[test]
    fn test_arithmetic() {
        let unit = Money::from_dong(125_000);
        assert_eq!(unit * 4, Money::from_dong(500_000));
        assert_eq!(
            Money::from_dong(500_000) + Money::from_dong(30_000) - Money::from_dong(50_000),
            Money::from_dong(480_000)
        );
    }

    #[test]
    fn test_to_dong_rounds() {
        assert_eq!(Money::new(Decimal::new(4_999_95, 1)).to_dong(), 50_000);
        assert_eq!(Money::from_dong(800_000).to_dong(), 800_000);
    }

    #[test]
    fn test_deserializes_json_integers() {
        let money: Money = serde_json::from_str("30000").unwrap();
        assert_eq!(money, Money::from_dong(30_000));
    }

    #[test]
    fn test_sum() {
        let lines = [Money::from_dong(100), Money::from_dong(250)];
        assert_eq!(lines.iter().sum::<Money>(), Money::from_dong(350));
        assert_eq!(Vec::<Money>::new().into_iter().sum::<Money>(), Money::ZERO);
    }
}
