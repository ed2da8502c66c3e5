//! Money in signed integer micro-dollars

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

use crate::constants::MICROS_PER_DOLLAR;

/// A monetary amount. Negative values only appear on compensating ledger entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_micros(micros: i64) -> Self {
        Amount(micros)
    }

    /// Convert from a dollar figure, rounding to the nearest micro-dollar
    pub fn from_dollars(dollars: f64) -> Self {
        Amount((dollars * MICROS_PER_DOLLAR as f64).round() as i64)
    }

    pub const fn micros(self) -> i64 {
        self.0
    }

    pub fn as_dollars(self) -> f64 {
        self.0 as f64 / MICROS_PER_DOLLAR as f64
    }

    /// Multiply by a non-negative factor, rounding to the nearest micro-dollar
    pub fn scale(self, factor: f64) -> Self {
        Amount((self.0 as f64 * factor).round() as i64)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl fmt::Display for Amount {
    /// Dollars with at least two decimals and no trailing zeros beyond that: `$0.5625`, `-$0.02`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / MICROS_PER_DOLLAR as u64;
        let frac = format!("{:06}", abs % MICROS_PER_DOLLAR as u64);
        let trimmed = frac.trim_end_matches('0');
        let frac = if trimmed.len() < 2 { &frac[..2] } else { trimmed };
        write!(f, "{}${}.{}", sign, whole, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dollars_rounds_to_micros() {
        assert_eq!(Amount::from_dollars(0.5625).micros(), 562_500);
        assert_eq!(Amount::from_dollars(4.69).micros(), 4_690_000);
        assert_eq!(Amount::from_dollars(0.0000004).micros(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::from_micros(562_500).to_string(), "$0.5625");
        assert_eq!(Amount::from_micros(20_000).to_string(), "$0.02");
        assert_eq!(Amount::from_micros(4_690_000).to_string(), "$4.69");
        assert_eq!(Amount::from_micros(-100_000).to_string(), "-$0.10");
        assert_eq!(Amount::ZERO.to_string(), "$0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Amount::from_micros(250_000);
        let b = Amount::from_micros(100_000);
        assert_eq!((a + b).micros(), 350_000);
        assert_eq!((b - a).micros(), -150_000);
        assert_eq!(a.scale(2.25).micros(), 562_500);
        let total: Amount = vec![a, b, -b].into_iter().sum();
        assert_eq!(total, a);
    }
}
