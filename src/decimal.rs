use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};
use std::str::FromStr;

/// decimal places of the currency minor unit
pub const MINOR_UNIT_DP: u32 = 2;

fn round_minor(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(MINOR_UNIT_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Money type held at minor-unit precision (2 decimal places).
///
/// Every constructor and arithmetic operation rounds half away from zero, so
/// sums of `Money` values are exact and never drift below a cent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(from = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    /// smallest representable amount (0.01)
    pub const MINOR_UNIT: Money = Money(Decimal::from_parts(1, 0, 0, false, 2));

    /// create from decimal
    pub fn from_decimal(d: Decimal) -> Self {
        Money(round_minor(d))
    }

    /// create from string with exact parsing
    pub fn from_str_exact(s: &str) -> Result<Self, rust_decimal::Error> {
        Ok(Money(round_minor(Decimal::from_str(s)?)))
    }

    /// create from integer amount (rupees, dollars, etc)
    pub fn from_major(amount: i64) -> Self {
        Money(Decimal::from(amount))
    }

    /// create from minor amount (paise, cents)
    pub fn from_minor(amount: i64) -> Self {
        Money(Decimal::new(amount, MINOR_UNIT_DP))
    }

    /// get underlying decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    /// multiply by `numerator / denominator` with a single rounding step
    pub fn mul_ratio(&self, numerator: Money, denominator: Money) -> Self {
        if denominator.is_zero() {
            return Money::ZERO;
        }
        Money::from_decimal(self.0 * numerator.0 / denominator.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::from_str_exact(s)
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money::from_decimal(d)
    }
}

impl From<i32> for Money {
    fn from(i: i32) -> Self {
        Money::from_major(i as i64)
    }
}

impl From<u32> for Money {
    fn from(i: u32) -> Self {
        Money::from_major(i as i64)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Money) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Money) {
        self.0 -= other.0;
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, other: Decimal) -> Money {
        Money(round_minor(self.0 * other))
    }
}

impl Div<Decimal> for Money {
    type Output = Money;

    fn div(self, other: Decimal) -> Money {
        Money(round_minor(self.0 / other))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}

/// annual interest rate, stored as a percentage (10 means 10% p.a.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    /// create from annual percentage (e.g., 10 for 10%)
    pub fn from_percentage(p: u32) -> Self {
        Rate(Decimal::from(p))
    }

    /// create from a decimal percentage (e.g., 10.5 for 10.5%)
    pub fn from_percentage_decimal(p: Decimal) -> Self {
        Rate(p)
    }

    /// create from basis points (e.g., 1050 for 10.5%)
    pub fn from_bps(bps: u32) -> Self {
        Rate(Decimal::from(bps) / Decimal::from(100))
    }

    /// get as percentage
    pub fn as_percentage(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// monthly rate as a fraction: annual / 12 / 100
    pub fn monthly_fraction(&self) -> Decimal {
        self.0 / Decimal::from(12) / Decimal::from(100)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_rounds_to_minor_unit() {
        let m = Money::from_str_exact("100.125").unwrap();
        assert_eq!(m.to_string(), "100.13"); // half away from zero

        let n = Money::from_decimal(dec!(-0.005));
        assert_eq!(n, Money::from_minor(-1));
    }

    #[test]
    fn test_deserialize_rounds_to_minor_unit() {
        let m: Money = serde_json::from_str("\"0.005\"").unwrap();
        assert_eq!(m, Money::MINOR_UNIT);

        let n: Money = serde_json::from_str("\"12.344\"").unwrap();
        assert_eq!(n, Money::from_minor(12_34));
        assert_eq!(serde_json::to_string(&n).unwrap(), "\"12.34\"");
    }

    #[test]
    fn test_minor_unit() {
        assert_eq!(Money::from_minor(1), Money::MINOR_UNIT);
        assert_eq!(Money::from_minor(100_00), Money::from_major(100));
    }

    #[test]
    fn test_mul_ratio() {
        let amount = Money::from_str_exact("10537.10").unwrap();
        let share = amount.mul_ratio(Money::from_major(60_000), Money::from_major(100_000));
        assert_eq!(share.to_string(), "6322.26");

        assert_eq!(amount.mul_ratio(Money::from_major(1), Money::ZERO), Money::ZERO);
    }

    #[test]
    fn test_monthly_rate() {
        let rate = Rate::from_percentage(12);
        assert_eq!(rate.monthly_fraction(), dec!(0.01));
        assert_eq!(Rate::from_bps(1050).as_percentage(), dec!(10.5));
    }

    #[test]
    fn test_sum() {
        let total: Money = [Money::from_minor(1), Money::from_minor(2), Money::from_major(3)]
            .iter()
            .sum();
        assert_eq!(total.to_string(), "3.03");
    }
}
