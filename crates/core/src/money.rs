use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Amount out of range: {0}")]
pub struct AmountOutOfRange(pub Decimal);

/// Signed amount in integer cents.
///
/// The sign convention follows the bank feed: positive is money going out
/// (an expense), negative is money coming in. The sign is carried through
/// from the provider unchanged; income/expense decisions happen in callers.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub fn from_cents(cents: i64) -> Self {
        Amount(cents)
    }

    pub fn to_cents(self) -> i64 {
        self.0
    }

    /// Convert a boundary decimal (e.g. "42.50") into cents, rounding to
    /// two decimal places.
    pub fn from_decimal(value: Decimal) -> Result<Self, AmountOutOfRange> {
        (value * Decimal::from(100))
            .round()
            .to_i64()
            .map(Amount)
            .ok_or(AmountOutOfRange(value))
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(100)
    }

    pub fn zero() -> Self {
        Amount(0)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_expense(self) -> bool {
        self.0 > 0
    }

    pub fn is_income(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Amount(self.0 - rhs.0)
    }
}

impl Neg for Amount {
    type Output = Self;
    fn neg(self) -> Self {
        Amount(-self.0)
    }
}
