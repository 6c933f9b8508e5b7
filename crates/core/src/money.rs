//! Non-negative monetary amounts (balances and prices).

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// A non-negative decimal amount in the platform's single currency, with at
/// most [`Money::SCALE`] fractional digits.
///
/// Balances and course prices are both `Money`; the type makes a negative
/// balance unrepresentable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Fractional digits an amount may carry (cents).
    pub const SCALE: u32 = 2;

    /// Validate and wrap an amount.
    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation(format!(
                "amount must not be negative (got {amount})"
            )));
        }
        let amount = check_scale(amount)?;
        Ok(Self(amount))
    }

    /// Whole currency units.
    pub fn from_units(units: u64) -> Self {
        Self(Decimal::from(units))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Subtract `charge`, returning `None` when the result would be negative.
    pub fn checked_sub(self, charge: Money) -> Option<Money> {
        if self.0 < charge.0 {
            None
        } else {
            Some(Money(self.0 - charge.0))
        }
    }

    /// Apply a signed adjustment, clamping the result at zero.
    ///
    /// Fails when `delta` is finer than a cent or the sum leaves the decimal range.
    pub fn adjust_clamped(self, delta: Decimal) -> DomainResult<Money> {
        let delta = check_scale(delta)?;
        let next = self
            .0
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("balance adjustment out of range"))?;
        if next.is_sign_negative() {
            Ok(Money::ZERO)
        } else {
            Ok(Money(next.normalize()))
        }
    }
}

fn check_scale(amount: Decimal) -> DomainResult<Decimal> {
    let amount = amount.normalize();
    if amount.scale() > Money::SCALE {
        return Err(DomainError::validation(format!(
            "amount {amount} has more than {} decimal places",
            Money::SCALE
        )));
    }
    Ok(amount)
}

impl ValueObject for Money {}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
