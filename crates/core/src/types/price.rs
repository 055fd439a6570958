//! Fixed-point money arithmetic.
//!
//! All amounts are [`Decimal`] values with two fractional digits. Single
//! currency only; there is no currency code on purpose.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of fractional digits kept on every stored amount.
pub const MONEY_SCALE: u32 = 2;

/// Errors that can occur when constructing a [`Price`] or [`TaxRate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// Amount is below zero.
    #[error("amount cannot be negative: {0}")]
    Negative(Decimal),
    /// Input is not a decimal number.
    #[error("not a decimal amount: {0:?}")]
    Unparseable(String),
    /// Arithmetic left the representable range.
    #[error("amount overflow")]
    Overflow,
    /// Tax rate outside `0..1`.
    #[error("tax rate must be between 0 and 1, got {0}")]
    RateOutOfRange(Decimal),
}

/// A non-negative monetary amount rounded to cents.
///
/// Serializes as a decimal string (`"10.00"`) so session and JSON payloads
/// never pass through floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// The zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price, rounding to cents with banker's rounding.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] for amounts below zero.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative(amount));
        }
        Ok(Self(round_money(amount)))
    }

    /// Build a price from an integer number of cents.
    #[must_use]
    pub fn from_cents(cents: u32) -> Self {
        Self(Decimal::new(i64::from(cents), MONEY_SCALE))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if the product does not fit.
    pub fn times(self, quantity: u32) -> Result<Self, PriceError> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(|v| Self(round_money(v)))
            .ok_or(PriceError::Overflow)
    }

    /// Checked addition.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if the sum does not fit.
    pub fn checked_add(self, other: Self) -> Result<Self, PriceError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(PriceError::Overflow)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount =
            Decimal::from_str(s.trim()).map_err(|_| PriceError::Unparseable(s.to_owned()))?;
        Self::new(amount)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl Add for Price {
    type Output = Self;

    /// Saturating at `Decimal::MAX`; use [`Price::checked_add`] when the
    /// operands are untrusted.
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// A sales tax rate expressed as a fraction (`0.08` for 8%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct TaxRate(Decimal);

impl TaxRate {
    /// The storefront's default rate of 8%.
    pub const DEFAULT: Self = Self(Decimal::from_parts(8, 0, 0, false, 2));

    /// Create a tax rate.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::RateOutOfRange`] unless `0 <= rate < 1`.
    pub fn new(rate: Decimal) -> Result<Self, PriceError> {
        if rate < Decimal::ZERO || rate >= Decimal::ONE {
            return Err(PriceError::RateOutOfRange(rate));
        }
        Ok(Self(rate))
    }

    /// The rate as a fraction.
    #[must_use]
    pub const fn fraction(&self) -> Decimal {
        self.0
    }

    /// Tax owed on `subtotal`, rounded to cents.
    #[must_use]
    pub fn tax_on(&self, subtotal: Price) -> Price {
        Price(round_money(subtotal.0.saturating_mul(self.0)))
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for TaxRate {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rate =
            Decimal::from_str(s.trim()).map_err(|_| PriceError::Unparseable(s.to_owned()))?;
        Self::new(rate)
    }
}

impl TryFrom<Decimal> for TaxRate {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaxRate> for Decimal {
    fn from(rate: TaxRate) -> Self {
        rate.0
    }
}

/// Round to cents using banker's rounding (half to even).
fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp(MONEY_SCALE);
    rounded.rescale(MONEY_SCALE);
    rounded
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_new_rejects_negative() {
        assert!(matches!(Price::new(dec!(-0.01)), Err(PriceError::Negative(_))));
        assert_eq!(Price::new(dec!(0)).unwrap(), Price::ZERO);
    }

    #[test]
    fn test_display_always_two_places() {
        assert_eq!(Price::new(dec!(5)).unwrap().to_string(), "5.00");
        assert_eq!(Price::from_cents(1999).to_string(), "19.99");
    }

    #[test]
    fn test_rounds_half_to_even() {
        assert_eq!(Price::new(dec!(0.125)).unwrap().amount(), dec!(0.12));
        assert_eq!(Price::new(dec!(0.135)).unwrap().amount(), dec!(0.14));
    }

    #[test]
    fn test_times_and_sum() {
        let lines = [
            Price::new(dec!(10.00)).unwrap().times(2).unwrap(),
            Price::new(dec!(5.00)).unwrap().times(1).unwrap(),
        ];
        let subtotal: Price = lines.into_iter().sum();
        assert_eq!(subtotal.amount(), dec!(25.00));
    }

    #[test]
    fn test_default_tax_rate() {
        let subtotal = Price::new(dec!(25.00)).unwrap();
        let tax = TaxRate::default().tax_on(subtotal);
        assert_eq!(tax.amount(), dec!(2.00));
        assert_eq!((subtotal + tax).amount(), dec!(27.00));
    }

    #[test]
    fn test_tax_rounds_to_cents() {
        let subtotal = Price::new(dec!(9.99)).unwrap();
        // 9.99 * 0.08 = 0.7992
        assert_eq!(TaxRate::DEFAULT.tax_on(subtotal).amount(), dec!(0.80));
    }

    #[test]
    fn test_tax_rate_bounds() {
        assert!(TaxRate::new(dec!(1)).is_err());
        assert!(TaxRate::new(dec!(-0.01)).is_err());
        assert_eq!("0.2".parse::<TaxRate>().unwrap().fraction(), dec!(0.2));
    }

    #[test]
    fn test_serde_uses_strings() {
        let price = Price::new(dec!(10)).unwrap();
        assert_eq!(serde_json::to_string(&price).unwrap(), "\"10.00\"");
        let parsed: Price = serde_json::from_str("\"3.50\"").unwrap();
        assert_eq!(parsed.amount(), dec!(3.50));
        assert!(serde_json::from_str::<Price>("\"-1\"").is_err());
    }
}
