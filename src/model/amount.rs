//! Amount type for handling monetary values with optional dollar signs.
//!
//! `Amount` wraps `Decimal`. Intermediate values (daily rates, proportional shares) may carry
//! any precision; anything that is returned to a caller for persistence is rounded to the minor
//! currency unit with `round_cents`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// The number of decimal places in the minor currency unit.
pub const MINOR_UNIT_DP: u32 = 2;

/// Represents how dollar amounts were (or should be) formatted.
///
/// # Examples
///  - `AmountFormat{ dollar: true, commas: true }` -> `-$60,000.00`
///  - `AmountFormat{ dollar: false, commas: false }` -> `-60000.00`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AmountFormat {
    /// Whether a dollar sign is present in the formatting.
    dollar: bool,
    /// Whether commas are present as thousands separators in the formatting.
    commas: bool,
}

impl Default for AmountFormat {
    fn default() -> Self {
        DEFAULT_FORMAT
    }
}

/// The default format has a dollar sign and commas: e.g. `-$60,000.00`.
const DEFAULT_FORMAT: AmountFormat = AmountFormat {
    dollar: true,
    commas: true,
};

/// The format used when persisting: e.g. `-60000.00`.
const PLAIN_FORMAT: AmountFormat = AmountFormat {
    dollar: false,
    commas: false,
};

/// Represents a money value in major units (e.g. dollars).
///
/// Unlike the formatting, which only affects `Display`, equality, ordering and hashing are based
/// on the numeric value alone.
///
/// # Examples
///
/// ```
/// # use budget_engine::model::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("-5000.00").unwrap();
/// let b = Amount::from_str("-$5,000.00").unwrap();
/// assert_eq!(a, b);
/// assert_ne!(a.to_string(), b.to_string());
/// assert_eq!(b.to_string(), "-$5,000.00");
/// ```
///
/// Rounding to the minor unit is half-up:
/// ```
/// # use budget_engine::model::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("48.275").unwrap();
/// assert_eq!(a.round_cents(), Amount::from_str("48.28").unwrap());
/// ```
#[derive(Clone, Copy, Default)]
pub struct Amount {
    /// The parsed numerical value.
    value: Decimal,
    /// The way the numerical value was parsed from, or should be written to, a `String`.
    format: AmountFormat,
}

impl Amount {
    /// Creates a new Amount from a Decimal value with default `String` formatting.
    pub const fn new(value: Decimal) -> Self {
        Self {
            value,
            format: DEFAULT_FORMAT,
        }
    }

    /// Creates a new Amount from a Decimal value with default specified formatting.
    pub const fn new_with_format(value: Decimal, format: AmountFormat) -> Self {
        Self { value, format }
    }

    /// Zero dollars.
    pub const fn zero() -> Self {
        Self::new(Decimal::ZERO)
    }

    /// One minor currency unit, i.e. `0.01`.
    pub const fn minor_unit() -> Self {
        Self::new(Decimal::from_parts(1, 0, 0, false, MINOR_UNIT_DP))
    }

    /// Creates an amount from a count of minor units, e.g. `from_cents(1050)` is `10.50`.
    pub fn from_cents(cents: i64) -> Self {
        Self::new(Decimal::new(cents, MINOR_UNIT_DP))
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value().is_zero()
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.value().is_sign_positive()
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.value().is_sign_negative()
    }

    pub fn abs(&self) -> Self {
        Self::new_with_format(self.value.abs(), self.format)
    }

    /// Rounds to the minor currency unit using half-up (midpoint away from zero) rounding.
    pub fn round_cents(&self) -> Self {
        Self::new_with_format(
            self.value
                .round_dp_with_strategy(MINOR_UNIT_DP, RoundingStrategy::MidpointAwayFromZero),
            self.format,
        )
    }

    /// True when the value carries precision below the minor currency unit, e.g. `1.005`.
    pub fn has_sub_cent_precision(&self) -> bool {
        self.value.normalize().scale() > MINOR_UNIT_DP
    }

    /// Multiplies by `numerator / denominator` without rounding, multiplying first so that
    /// repeating fractions are introduced as late as possible. Returns zero for a zero
    /// denominator.
    pub fn scale(&self, numerator: Decimal, denominator: Decimal) -> Self {
        if denominator.is_zero() {
            return Self::zero();
        }
        Self::new(self.value * numerator / denominator)
    }

    /// The same value with plain formatting, e.g. `1234.50`.
    pub fn plain(&self) -> Self {
        Self::new_with_format(self.value, PLAIN_FORMAT)
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Amount {}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl Hash for Amount {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.normalize().hash(state)
    }
}

impl Debug for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.value)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Self) -> Self::Output {
        Amount::new_with_format(self.value + rhs.value, self.format)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.value += rhs.value;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount::new_with_format(self.value - rhs.value, self.format)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.value -= rhs.value;
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Self::Output {
        Amount::new_with_format(-self.value, self.format)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, a| acc + a)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, a| acc + *a)
    }
}

/// An error that can occur when parsing strings into `Decimal` values.
pub struct AmountError(rust_decimal::Error);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut dollar_sign = false;
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Ok(Amount::default());
        }

        let without_dollar = if let Some(after_minus) = trimmed.strip_prefix('-') {
            // Negative number: could be "-$50.00" or "-50.00"
            if let Some(after_dollar) = after_minus.strip_prefix('$') {
                dollar_sign = true;
                format!("-{after_dollar}")
            } else {
                trimmed.to_string()
            }
        } else if let Some(after_dollar) = trimmed.strip_prefix('$') {
            dollar_sign = true;
            after_dollar.to_string()
        } else {
            trimmed.to_string()
        };

        // Remove commas (thousand separators)
        let without_commas = without_dollar.replace(',', "");
        let commas = without_commas.len() < without_dollar.len();

        let value = Decimal::from_str(&without_commas).map_err(AmountError)?;
        Ok(Amount {
            value,
            format: AmountFormat {
                dollar: dollar_sign,
                commas,
            },
        })
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (sign, num) = if self.is_negative() {
            (String::from("-"), self.value().abs())
        } else {
            (String::new(), self.value())
        };

        let dol = if self.format.dollar {
            String::from("$")
        } else {
            String::new()
        };

        if self.format.commas {
            write!(
                f,
                "{sign}{dol}{}",
                format_num::format_num!(",.2", num.to_f64().unwrap_or_default())
            )
        } else {
            write!(f, "{sign}{dol}{num}")
        }
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Persist without dollar signs or separators so that stored values re-parse exactly.
        serializer.serialize_str(&self.plain().to_string())
    }
}

struct AmountVisitor;

impl Visitor<'_> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a money value as a string or a number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Amount::from_str(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Amount::new(Decimal::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Amount::new(Decimal::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        // Going through the shortest round-trip string avoids binary float noise like 0.1000001.
        Amount::from_str(&v.to_string()).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AmountVisitor)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_with_dollar_sign() {
        assert_eq!(amt("$50.00").value(), Decimal::from_str("50.00").unwrap());
    }

    #[test]
    fn test_parse_negative_with_dollar_sign() {
        assert_eq!(amt("-$50.00").value(), Decimal::from_str("-50.00").unwrap());
    }

    #[test]
    fn test_parse_empty_string() {
        assert_eq!(amt("").value(), Decimal::ZERO);
    }

    #[test]
    fn test_parse_large_amount_with_commas() {
        assert_eq!(
            amt("-$60,000.00").value(),
            Decimal::from_str("-60000.00").unwrap()
        );
    }

    #[test]
    fn test_display_default_format() {
        assert_eq!(Amount::from_cents(123456).to_string(), "$1,234.56");
        assert_eq!(Amount::from_cents(-5000).to_string(), "-$50.00");
    }

    #[test]
    fn test_parse_retains_format() {
        let s = "1,000,000.00";
        assert_eq!(amt(s).to_string(), s);
        let s = "-$1000000.00";
        assert_eq!(amt(s).to_string(), s);
    }

    #[test]
    fn test_equality_ignores_format() {
        assert_eq!(amt("$50.00"), amt("50"));
        assert!(amt("$30.00") < amt("50.00"));
    }

    #[test]
    fn test_zero_is_not_positive_or_negative() {
        let zero = amt("-0.00");
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());
    }

    #[test]
    fn test_round_cents_half_up() {
        assert_eq!(amt("0.005").round_cents(), amt("0.01"));
        assert_eq!(amt("0.0049").round_cents(), amt("0.00"));
        assert_eq!(amt("46.428571").round_cents(), amt("46.43"));
        assert_eq!(amt("-1.005").round_cents(), amt("-1.01"));
    }

    #[test]
    fn test_sub_cent_precision() {
        assert!(amt("1.005").has_sub_cent_precision());
        assert!(!amt("1.50").has_sub_cent_precision());
        assert!(!amt("1.500000").has_sub_cent_precision());
    }

    #[test]
    fn test_scale_multiplies_first() {
        let a = amt("100").scale(Decimal::from(31), Decimal::from(31));
        assert_eq!(a, amt("100"));
        assert_eq!(amt("100").scale(Decimal::ONE, Decimal::ZERO), Amount::zero());
    }

    #[test]
    fn test_sum_and_arithmetic() {
        let total: Amount = [amt("1.10"), amt("2.20"), amt("3.30")].iter().sum();
        assert_eq!(total, amt("6.60"));
        assert_eq!(total - amt("0.60"), amt("6"));
        assert_eq!(-amt("1"), amt("-1"));
    }

    #[test]
    fn test_serialize_plain() {
        let json = serde_json::to_string(&Amount::from_cents(123456)).unwrap();
        assert_eq!(json, "\"1234.56\"");
    }

    #[test]
    fn test_deserialize_string_or_number() {
        let a: Amount = serde_json::from_str("\"$1,234.56\"").unwrap();
        assert_eq!(a, Amount::from_cents(123456));
        let b: Amount = serde_json::from_str("60.1").unwrap();
        assert_eq!(b, Amount::from_cents(6010));
        let c: Amount = serde_json::from_str("40").unwrap();
        assert_eq!(c, Amount::from_cents(4000));
    }

    #[test]
    fn test_minor_unit() {
        assert_eq!(Amount::minor_unit(), amt("0.01"));
    }
}
