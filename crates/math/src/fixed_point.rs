//! Decimal fixed-point arithmetic with the scale carried in the type
//!
//! A `FixedPoint<D>` is an arbitrary-precision integer equal to the real
//! value multiplied by 10^D. Values of different scales never mix: moving
//! between scales goes through `rescale` or `from_units`, so every boundary
//! conversion is visible at the call site.

use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{MathError, MathResult};

/// Scale of balances, rewards, profit and APY values
pub const WAD_DECIMALS: u32 = 18;

/// Scale of reward price feeds
pub const PRICE_DECIMALS: u32 = 8;

/// 18-decimal fixed point
pub type Wad = FixedPoint<WAD_DECIMALS>;

/// 8-decimal fixed point, the price feed scale
pub type PriceE8 = FixedPoint<PRICE_DECIMALS>;

/// 10^decimals as a big integer
pub fn pow10(decimals: u32) -> BigInt {
    num_traits::pow(BigInt::from(10u8), decimals as usize)
}

/// Move a raw integer from one decimal scale to another, truncating toward
/// zero when precision is dropped
fn convert_scale(raw: BigInt, from: u32, to: u32) -> BigInt {
    if to >= from {
        raw * pow10(to - from)
    } else {
        raw / pow10(from - to)
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FixedPoint<const DECIMALS: u32> {
    raw: BigInt,
}

impl<const DECIMALS: u32> FixedPoint<DECIMALS> {
    pub fn zero() -> Self {
        Self { raw: BigInt::zero() }
    }

    /// Wrap an integer already expressed at this scale
    pub fn from_raw(raw: impl Into<BigInt>) -> Self {
        Self { raw: raw.into() }
    }

    /// Normalize a token amount given in its native decimals (e.g. 6 for USDC)
    pub fn from_units(amount: impl Into<BigInt>, native_decimals: u32) -> Self {
        Self {
            raw: convert_scale(amount.into(), native_decimals, DECIMALS),
        }
    }

    /// Whole-number value, e.g. `Wad::from_integer(100)` is 100.0
    pub fn from_integer(value: i64) -> Self {
        Self::from_units(value, 0)
    }

    /// 10^DECIMALS, the raw representation of 1.0
    pub fn scale() -> BigInt {
        pow10(DECIMALS)
    }

    pub const fn decimals() -> u32 {
        DECIMALS
    }

    pub fn raw(&self) -> &BigInt {
        &self.raw
    }

    /// Convert to another scale. Reducing precision truncates toward zero.
    pub fn rescale<const TARGET: u32>(&self) -> FixedPoint<TARGET> {
        FixedPoint {
            raw: convert_scale(self.raw.clone(), DECIMALS, TARGET),
        }
    }

    /// Raw integer at an arbitrary runtime scale, used at wire boundaries
    /// where the scale comes from configuration
    pub fn raw_at_scale(&self, decimals: u32) -> BigInt {
        convert_scale(self.raw.clone(), DECIMALS, decimals)
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.raw.is_positive()
    }

    pub fn is_negative(&self) -> bool {
        self.raw.is_negative()
    }

    /// Parse a decimal string such as `"105.0"` or `"-0.25"`
    pub fn parse(input: &str) -> MathResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(MathError::invalid_decimal(input, "empty input"));
        }

        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(MathError::invalid_decimal(input, "no digits"));
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(MathError::invalid_decimal(input, "unexpected character"));
        }
        if frac_part.len() > DECIMALS as usize {
            return Err(MathError::precision_loss(input, frac_part.len(), DECIMALS));
        }

        let int_value = parse_digits(int_part);
        let padded = format!("{:0<width$}", frac_part, width = DECIMALS as usize);
        let frac_value = parse_digits(&padded);

        let raw = int_value * Self::scale() + frac_value;
        Ok(Self {
            raw: if negative { -raw } else { raw },
        })
    }
}

fn parse_digits(digits: &str) -> BigInt {
    if digits.is_empty() {
        return BigInt::zero();
    }
    // Callers have already checked every byte is an ASCII digit.
    BigInt::parse_bytes(digits.as_bytes(), 10).unwrap_or_default()
}

impl<const DECIMALS: u32> fmt::Display for FixedPoint<DECIMALS> {
    /// Renders like `formatUnits`: trailing zeros trimmed, at least one
    /// fractional digit
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = Self::scale();
        let magnitude = self.raw.abs();
        let int_part = &magnitude / &scale;
        let frac_part = &magnitude % &scale;

        let mut frac = format!("{:0>width$}", frac_part.to_string(), width = DECIMALS as usize);
        while frac.len() > 1 && frac.ends_with('0') {
            frac.pop();
        }
        if frac.is_empty() {
            frac.push('0');
        }

        let sign = if self.raw.is_negative() { "-" } else { "" };
        write!(f, "{}{}.{}", sign, int_part, frac)
    }
}

impl<const DECIMALS: u32> fmt::Debug for FixedPoint<DECIMALS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedPoint<{}>({})", DECIMALS, self)
    }
}

impl<const DECIMALS: u32> FromStr for FixedPoint<DECIMALS> {
    type Err = MathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Arithmetic
// ============================================================================

impl<const DECIMALS: u32> Add for FixedPoint<DECIMALS> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self { raw: self.raw + rhs.raw }
    }
}

impl<'a, const DECIMALS: u32> Add<&'a FixedPoint<DECIMALS>> for &'a FixedPoint<DECIMALS> {
    type Output = FixedPoint<DECIMALS>;

    fn add(self, rhs: &'a FixedPoint<DECIMALS>) -> FixedPoint<DECIMALS> {
        FixedPoint { raw: &self.raw + &rhs.raw }
    }
}

impl<const DECIMALS: u32> Sub for FixedPoint<DECIMALS> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self { raw: self.raw - rhs.raw }
    }
}

impl<'a, const DECIMALS: u32> Sub<&'a FixedPoint<DECIMALS>> for &'a FixedPoint<DECIMALS> {
    type Output = FixedPoint<DECIMALS>;

    fn sub(self, rhs: &'a FixedPoint<DECIMALS>) -> FixedPoint<DECIMALS> {
        FixedPoint { raw: &self.raw - &rhs.raw }
    }
}

impl<const DECIMALS: u32> Neg for FixedPoint<DECIMALS> {
    type Output = Self;

    fn neg(self) -> Self {
        Self { raw: -self.raw }
    }
}

// ============================================================================
// Serde: decimal strings, so persisted histories stay exact and readable
// ============================================================================

impl<const DECIMALS: u32> Serialize for FixedPoint<DECIMALS> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de, const DECIMALS: u32> Deserialize<'de> for FixedPoint<DECIMALS> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let value = Wad::parse("105.0").unwrap();
        assert_eq!(value.raw(), &(BigInt::from(105) * pow10(18)));
        assert_eq!(value.to_string(), "105.0");

        assert_eq!(Wad::parse("25.55").unwrap().to_string(), "25.55");
        assert_eq!(Wad::parse("-0.5").unwrap().to_string(), "-0.5");
        assert_eq!(Wad::parse(".5").unwrap().to_string(), "0.5");
        assert_eq!(Wad::parse("7").unwrap().to_string(), "7.0");
        assert_eq!(Wad::from_raw(1).to_string(), "0.000000000000000001");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(Wad::parse(""), Err(MathError::InvalidDecimal { .. })));
        assert!(matches!(Wad::parse("."), Err(MathError::InvalidDecimal { .. })));
        assert!(matches!(Wad::parse("1.2.3"), Err(MathError::InvalidDecimal { .. })));
        assert!(matches!(Wad::parse("12a"), Err(MathError::InvalidDecimal { .. })));
        assert!(matches!(
            PriceE8::parse("1.123456789"),
            Err(MathError::PrecisionLoss { digits: 9, scale: 8, .. })
        ));
    }

    #[test]
    fn test_native_units_normalization() {
        // 105 USDC in 6-decimal native units
        let balance = Wad::from_units(105_000_000u64, 6);
        assert_eq!(balance, Wad::from_integer(105));

        // Going to a coarser scale truncates
        let price = PriceE8::from_units(123_456_789_999u64, 11);
        assert_eq!(price.to_string(), "1.23456789");
    }

    #[test]
    fn test_rescale() {
        let apy = Wad::parse("25.55").unwrap();
        let as_e16: FixedPoint<16> = apy.rescale();
        assert_eq!(as_e16.raw(), &(BigInt::from(2555) * pow10(14)));

        let back: Wad = as_e16.rescale();
        assert_eq!(back, apy);

        let negative = Wad::parse("-0.123").unwrap();
        let truncated: FixedPoint<1> = negative.rescale();
        assert_eq!(truncated.to_string(), "-0.1");

        assert_eq!(apy.raw_at_scale(16), BigInt::from(2555) * pow10(14));
    }

    #[test]
    fn test_arithmetic_and_sign() {
        let a = Wad::from_integer(105);
        let b = Wad::from_integer(100);
        assert_eq!(&a - &b, Wad::from_integer(5));
        assert_eq!(a.clone() + b.clone(), Wad::from_integer(205));
        assert!((b.clone() - a.clone()).is_negative());
        assert!(Wad::zero().is_zero());
        assert!(!Wad::zero().is_positive());
        assert_eq!(-Wad::from_integer(3), Wad::parse("-3").unwrap());
    }

    #[test]
    fn test_serde_as_string() {
        let value = PriceE8::parse("1.5").unwrap();
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"1.5\"");

        let back: PriceE8 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);

        assert!(serde_json::from_str::<PriceE8>("\"abc\"").is_err());
    }
}
