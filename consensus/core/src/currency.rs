use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul};
use std::str::FromStr;

/// Tax levied on storage-related payouts, as a fixed-denominator fraction.
pub const TAX_NUMERATOR: u64 = 39;
pub const TAX_DENOMINATOR: u64 = 1000;

/// A non-negative arbitrary-precision amount of coins (or block stakes).
/// Negative values are unrepresentable; subtraction is explicit about what
/// happens on underflow.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Currency(BigUint);

impl Currency {
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    pub fn mul64(&self, rhs: u64) -> Currency {
        Currency(&self.0 * rhs)
    }

    /// Integer division by a small divisor. Panics on zero, like any division.
    pub fn div64(&self, rhs: u64) -> Currency {
        Currency(&self.0 / rhs)
    }

    pub fn checked_sub(&self, rhs: &Currency) -> Option<Currency> {
        if self.0 >= rhs.0 {
            Some(Currency(&self.0 - &rhs.0))
        } else {
            None
        }
    }

    /// Subtraction flooring at zero, for counters that drain toward zero.
    pub fn saturating_sub(&self, rhs: &Currency) -> Currency {
        self.checked_sub(rhs).unwrap_or_default()
    }

    /// The fixed-denominator tax over this amount.
    pub fn mul_tax(&self) -> Currency {
        self.mul64(TAX_NUMERATOR).div64(TAX_DENOMINATOR)
    }

    pub fn pow(&self, exp: u32) -> Currency {
        Currency(self.0.pow(exp))
    }

    /// Lossy conversion used only for proportional sampling, never for
    /// balance checks.
    pub fn to_f64_lossy(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::MAX)
    }

    pub fn to_be_bytes(&self) -> Vec<u8> {
        self.0.to_bytes_be()
    }

    pub fn from_be_bytes(bytes: &[u8]) -> Currency {
        Currency(BigUint::from_bytes_be(bytes))
    }
}

impl From<u64> for Currency {
    fn from(value: u64) -> Self {
        Currency(BigUint::from(value))
    }
}

impl From<u32> for Currency {
    fn from(value: u32) -> Self {
        Currency(BigUint::from(value))
    }
}

impl Add for &Currency {
    type Output = Currency;
    fn add(self, rhs: &Currency) -> Currency {
        Currency(&self.0 + &rhs.0)
    }
}

impl Add for Currency {
    type Output = Currency;
    fn add(self, rhs: Currency) -> Currency {
        Currency(self.0 + rhs.0)
    }
}

impl AddAssign<&Currency> for Currency {
    fn add_assign(&mut self, rhs: &Currency) {
        self.0 += &rhs.0;
    }
}

impl Mul for &Currency {
    type Output = Currency;
    fn mul(self, rhs: &Currency) -> Currency {
        Currency(&self.0 * &rhs.0)
    }
}

impl Div for &Currency {
    type Output = Currency;
    fn div(self, rhs: &Currency) -> Currency {
        Currency(&self.0 / &rhs.0)
    }
}

impl Sum for Currency {
    fn sum<I: Iterator<Item = Currency>>(iter: I) -> Currency {
        iter.fold(Currency::zero(), |acc, c| acc + c)
    }
}

impl<'a> Sum<&'a Currency> for Currency {
    fn sum<I: Iterator<Item = &'a Currency>>(iter: I) -> Currency {
        iter.fold(Currency::zero(), |mut acc, c| {
            acc += c;
            acc
        })
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Currency {
    type Err = num_bigint::ParseBigIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Currency(BigUint::from_str(s)?))
    }
}

impl Serialize for Currency {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.to_be_bytes())
        }
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = <&str as Deserialize>::deserialize(deserializer)?;
            Currency::from_str(s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8> as Deserialize>::deserialize(deserializer)?;
            Ok(Currency::from_be_bytes(&bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_total() {
        let small = Currency::from(5u64);
        let large = Currency::from(7u64);
        assert!(small < large);
        assert!(large > small);
        assert_eq!(small.cmp(&small.clone()), std::cmp::Ordering::Equal);
    }

    #[test]
    fn zero_detection() {
        assert!(Currency::zero().is_zero());
        assert!(!Currency::from(1u64).is_zero());
        assert!(Currency::from(1u64).saturating_sub(&Currency::from(1u64)).is_zero());
    }

    #[test]
    fn subtraction_never_goes_negative() {
        let one = Currency::from(1u64);
        let two = Currency::from(2u64);
        assert_eq!(one.checked_sub(&two), None);
        assert_eq!(one.saturating_sub(&two), Currency::zero());
        assert_eq!(two.checked_sub(&one), Some(Currency::from(1u64)));
    }

    #[test]
    fn mul_tax_uses_fixed_denominator() {
        let amount = Currency::from(1000u64);
        assert_eq!(amount.mul_tax(), Currency::from(39u64));
        // truncating division
        assert_eq!(Currency::from(25u64).mul_tax(), Currency::from(0u64));
    }

    #[test]
    fn exceeds_u64_range() {
        let huge = Currency::from(10u32).pow(150);
        assert_eq!(huge.to_string().len(), 151);
        assert_eq!(&huge / &Currency::from(10u32).pow(150), Currency::from(1u64));
    }

    #[test]
    fn binary_round_trip_is_exact() {
        let value = Currency::from(10u32).pow(42) + Currency::from(17u64);
        let encoded = bincode::serialize(&value).unwrap();
        let decoded: Currency = bincode::deserialize(&encoded).unwrap();
        assert_eq!(value, decoded);
    }
}
