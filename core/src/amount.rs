//! Token amounts in wire units.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AmountError;

/// Number of fractional digits between the human-facing unit and wire units.
pub const DECIMALS: u8 = 8;

/// Wire units per human-facing unit (`10^8`).
pub const SCALE: u64 = 10u64.pow(DECIMALS as u32);

/// An amount of the wagered token, counted in the smallest (wire) unit.
///
/// All ledger arithmetic happens in wire units. Conversion to and from the
/// human-facing unit only happens at the edges via [`Amount::from_human`]
/// and [`Amount::to_human`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Wrap a raw wire-unit count.
    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    /// `whole` human units, e.g. `from_whole(5)` is five tokens.
    pub fn from_whole(whole: u64) -> Result<Self, AmountError> {
        whole
            .checked_mul(SCALE)
            .map(Self)
            .ok_or(AmountError::Overflow)
    }

    /// Parse a human-facing decimal such as `"1.25"` into wire units.
    pub fn from_human(s: &str) -> Result<Self, AmountError> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountError::Malformed(s.to_string()));
        }
        if frac.len() > DECIMALS as usize {
            return Err(AmountError::TooManyDecimals(frac.len()));
        }
        let digits_only = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if !digits_only(whole) || !digits_only(frac) {
            return Err(AmountError::Malformed(s.to_string()));
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| AmountError::Overflow)?
        };
        let frac_units: u64 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = DECIMALS as usize);
            padded
                .parse()
                .map_err(|_| AmountError::Malformed(s.to_string()))?
        };

        Self::from_whole(whole)?
            .checked_add(Self(frac_units))
            .ok_or(AmountError::Overflow)
    }

    /// Fixed-width human-facing representation, e.g. `"1.25000000"`.
    pub fn to_human(&self) -> String {
        let whole = self.0 / SCALE;
        let rem = self.0 % SCALE;
        format!("{}.{:0>width$}", whole, rem, width = DECIMALS as usize)
    }

    /// Raw wire-unit count.
    pub const fn units(&self) -> u64 {
        self.0
    }

    /// Wire encoding: the decimal string of the unit count.
    pub fn to_wire(&self) -> String {
        self.0.to_string()
    }

    /// Inverse of [`Amount::to_wire`].
    pub fn from_wire(s: &str) -> Result<Self, AmountError> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| AmountError::Malformed(s.to_string()))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_mul(self, factor: u64) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Absolute difference between two amounts.
    pub fn abs_diff(self, rhs: Self) -> Self {
        Self(self.0.abs_diff(rhs.0))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_human(s)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_conversion() {
        assert_eq!(Amount::from_human("5").unwrap().units(), 500_000_000);
        assert_eq!(Amount::from_human("1.25").unwrap().units(), 125_000_000);
        assert_eq!(Amount::from_human(".5").unwrap().units(), 50_000_000);
        assert_eq!(Amount::from_human("0.00000001").unwrap().units(), 1);
        assert_eq!(Amount::from_units(125_000_000).to_human(), "1.25000000");
        assert_eq!(Amount::from_whole(3).unwrap().to_string(), "3.00000000");
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            Amount::from_human("1.123456789"),
            Err(AmountError::TooManyDecimals(9))
        );
        assert!(matches!(
            Amount::from_human("1,5"),
            Err(AmountError::Malformed(_))
        ));
        assert!(matches!(Amount::from_human("."), Err(AmountError::Malformed(_))));
        assert!(matches!(Amount::from_human("-1"), Err(AmountError::Malformed(_))));
        assert_eq!(
            Amount::from_human("184467440738"),
            Err(AmountError::Overflow)
        );
        assert_eq!(Amount::from_whole(u64::MAX), Err(AmountError::Overflow));
    }

    #[test]
    fn wire_encoding_is_unit_count() {
        let amount = Amount::from_human("2.5").unwrap();
        assert_eq!(amount.to_wire(), "250000000");
        assert_eq!(Amount::from_wire("250000000").unwrap(), amount);
        assert!(Amount::from_wire("2.5").is_err());
    }

    #[test]
    fn arithmetic_helpers() {
        let a = Amount::from_units(5);
        let b = Amount::from_units(3);
        assert_eq!(a.abs_diff(b), Amount::from_units(2));
        assert_eq!(b.abs_diff(a), Amount::from_units(2));
        assert_eq!(b.saturating_sub(a), Amount::ZERO);
        assert_eq!(a.checked_mul(2), Some(Amount::from_units(10)));
        assert_eq!(Amount::from_units(u64::MAX).checked_add(a), None);
    }
}
