//! Fixed-point amounts
//!
//! Balances and transfer values are counted in 10^-8 units so that ledger
//! replay is exact on every node.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional decimal digits carried by an [`Amount`]
pub const AMOUNT_DECIMALS: u32 = 8;

/// Errors raised when parsing an amount from text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Invalid amount: {0}")]
    Invalid(String),
    #[error("Too many decimal places in {0} (max: {AMOUNT_DECIMALS})")]
    TooPrecise(String),
    #[error("Amount out of range: {0}")]
    OutOfRange(String),
}

/// A signed fixed-point quantity of coins
///
/// Transaction amounts are always positive; ledger balances may be negative
/// only for the privileged system wallet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(i64);

impl Amount {
    /// Units per whole coin
    pub const COIN: i64 = 100_000_000;

    pub const ZERO: Amount = Amount(0);

    /// Build an amount from raw 10^-8 units
    pub const fn from_units(units: i64) -> Self {
        Self(units)
    }

    /// Build an amount from whole coins
    pub const fn from_coins(coins: i64) -> Self {
        Self(coins * Self::COIN)
    }

    pub const fn units(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let coin = Self::COIN as u64;
        let whole = abs / coin;
        let frac = abs % coin;

        if frac == 0 {
            write!(f, "{}{}", sign, whole)
        } else {
            let digits = format!("{:08}", frac);
            write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
        }
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (whole, frac) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body, ""),
        };

        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
            return Err(AmountError::Invalid(s.to_string()));
        }
        if frac.len() > AMOUNT_DECIMALS as usize {
            return Err(AmountError::TooPrecise(s.to_string()));
        }

        let whole_units: i64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<i64>()
                .map_err(|_| AmountError::OutOfRange(s.to_string()))?
        };
        let frac_units: i64 = if frac.is_empty() {
            0
        } else {
            format!("{:0<8}", frac)
                .parse::<i64>()
                .map_err(|_| AmountError::Invalid(s.to_string()))?
        };

        let units = whole_units
            .checked_mul(Self::COIN)
            .and_then(|u| u.checked_add(frac_units))
            .ok_or_else(|| AmountError::OutOfRange(s.to_string()))?;

        Ok(Amount(if negative { -units } else { units }))
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}
