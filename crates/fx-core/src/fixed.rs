// crates/fx-core/src/fixed.rs
//
// Fixed-point arithmetic for the treasury engine.
//
// Two scales are in use:
//   - PRECISION (10^18): amounts, prices, NAVs, collateral and leverage ratios.
//   - FEE_PRECISION (10^9): fee, harvester, and rebalance-pool ratios.
//
// Every cross-unit product goes through `mul_div`, which keeps the full
// 256-bit intermediate and rounds exactly once, in the direction the caller
// asks for. Amounts paid to users round down; amounts charged round up.

use std::fmt;
use std::str::FromStr;

use ethnum::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::FxError;

/// Unit of the 18-decimal scale (1.0).
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Unit of the 9-decimal ratio scale (100%).
pub const FEE_PRECISION: u64 = 1_000_000_000;

/// Rounding mode for division operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round towards zero.
    Down,
    /// Round away from zero.
    Up,
}

/// Compute `a * b / denominator` with a 256-bit intermediate.
///
/// # Errors
/// Returns `FxError::DivisionByZero` if `denominator` is zero and
/// `FxError::MathOverflow` if the quotient does not fit in `u128`.
pub fn mul_div(a: u128, b: u128, denominator: u128, rounding: Rounding) -> Result<u128, FxError> {
    if denominator == 0 {
        return Err(FxError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    let denominator = U256::from(denominator);
    let mut quotient = product / denominator;
    if rounding == Rounding::Up && product % denominator != U256::ZERO {
        quotient += U256::ONE;
    }
    u128::try_from(quotient).map_err(|_| FxError::MathOverflow)
}

/// An 18-decimal fixed-point value (`Wad::ONE` = 1.0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wad(pub u128);

impl Wad {
    pub const ZERO: Wad = Wad(0);
    pub const ONE: Wad = Wad(PRECISION);

    /// Wrap a raw 18-decimal integer.
    pub const fn from_raw(raw: u128) -> Self {
        Wad(raw)
    }

    /// Whole-number value, e.g. `Wad::from_int(2000)` is 2000.0.
    pub const fn from_int(n: u128) -> Self {
        Wad(n * PRECISION)
    }

    /// A ratio `numerator / denominator`, e.g. `Wad::from_ratio(13, 10)` is 1.3.
    pub const fn from_ratio(numerator: u128, denominator: u128) -> Self {
        Wad(numerator * PRECISION / denominator)
    }

    pub const fn raw(self) -> u128 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `amount * self`, e.g. the value of `amount` tokens priced at `self`.
    pub fn mul_amount(self, amount: u128, rounding: Rounding) -> Result<u128, FxError> {
        mul_div(amount, self.0, PRECISION, rounding)
    }

    /// `amount / self`, e.g. how many tokens priced at `self` a value buys.
    pub fn div_amount(self, amount: u128, rounding: Rounding) -> Result<u128, FxError> {
        mul_div(amount, PRECISION, self.0, rounding)
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / PRECISION;
        let frac = self.0 % PRECISION;
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            let frac_str = format!("{:018}", frac);
            write!(f, "{}.{}", whole, frac_str.trim_end_matches('0'))
        }
    }
}

/// Error parsing a decimal string into a [`Wad`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid decimal {input:?}: {reason}")]
pub struct ParseDecimalError {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for Wad {
    type Err = ParseDecimalError;

    /// Parse a plain decimal such as `"2000"`, `"1.3"` or `"0.000000000000000001"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| ParseDecimalError {
            input: s.to_string(),
            reason,
        };
        let (whole, frac) = s.trim().split_once('.').unwrap_or((s.trim(), ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(err("empty"));
        }
        if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err("expected digits with an optional decimal point"));
        }
        if frac.len() > 18 {
            return Err(err("more than 18 decimal places"));
        }
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| err("out of range"))?
        };
        let frac: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<18}", frac);
            padded.parse().map_err(|_| err("out of range"))?
        };
        whole
            .checked_mul(PRECISION)
            .and_then(|w| w.checked_add(frac))
            .map(Wad)
            .ok_or_else(|| err("out of range"))
    }
}

/// A 9-decimal ratio (`FeeRatio::ONE` = 100%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeRatio(pub u64);

impl FeeRatio {
    pub const ZERO: FeeRatio = FeeRatio(0);
    pub const ONE: FeeRatio = FeeRatio(FEE_PRECISION);

    /// Ratio from a percentage, e.g. `FeeRatio::from_percent(10)` is 10%.
    pub const fn from_percent(percent: u64) -> Self {
        FeeRatio(percent * FEE_PRECISION / 100)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` if the ratio is at most 100%.
    pub const fn is_bounded(self) -> bool {
        self.0 <= FEE_PRECISION
    }

    /// `amount * self / 1e9`.
    pub fn apply(self, amount: u128, rounding: Rounding) -> Result<u128, FxError> {
        mul_div(amount, self.0 as u128, FEE_PRECISION as u128, rounding)
    }
}
