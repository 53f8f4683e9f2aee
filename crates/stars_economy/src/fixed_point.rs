//! # Fixed-Point Arithmetic
//!
//! **NO FLOATING POINT IN BALANCES**
//!
//! Every amount of STAR is a whole number of micro-units (6 decimals):
//!
//! - `Amount`: non-negative, balances, wagers, rewards
//! - `Delta`: signed, transaction amounts
//! - `Multiplier`: non-negative payout factor
//!
//! `0.1 + 0.2 == 0.3` holds exactly, so the sum of an account's transactions
//! always equals its balance to the last micro-unit.
//!
//! Config files write decimals (`reward = 0.2`); they are rounded to the
//! nearest micro-unit once, at load.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EconomyError, EconomyResult};

/// Number of decimal places for all fixed-point values.
const DECIMAL_PLACES: u32 = 6;

/// The multiplier for 6 decimal places.
const SCALE: u64 = 10u64.pow(DECIMAL_PLACES);

/// Basis points in 100%.
const BASIS_POINTS: u128 = 10_000;

/// Converts a decimal float to micro-units, rejecting negatives and NaN.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn micros_from_f64(value: f64) -> Result<u64, String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{value} is not a non-negative finite number"));
    }
    let scaled = (value * SCALE as f64).round();
    if scaled >= u64::MAX as f64 {
        return Err(format!("{value} is out of range"));
    }
    Ok(scaled as u64)
}

#[allow(clippy::cast_precision_loss)]
fn micros_to_f64(micros: u64) -> f64 {
    micros as f64 / SCALE as f64
}

// =============================================================================
// Amount
// =============================================================================

/// Non-negative STAR amount with 6 decimal places.
///
/// Internally stores value * 1,000,000 as a u64.
///
/// # Range
///
/// - Minimum: 0.000000
/// - Maximum: 18,446,744,073,709.551615
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
#[repr(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Zero value.
    pub const ZERO: Self = Self(0);

    /// One STAR (1.000000).
    pub const ONE: Self = Self(SCALE);

    /// Maximum representable value.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates an amount from whole STAR.
    ///
    /// Constructor for literals and config constants; runtime arithmetic
    /// goes through the checked operations.
    ///
    /// ```rust,ignore
    /// let ten = Amount::from_whole(10); // 10.000000
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `whole` exceeds `u64::MAX / 1_000_000`.
    #[inline]
    #[must_use]
    pub const fn from_whole(whole: u64) -> Self {
        Self(whole * SCALE)
    }

    /// Creates an amount from parts.
    ///
    /// # Arguments
    ///
    /// * `whole` - The whole number part
    /// * `micros` - The fractional part in micro-units (0-999999)
    ///
    /// ```rust,ignore
    /// let reward = Amount::from_parts(0, 200_000); // 0.200000
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `whole` is out of range, and in debug builds if `micros`
    /// is not below one whole unit.
    #[inline]
    #[must_use]
    pub const fn from_parts(whole: u64, micros: u32) -> Self {
        debug_assert!((micros as u64) < SCALE, "micros must be below 1_000_000");
        Self(whole * SCALE + micros as u64)
    }

    /// Creates an amount from raw micro-units.
    #[inline]
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Returns the raw micro-units.
    #[inline]
    #[must_use]
    pub const fn micros(self) -> u64 {
        self.0
    }

    /// Returns the whole number part.
    #[inline]
    #[must_use]
    pub const fn whole(self) -> u64 {
        self.0 / SCALE
    }

    /// Returns the fractional part in micro-units (0-999999).
    #[inline]
    #[must_use]
    pub const fn fraction(self) -> u32 {
        (self.0 % SCALE) as u32
    }

    /// Returns true if this value is zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition. Returns `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction. Returns `None` on underflow.
    #[inline]
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Safe addition with error on overflow.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::ArithmeticOverflow` if the addition would overflow.
    #[inline]
    pub fn safe_add(self, rhs: Self) -> EconomyResult<Self> {
        self.checked_add(rhs).ok_or(EconomyError::ArithmeticOverflow)
    }

    /// Applies a signed delta. Returns `None` if the result would be negative
    /// or overflow.
    #[inline]
    #[must_use]
    pub const fn checked_apply(self, delta: Delta) -> Option<Self> {
        let result = if delta.0 >= 0 {
            self.0.checked_add(delta.0.unsigned_abs())
        } else {
            self.0.checked_sub(delta.0.unsigned_abs())
        };
        match result {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Multiplies by a percentage in basis points (10000 = 100%), rounding down.
    ///
    /// ```rust,ignore
    /// let reward = Amount::from_parts(0, 200_000);
    /// let income = reward.mul_percent_bp(1000); // 0.020000
    /// ```
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn mul_percent_bp(self, percent_basis_points: u32) -> Self {
        // bp <= 10000 is enforced by config validation, so the result never exceeds self.
        let result = (self.0 as u128 * percent_basis_points as u128) / BASIS_POINTS;
        Self(result as u64)
    }

    /// Multiplies by a payout multiplier, rounding down to the micro-unit.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::ArithmeticOverflow` if the product does not fit.
    pub fn mul_multiplier(self, multiplier: Multiplier) -> EconomyResult<Self> {
        let product = u128::from(self.0) * u128::from(multiplier.0) / u128::from(SCALE);
        u64::try_from(product)
            .map(Self)
            .map_err(|_| EconomyError::ArithmeticOverflow)
    }

    /// The amount as a positive delta.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::ArithmeticOverflow` above `i64::MAX` micro-units.
    pub fn credit(self) -> EconomyResult<Delta> {
        i64::try_from(self.0)
            .map(Delta)
            .map_err(|_| EconomyError::ArithmeticOverflow)
    }

    /// The amount as a negative delta.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::ArithmeticOverflow` above `i64::MAX` micro-units.
    pub fn debit(self) -> EconomyResult<Delta> {
        self.credit().map(|d| Delta(-d.0))
    }

    /// Lossy conversion for display and statistics only.
    #[must_use]
    pub fn to_f64(self) -> f64 {
        micros_to_f64(self.0)
    }
}

impl TryFrom<f64> for Amount {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        micros_from_f64(value).map(Self)
    }
}

impl From<Amount> for f64 {
    fn from(amount: Amount) -> Self {
        amount.to_f64()
    }
}

impl FromStr for Amount {
    type Err = EconomyError;

    /// Parses `"15"`, `"0.2"` or `"12.345678"`; more than 6 decimals is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EconomyError::InvalidConfig(format!("invalid amount: {s:?}"));
        let (whole, fraction) = s.trim().split_once('.').unwrap_or((s.trim(), ""));
        if whole.is_empty() || fraction.len() > DECIMAL_PLACES as usize {
            return Err(invalid());
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let whole: u64 = whole.parse().map_err(|_| invalid())?;
        let micros: u64 = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{fraction:0<6}");
            padded.parse().map_err(|_| invalid())?
        };
        whole
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(micros))
            .map(Self)
            .ok_or(EconomyError::ArithmeticOverflow)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({}.{:06})", self.whole(), self.fraction())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.whole(), self.fraction())
    }
}

// =============================================================================
// Delta
// =============================================================================

/// Signed STAR amount, the value of one transaction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Delta(i64);

impl Delta {
    /// Zero value.
    pub const ZERO: Self = Self(0);

    /// Creates a delta from raw signed micro-units.
    #[inline]
    #[must_use]
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Returns the raw signed micro-units.
    #[inline]
    #[must_use]
    pub const fn micros(self) -> i64 {
        self.0
    }

    /// Returns true if this delta removes funds.
    #[inline]
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Absolute value as an amount.
    #[inline]
    #[must_use]
    pub const fn magnitude(self) -> Amount {
        Amount(self.0.unsigned_abs())
    }

    /// `to - from`, e.g. a game's payout minus its wager.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::ArithmeticOverflow` if either side exceeds `i64`.
    pub fn between(to: Amount, from: Amount) -> EconomyResult<Self> {
        let to = to.credit()?;
        let from = from.credit()?;
        to.checked_add(Self(-from.0))
            .ok_or(EconomyError::ArithmeticOverflow)
    }

    /// Checked addition. Returns `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Delta({self})")
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "+" };
        write!(f, "{sign}{}", self.magnitude())
    }
}

// =============================================================================
// Multiplier
// =============================================================================

/// Non-negative payout multiplier with 6 decimal places.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
#[repr(transparent)]
pub struct Multiplier(u64);

impl Multiplier {
    /// A losing multiplier.
    pub const ZERO: Self = Self(0);

    /// Break-even (1.000000).
    pub const ONE: Self = Self(SCALE);

    /// Creates a whole multiplier (`x2`, `x20`).
    ///
    /// # Panics
    ///
    /// Panics if `whole` exceeds `u64::MAX / 1_000_000`.
    #[inline]
    #[must_use]
    pub const fn from_whole(whole: u64) -> Self {
        Self(whole * SCALE)
    }

    /// Creates a multiplier from raw micro-units.
    #[inline]
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Returns the raw micro-units.
    #[inline]
    #[must_use]
    pub const fn micros(self) -> u64 {
        self.0
    }

    /// Lossy conversion for display and statistics only.
    #[must_use]
    pub fn to_f64(self) -> f64 {
        micros_to_f64(self.0)
    }
}

impl TryFrom<f64> for Multiplier {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        micros_from_f64(value).map(Self)
    }
}

impl From<Multiplier> for f64 {
    fn from(multiplier: Multiplier) -> Self {
        multiplier.to_f64()
    }
}

impl fmt::Debug for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multiplier({}.{:06})", self.0 / SCALE, self.0 % SCALE)
    }
}

impl fmt::Display for Multiplier {
    /// Two decimals, truncated: `x2.00`, `x1.37`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}.{:02}", self.0 / SCALE, (self.0 % SCALE) / 10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts() {
        let value = Amount::from_parts(3, 141_592);
        assert_eq!(value.whole(), 3);
        assert_eq!(value.fraction(), 141_592);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "micros must be below")]
    fn test_from_parts_rejects_whole_unit_of_micros() {
        let _ = Amount::from_parts(0, 1_500_000);
    }

    #[test]
    fn test_no_float_drift() {
        let a = Amount::try_from(0.1).unwrap();
        let b = Amount::try_from(0.2).unwrap();
        assert_eq!(a.checked_add(b), Some(Amount::try_from(0.3).unwrap()));
    }

    #[test]
    fn test_percent() {
        let reward = Amount::from_parts(0, 200_000);
        assert_eq!(reward.mul_percent_bp(1000), Amount::from_parts(0, 20_000));
    }

    #[test]
    fn test_checked_apply_never_goes_negative() {
        let balance = Amount::from_whole(1);
        let debit = Amount::from_whole(2).debit().unwrap();
        assert!(balance.checked_apply(debit).is_none());
        let credit = Amount::from_whole(2).credit().unwrap();
        assert_eq!(balance.checked_apply(credit), Some(Amount::from_whole(3)));
    }

    #[test]
    fn test_multiplier_rounds_down() {
        let wager = Amount::from_parts(0, 3);
        let payout = wager.mul_multiplier(Multiplier::try_from(1.5).unwrap()).unwrap();
        assert_eq!(payout, Amount::from_micros(4));
    }

    #[test]
    fn test_delta_between() {
        let d = Delta::between(Amount::from_whole(2), Amount::from_whole(5)).unwrap();
        assert_eq!(d, Amount::from_whole(3).debit().unwrap());
        assert_eq!(d.to_string(), "-3.000000");
    }

    #[test]
    fn test_parse() {
        assert_eq!("15".parse::<Amount>().unwrap(), Amount::from_whole(15));
        assert_eq!("0.2".parse::<Amount>().unwrap(), Amount::from_parts(0, 200_000));
        assert!("1.1234567".parse::<Amount>().is_err());
        assert!("-1".parse::<Amount>().is_err());
        assert!(".5".parse::<Amount>().is_err());
    }

    #[test]
    fn test_rejects_negative_float() {
        assert!(Amount::try_from(-0.5).is_err());
        assert!(Multiplier::try_from(f64::NAN).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::from_parts(42, 123_456).to_string(), "42.123456");
        assert_eq!(Multiplier::try_from(1.379).unwrap().to_string(), "x1.37");
    }
}
