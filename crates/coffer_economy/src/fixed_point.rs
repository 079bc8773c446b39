//! # Fixed-Point Arithmetic
//!
//! **NO FLOATING POINT IN BALANCES OR CACHED STATS**
//!
//! Coin balances, chest prices and the cached `coins_per_tap` total are all
//! fixed-point decimals. Recomputing a player's totals twice must produce the
//! same bits, and `0.1 + 0.5 == 0.6` has to hold exactly.
//!
//! Internally a value is stored as `value * 10^6` in a `u64`.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EconomyError, EconomyResult};

/// Number of decimal places.
const DECIMAL_PLACES: u32 = 6;

/// The multiplier for 6 decimal places.
const MULTIPLIER: u64 = 10u64.pow(DECIMAL_PLACES);

/// Fixed-point decimal number with 6 decimal places.
///
/// # Range
///
/// - Minimum: 0.000000
/// - Maximum: 18,446,744,073,709.551615
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct FixedPoint(u64);

impl FixedPoint {
    /// Zero value.
    pub const ZERO: Self = Self(0);

    /// One unit (1.000000).
    pub const ONE: Self = Self(MULTIPLIER);

    /// Maximum representable value.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a fixed-point number from a whole number.
    ///
    /// Saturates at [`FixedPoint::MAX`].
    #[inline]
    #[must_use]
    pub const fn from_whole(whole: u64) -> Self {
        Self(whole.saturating_mul(MULTIPLIER))
    }

    /// Creates a fixed-point number from parts.
    ///
    /// # Arguments
    ///
    /// * `whole` - The whole number part
    /// * `micros` - The decimal part in millionths (0-999999)
    ///
    /// ```rust,ignore
    /// let tenth = FixedPoint::from_parts(0, 100_000); // 0.1
    /// ```
    #[inline]
    #[must_use]
    pub const fn from_parts(whole: u64, micros: u32) -> Self {
        Self(whole.saturating_mul(MULTIPLIER).saturating_add(micros as u64 % MULTIPLIER))
    }

    /// Creates a fixed-point number from raw internal value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw internal value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns the whole number part.
    #[inline]
    #[must_use]
    pub const fn whole(self) -> u64 {
        self.0 / MULTIPLIER
    }

    /// Returns the decimal part in millionths (0-999999).
    #[inline]
    #[must_use]
    pub const fn micros(self) -> u32 {
        (self.0 % MULTIPLIER) as u32
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

    /// Saturating addition.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Returns true if this value is zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
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

    /// Safe subtraction with error on underflow.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::ArithmeticOverflow` if the subtraction would underflow.
    #[inline]
    pub fn safe_sub(self, rhs: Self) -> EconomyResult<Self> {
        self.checked_sub(rhs).ok_or(EconomyError::ArithmeticOverflow)
    }
}

impl Add for FixedPoint {
    type Output = Self;

    /// Saturating; balances never wrap.
    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl fmt::Debug for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedPoint({}.{:06})", self.whole(), self.micros())
    }
}

impl fmt::Display for FixedPoint {
    /// Shortest exact form: `100`, `0.1`, `1.25`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let micros = self.micros();
        if micros == 0 {
            return write!(f, "{}", self.whole());
        }
        let digits = format!("{micros:06}");
        write!(f, "{}.{}", self.whole(), digits.trim_end_matches('0'))
    }
}

impl FromStr for FixedPoint {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EconomyError::InvalidConfig(format!("invalid decimal amount: {s:?}"));
        let s = s.trim();
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() || frac.len() > DECIMAL_PLACES as usize {
            return Err(invalid());
        }
        let whole: u64 = whole.parse().map_err(|_| invalid())?;
        let micros: u32 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<6}");
            padded.parse().map_err(|_| invalid())?
        };
        whole
            .checked_mul(MULTIPLIER)
            .and_then(|w| w.checked_add(u64::from(micros)))
            .map(Self)
            .ok_or(EconomyError::ArithmeticOverflow)
    }
}

impl Serialize for FixedPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FixedPoint {
    /// Accepts a non-negative integer (`100`) or a decimal string (`"0.1"`).
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FixedPointVisitor;

        impl Visitor<'_> for FixedPointVisitor {
            type Value = FixedPoint;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or a decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                v.checked_mul(MULTIPLIER)
                    .map(FixedPoint)
                    .ok_or_else(|| E::custom("amount out of range"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                let v = u64::try_from(v).map_err(|_| E::custom("amount must not be negative"))?;
                self.visit_u64(v)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(FixedPointVisitor)
    }
}
