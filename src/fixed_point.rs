//! Scaled-integer primitives shared by every engine.
//!
//! Prices and values carry [`SCALE`] (1e9), ratios carry [`BPS`] (1e4).
//! Decay factors are computed at [`EXP_SCALE`] (1e18) and only the final EMA
//! value is rounded back to [`SCALE`].

use serde::{Deserialize, Serialize};

/// Price/value scale: 1.0 == 1_000_000_000.
pub const SCALE: u128 = 1_000_000_000;

/// Basis-point denominator: 10_000 == 100%.
pub const BPS: u128 = 10_000;

/// Internal precision of the exponential.
pub const EXP_SCALE: u128 = 1_000_000_000_000_000_000;

/// ln(2) at [`EXP_SCALE`].
pub const LN2_EXP: u128 = 693_147_180_559_945_309;

/// `a * b / d`, truncating.
///
/// Callers stay inside u128 for any realistic pool: amounts below 1e18 scaled
/// units times prices below 1e18 scaled units.
#[inline]
pub fn mul_div(a: u128, b: u128, d: u128) -> u128 {
    if d == 0 {
        return 0;
    }
    a * b / d
}

/// `amount * bps / 10_000`, truncating.
#[inline]
pub fn apply_bps(amount: u128, bps: u64) -> u128 {
    amount * u128::from(bps) / BPS
}

/// Value of `amount` at `price` (both at [`SCALE`]).
#[inline]
pub fn value_at(amount: u128, price: u128) -> u128 {
    amount * price / SCALE
}

/// Integer square root (floor) via Newton's method.
pub fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = x / 2 + 1;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

/// Bounded Taylor approximation of `exp(-x)`.
///
/// Immutable parameters travel with the engine that owns them, so concurrent
/// runs never share anything mutable. `halvings` is consumed by the EMA
/// engine's range reduction, not by [`ExpApprox::exp_neg`] itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpApprox {
    /// Number of series terms, constant term included.
    pub terms: u32,
    /// Power-of-two reduction applied before the series.
    pub halvings: u32,
}

impl Default for ExpApprox {
    fn default() -> Self {
        Self { terms: 5, halvings: 8 }
    }
}

impl ExpApprox {
    /// `exp(-x)` for `x` at [`EXP_SCALE`], result at [`EXP_SCALE`].
    ///
    /// Accurate only for small `x` (well below 1.0); the result is clamped to
    /// `[0, EXP_SCALE]`.
    pub fn exp_neg(&self, x: u128) -> u128 {
        let mut sum = EXP_SCALE as i128;
        let mut term = EXP_SCALE;
        for k in 1..self.terms {
            term = term.saturating_mul(x) / EXP_SCALE / u128::from(k);
            if k % 2 == 1 {
                sum -= term as i128;
            } else {
                sum += term as i128;
            }
        }
        sum.clamp(0, EXP_SCALE as i128) as u128
    }
}

/// Boundary-only conversion to a human-readable number.
pub fn to_display(value: u128) -> f64 {
    value as f64 / SCALE as f64
}

/// Boundary-only conversion from a human-readable number (negatives become 0).
pub fn from_display(value: f64) -> u128 {
    (value * SCALE as f64).round() as u128
}
