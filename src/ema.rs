//! Time-weighted EMA price smoothing.
//!
//! The engine is the only writer of [`EmaState`]. Decay per update is
//! `alpha = exp(-dt * ln2 / half_life)` evaluated in fixed point:
//! whole half-lives are exact right shifts, the remainder goes through a
//! range-reduced Taylor series.

use serde::{Deserialize, Serialize};

use crate::fixed_point::{ExpApprox, BPS, EXP_SCALE, LN2_EXP};

/// Beyond this many half-lives the previous value no longer contributes.
const MAX_WHOLE_HALF_LIVES: u64 = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmaState {
    /// Smoothed price at [`crate::fixed_point::SCALE`]; 0 until bootstrapped.
    pub value: u128,
    pub last_update_time: i64,
}

impl EmaState {
    pub fn is_bootstrapped(&self) -> bool {
        self.value != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmaEngine {
    pub half_life: u64,
    pub approx: ExpApprox,
}

impl EmaEngine {
    pub fn new(half_life: u64) -> Self {
        Self { half_life, approx: ExpApprox::default() }
    }

    pub fn with_approx(half_life: u64, approx: ExpApprox) -> Self {
        Self { half_life, approx }
    }

    /// Weight kept by the previous EMA after `dt` seconds, at [`EXP_SCALE`].
    pub fn decay_factor(&self, dt: u64) -> u128 {
        if self.half_life == 0 {
            return EXP_SCALE;
        }
        let whole = dt / self.half_life;
        if whole >= MAX_WHOLE_HALF_LIVES {
            return 0;
        }
        let rem = dt % self.half_life;
        let x = u128::from(rem) * LN2_EXP / u128::from(self.half_life);

        let mut factor = self.approx.exp_neg(x >> self.approx.halvings);
        for _ in 0..self.approx.halvings {
            factor = factor * factor / EXP_SCALE;
        }
        factor >> whole
    }

    /// Fold `price` observed at `now` into `state` and return the new value.
    ///
    /// The first observation is adopted verbatim. Non-advancing time and a
    /// zero half-life leave the state untouched.
    pub fn update(&self, state: &mut EmaState, price: u128, now: i64) -> u128 {
        if self.half_life == 0 {
            return state.value;
        }
        if state.value == 0 {
            state.value = price;
            state.last_update_time = now;
            return state.value;
        }
        let dt = now.saturating_sub(state.last_update_time);
        if dt <= 0 {
            return state.value;
        }
        let alpha = self.decay_factor(dt as u64);
        state.value = blend(price, state.value, alpha);
        state.last_update_time = now;
        state.value
    }

    /// EMA as it would read at `now`, without committing anything.
    pub fn peek(&self, state: &EmaState, price: u128, now: i64) -> u128 {
        let mut scratch = *state;
        if scratch.value == 0 {
            return price;
        }
        self.update(&mut scratch, price, now)
    }
}

/// `round(price * (1 - alpha) + prev * alpha)` with `alpha` at [`EXP_SCALE`].
fn blend(price: u128, prev: u128, alpha: u128) -> u128 {
    let alpha = alpha.min(EXP_SCALE);
    (price * (EXP_SCALE - alpha) + prev * alpha + EXP_SCALE / 2) / EXP_SCALE
}

/// Distance between spot and EMA relative to the EMA, in bps.
pub fn ema_lag_bps(spot: u128, ema: u128) -> u128 {
    if ema == 0 {
        return 0;
    }
    spot.abs_diff(ema) * BPS / ema
}

/// Seconds until a lag of `lag_bps` decays to `target_bps`: `H * log2(lag / target)`,
/// floored. Zero when already within target or when the target is zero.
pub fn convergence_time(lag_bps: u128, target_bps: u128, half_life: u64) -> u64 {
    if target_bps == 0 || lag_bps <= target_bps {
        return 0;
    }
    const FRAC_BITS: u32 = 32;

    // Binary logarithm: whole bits by halving, fraction bits by squaring.
    let mut ratio = lag_bps.saturating_mul(EXP_SCALE) / target_bps;
    let mut log2: u128 = 0;
    while ratio >= 2 * EXP_SCALE {
        ratio /= 2;
        log2 += 1;
    }
    log2 <<= FRAC_BITS;
    for bit in (0..FRAC_BITS).rev() {
        ratio = ratio * ratio / EXP_SCALE;
        if ratio >= 2 * EXP_SCALE {
            ratio /= 2;
            log2 |= 1 << bit;
        }
    }

    u64::try_from((log2 * u128::from(half_life)) >> FRAC_BITS).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManipulationReport {
    pub final_ema: u128,
    pub price_moved_bps: i128,
    pub ema_moved_bps: i128,
    /// Share of the spot move that reached the EMA, in bps.
    pub effectiveness_bps: i128,
}

/// An attacker pins spot at `manipulated` for `duration` seconds after the EMA
/// settled at `initial`.
pub fn manipulation_resistance(
    initial: u128,
    manipulated: u128,
    duration: u64,
    half_life: u64,
) -> ManipulationReport {
    let engine = EmaEngine::new(half_life);
    let mut state = EmaState::default();
    engine.update(&mut state, initial, 0);
    let final_ema = engine.update(&mut state, manipulated, duration as i64);

    let moved = |to: u128| -> i128 {
        if initial == 0 {
            return 0;
        }
        (to as i128 - initial as i128) * BPS as i128 / initial as i128
    };
    let price_moved_bps = moved(manipulated);
    let ema_moved_bps = moved(final_ema);
    let effectiveness_bps = if price_moved_bps == 0 {
        0
    } else {
        ema_moved_bps * BPS as i128 / price_moved_bps
    };

    ManipulationReport { final_ema, price_moved_bps, ema_moved_bps, effectiveness_bps }
}
