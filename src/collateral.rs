//! Collateral-factor engine: curve-aware base CF, pessimistic divergence cap
//! and buffered borrow capacity. Pure functions, no state.

use serde::{Deserialize, Serialize};

use crate::config::ProtocolConfig;
use crate::fixed_point::{apply_bps, isqrt, mul_div, value_at, BPS, SCALE};

/// Everything a caller needs to gate borrowing and liquidation for one
/// collateral amount at one moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfQuote {
    /// `V`, collateral valued at the lending price.
    pub collateral_value: u128,
    pub base_cf_bps: u64,
    /// Threshold used for liquidation eligibility.
    pub liquidation_cf_bps: u64,
    /// Threshold used to gate new borrowing.
    pub max_allowed_cf_bps: u64,
    pub max_borrow: u128,
}

/// Largest `Y` with `Y = V * (1 - Y/R1)^2`: what a borrower could extract
/// from a constant-product pool holding `debt_reserve` if `value` of
/// collateral were dumped into it.
pub fn curve_y_from_v(value: u128, debt_reserve: u128) -> u128 {
    if value == 0 || debt_reserve == 0 {
        return 0;
    }
    let a = mul_div(value, SCALE, debt_reserve);
    let sqrt_term = isqrt((4 * a + SCALE) * SCALE);
    let t = mul_div(2 * a, SCALE, 2 * a + SCALE + sqrt_term);
    mul_div(debt_reserve, t, SCALE)
}

/// Curve-derived CF in bps; 0 for an empty position or an empty pool.
pub fn base_cf_bps(value: u128, debt_reserve: u128) -> u64 {
    if value == 0 {
        return 0;
    }
    let y = curve_y_from_v(value, debt_reserve);
    to_bps(mul_div(y, BPS, value))
}

/// `min(base, base * spot / ema)` clamped once to `[min_cf, max_cf]`.
///
/// Spot above the EMA never raises CF above base. With the cap disabled only
/// the `max_cf` ceiling applies.
pub fn pessimistic_cf_bps(base_cf_bps: u64, spot: u128, ema: u128, config: &ProtocolConfig) -> u64 {
    if !config.pessimistic_cap_enabled {
        return base_cf_bps.min(config.max_cf_bps);
    }
    if ema == 0 {
        return config.min_cf_bps;
    }
    let shrunk = to_bps(mul_div(spot, u128::from(base_cf_bps), ema));
    base_cf_bps
        .min(shrunk)
        .clamp(config.min_cf_bps, config.max_cf_bps)
}

/// Full CF pipeline for `collateral` at the current prices.
///
/// `lending_price` values the collateral (the EMA when smoothing is on),
/// `spot_price` only feeds the divergence cap.
pub fn quote(
    collateral: u128,
    lending_price: u128,
    spot_price: u128,
    debt_reserve: u128,
    config: &ProtocolConfig,
) -> CfQuote {
    let collateral_value = value_at(collateral, lending_price);
    let base = if config.dynamic_cf_enabled {
        base_cf_bps(collateral_value, debt_reserve)
    } else {
        config.fixed_cf_bps
    };
    let liquidation_cf_bps = pessimistic_cf_bps(base, spot_price, lending_price, config);
    let max_allowed_cf_bps = liquidation_cf_bps.saturating_sub(config.ltv_buffer_bps);

    CfQuote {
        collateral_value,
        base_cf_bps: base,
        liquidation_cf_bps,
        max_allowed_cf_bps,
        max_borrow: apply_bps(collateral_value, max_allowed_cf_bps),
    }
}

fn to_bps(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap_only() -> ProtocolConfig {
        ProtocolConfig::full()
    }

    #[test]
    fn test_curve_degenerate_inputs() {
        assert_eq!(curve_y_from_v(0, 100 * SCALE), 0);
        assert_eq!(curve_y_from_v(100 * SCALE, 0), 0);
        assert_eq!(base_cf_bps(0, 100 * SCALE), 0);
        assert_eq!(base_cf_bps(100 * SCALE, 0), 0);
    }

    #[test]
    fn test_curve_satisfies_invariant() {
        // Y = V (1 - Y/R1)^2 within rounding.
        let v = 100 * SCALE;
        let r1 = 1_000 * SCALE;
        let y = curve_y_from_v(v, r1);
        let one_minus = SCALE - mul_div(y, SCALE, r1);
        let rhs = mul_div(mul_div(v, one_minus, SCALE), one_minus, SCALE);
        assert!(y.abs_diff(rhs) < 10_000, "y={} rhs={}", y, rhs);
    }

    #[test]
    fn test_deep_pool_clamped_to_max() {
        let base = base_cf_bps(100 * SCALE, 1_000_000 * SCALE);
        assert_eq!(base, 9_998);
        assert_eq!(pessimistic_cf_bps(base, SCALE, SCALE, &cap_only()), 8_500);
    }

    #[test]
    fn test_shallow_pool_lowers_cf() {
        assert_eq!(base_cf_bps(100 * SCALE, 1_000 * SCALE), 8_392);
        assert_eq!(base_cf_bps(100 * SCALE, 200 * SCALE), 5_358);
        assert_eq!(base_cf_bps(1_000 * SCALE, 1_000 * SCALE), 3_819);
    }

    #[test]
    fn test_cap_identity_when_spot_equals_ema() {
        let cfg = cap_only();
        assert_eq!(pessimistic_cf_bps(8_000, SCALE, SCALE, &cfg), 8_000);
        assert_eq!(pessimistic_cf_bps(8_000, 7 * SCALE, 7 * SCALE, &cfg), 8_000);
    }

    #[test]
    fn test_cap_scales_down_when_spot_trails() {
        let cfg = cap_only();
        assert_eq!(pessimistic_cf_bps(8_000, 900_000_000, SCALE, &cfg), 7_200);
    }

    #[test]
    fn test_cap_never_raises_above_base() {
        let cfg = cap_only();
        assert_eq!(pessimistic_cf_bps(8_000, 2 * SCALE, SCALE, &cfg), 8_000);
    }

    #[test]
    fn test_cap_monotone_in_ratio() {
        let cfg = cap_only();
        let mut prev = 0;
        for spot_pct in (1..=150).step_by(7) {
            let spot = SCALE * spot_pct / 100;
            let cf = pessimistic_cf_bps(8_000, spot, SCALE, &cfg);
            assert!(cf >= prev, "cf dropped at {}%: {} < {}", spot_pct, cf, prev);
            prev = cf;
        }
        assert_eq!(prev, 8_000);
    }

    #[test]
    fn test_clamp_applied_once_after_min() {
        // Scaling happens on the unclamped base: min(9990, 8991) -> 8500.
        // Clamping first would give 8500 * 0.9 = 7650.
        let cfg = cap_only();
        assert_eq!(pessimistic_cf_bps(9_990, 900_000_000, SCALE, &cfg), 8_500);
    }

    #[test]
    fn test_cap_floor_and_zero_ema() {
        let cfg = cap_only();
        assert_eq!(pessimistic_cf_bps(8_000, 1, SCALE, &cfg), cfg.min_cf_bps);
        assert_eq!(pessimistic_cf_bps(8_000, SCALE, 0, &cfg), cfg.min_cf_bps);
    }

    #[test]
    fn test_cap_disabled_only_ceiling() {
        let cfg = ProtocolConfig::ema_plus_dynamic_cf();
        assert_eq!(pessimistic_cf_bps(9_998, SCALE / 2, SCALE, &cfg), 8_500);
        assert_eq!(pessimistic_cf_bps(7_000, SCALE / 2, SCALE, &cfg), 7_000);
    }

    #[test]
    fn test_quote_buffer_gap() {
        let cfg = ProtocolConfig::full();
        let q = quote(100 * SCALE, SCALE, SCALE, 1_000_000 * SCALE, &cfg);
        assert_eq!(q.collateral_value, 100 * SCALE);
        assert_eq!(q.liquidation_cf_bps, 8_500);
        assert_eq!(q.liquidation_cf_bps - q.max_allowed_cf_bps, cfg.ltv_buffer_bps);
        assert_eq!(q.max_borrow, 80 * SCALE);
    }

    #[test]
    fn test_quote_fixed_cf() {
        let cfg = ProtocolConfig::traditional();
        let q = quote(100 * SCALE, 2 * SCALE, 2 * SCALE, 1, &cfg);
        assert_eq!(q.base_cf_bps, 7_500);
        assert_eq!(q.max_allowed_cf_bps, 7_500);
        assert_eq!(q.max_borrow, 150 * SCALE);
    }

    #[test]
    fn test_quote_zero_value() {
        let cfg = ProtocolConfig::full();
        let q = quote(0, SCALE, SCALE, 1_000 * SCALE, &cfg);
        assert_eq!(q.collateral_value, 0);
        assert_eq!(q.liquidation_cf_bps, cfg.min_cf_bps);
        assert_eq!(q.max_allowed_cf_bps, 0);
        assert_eq!(q.max_borrow, 0);
    }
}
