//! Liquidation engine: eligibility, sizing, seizure, incentive split and bad
//! debt. `evaluate` is pure; the pool commits the outcome.

use serde::{Deserialize, Serialize};

use crate::config::ProtocolConfig;
use crate::fixed_point::{apply_bps, mul_div, value_at, BPS, SCALE};
use crate::pool::BorrowerPosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    /// Debt exceeded collateral value; the whole debt is repaid.
    pub is_insolvent: bool,
    pub collateral_value: u128,
    pub debt_to_repay: u128,
    pub collateral_to_seize: u128,
    pub liquidator_bonus: u128,
    pub collateral_to_reserves: u128,
    pub bad_debt: u128,
    pub remaining_debt: u128,
    pub remaining_collateral: u128,
}

/// `debt * 10_000 >= value * cf`. Debt-free positions are never eligible.
pub fn is_liquidatable(collateral_value: u128, debt: u128, liquidation_cf_bps: u64) -> bool {
    debt > 0 && debt * BPS >= collateral_value * u128::from(liquidation_cf_bps)
}

/// Size a liquidation of `position` at `price`, or `None` when it is healthy.
pub fn evaluate(
    position: &BorrowerPosition,
    liquidation_cf_bps: u64,
    price: u128,
    config: &ProtocolConfig,
) -> Option<LiquidationOutcome> {
    let debt = position.debt_amount;
    let collateral = position.collateral_amount;
    let collateral_value = value_at(collateral, price);
    if !is_liquidatable(collateral_value, debt, liquidation_cf_bps) {
        return None;
    }

    let is_insolvent = debt > collateral_value;
    let debt_to_repay = if is_insolvent {
        debt
    } else {
        match apply_bps(debt, config.close_factor_bps).min(debt) {
            0 => debt,
            partial => partial,
        }
    };

    // Seizure is capped by what the position holds. Bad debt is booked once
    // the whole collateral is taken; floor dust of a partial seize is not.
    let wanted = if price == 0 { u128::MAX } else { mul_div(debt_to_repay, SCALE, price) };
    let (collateral_to_seize, bad_debt) = if is_insolvent || wanted >= collateral {
        (collateral, debt_to_repay.saturating_sub(value_at(collateral, price)))
    } else {
        (wanted, 0)
    };

    let liquidator_bonus = apply_bps(collateral_to_seize, config.liquidation_incentive_bps);
    Some(LiquidationOutcome {
        is_insolvent,
        collateral_value,
        debt_to_repay,
        collateral_to_seize,
        liquidator_bonus,
        collateral_to_reserves: collateral_to_seize - liquidator_bonus,
        bad_debt,
        remaining_debt: debt - debt_to_repay,
        remaining_collateral: collateral - collateral_to_seize,
    })
}

/// Borrow limit over debt, in bps (10_000 = exactly at the threshold).
pub fn health_factor_bps(collateral_value: u128, debt: u128, liquidation_cf_bps: u64) -> u128 {
    if debt == 0 {
        return u128::MAX;
    }
    collateral_value * u128::from(liquidation_cf_bps) / debt
}

/// Lending price at which the position turns liquidatable.
pub fn liquidation_price(collateral: u128, debt: u128, liquidation_cf_bps: u64) -> Option<u128> {
    let denom = collateral * u128::from(liquidation_cf_bps);
    if denom == 0 {
        return None;
    }
    Some(debt * BPS * SCALE / denom)
}

/// Running totals over committed liquidations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationStats {
    pub liquidations: u64,
    pub insolvencies: u64,
    pub total_bad_debt: u128,
    pub total_debt_repaid: u128,
    pub total_collateral_seized: u128,
}

impl LiquidationStats {
    pub fn record(&mut self, outcome: &LiquidationOutcome) {
        self.liquidations += 1;
        if outcome.is_insolvent {
            self.insolvencies += 1;
        }
        self.total_bad_debt += outcome.bad_debt;
        self.total_debt_repaid += outcome.debt_to_repay;
        self.total_collateral_seized += outcome.collateral_to_seize;
    }

    /// Bad debt as a share of repaid debt.
    pub fn bad_debt_rate_bps(&self) -> u128 {
        mul_div(self.total_bad_debt, BPS, self.total_debt_repaid)
    }
}
