//! Run inputs and outputs: ticks in, events and snapshots out.

use serde::{Deserialize, Serialize};

use crate::liquidation::LiquidationOutcome;

/// One external price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: i64,
    /// Collateral price in quote units, at [`crate::fixed_point::SCALE`].
    pub price: u128,
}

impl Tick {
    pub fn new(timestamp: i64, price: u128) -> Self {
        Self { timestamp, price }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Liquidation,
    /// Debt exceeded collateral value at the lending price.
    Insolvency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationAmounts {
    pub debt_repaid: u128,
    pub collateral_seized: u128,
    pub liquidator_bonus: u128,
    pub collateral_to_reserves: u128,
    pub bad_debt: u128,
    /// Lending price the position was valued at.
    pub price: u128,
    pub liquidation_cf_bps: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub position_id: u64,
    pub amounts: LiquidationAmounts,
    pub timestamp: i64,
}

impl Event {
    pub fn from_outcome(
        position_id: u64,
        timestamp: i64,
        price: u128,
        liquidation_cf_bps: u64,
        outcome: &LiquidationOutcome,
    ) -> Self {
        let kind = if outcome.is_insolvent {
            EventKind::Insolvency
        } else {
            EventKind::Liquidation
        };
        Self {
            kind,
            position_id,
            timestamp,
            amounts: LiquidationAmounts {
                debt_repaid: outcome.debt_to_repay,
                collateral_seized: outcome.collateral_to_seize,
                liquidator_bonus: outcome.liquidator_bonus,
                collateral_to_reserves: outcome.collateral_to_reserves,
                bad_debt: outcome.bad_debt,
                price,
                liquidation_cf_bps,
            },
        }
    }
}

/// Pool state after one committed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: i64,
    pub spot_price: u128,
    /// Current EMA value; equals spot when smoothing is disabled.
    pub ema_price: u128,
    pub active_position_count: usize,
    pub cumulative_bad_debt: u128,
    pub cumulative_liquidation_count: u64,
    pub reserve_base: u128,
    pub reserve_quote: u128,
    pub total_debt: u128,
    pub total_collateral: u128,
    /// Mean liquidation CF over active positions.
    pub average_cf_bps: u64,
    /// Collateral margin over debt, `(value - debt) * 100 / debt` floored;
    /// negative when under water, `None` with no debt.
    pub protocol_health_pct: Option<i128>,
}
