//! Pool state machine: reserves, EMA, the position book and the per-tick
//! liquidation sweep.
//!
//! Each [`Pool`] owns its reserves, EMA state and positions exclusively and
//! only reads its [`ProtocolConfig`]. `step` is atomic: it either commits a
//! whole tick (reprice, EMA, sweep, snapshot) or fails before touching state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collateral::{self, CfQuote};
use crate::config::ProtocolConfig;
use crate::ema::{EmaEngine, EmaState};
use crate::error::{SimError, SimResult};
use crate::events::{Event, EventKind, Snapshot, Tick};
use crate::fixed_point::{apply_bps, mul_div, value_at, BPS, SCALE};
use crate::liquidation::{self, LiquidationStats};
use crate::logging::{log, obj, v_amount, v_num, v_str, Domain, Level};

// =============================================================================
// Reserves
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolReserves {
    /// Collateral-token side.
    pub reserve_base: u128,
    /// Debt-token side.
    pub reserve_quote: u128,
}

impl PoolReserves {
    pub fn new(reserve_base: u128, reserve_quote: u128) -> Self {
        Self { reserve_base, reserve_quote }
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.reserve_base == 0 || self.reserve_quote == 0 {
            return Err(SimError::InvalidReserves {
                base: self.reserve_base,
                quote: self.reserve_quote,
            });
        }
        Ok(())
    }

    /// `reserve_quote * SCALE / reserve_base`, truncating.
    pub fn spot_price(&self) -> u128 {
        mul_div(self.reserve_quote, SCALE, self.reserve_base)
    }

    /// Re-balance the quote side so the pool quotes `price`. The quote side
    /// never drops to zero.
    pub fn reprice(&mut self, price: u128) {
        self.reserve_quote = value_at(self.reserve_base, price).max(1);
    }
}

// =============================================================================
// Positions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionStatus {
    Active,
    /// Debt fully repaid through partial liquidations.
    Closed,
    /// Fully liquidated while debt exceeded collateral value.
    Insolvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowerPosition {
    pub id: u64,
    pub collateral_amount: u128,
    pub debt_amount: u128,
    pub entry_ltv_bps: u64,
    pub entry_price: u128,
    pub status: PositionStatus,
}

impl BorrowerPosition {
    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }
}

// =============================================================================
// Pool
// =============================================================================

#[derive(Debug, Clone)]
pub struct Pool {
    config: ProtocolConfig,
    ema: EmaEngine,
    ema_state: EmaState,
    reserves: PoolReserves,
    positions: BTreeMap<u64, BorrowerPosition>,
    next_position_id: u64,
    now: i64,
    total_debt: u128,
    total_collateral: u128,
    total_borrowed: u128,
    stats: LiquidationStats,
    events: Vec<Event>,
    snapshots: Vec<Snapshot>,
    initial_lp_value: u128,
}

impl Pool {
    /// Validates `config` and `reserves`; the EMA starts at the initial spot.
    pub fn new(config: ProtocolConfig, reserves: PoolReserves, start_time: i64) -> SimResult<Self> {
        config.validate()?;
        reserves.validate()?;

        let ema = EmaEngine::new(config.half_life);
        let mut ema_state = EmaState::default();
        let spot = reserves.spot_price();
        if config.ema_enabled {
            ema.update(&mut ema_state, spot, start_time);
        }

        log(
            Level::Info,
            Domain::Pool,
            "pool.created",
            obj(&[
                ("run", v_str(&config.name)),
                ("layers", v_str(&config.describe())),
                ("reserve_base", v_amount(reserves.reserve_base)),
                ("reserve_quote", v_amount(reserves.reserve_quote)),
                ("spot", v_amount(spot)),
                ("start_time", v_num(start_time as f64)),
            ]),
        );

        let mut pool = Self {
            config,
            ema,
            ema_state,
            reserves,
            positions: BTreeMap::new(),
            next_position_id: 1,
            now: start_time,
            total_debt: 0,
            total_collateral: 0,
            total_borrowed: 0,
            stats: LiquidationStats::default(),
            events: Vec::new(),
            snapshots: Vec::new(),
            initial_lp_value: 0,
        };
        pool.initial_lp_value = pool.lp_value();
        Ok(pool)
    }

    // -------------------------------------------------------------------------
    // Prices
    // -------------------------------------------------------------------------

    pub fn spot_price(&self) -> u128 {
        self.reserves.spot_price()
    }

    /// Price used for valuation: the EMA when smoothing is on, spot otherwise.
    pub fn lending_price(&self) -> u128 {
        if self.config.ema_enabled && self.ema_state.is_bootstrapped() {
            self.ema_state.value
        } else {
            self.spot_price()
        }
    }

    /// CF quote for `collateral` at the current prices and reserves.
    pub fn quote(&self, collateral: u128) -> CfQuote {
        collateral::quote(
            collateral,
            self.lending_price(),
            self.spot_price(),
            self.reserves.reserve_quote,
            &self.config,
        )
    }

    // -------------------------------------------------------------------------
    // Position admission
    // -------------------------------------------------------------------------

    /// Borrow `target_ltv_bps` of the buffered borrow capacity of
    /// `collateral`. The borrowed amount leaves the quote reserve.
    pub fn open_position(&mut self, collateral: u128, target_ltv_bps: u64) -> SimResult<u64> {
        if collateral == 0 {
            return Err(SimError::InvalidPosition { reason: "zero collateral" });
        }
        if target_ltv_bps > BPS as u64 {
            return Err(SimError::InvalidPosition { reason: "target ltv above 10000 bps" });
        }
        let quote = self.quote(collateral);
        let borrow = apply_bps(quote.max_borrow, target_ltv_bps)
            .min(self.reserves.reserve_quote.saturating_sub(1));
        let entry_ltv_bps =
            u64::try_from(mul_div(borrow, BPS, quote.collateral_value)).unwrap_or(0);
        Ok(self.admit(collateral, borrow, entry_ltv_bps))
    }

    /// Admit a position with an explicit debt.
    pub fn add_position(
        &mut self,
        collateral: u128,
        debt: u128,
        entry_ltv_bps: u64,
    ) -> SimResult<u64> {
        if collateral == 0 {
            return Err(SimError::InvalidPosition { reason: "zero collateral" });
        }
        if debt >= self.reserves.reserve_quote {
            return Err(SimError::InvalidPosition { reason: "debt exceeds quote reserve" });
        }
        Ok(self.admit(collateral, debt, entry_ltv_bps))
    }

    fn admit(&mut self, collateral: u128, debt: u128, entry_ltv_bps: u64) -> u64 {
        let id = self.next_position_id;
        self.next_position_id += 1;
        let entry_price = self.lending_price();
        self.positions.insert(
            id,
            BorrowerPosition {
                id,
                collateral_amount: collateral,
                debt_amount: debt,
                entry_ltv_bps,
                entry_price,
                status: PositionStatus::Active,
            },
        );
        self.total_debt += debt;
        self.total_collateral += collateral;
        self.total_borrowed += debt;
        self.reserves.reserve_quote -= debt;

        log(
            Level::Debug,
            Domain::Pool,
            "pool.position_opened",
            obj(&[
                ("run", v_str(&self.config.name)),
                ("position_id", v_num(id as f64)),
                ("collateral", v_amount(collateral)),
                ("debt", v_amount(debt)),
                ("entry_ltv_bps", v_num(entry_ltv_bps as f64)),
            ]),
        );
        id
    }

    // -------------------------------------------------------------------------
    // Step
    // -------------------------------------------------------------------------

    /// Advance the pool to `tick`.
    ///
    /// Returns the new snapshot, `Ok(None)` for a tick that does not advance
    /// time, or `MalformedTick` for a zero price (state untouched).
    pub fn step(&mut self, tick: Tick) -> SimResult<Option<Snapshot>> {
        if tick.price == 0 {
            return Err(SimError::MalformedTick { timestamp: tick.timestamp, price: tick.price });
        }
        if tick.timestamp <= self.now {
            log(
                Level::Debug,
                Domain::Pool,
                "pool.tick_skipped",
                obj(&[
                    ("run", v_str(&self.config.name)),
                    ("timestamp", v_num(tick.timestamp as f64)),
                    ("now", v_num(self.now as f64)),
                ]),
            );
            return Ok(None);
        }
        self.now = tick.timestamp;

        self.reserves.reprice(tick.price);
        let spot = self.reserves.spot_price();
        if self.config.ema_enabled {
            self.ema.update(&mut self.ema_state, spot, tick.timestamp);
        }
        let lending = self.lending_price();

        self.sweep(spot, lending);

        let snapshot = self.snapshot(spot, lending);
        self.snapshots.push(snapshot.clone());
        Ok(Some(snapshot))
    }

    /// One liquidation attempt per active position, ascending id.
    fn sweep(&mut self, spot: u128, lending: u128) {
        for position in self.positions.values_mut().filter(|p| p.is_active()) {
            let cf = collateral::quote(
                position.collateral_amount,
                lending,
                spot,
                self.reserves.reserve_quote,
                &self.config,
            )
            .liquidation_cf_bps;
            let Some(outcome) = liquidation::evaluate(position, cf, lending, &self.config) else {
                continue;
            };

            position.debt_amount = outcome.remaining_debt;
            position.collateral_amount = outcome.remaining_collateral;
            if outcome.remaining_debt == 0 {
                position.status = if outcome.is_insolvent {
                    PositionStatus::Insolvent
                } else {
                    PositionStatus::Closed
                };
            }

            self.total_debt -= outcome.debt_to_repay;
            self.total_collateral -= outcome.collateral_to_seize;
            self.reserves.reserve_base += outcome.collateral_to_reserves;
            self.reserves.reserve_quote += outcome.debt_to_repay;
            self.stats.record(&outcome);

            let event = Event::from_outcome(position.id, self.now, lending, cf, &outcome);
            let level = match event.kind {
                EventKind::Insolvency => Level::Info,
                EventKind::Liquidation => Level::Debug,
            };
            log(
                level,
                Domain::Liquidation,
                "liquidation.executed",
                obj(&[
                    ("run", v_str(&self.config.name)),
                    ("position_id", v_num(position.id as f64)),
                    ("kind", v_str(&format!("{:?}", event.kind))),
                    ("timestamp", v_num(self.now as f64)),
                    ("price", v_amount(lending)),
                    ("cf_bps", v_num(cf as f64)),
                    ("debt_repaid", v_amount(outcome.debt_to_repay)),
                    ("collateral_seized", v_amount(outcome.collateral_to_seize)),
                    ("bad_debt", v_amount(outcome.bad_debt)),
                ]),
            );
            self.events.push(event);
        }
    }

    fn snapshot(&self, spot: u128, lending: u128) -> Snapshot {
        let active: Vec<&BorrowerPosition> =
            self.positions.values().filter(|p| p.is_active()).collect();
        let average_cf_bps = if active.is_empty() {
            0
        } else {
            let sum: u64 = active
                .iter()
                .map(|p| {
                    collateral::quote(
                        p.collateral_amount,
                        lending,
                        spot,
                        self.reserves.reserve_quote,
                        &self.config,
                    )
                    .liquidation_cf_bps
                })
                .sum();
            sum / active.len() as u64
        };
        let protocol_health_pct = if self.total_debt == 0 {
            None
        } else {
            let value = value_at(self.total_collateral, lending) as i128;
            let debt = self.total_debt as i128;
            Some(((value - debt) * 100).div_euclid(debt))
        };

        Snapshot {
            timestamp: self.now,
            spot_price: spot,
            ema_price: if self.config.ema_enabled { self.ema_state.value } else { spot },
            active_position_count: active.len(),
            cumulative_bad_debt: self.stats.total_bad_debt,
            cumulative_liquidation_count: self.stats.liquidations,
            reserve_base: self.reserves.reserve_base,
            reserve_quote: self.reserves.reserve_quote,
            total_debt: self.total_debt,
            total_collateral: self.total_collateral,
            average_cf_bps,
            protocol_health_pct,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn reserves(&self) -> PoolReserves {
        self.reserves
    }

    pub fn ema_state(&self) -> EmaState {
        self.ema_state
    }

    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn position(&self, id: u64) -> Option<&BorrowerPosition> {
        self.positions.get(&id)
    }

    /// All positions in ascending id order, including closed ones.
    pub fn positions(&self) -> impl Iterator<Item = &BorrowerPosition> {
        self.positions.values()
    }

    pub fn active_position_count(&self) -> usize {
        self.positions.values().filter(|p| p.is_active()).count()
    }

    pub fn total_debt(&self) -> u128 {
        self.total_debt
    }

    pub fn total_collateral(&self) -> u128 {
        self.total_collateral
    }

    /// Debt issued at admission, before any repayment.
    pub fn total_borrowed(&self) -> u128 {
        self.total_borrowed
    }

    pub fn cumulative_bad_debt(&self) -> u128 {
        self.stats.total_bad_debt
    }

    pub fn stats(&self) -> &LiquidationStats {
        &self.stats
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// LP claim at the lending price: reserves plus outstanding debt, net of
    /// bad debt.
    pub fn lp_value(&self) -> u128 {
        let base_value = value_at(self.reserves.reserve_base, self.lending_price());
        let claims = base_value + self.reserves.reserve_quote + self.total_debt;
        claims.saturating_sub(self.stats.total_bad_debt)
    }

    pub fn initial_lp_value(&self) -> u128 {
        self.initial_lp_value
    }

    /// LP value change since construction, in bps.
    pub fn lp_return_bps(&self) -> i128 {
        if self.initial_lp_value == 0 {
            return 0;
        }
        let initial = self.initial_lp_value as i128;
        (self.lp_value() as i128 - initial) * BPS as i128 / initial
    }
}
