//! Synthetic crisis trajectories shared by the integration tests.
//!
//! Paths are built from integer hold/ramp segments so every run sees the same
//! ticks bit for bit.

#![allow(dead_code)]

use gammsim::fixed_point::SCALE;
use gammsim::{BorrowerSpec, PoolReserves, RunSetup, Tick};

pub const DEFAULT_START: i64 = 1_700_000_000;
pub const DEFAULT_INTERVAL: i64 = 60;

/// Piecewise price path sampled every `interval` seconds.
#[derive(Debug, Clone)]
pub struct PricePath {
    interval: i64,
    time: i64,
    price: u128,
    ticks: Vec<Tick>,
}

impl PricePath {
    /// Path starting at `price`; the first tick lands one interval after
    /// `start`.
    pub fn new(start: i64, interval: i64, price: u128) -> Self {
        Self { interval, time: start, price, ticks: Vec::new() }
    }

    /// `n` ticks at a flat `price`.
    pub fn hold(mut self, price: u128, n: u32) -> Self {
        for _ in 0..n {
            self.push(price);
        }
        self.price = price;
        self
    }

    /// `n` ticks moving linearly to `to`; the last tick is exactly `to`.
    pub fn ramp(mut self, to: u128, n: u32) -> Self {
        let from = self.price;
        let n128 = u128::from(n);
        for i in 1..=n128 {
            let price = if to >= from {
                from + (to - from) * i / n128
            } else {
                from - (from - to) * i / n128
            };
            self.push(price);
        }
        self.price = to;
        self
    }

    fn push(&mut self, price: u128) {
        self.time += self.interval;
        self.ticks.push(Tick::new(self.time, price));
    }

    pub fn build(self) -> Vec<Tick> {
        self.ticks
    }
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub setup: RunSetup,
    pub ticks: Vec<Tick>,
}

fn pct(p: u128) -> u128 {
    SCALE * p / 100
}

/// 1M/1M pool at price 1.0 with five borrowers at 52-73% LTV. Debts are
/// explicit so every configuration carries the same book.
pub fn default_setup() -> RunSetup {
    let borrowers = [
        (100_000, 56_000),
        (50_000, 31_000),
        (150_000, 78_000),
        (80_000, 47_000),
        (60_000, 44_000),
    ]
    .into_iter()
    .map(|(collateral, debt)| BorrowerSpec::Explicit {
        collateral: collateral * SCALE,
        debt: debt * SCALE,
    })
    .collect();

    RunSetup {
        reserves: PoolReserves::new(1_000_000 * SCALE, 1_000_000 * SCALE),
        start_time: DEFAULT_START,
        borrowers,
    }
}

/// Sudden 65% drop, a short floor, partial recovery.
pub fn flash_crash() -> Scenario {
    let ticks = PricePath::new(DEFAULT_START, DEFAULT_INTERVAL, SCALE)
        .hold(SCALE, 30)
        .ramp(pct(35), 3)
        .hold(pct(35), 20)
        .ramp(pct(80), 30)
        .hold(pct(80), 30)
        .build();
    Scenario { name: "flash_crash", setup: default_setup(), ticks }
}

/// Pump to 2.5x then dump to a quarter of the starting price.
pub fn pump_and_dump() -> Scenario {
    let ticks = PricePath::new(DEFAULT_START, DEFAULT_INTERVAL, SCALE)
        .hold(SCALE, 30)
        .ramp(pct(250), 15)
        .ramp(pct(25), 10)
        .hold(pct(25), 60)
        .build();
    Scenario { name: "pump_and_dump", setup: default_setup(), ticks }
}

/// Ten-hour grind down to 30%.
pub fn slow_bleed() -> Scenario {
    let ticks = PricePath::new(DEFAULT_START, DEFAULT_INTERVAL, SCALE)
        .hold(SCALE, 10)
        .ramp(pct(30), 600)
        .hold(pct(30), 30)
        .build();
    Scenario { name: "slow_bleed", setup: default_setup(), ticks }
}

pub fn all() -> Vec<Scenario> {
    vec![flash_crash(), pump_and_dump(), slow_bleed()]
}
