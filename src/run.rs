//! Whole-run driver: build a pool, admit borrowers, replay ticks, report.
//!
//! Runs share nothing mutable, so independent configurations fan out across
//! threads with `rayon`. Within a run ticks are strictly sequential.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ProtocolConfig;
use crate::error::SimResult;
use crate::events::{Event, Snapshot, Tick};
use crate::fixed_point::{mul_div, value_at, BPS};
use crate::logging::{log, obj, v_amount, v_num, v_str, Domain, Level};
use crate::pool::{Pool, PoolReserves, PositionStatus};

// =============================================================================
// Inputs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorrowerSpec {
    /// Borrow `ltv_bps` of the buffered borrow capacity at setup.
    Target { collateral: u128, ltv_bps: u64 },
    /// Fixed debt, identical across configurations.
    Explicit { collateral: u128, debt: u128 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSetup {
    pub reserves: PoolReserves,
    pub start_time: i64,
    pub borrowers: Vec<BorrowerSpec>,
}

// =============================================================================
// Outputs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub config_name: String,
    pub total_positions: usize,
    pub active_positions: usize,
    pub closed_positions: usize,
    pub insolvent_positions: usize,
    pub total_borrowed: u128,
    pub total_bad_debt: u128,
    /// Bad debt over debt issued at setup.
    pub bad_debt_rate_bps: u128,
    pub liquidation_count: u64,
    pub insolvency_count: u64,
    pub protocol_health_final: Option<i128>,
    pub lp_return_bps: i128,
}

impl RunReport {
    pub fn from_pool(pool: &Pool) -> Self {
        let count =
            |status: PositionStatus| pool.positions().filter(|p| p.status == status).count();
        let stats = pool.stats();
        Self {
            config_name: pool.config().name.clone(),
            total_positions: pool.positions().count(),
            active_positions: count(PositionStatus::Active),
            closed_positions: count(PositionStatus::Closed),
            insolvent_positions: count(PositionStatus::Insolvent),
            total_borrowed: pool.total_borrowed(),
            total_bad_debt: stats.total_bad_debt,
            bad_debt_rate_bps: mul_div(stats.total_bad_debt, BPS, pool.total_borrowed()),
            liquidation_count: stats.liquidations,
            insolvency_count: stats.insolvencies,
            protocol_health_final: pool.snapshots().last().and_then(|s| s.protocol_health_pct),
            lp_return_bps: pool.lp_return_bps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    pub report: RunReport,
    pub snapshots: Vec<Snapshot>,
    pub events: Vec<Event>,
}

impl RunOutput {
    /// Hex SHA-256 over the JSON event log and report.
    pub fn digest(&self) -> serde_json::Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&self.events)?);
        hasher.update(serde_json::to_vec(&self.report)?);
        Ok(hex::encode(hasher.finalize()))
    }
}

// =============================================================================
// Drivers
// =============================================================================

/// Replay `ticks` against a fresh pool under `config`.
pub fn run(config: &ProtocolConfig, setup: &RunSetup, ticks: &[Tick]) -> SimResult<RunOutput> {
    let mut pool = Pool::new(config.clone(), setup.reserves, setup.start_time)?;

    for borrower in &setup.borrowers {
        match *borrower {
            BorrowerSpec::Target { collateral, ltv_bps } => {
                pool.open_position(collateral, ltv_bps)?;
            }
            BorrowerSpec::Explicit { collateral, debt } => {
                let value = value_at(collateral, pool.lending_price());
                let ltv = u64::try_from(mul_div(debt, BPS, value)).unwrap_or(u64::MAX);
                pool.add_position(collateral, debt, ltv)?;
            }
        }
    }

    for tick in ticks {
        pool.step(*tick)?;
    }

    let report = RunReport::from_pool(&pool);
    log(
        Level::Info,
        Domain::Run,
        "run.finished",
        obj(&[
            ("run", v_str(&report.config_name)),
            ("ticks", v_num(ticks.len() as f64)),
            ("liquidations", v_num(report.liquidation_count as f64)),
            ("insolvencies", v_num(report.insolvency_count as f64)),
            ("bad_debt", v_amount(report.total_bad_debt)),
            ("bad_debt_rate_bps", v_amount(report.bad_debt_rate_bps)),
            ("lp_return_bps", v_num(report.lp_return_bps as f64)),
        ]),
    );

    Ok(RunOutput {
        report,
        snapshots: pool.snapshots().to_vec(),
        events: pool.events().to_vec(),
    })
}

/// Run every configuration against the same inputs in parallel. Outputs keep
/// the order of `configs`; the first failing run aborts the comparison.
pub fn compare(
    configs: &[ProtocolConfig],
    setup: &RunSetup,
    ticks: &[Tick],
) -> SimResult<Vec<RunOutput>> {
    let outputs: Vec<RunOutput> = configs
        .par_iter()
        .map(|config| run(config, setup, ticks))
        .collect::<SimResult<Vec<_>>>()?;

    let worst = outputs
        .iter()
        .max_by_key(|o| o.report.total_bad_debt)
        .map(|o| o.report.config_name.clone())
        .unwrap_or_default();
    log(
        Level::Info,
        Domain::Run,
        "run.compared",
        obj(&[
            ("configs", v_num(configs.len() as f64)),
            ("ticks", v_num(ticks.len() as f64)),
            ("worst_bad_debt", v_str(&worst)),
        ]),
    );
    Ok(outputs)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerAttribution {
    pub config_name: String,
    pub bad_debt: u128,
    /// Bad debt avoided relative to the baseline, in bps of the baseline.
    /// Negative when the configuration did worse.
    pub reduction_bps: i128,
}

/// How much bad debt each layered configuration avoided versus `baseline`.
pub fn attribute_layers(baseline: &RunReport, layered: &[RunReport]) -> Vec<LayerAttribution> {
    let base = baseline.total_bad_debt as i128;
    layered
        .iter()
        .map(|report| {
            let bad = report.total_bad_debt as i128;
            let reduction_bps = if base == 0 { 0 } else { (base - bad) * BPS as i128 / base };
            LayerAttribution {
                config_name: report.config_name.clone(),
                bad_debt: report.total_bad_debt,
                reduction_bps,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use crate::fixed_point::SCALE;

    fn setup() -> RunSetup {
        RunSetup {
            reserves: PoolReserves::new(1_000 * SCALE, 1_000 * SCALE),
            start_time: 0,
            borrowers: vec![
                BorrowerSpec::Target { collateral: 100 * SCALE, ltv_bps: 10_000 },
                BorrowerSpec::Explicit { collateral: 100 * SCALE, debt: 60 * SCALE },
            ],
        }
    }

    fn report(name: &str, bad: u128) -> RunReport {
        RunReport {
            config_name: name.to_string(),
            total_positions: 0,
            active_positions: 0,
            closed_positions: 0,
            insolvent_positions: 0,
            total_borrowed: 0,
            total_bad_debt: bad,
            bad_debt_rate_bps: 0,
            liquidation_count: 0,
            insolvency_count: 0,
            protocol_health_final: None,
            lp_return_bps: 0,
        }
    }

    #[test]
    fn test_run_counts_statuses() {
        let ticks = vec![Tick::new(60, SCALE / 2)];
        let out = run(&ProtocolConfig::traditional(), &setup(), &ticks).unwrap();
        // 75 debt and 60 debt against 50 of collateral value: both insolvent.
        assert_eq!(out.report.total_positions, 2);
        assert_eq!(out.report.insolvent_positions, 2);
        assert_eq!(out.report.total_borrowed, 135 * SCALE);
        assert_eq!(out.report.total_bad_debt, 35 * SCALE);
        assert_eq!(out.report.bad_debt_rate_bps, 2_592);
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.snapshots.len(), 1);
    }

    #[test]
    fn test_run_propagates_malformed_tick() {
        let ticks = vec![Tick::new(60, SCALE), Tick::new(120, 0)];
        let err = run(&ProtocolConfig::full(), &setup(), &ticks).unwrap_err();
        assert_eq!(err, SimError::MalformedTick { timestamp: 120, price: 0 });
    }

    #[test]
    fn test_compare_preserves_order() {
        let configs = ProtocolConfig::all_presets();
        let ticks = vec![Tick::new(60, 900_000_000), Tick::new(120, 800_000_000)];
        let outputs = compare(&configs, &setup(), &ticks).unwrap();
        let names: Vec<&str> = outputs.iter().map(|o| o.report.config_name.as_str()).collect();
        let expected: Vec<&str> = configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_digest_stable() {
        let ticks = vec![Tick::new(60, SCALE / 2)];
        let a = run(&ProtocolConfig::full(), &setup(), &ticks).unwrap();
        let b = run(&ProtocolConfig::full(), &setup(), &ticks).unwrap();
        let digest = a.digest().unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, b.digest().unwrap());
    }

    #[test]
    fn test_attribution() {
        let rows = attribute_layers(&report("base", 100), &[report("a", 25), report("b", 150)]);
        assert_eq!(rows[0].reduction_bps, 7_500);
        assert_eq!(rows[1].reduction_bps, -5_000);
        assert_eq!(attribute_layers(&report("base", 0), &[report("a", 5)])[0].reduction_bps, 0);
    }
}
