use crate::logging::{log, obj, v_str, Domain, Level};
use crate::pool::Pool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    pub msg: String,
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invariant violated: {}", self.msg)
    }
}

impl std::error::Error for InvariantViolation {}

fn violation(pool: &Pool, msg: String) -> InvariantViolation {
    log(
        Level::Error,
        Domain::Verify,
        "verify.violation",
        obj(&[("run", v_str(&pool.config().name)), ("msg", v_str(&msg))]),
    );
    InvariantViolation { msg }
}

pub fn assert_reserves_positive(pool: &Pool) -> Result<(), InvariantViolation> {
    let r = pool.reserves();
    if r.reserve_base == 0 || r.reserve_quote == 0 {
        return Err(violation(
            pool,
            format!(
                "reserves must stay positive: base={} quote={}",
                r.reserve_base, r.reserve_quote
            ),
        ));
    }
    Ok(())
}

pub fn assert_book_totals(pool: &Pool) -> Result<(), InvariantViolation> {
    let debt: u128 = pool.positions().map(|p| p.debt_amount).sum();
    if debt != pool.total_debt() {
        return Err(violation(
            pool,
            format!("total_debt {} != sum of position debt {}", pool.total_debt(), debt),
        ));
    }
    let collateral: u128 = pool.positions().map(|p| p.collateral_amount).sum();
    if collateral != pool.total_collateral() {
        return Err(violation(
            pool,
            format!(
                "total_collateral {} != sum of position collateral {}",
                pool.total_collateral(),
                collateral
            ),
        ));
    }
    Ok(())
}

pub fn assert_closed_positions_settled(pool: &Pool) -> Result<(), InvariantViolation> {
    if let Some(p) = pool.positions().find(|p| !p.is_active() && p.debt_amount != 0) {
        return Err(violation(
            pool,
            format!("position {} is {:?} with debt {}", p.id, p.status, p.debt_amount),
        ));
    }
    Ok(())
}

pub fn assert_event_order(pool: &Pool) -> Result<(), InvariantViolation> {
    if pool.events().windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
        return Err(violation(pool, "event timestamps decrease".to_string()));
    }
    Ok(())
}

/// Every post-step invariant of a pool.
pub fn check_pool(pool: &Pool) -> Result<(), InvariantViolation> {
    assert_reserves_positive(pool)?;
    assert_book_totals(pool)?;
    assert_closed_positions_settled(pool)?;
    assert_event_order(pool)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use crate::events::Tick;
    use crate::fixed_point::SCALE;
    use crate::pool::PoolReserves;

    #[test]
    fn test_fresh_pool_passes() {
        let pool = Pool::new(ProtocolConfig::full(), PoolReserves::new(SCALE, SCALE), 0).unwrap();
        assert!(check_pool(&pool).is_ok());
    }

    #[test]
    fn test_invariants_hold_through_liquidations() {
        let reserves = PoolReserves::new(1_000 * SCALE, 1_000 * SCALE);
        let mut pool = Pool::new(ProtocolConfig::traditional(), reserves, 0).unwrap();
        pool.open_position(100 * SCALE, 10_000).unwrap();
        pool.open_position(40 * SCALE, 8_000).unwrap();
        for (i, price) in [950u128, 900, 700, 400, 450].iter().enumerate() {
            pool.step(Tick::new(60 * (i as i64 + 1), price * SCALE / 1_000)).unwrap();
            check_pool(&pool).unwrap();
        }
        assert!(!pool.events().is_empty());
    }

    #[test]
    fn test_violation_display() {
        let v = InvariantViolation { msg: "x".to_string() };
        assert_eq!(v.to_string(), "invariant violated: x");
    }
}
