//! Per-run protocol parameters and the named layer presets.
//!
//! A [`ProtocolConfig`] is immutable once a run starts and is freely shared
//! across concurrent runs. Disabled layers are expressed through parameter
//! values: no LTV buffer is `ltv_buffer_bps = 0`, no partial liquidation is
//! `close_factor_bps = 10_000`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::logging::{log, obj, v_num, v_str, Domain, Level};

pub const MIN_HALF_LIFE: u64 = 60;
pub const MAX_HALF_LIFE: u64 = 43_200;
pub const DEFAULT_HALF_LIFE: u64 = 60;

pub const MAX_COLLATERAL_FACTOR_BPS: u64 = 8_500;
pub const MIN_COLLATERAL_FACTOR_BPS: u64 = 100;
pub const FIXED_COLLATERAL_FACTOR_BPS: u64 = 7_500;
pub const LTV_BUFFER_BPS: u64 = 500;
pub const CLOSE_FACTOR_BPS: u64 = 5_000;
pub const LIQUIDATION_INCENTIVE_BPS: u64 = 300;
pub const FULL_CLOSE_BPS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub name: String,

    // === Price smoothing ===
    /// Lending price is the EMA when set, the raw spot otherwise.
    pub ema_enabled: bool,
    /// Seconds for the EMA to close half the gap to spot.
    pub half_life: u64,

    // === Collateral factor ===
    /// Curve-derived CF when set, `fixed_cf_bps` otherwise.
    pub dynamic_cf_enabled: bool,
    /// Shrink CF by spot/EMA when spot trails the EMA.
    pub pessimistic_cap_enabled: bool,
    pub fixed_cf_bps: u64,
    pub max_cf_bps: u64,
    pub min_cf_bps: u64,
    /// Gap between liquidation CF and borrow-capacity CF.
    pub ltv_buffer_bps: u64,

    // === Liquidation ===
    pub close_factor_bps: u64,
    pub liquidation_incentive_bps: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self::full()
    }
}

impl ProtocolConfig {
    /// Oracle-style lending: spot price, fixed 75% CF, no extra layers.
    pub fn traditional() -> Self {
        Self {
            name: "Traditional Lending".to_string(),
            ema_enabled: false,
            half_life: DEFAULT_HALF_LIFE,
            dynamic_cf_enabled: false,
            pessimistic_cap_enabled: false,
            fixed_cf_bps: FIXED_COLLATERAL_FACTOR_BPS,
            max_cf_bps: MAX_COLLATERAL_FACTOR_BPS,
            min_cf_bps: MIN_COLLATERAL_FACTOR_BPS,
            ltv_buffer_bps: 0,
            close_factor_bps: CLOSE_FACTOR_BPS,
            liquidation_incentive_bps: LIQUIDATION_INCENTIVE_BPS,
        }
    }

    pub fn only_ema() -> Self {
        Self {
            name: "Only EMA".to_string(),
            ema_enabled: true,
            ..Self::traditional()
        }
    }

    pub fn only_dynamic_cf() -> Self {
        Self {
            name: "Only Dynamic CF".to_string(),
            dynamic_cf_enabled: true,
            ..Self::traditional()
        }
    }

    /// EMA plus curve CF, still missing the divergence cap and buffer.
    pub fn ema_plus_dynamic_cf() -> Self {
        Self {
            name: "EMA + Dynamic CF".to_string(),
            ema_enabled: true,
            dynamic_cf_enabled: true,
            ..Self::traditional()
        }
    }

    /// Every protection layer on, protocol default parameters.
    pub fn full() -> Self {
        Self {
            name: "Full GAMM".to_string(),
            ema_enabled: true,
            half_life: DEFAULT_HALF_LIFE,
            dynamic_cf_enabled: true,
            pessimistic_cap_enabled: true,
            fixed_cf_bps: FIXED_COLLATERAL_FACTOR_BPS,
            max_cf_bps: MAX_COLLATERAL_FACTOR_BPS,
            min_cf_bps: MIN_COLLATERAL_FACTOR_BPS,
            ltv_buffer_bps: LTV_BUFFER_BPS,
            close_factor_bps: CLOSE_FACTOR_BPS,
            liquidation_incentive_bps: LIQUIDATION_INCENTIVE_BPS,
        }
    }

    /// Slower EMA, wider buffer, lower CF ceiling.
    pub fn conservative() -> Self {
        Self {
            name: "Conservative GAMM".to_string(),
            half_life: 300,
            ltv_buffer_bps: 1_000,
            max_cf_bps: 7_500,
            ..Self::full()
        }
    }

    /// Fastest permitted EMA with a thin buffer.
    pub fn aggressive() -> Self {
        Self {
            name: "Aggressive GAMM".to_string(),
            half_life: MIN_HALF_LIFE,
            ltv_buffer_bps: 300,
            ..Self::full()
        }
    }

    pub fn all_presets() -> Vec<Self> {
        vec![
            Self::traditional(),
            Self::only_ema(),
            Self::only_dynamic_cf(),
            Self::ema_plus_dynamic_cf(),
            Self::full(),
            Self::conservative(),
            Self::aggressive(),
        ]
    }

    /// Look up a preset by display name or short key (`full`, `only_ema`, ...).
    pub fn preset(name: &str) -> Option<Self> {
        let key = name.trim().to_lowercase().replace([' ', '+', '-'], "_");
        let cfg = match key.as_str() {
            "traditional" | "traditional_lending" => Self::traditional(),
            "only_ema" => Self::only_ema(),
            "only_dynamic_cf" => Self::only_dynamic_cf(),
            "ema_plus_dynamic_cf" | "ema___dynamic_cf" => Self::ema_plus_dynamic_cf(),
            "full" | "full_gamm" => Self::full(),
            "conservative" | "conservative_gamm" => Self::conservative(),
            "aggressive" | "aggressive_gamm" => Self::aggressive(),
            _ => return None,
        };
        Some(cfg)
    }

    pub fn from_env() -> Self {
        let base = std::env::var("GAMM_PRESET")
            .ok()
            .and_then(|name| Self::preset(&name))
            .unwrap_or_default();
        Self {
            name: std::env::var("GAMM_NAME").unwrap_or(base.name),
            ema_enabled: env_flag("GAMM_EMA").unwrap_or(base.ema_enabled),
            half_life: env_num("GAMM_HALF_LIFE").unwrap_or(base.half_life),
            dynamic_cf_enabled: env_flag("GAMM_DYNAMIC_CF").unwrap_or(base.dynamic_cf_enabled),
            pessimistic_cap_enabled: env_flag("GAMM_PESSIMISTIC_CAP")
                .unwrap_or(base.pessimistic_cap_enabled),
            fixed_cf_bps: env_num("GAMM_FIXED_CF_BPS").unwrap_or(base.fixed_cf_bps),
            max_cf_bps: env_num("GAMM_MAX_CF_BPS").unwrap_or(base.max_cf_bps),
            min_cf_bps: env_num("GAMM_MIN_CF_BPS").unwrap_or(base.min_cf_bps),
            ltv_buffer_bps: env_num("GAMM_LTV_BUFFER_BPS").unwrap_or(base.ltv_buffer_bps),
            close_factor_bps: env_num("GAMM_CLOSE_FACTOR_BPS").unwrap_or(base.close_factor_bps),
            liquidation_incentive_bps: env_num("GAMM_INCENTIVE_BPS")
                .unwrap_or(base.liquidation_incentive_bps),
        }
    }

    /// [`ProtocolConfig::from_env`] followed by validation.
    pub fn load_from_env() -> Result<Self> {
        let cfg = Self::from_env();
        cfg.validate().context("protocol config from environment")?;
        Ok(cfg)
    }

    /// Parse a JSON object; absent fields keep the `full()` defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text).context("parse protocol config json")?;
        cfg.validate()
            .with_context(|| format!("protocol config '{}'", cfg.name))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> SimResult<()> {
        let result = self.check();
        if let Err(SimError::InvalidConfig { field, value, reason }) = &result {
            log(
                Level::Warn,
                Domain::Config,
                "config.invalid",
                obj(&[
                    ("name", v_str(&self.name)),
                    ("field", v_str(field)),
                    ("value", v_num(*value as f64)),
                    ("reason", v_str(reason)),
                ]),
            );
        }
        result
    }

    fn check(&self) -> SimResult<()> {
        if !(MIN_HALF_LIFE..=MAX_HALF_LIFE).contains(&self.half_life) {
            return Err(SimError::InvalidConfig {
                field: "half_life",
                value: self.half_life,
                reason: "outside [60, 43200] seconds",
            });
        }
        let bps_fields = [
            ("fixed_cf_bps", self.fixed_cf_bps),
            ("max_cf_bps", self.max_cf_bps),
            ("min_cf_bps", self.min_cf_bps),
            ("ltv_buffer_bps", self.ltv_buffer_bps),
            ("close_factor_bps", self.close_factor_bps),
            ("liquidation_incentive_bps", self.liquidation_incentive_bps),
        ];
        for (field, value) in bps_fields {
            if value > FULL_CLOSE_BPS {
                return Err(SimError::InvalidConfig {
                    field,
                    value,
                    reason: "outside [0, 10000] bps",
                });
            }
        }
        if self.min_cf_bps > self.max_cf_bps {
            return Err(SimError::InvalidConfig {
                field: "min_cf_bps",
                value: self.min_cf_bps,
                reason: "exceeds max_cf_bps",
            });
        }
        Ok(())
    }

    /// Short label of the enabled layers, e.g. `EMA(60s), DynamicCF`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.ema_enabled {
            parts.push(format!("EMA({}s)", self.half_life));
        }
        if self.dynamic_cf_enabled {
            parts.push("DynamicCF".to_string());
        } else {
            parts.push(format!("FixedCF({}bps)", self.fixed_cf_bps));
        }
        if self.pessimistic_cap_enabled {
            parts.push("PessimisticCap".to_string());
        }
        if self.ltv_buffer_bps > 0 {
            parts.push(format!("LTVBuffer({}bps)", self.ltv_buffer_bps));
        }
        if self.close_factor_bps < FULL_CLOSE_BPS {
            parts.push(format!("PartialLiq({}bps)", self.close_factor_bps));
        }
        format!("{}: [{}]", self.name, parts.join(", "))
    }
}

fn env_num(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    match std::env::var(key).ok()?.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
