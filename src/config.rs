use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Day;
use crate::waterfall::MaxChargePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("population must be non-empty: {honeycombs} honeycombs x {bees_per_honeycomb} bees")]
    EmptyPopulation { honeycombs: usize, bees_per_honeycomb: usize },

    #[error("horizon must cover at least one day")]
    EmptyHorizon,

    #[error("{name} does not fit in a machine word")]
    Overflow { name: &'static str },

    #[error("pool_ratio must lie strictly between 0 and 1, got {0}")]
    PoolRatio(f64),

    #[error("invalid {name}: {value}")]
    Parameter { name: &'static str, value: f64 },

    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Length of a run, in the unit the caller thinks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Horizon {
    Days(u32),
    /// 30-day months. Enables per-month snapshots and renewal.
    Months(u32),
}

impl Horizon {
    /// `None` when a month horizon is too long to count in days.
    pub fn checked_days(self) -> Option<u32> {
        match self {
            Horizon::Days(n) => Some(n),
            Horizon::Months(n) => n.checked_mul(Day::DAYS_PER_MONTH),
        }
    }

    /// Saturates; [`SimulationConfig::validate`] rejects horizons that would.
    pub fn days(self) -> u32 {
        self.checked_days().unwrap_or(u32::MAX)
    }

    pub fn is_monthly(self) -> bool {
        matches!(self, Horizon::Months(_))
    }
}

/// Gaussian premium parameters. Draws are truncated to whole units and clamped at zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PremiumConfig {
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SeverityConfig {
    Normal { mean: f64, std_dev: f64 },
    /// Gamma(shape, scale) multiplied by `scale_factor`.
    /// E[X] = shape * scale * scale_factor.
    Gamma { shape: f64, scale: f64, scale_factor: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub honeycombs: usize,
    pub bees_per_honeycomb: usize,
    pub horizon: Horizon,
    /// Fraction of each premium kept as the bee's personal reserve.
    pub pool_ratio: f64,
    pub premium: PremiumConfig,
    /// Poisson λ: expected number of claims per day.
    pub claim_rate_lambda: f64,
    pub severity: SeverityConfig,
    pub max_charge: MaxChargePolicy,
    pub initial_reserve_fund: f64,
    /// Renew every bee at each month boundary. Ignored for day horizons.
    #[serde(default)]
    pub renew_each_month: bool,
}

/// A named variation on the canonical parameters.
pub struct Scenario {
    pub name: &'static str,
    pub config: SimulationConfig,
}

pub const DEFAULT_MAX_CHARGE_CONSTANT: f64 = 100.0;
pub const DEFAULT_MAX_CHARGE_RATIO: f64 = 0.05;

impl SimulationConfig {
    /// Reference parameters: 1000 honeycombs of 5 bees over 12 months.
    pub fn canonical() -> Self {
        SimulationConfig {
            seed: 42,
            honeycombs: 1_000,
            bees_per_honeycomb: 5,
            horizon: Horizon::Months(12),
            pool_ratio: 0.25,
            premium: PremiumConfig { mean: 4_000.0, std_dev: 2_000.0 },
            claim_rate_lambda: 10.0,
            severity: SeverityConfig::Normal { mean: 500.0, std_dev: 200.0 },
            max_charge: MaxChargePolicy::Ratio(DEFAULT_MAX_CHARGE_RATIO),
            initial_reserve_fund: 3_000_000.0,
            renew_each_month: false,
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: display.clone(), source })?;
        let config: SimulationConfig = serde_json::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: display, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Saturates; [`SimulationConfig::validate`] rejects populations that would.
    pub fn population(&self) -> usize {
        self.honeycombs.saturating_mul(self.bees_per_honeycomb)
    }

    /// Reject parameters the sampler or waterfall cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.honeycombs.checked_mul(self.bees_per_honeycomb) {
            None => return Err(ConfigError::Overflow { name: "population" }),
            Some(0) => {
                return Err(ConfigError::EmptyPopulation {
                    honeycombs: self.honeycombs,
                    bees_per_honeycomb: self.bees_per_honeycomb,
                });
            }
            Some(_) => {}
        }
        match self.horizon.checked_days() {
            None => return Err(ConfigError::Overflow { name: "horizon" }),
            Some(0) => return Err(ConfigError::EmptyHorizon),
            Some(_) => {}
        }
        if !(self.pool_ratio > 0.0 && self.pool_ratio < 1.0) {
            return Err(ConfigError::PoolRatio(self.pool_ratio));
        }

        finite("premium.mean", self.premium.mean)?;
        non_negative("premium.std_dev", self.premium.std_dev)?;
        positive("claim_rate_lambda", self.claim_rate_lambda)?;
        match self.severity {
            SeverityConfig::Normal { mean, std_dev } => {
                finite("severity.mean", mean)?;
                non_negative("severity.std_dev", std_dev)?;
            }
            SeverityConfig::Gamma { shape, scale, scale_factor } => {
                positive("severity.shape", shape)?;
                positive("severity.scale", scale)?;
                non_negative("severity.scale_factor", scale_factor)?;
            }
        }
        match self.max_charge {
            MaxChargePolicy::Unlimited => {}
            MaxChargePolicy::Constant(c) => non_negative("max_charge.constant", c)?,
            MaxChargePolicy::Ratio(r) => non_negative("max_charge.ratio", r)?,
        }
        non_negative("initial_reserve_fund", self.initial_reserve_fund)
    }
}

fn finite(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() { Ok(()) } else { Err(ConfigError::Parameter { name, value }) }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Parameter { name, value })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Parameter { name, value })
    }
}

/// Named scenarios used for side-by-side comparison runs.
pub fn scenarios() -> Vec<Scenario> {
    let base = SimulationConfig::canonical();
    vec![
        Scenario { name: "canonical", config: base.clone() },
        Scenario {
            name: "constant-cap",
            config: SimulationConfig {
                max_charge: MaxChargePolicy::Constant(DEFAULT_MAX_CHARGE_CONSTANT),
                ..base.clone()
            },
        },
        Scenario {
            name: "gamma-severity",
            config: SimulationConfig {
                severity: SeverityConfig::Gamma { shape: 3.0, scale: 0.5, scale_factor: 500.0 },
                ..base.clone()
            },
        },
        Scenario {
            name: "thin-reserve",
            config: SimulationConfig { initial_reserve_fund: 300_000.0, ..base.clone() },
        },
        Scenario {
            name: "large-honeycombs",
            config: SimulationConfig {
                honeycombs: 250,
                bees_per_honeycomb: 20,
                horizon: Horizon::Months(24),
                renew_each_month: true,
                ..base
            },
        },
    ]
}
