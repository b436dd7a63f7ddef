//! The charge waterfall.
//!
//! A claim is absorbed tier by tier, each tier only seeing what the previous
//! one could not cover:
//!
//! 1. the claimant's personal reserve,
//! 2. the claimant's pool share,
//! 3. every bee's pool share in the hive, in proportion to its size and
//!    capped per bee by [`MaxChargePolicy`],
//! 4. the hive reserve fund.
//!
//! A reserve fund driven to zero or below ends the run with
//! [`ChargeError::Insolvent`]. Deductions made by earlier tiers are kept.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::hive::Hive;
use crate::types::BeeRef;

/// Shortfalls below this are float noise from proportional shares.
const SHORTFALL_EPSILON: f64 = 1e-9;

/// Most the aggregate tier may take from one bee for a single claim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxChargePolicy {
    Unlimited,
    /// Fixed amount per bee.
    Constant(f64),
    /// Fraction of the bee's current pool share.
    Ratio(f64),
}

impl MaxChargePolicy {
    pub fn cap(&self, pool_share: f64) -> f64 {
        match *self {
            MaxChargePolicy::Unlimited => f64::INFINITY,
            MaxChargePolicy::Constant(c) => c,
            MaxChargePolicy::Ratio(r) => r * pool_share,
        }
    }

    /// The policy's parameter as reported in summaries.
    pub fn parameter(&self) -> Option<f64> {
        match *self {
            MaxChargePolicy::Unlimited => None,
            MaxChargePolicy::Constant(c) => Some(c),
            MaxChargePolicy::Ratio(r) => Some(r),
        }
    }
}

/// How much of a fee each tier absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChargeOutcome {
    pub personal: f64,
    pub pool_share: f64,
    pub aggregate: f64,
    pub reserve: f64,
}

impl ChargeOutcome {
    pub fn total(&self) -> f64 {
        self.personal + self.pool_share + self.aggregate + self.reserve
    }

    pub fn reached_reserve(&self) -> bool {
        self.reserve > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ChargeError {
    #[error("hive insolvent: shortfall of {shortfall:.2} left the reserve fund at {reserve_fund:.2}")]
    Insolvent { shortfall: f64, reserve_fund: f64 },
}

/// Charge `fee` to `bee` and run it down the tiers.
///
/// The fee is recorded in the bee's claim history whether or not the hive
/// survives it.
pub fn charge_bee(hive: &mut Hive, bee: BeeRef, fee: f64) -> Result<ChargeOutcome, ChargeError> {
    let mut outcome = ChargeOutcome::default();

    let claimant = hive.bee_mut(bee);
    claimant.record_claim(fee);

    let reserve_before = claimant.personal_reserve;
    let residual = claimant.absorb_personal(fee);
    if residual == 0.0 {
        outcome.personal = fee;
        return Ok(outcome);
    }
    outcome.personal = reserve_before;

    let pool_before = claimant.pool_share;
    let escalated = claimant.absorb_pool(residual);
    if escalated == 0.0 {
        outcome.pool_share = residual;
        return Ok(outcome);
    }
    outcome.pool_share = pool_before;

    let collected = charge_aggregate(hive, escalated);
    outcome.aggregate = collected;

    let shortfall = escalated - collected;
    if shortfall <= SHORTFALL_EPSILON {
        return Ok(outcome);
    }
    draw_reserve(hive, shortfall)?;
    outcome.reserve = shortfall;
    Ok(outcome)
}

/// Tier 3: spread `residual` over every bee's pool share in proportion to its
/// size, taking at most the policy cap from each. Returns the amount collected.
///
/// Shares are not re-normalised after capping; whatever the caps hold back
/// falls through to the reserve fund.
pub fn charge_aggregate(hive: &mut Hive, residual: f64) -> f64 {
    let pool_sum = hive.pool_balance();
    if pool_sum <= 0.0 {
        return 0.0;
    }

    let policy = hive.max_charge;
    let mut collected = 0.0;
    for bee in hive.bees_mut() {
        if bee.pool_share <= 0.0 {
            continue;
        }
        let share = residual * bee.pool_share / pool_sum;
        let take = share.min(policy.cap(bee.pool_share)).min(bee.pool_share);
        bee.pool_share -= take;
        collected += take;
    }
    debug!(target: "beehive::waterfall", residual, pool_sum, collected, "aggregate pool charged");
    collected
}

/// Tier 4. Commits the draw, then reports insolvency if nothing is left.
fn draw_reserve(hive: &mut Hive, shortfall: f64) -> Result<(), ChargeError> {
    hive.reserve_fund -= shortfall;
    if hive.reserve_fund <= 0.0 {
        warn!(
            target: "beehive::waterfall",
            shortfall,
            reserve_fund = hive.reserve_fund,
            "reserve fund exhausted"
        );
        return Err(ChargeError::Insolvent { shortfall, reserve_fund: hive.reserve_fund });
    }
    debug!(target: "beehive::waterfall", shortfall, reserve_fund = hive.reserve_fund, "reserve drawn");
    Ok(())
}
