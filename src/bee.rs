use crate::types::{BeeId, HoneycombId};

/// One insured participant.
///
/// Funds sit in two buckets: the personal reserve ("small pool"), spent first
/// and never shared, and the pool share ("big pool"), spent second and also
/// drawn on by the hive when another bee's claim escalates.
#[derive(Debug, Clone, PartialEq)]
pub struct Bee {
    pub id: BeeId,
    /// Back-reference to the owning honeycomb; identifier only.
    pub honeycomb: HoneycombId,
    pub premium: f64,
    pub pool_ratio: f64,
    pub personal_reserve: f64,
    pub pool_share: f64,
    /// Every fee charged to this bee, in order.
    pub claim_history: Vec<f64>,
}

impl Bee {
    /// Split `premium` into `floor(premium * pool_ratio)` personal reserve and
    /// the remainder as pool share.
    pub fn new(id: BeeId, honeycomb: HoneycombId, premium: f64, pool_ratio: f64) -> Self {
        let personal_reserve = (premium * pool_ratio).floor();
        Bee {
            id,
            honeycomb,
            premium,
            pool_ratio,
            personal_reserve,
            pool_share: premium - personal_reserve,
            claim_history: Vec::new(),
        }
    }

    /// Periodic premium renewal: tops up the personal reserve and resets the
    /// pool share. Claim history is not consulted.
    pub fn renew(&mut self) {
        self.personal_reserve += self.premium * self.pool_ratio;
        self.pool_share = self.premium * (1.0 - self.pool_ratio);
    }

    pub fn record_claim(&mut self, fee: f64) {
        self.claim_history.push(fee);
    }

    /// Tier 1. Returns the part of `fee` the personal reserve could not cover.
    pub fn absorb_personal(&mut self, fee: f64) -> f64 {
        if self.personal_reserve > fee {
            self.personal_reserve -= fee;
            return 0.0;
        }
        let residual = fee - self.personal_reserve;
        self.personal_reserve = 0.0;
        residual
    }

    /// Tier 2. Returns the part of `residual` the pool share could not cover.
    pub fn absorb_pool(&mut self, residual: f64) -> f64 {
        if self.pool_share >= residual {
            self.pool_share -= residual;
            return 0.0;
        }
        let left = residual - self.pool_share;
        self.pool_share = 0.0;
        left
    }

    pub fn claim_count(&self) -> usize {
        self.claim_history.len()
    }

    pub fn claims_total(&self) -> f64 {
        self.claim_history.iter().sum()
    }
}
