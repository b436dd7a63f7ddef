use crate::bee::Bee;
use crate::honeycomb::Honeycomb;
use crate::types::{BeeRef, HiveId, HoneycombId};
use crate::waterfall::{self, ChargeError, ChargeOutcome, MaxChargePolicy};

/// Totals over every charge ever applied in the hive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClaimStats {
    pub count: usize,
    pub total: f64,
}

/// Top-level pool: owns the honeycombs and the last-resort reserve fund.
#[derive(Debug, Clone)]
pub struct Hive {
    pub id: HiveId,
    /// Signed: a committed non-positive value means the hive is insolvent.
    pub reserve_fund: f64,
    pub honeycombs: Vec<Honeycomb>,
    pub max_charge: MaxChargePolicy,
    /// Flat index over all bees in join order, for uniform selection.
    roster: Vec<BeeRef>,
}

impl Hive {
    pub fn new(id: HiveId, reserve_fund: f64, max_charge: MaxChargePolicy) -> Self {
        Hive { id, reserve_fund, honeycombs: Vec::new(), max_charge, roster: Vec::new() }
    }

    /// Add an empty honeycomb and return its arena index.
    pub fn add_honeycomb(&mut self, id: HoneycombId) -> usize {
        self.honeycombs.push(Honeycomb::new(id, self.id));
        self.honeycombs.len() - 1
    }

    /// Join `bee` to the honeycomb at `honeycomb` (arena index).
    pub fn join(&mut self, honeycomb: usize, bee: Bee) -> BeeRef {
        let slot = self.honeycombs[honeycomb].join(bee);
        let r = BeeRef { honeycomb, slot };
        self.roster.push(r);
        r
    }

    pub fn renew(&mut self, amount: f64) {
        self.reserve_fund += amount;
    }

    /// Renew every bee's premium split.
    pub fn renew_bees(&mut self) {
        self.bees_mut().for_each(Bee::renew);
    }

    /// Run the charge waterfall for `fee` starting at `bee`.
    pub fn charge(&mut self, bee: BeeRef, fee: f64) -> Result<ChargeOutcome, ChargeError> {
        waterfall::charge_bee(self, bee, fee)
    }

    pub fn bee(&self, r: BeeRef) -> &Bee {
        &self.honeycombs[r.honeycomb].bees[r.slot]
    }

    pub fn bee_mut(&mut self, r: BeeRef) -> &mut Bee {
        &mut self.honeycombs[r.honeycomb].bees[r.slot]
    }

    /// The bee at position `index` of the join order.
    pub fn bee_at(&self, index: usize) -> BeeRef {
        self.roster[index]
    }

    pub fn population(&self) -> usize {
        self.roster.len()
    }

    pub fn bees(&self) -> impl Iterator<Item = &Bee> {
        self.honeycombs.iter().flat_map(|c| c.bees.iter())
    }

    pub fn bees_mut(&mut self) -> impl Iterator<Item = &mut Bee> {
        self.honeycombs.iter_mut().flat_map(|c| c.bees.iter_mut())
    }

    /// Sum of every bee's pool share. Zero for an empty hive.
    pub fn pool_balance(&self) -> f64 {
        self.bees().map(|b| b.pool_share).sum()
    }

    /// Sum of every bee's personal reserve. Zero for an empty hive.
    pub fn balance(&self) -> f64 {
        self.honeycombs.iter().map(Honeycomb::balance).sum()
    }

    pub fn claim_stats(&self) -> ClaimStats {
        self.honeycombs.iter().fold(ClaimStats::default(), |acc, c| {
            let (count, total) = c.claim_stats();
            ClaimStats { count: acc.count + count, total: acc.total + total }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BeeId;

    fn hive_with(premiums: &[f64]) -> (Hive, Vec<BeeRef>) {
        let mut hive = Hive::new(HiveId(0), 0.0, MaxChargePolicy::Unlimited);
        let comb = hive.add_honeycomb(HoneycombId(1));
        let refs = premiums
            .iter()
            .enumerate()
            .map(|(i, p)| hive.join(comb, Bee::new(BeeId(i as u64 + 1), HoneycombId(1), *p, 0.25)))
            .collect();
        (hive, refs)
    }

    #[test]
    fn empty_hive_aggregates_are_zero() {
        let hive = Hive::new(HiveId(0), 10.0, MaxChargePolicy::Unlimited);
        assert_eq!(hive.pool_balance(), 0.0);
        assert_eq!(hive.balance(), 0.0);
        assert_eq!(hive.claim_stats(), ClaimStats::default());
        assert_eq!(hive.population(), 0);
    }

    #[test]
    fn renew_adds_to_reserve_fund() {
        let mut hive = Hive::new(HiveId(0), 100.0, MaxChargePolicy::Unlimited);
        hive.renew(250.0);
        assert_eq!(hive.reserve_fund, 350.0);
    }

    #[test]
    fn roster_follows_join_order_across_honeycombs() {
        let mut hive = Hive::new(HiveId(0), 0.0, MaxChargePolicy::Unlimited);
        let a = hive.add_honeycomb(HoneycombId(1));
        let b = hive.add_honeycomb(HoneycombId(2));
        hive.join(a, Bee::new(BeeId(1), HoneycombId(1), 100.0, 0.25));
        hive.join(b, Bee::new(BeeId(2), HoneycombId(2), 100.0, 0.25));
        hive.join(a, Bee::new(BeeId(3), HoneycombId(1), 100.0, 0.25));

        assert_eq!(hive.population(), 3);
        assert_eq!(hive.bee(hive.bee_at(1)).id, BeeId(2));
        assert_eq!(hive.bee_at(2), BeeRef { honeycomb: 0, slot: 1 });
        assert_eq!(hive.honeycombs[1].hive, HiveId(0));
    }

    #[test]
    fn balances_sum_over_all_bees() {
        let (hive, _) = hive_with(&[2_000.0, 3_000.0]);
        assert_eq!(hive.balance(), 1_250.0);
        assert_eq!(hive.pool_balance(), 3_750.0);
    }

    #[test]
    fn renew_bees_resets_every_pool_share() {
        let (mut hive, refs) = hive_with(&[2_000.0, 3_000.0]);
        hive.bee_mut(refs[0]).pool_share = 0.0;
        hive.bee_mut(refs[1]).personal_reserve = 0.0;
        hive.renew_bees();
        assert_eq!(hive.bee(refs[0]).pool_share, 1_500.0);
        assert_eq!(hive.bee(refs[0]).personal_reserve, 1_000.0);
        assert_eq!(hive.bee(refs[1]).personal_reserve, 750.0);
    }

    #[test]
    fn claim_stats_span_honeycombs() {
        let (mut hive, refs) = hive_with(&[2_000.0, 2_000.0]);
        hive.charge(refs[0], 100.0).unwrap();
        hive.charge(refs[1], 30.0).unwrap();
        hive.charge(refs[1], 20.0).unwrap();
        assert_eq!(hive.claim_stats(), ClaimStats { count: 3, total: 150.0 });
    }
}
