use crate::bee::Bee;
use crate::types::{HiveId, HoneycombId};

/// A group of bees. Pooling happens at hive scope; the honeycomb only owns
/// its members and answers balance queries over them.
#[derive(Debug, Clone, PartialEq)]
pub struct Honeycomb {
    pub id: HoneycombId,
    /// Back-reference to the owning hive; identifier only.
    pub hive: HiveId,
    pub bees: Vec<Bee>,
}

impl Honeycomb {
    pub fn new(id: HoneycombId, hive: HiveId) -> Self {
        Honeycomb { id, hive, bees: Vec::new() }
    }

    /// Append a bee. Membership is never removed during a run.
    pub fn join(&mut self, bee: Bee) -> usize {
        debug_assert_eq!(bee.honeycomb, self.id, "bee joined a foreign honeycomb");
        self.bees.push(bee);
        self.bees.len() - 1
    }

    /// Sum of personal reserves. Zero for an empty honeycomb.
    pub fn balance(&self) -> f64 {
        self.bees.iter().map(|b| b.personal_reserve).sum()
    }

    /// Sum of pool shares. Zero for an empty honeycomb.
    pub fn pool_balance(&self) -> f64 {
        self.bees.iter().map(|b| b.pool_share).sum()
    }

    /// (number of charges, total charged) across the honeycomb's bees.
    pub fn claim_stats(&self) -> (usize, f64) {
        self.bees
            .iter()
            .fold((0, 0.0), |(n, total), b| (n + b.claim_count(), total + b.claims_total()))
    }
}
