use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HiveId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HoneycombId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BeeId(pub u64);

/// Arena position of a bee inside its hive: `honeycomb` indexes `Hive::honeycombs`,
/// `slot` indexes that honeycomb's bees. Stable for the whole run because
/// membership is append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BeeRef {
    pub honeycomb: usize,
    pub slot: usize,
}

/// Simulation time in days, counted from 0.
/// Months are fixed 30-day blocks, so day 29 closes month 1 and day 30 opens month 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Day(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Month(pub u32);

impl Day {
    pub const DAYS_PER_MONTH: u32 = 30;

    /// The 1-based month this day falls in.
    pub fn month(self) -> Month {
        Month(self.0 / Self::DAYS_PER_MONTH + 1)
    }

    /// True on the last day of a month, i.e. when a month boundary follows.
    pub fn closes_month(self) -> bool {
        (self.0 + 1) % Self::DAYS_PER_MONTH == 0
    }
}

impl Month {
    pub fn first_day(self) -> Day {
        Day((self.0 - 1) * Day::DAYS_PER_MONTH)
    }

    pub fn last_day(self) -> Day {
        Day(self.0 * Day::DAYS_PER_MONTH - 1)
    }
}
