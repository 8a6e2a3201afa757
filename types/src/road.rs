use crate::game::Outcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of rows in the streak grid before a streak tails off to the right.
pub const ROAD_ROWS: u32 = 6;

/// Shortest length shown on the consecutive-wins chart.
pub const MIN_SERIES_LENGTH: u32 = 5;

/// One non-tie hand placed on the streak grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakCell {
    pub outcome: Outcome,
    pub column: u32,
    pub row: u32,
    pub tie_count: u32,
    /// Index of the run this cell belongs to. Equals `column` unless the run
    /// overflowed into a dragon tail.
    pub streak: u32,
}

/// Streak length -> occurrence count, kept separately for Banker and Player.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    pub banker: BTreeMap<u32, u64>,
    pub player: BTreeMap<u32, u64>,
}

impl Histogram {
    fn side(&self, outcome: Outcome) -> Option<&BTreeMap<u32, u64>> {
        match outcome {
            Outcome::Banker => Some(&self.banker),
            Outcome::Player => Some(&self.player),
            Outcome::Tie => None,
        }
    }

    fn side_mut(&mut self, outcome: Outcome) -> Option<&mut BTreeMap<u32, u64>> {
        match outcome {
            Outcome::Banker => Some(&mut self.banker),
            Outcome::Player => Some(&mut self.player),
            Outcome::Tie => None,
        }
    }

    /// Count one streak. Ties are not tracked.
    pub fn increment(&mut self, outcome: Outcome, length: u32) {
        self.add(outcome, length, 1);
    }

    pub fn add(&mut self, outcome: Outcome, length: u32, count: u64) {
        if length == 0 || count == 0 {
            return;
        }
        if let Some(side) = self.side_mut(outcome) {
            *side.entry(length).or_default() += count;
        }
    }

    pub fn get(&self, outcome: Outcome, length: u32) -> u64 {
        self.side(outcome)
            .and_then(|side| side.get(&length).copied())
            .unwrap_or(0)
    }

    /// Additive merge; commutative and associative.
    pub fn merge(&mut self, other: &Histogram) {
        for (&length, &count) in &other.banker {
            self.add(Outcome::Banker, length, count);
        }
        for (&length, &count) in &other.player {
            self.add(Outcome::Player, length, count);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.banker.is_empty() && self.player.is_empty()
    }

    pub fn longest(&self) -> u32 {
        let banker = self.banker.keys().next_back().copied().unwrap_or(0);
        let player = self.player.keys().next_back().copied().unwrap_or(0);
        banker.max(player)
    }

    /// `(outcome, length, count)` triples, Banker first, ascending length.
    pub fn entries(&self) -> impl Iterator<Item = (Outcome, u32, u64)> + '_ {
        self.banker
            .iter()
            .map(|(&l, &c)| (Outcome::Banker, l, c))
            .chain(self.player.iter().map(|(&l, &c)| (Outcome::Player, l, c)))
    }

    /// Dense chart series covering `1..=max(longest, MIN_SERIES_LENGTH)`.
    pub fn series(&self) -> Vec<SeriesPoint> {
        let end = self.longest().max(MIN_SERIES_LENGTH);
        let mut points = Vec::with_capacity(end as usize * 2);
        for length in 1..=end {
            for outcome in [Outcome::Banker, Outcome::Player] {
                points.push(SeriesPoint {
                    x: length,
                    y: self.get(outcome, length),
                    outcome,
                });
            }
        }
        points
    }
}

/// One bar of the consecutive-wins chart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub x: u32,
    pub y: u64,
    #[serde(rename = "type")]
    pub outcome: Outcome,
}

/// Both streak statistics for a span of hands.
///
/// `streaks` counts grid columns (runs) by length. `between` counts runs
/// flanked by the opposite outcome, plus the leading run. They are related
/// but never interchangeable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakStats {
    pub streaks: Histogram,
    pub between: Histogram,
}

impl StreakStats {
    pub fn merge(&mut self, other: &StreakStats) {
        self.streaks.merge(&other.streaks);
        self.between.merge(&other.between);
    }
}
