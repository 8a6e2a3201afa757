use crate::{card::Card, road::StreakStats};
use serde::{Deserialize, Serialize};

/// Winner of a single hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Outcome {
    Banker,
    Player,
    Tie,
}

impl Outcome {
    /// Compare final totals: the higher total wins, equal totals tie.
    pub fn from_totals(player_total: u8, banker_total: u8) -> Self {
        use std::cmp::Ordering;
        match player_total.cmp(&banker_total) {
            Ordering::Greater => Outcome::Player,
            Ordering::Less => Outcome::Banker,
            Ordering::Equal => Outcome::Tie,
        }
    }

    pub fn is_tie(self) -> bool {
        self == Outcome::Tie
    }

    /// Banker <-> Player; a tie has no opposite.
    pub fn opposite(self) -> Option<Self> {
        match self {
            Outcome::Banker => Some(Outcome::Player),
            Outcome::Player => Some(Outcome::Banker),
            Outcome::Tie => None,
        }
    }
}

/// Result of one deal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hand {
    pub player_cards: Vec<Card>,
    pub banker_cards: Vec<Card>,
    pub player_total: u8,
    pub banker_total: u8,
    pub result: Outcome,
    pub player_pair: bool,
    pub banker_pair: bool,
}

/// A hand tagged with its 1-based position within its game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandRecord {
    pub hand_number: u32,
    #[serde(flatten)]
    pub hand: Hand,
}

/// Win and pair counters for a span of hands.
///
/// Merging is plain addition so partial tallies can be combined in any order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub total_hands: u32,
    pub banker_wins: u32,
    pub player_wins: u32,
    pub tie_wins: u32,
    pub banker_pairs: u32,
    pub player_pairs: u32,
}

impl Tally {
    pub fn record(&mut self, hand: &Hand) {
        self.total_hands += 1;
        match hand.result {
            Outcome::Banker => self.banker_wins += 1,
            Outcome::Player => self.player_wins += 1,
            Outcome::Tie => self.tie_wins += 1,
        }
        if hand.banker_pair {
            self.banker_pairs += 1;
        }
        if hand.player_pair {
            self.player_pairs += 1;
        }
    }

    pub fn merge(&mut self, other: &Tally) {
        self.total_hands += other.total_hands;
        self.banker_wins += other.banker_wins;
        self.player_wins += other.player_wins;
        self.tie_wins += other.tie_wins;
        self.banker_pairs += other.banker_pairs;
        self.player_pairs += other.player_pairs;
    }

    /// Sum of the three outcome counters (always equals `total_hands`).
    pub fn decided(&self) -> u32 {
        self.banker_wins + self.player_wins + self.tie_wins
    }
}

/// Outcome of one game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub play_number: u32,
    pub game_number: u32,
    #[serde(flatten)]
    pub tally: Tally,
    /// Full hand detail; only retained by the persisted tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hands: Option<Vec<HandRecord>>,
}

impl GameResult {
    pub fn unit(&self) -> WorkUnit {
        WorkUnit {
            play_number: self.play_number,
            game_number: self.game_number,
        }
    }

    /// Hand outcomes in deal order, if hand detail was retained.
    pub fn outcomes(&self) -> Option<Vec<Outcome>> {
        self.hands
            .as_ref()
            .map(|hands| hands.iter().map(|record| record.hand.result).collect())
    }
}

/// Every game of one play, ordered by game number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResult {
    pub play_number: u32,
    pub games: Vec<GameResult>,
    /// Pre-computed streak histogram and between-counts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<StreakStats>,
}

impl PlayResult {
    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for game in &self.games {
            tally.merge(&game.tally);
        }
        tally
    }

    pub fn total_hands(&self) -> u64 {
        self.games.iter().map(|g| g.tally.total_hands as u64).sum()
    }
}

/// The smallest schedulable piece of simulation work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkUnit {
    pub play_number: u32,
    pub game_number: u32,
}

impl WorkUnit {
    pub const fn new(play_number: u32, game_number: u32) -> Self {
        Self {
            play_number,
            game_number,
        }
    }
}
