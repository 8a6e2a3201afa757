//! Persistence collaborator for the stored tiers.

use shoebox_types::{api::GameId, HandRecord, Histogram, Outcome, Tally};
use std::{
    collections::{BTreeMap, HashMap},
    sync::RwLock,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,
    #[error("game {0} does not exist")]
    UnknownGame(GameId),
}

/// A game summary row as read back from the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredGame {
    pub game_id: GameId,
    pub play_number: u32,
    pub game_number: u32,
    pub tally: Tally,
}

/// Write and read queries the simulator issues against a store.
///
/// Writes are not retried; a failed write fails the simulation.
pub trait Store: Send + Sync {
    fn insert_game_summary(
        &self,
        simulation: &str,
        play_number: u32,
        game_number: u32,
        tally: &Tally,
    ) -> Result<GameId, StoreError>;

    fn insert_hand(&self, game_id: GameId, hand: &HandRecord) -> Result<(), StoreError>;

    fn insert_streak_histogram_entry(
        &self,
        simulation: &str,
        play_number: u32,
        length: u32,
        outcome: Outcome,
        count: u64,
    ) -> Result<(), StoreError>;

    /// Games of one play ordered by game number; `page` is 1-based.
    fn games_for_play(
        &self,
        simulation: &str,
        play_number: u32,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<StoredGame>, StoreError>;

    fn count_games_for_play(&self, simulation: &str, play_number: u32) -> Result<u64, StoreError>;

    /// Hands of one game in deal order. Empty if only the summary was stored.
    fn hands_for_game(&self, game_id: GameId) -> Result<Vec<HandRecord>, StoreError>;

    fn streak_histogram(&self, simulation: &str, play_number: u32)
        -> Result<Histogram, StoreError>;

    /// Drop every row written for `simulation`.
    fn remove_simulation(&self, simulation: &str) -> Result<(), StoreError>;
}

type PlayKey = (String, u32);

#[derive(Default)]
struct Tables {
    next_id: GameId,
    games: HashMap<GameId, StoredGame>,
    plays: BTreeMap<PlayKey, BTreeMap<u32, GameId>>,
    hands: HashMap<GameId, Vec<HandRecord>>,
    histograms: BTreeMap<PlayKey, Histogram>,
}

/// In-process [Store] backed by ordered maps.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total stored game rows across every simulation.
    pub fn game_count(&self) -> usize {
        self.tables.read().map(|t| t.games.len()).unwrap_or(0)
    }

    /// Total stored hand rows across every simulation.
    pub fn hand_count(&self) -> usize {
        self.tables
            .read()
            .map(|t| t.hands.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

impl Store for MemoryStore {
    fn insert_game_summary(
        &self,
        simulation: &str,
        play_number: u32,
        game_number: u32,
        tally: &Tally,
    ) -> Result<GameId, StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        tables.next_id += 1;
        let game_id = tables.next_id;
        tables.games.insert(
            game_id,
            StoredGame {
                game_id,
                play_number,
                game_number,
                tally: *tally,
            },
        );
        tables
            .plays
            .entry((simulation.to_string(), play_number))
            .or_default()
            .insert(game_number, game_id);
        Ok(game_id)
    }

    fn insert_hand(&self, game_id: GameId, hand: &HandRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        if !tables.games.contains_key(&game_id) {
            return Err(StoreError::UnknownGame(game_id));
        }
        tables.hands.entry(game_id).or_default().push(hand.clone());
        Ok(())
    }

    fn insert_streak_histogram_entry(
        &self,
        simulation: &str,
        play_number: u32,
        length: u32,
        outcome: Outcome,
        count: u64,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        tables
            .histograms
            .entry((simulation.to_string(), play_number))
            .or_default()
            .add(outcome, length, count);
        Ok(())
    }

    fn games_for_play(
        &self,
        simulation: &str,
        play_number: u32,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<StoredGame>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        let Some(ids) = tables.plays.get(&(simulation.to_string(), play_number)) else {
            return Ok(Vec::new());
        };
        let skip = page.saturating_sub(1) as usize * page_size as usize;
        Ok(ids
            .values()
            .skip(skip)
            .take(page_size as usize)
            .filter_map(|id| tables.games.get(id).cloned())
            .collect())
    }

    fn count_games_for_play(&self, simulation: &str, play_number: u32) -> Result<u64, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables
            .plays
            .get(&(simulation.to_string(), play_number))
            .map_or(0, |ids| ids.len() as u64))
    }

    fn hands_for_game(&self, game_id: GameId) -> Result<Vec<HandRecord>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        if !tables.games.contains_key(&game_id) {
            return Err(StoreError::UnknownGame(game_id));
        }
        Ok(tables.hands.get(&game_id).cloned().unwrap_or_default())
    }

    fn streak_histogram(
        &self,
        simulation: &str,
        play_number: u32,
    ) -> Result<Histogram, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables
            .histograms
            .get(&(simulation.to_string(), play_number))
            .cloned()
            .unwrap_or_default())
    }

    fn remove_simulation(&self, simulation: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        let keys: Vec<PlayKey> = tables
            .plays
            .keys()
            .filter(|(sim, _)| sim == simulation)
            .cloned()
            .collect();
        for key in keys {
            if let Some(ids) = tables.plays.remove(&key) {
                for id in ids.values() {
                    tables.games.remove(id);
                    tables.hands.remove(id);
                }
            }
        }
        tables.histograms.retain(|(sim, _), _| sim != simulation);
        Ok(())
    }
}
