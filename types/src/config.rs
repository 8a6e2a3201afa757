use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decks per shoe when the request does not say.
pub const DEFAULT_DECK_COUNT: u32 = 8;
/// Largest shoe the simulator will build.
pub const MAX_DECK_COUNT: u32 = 16;
/// Cards per standard deck.
pub const DECK_SIZE: u32 = 52;
/// Longest game a request may ask for.
pub const MAX_HANDS_PER_GAME: u32 = 10_000;
/// Upper bound on `plays * gamesPerPlay`.
pub const MAX_TOTAL_GAMES: u64 = 1_000_000;
/// Upper bound on `plays * gamesPerPlay * handsPerGame`.
pub const MAX_TOTAL_HANDS: u64 = 100_000_000;
/// Game count at or above which the persisted tier gives way to the summarized one.
pub const DEFAULT_PERSIST_THRESHOLD: u64 = 1_000;

/// Parameters of one simulation request. Immutable once validated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    #[serde(default)]
    pub plays: u32,
    #[serde(default)]
    pub games_per_play: u32,
    #[serde(default)]
    pub hands_per_game: u32,
    #[serde(default = "default_deck_count")]
    pub deck_count: u32,
    #[serde(default, alias = "skipCardCount")]
    pub skip_card: u32,
    #[serde(default)]
    pub small_card_reduction_pct: u8,
    #[serde(default)]
    pub big_card_reduction_pct: u8,
    #[serde(default, alias = "isContinuousMode")]
    pub continuous_mode: bool,
    #[serde(default)]
    pub use_in_memory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_deck_count() -> u32 {
    DEFAULT_DECK_COUNT
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            plays: 1,
            games_per_play: 1,
            hands_per_game: 1,
            deck_count: DEFAULT_DECK_COUNT,
            skip_card: 0,
            small_card_reduction_pct: 0,
            big_card_reduction_pct: 0,
            continuous_mode: false,
            use_in_memory: false,
            seed: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} is required and must be > 0")]
    Missing { field: &'static str },
    #[error("deckCount must be between 1 and {max} (got {value})")]
    DeckCount { value: u32, max: u32 },
    #[error("{field} must be a percentage between 0 and 100 (got {value})")]
    Percentage { field: &'static str, value: u8 },
    #[error("skipCard must be smaller than the shoe ({shoe} cards, got {value})")]
    SkipCard { value: u32, shoe: u32 },
    #[error("{field} must be at most {max} (got {value})")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("plays", self.plays),
            ("gamesPerPlay", self.games_per_play),
            ("handsPerGame", self.hands_per_game),
        ] {
            if value == 0 {
                return Err(ConfigError::Missing { field });
            }
        }
        for (field, value, max) in [
            (
                "handsPerGame",
                self.hands_per_game as u64,
                MAX_HANDS_PER_GAME as u64,
            ),
            ("totalGames", self.total_games(), MAX_TOTAL_GAMES),
            ("totalHands", self.total_hands(), MAX_TOTAL_HANDS),
        ] {
            if value > max {
                return Err(ConfigError::TooLarge { field, value, max });
            }
        }
        if self.deck_count == 0 || self.deck_count > MAX_DECK_COUNT {
            return Err(ConfigError::DeckCount {
                value: self.deck_count,
                max: MAX_DECK_COUNT,
            });
        }
        for (field, value) in [
            ("smallCardReductionPct", self.small_card_reduction_pct),
            ("bigCardReductionPct", self.big_card_reduction_pct),
        ] {
            if value > 100 {
                return Err(ConfigError::Percentage { field, value });
            }
        }
        let shoe = self.deck_count * DECK_SIZE;
        if self.skip_card >= shoe {
            return Err(ConfigError::SkipCard {
                value: self.skip_card,
                shoe,
            });
        }
        Ok(())
    }

    pub fn total_games(&self) -> u64 {
        self.plays as u64 * self.games_per_play as u64
    }

    pub fn total_hands(&self) -> u64 {
        self.total_games()
            .saturating_mul(self.hands_per_game as u64)
    }
}

/// Aggregation strategy for one simulation.
///
/// All tiers compute identical counters and histograms; they differ only in
/// what is retained afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    /// Every hand is written to the store for on-demand detail queries.
    Persisted,
    /// Workers pre-compute histogram fragments; only game summaries are stored.
    Summarized,
    /// Same computation as `Summarized` with nothing written to the store.
    InMemory,
}

impl Tier {
    /// Pure function of the caller's flag and the workload size.
    pub fn select(use_in_memory: bool, total_games: u64, persist_threshold: u64) -> Self {
        if use_in_memory {
            Tier::InMemory
        } else if total_games >= persist_threshold {
            Tier::Summarized
        } else {
            Tier::Persisted
        }
    }

    /// Whether workers must ship individual hands back.
    pub fn keeps_hands(self) -> bool {
        matches!(self, Tier::Persisted)
    }

    pub fn writes_to_store(self) -> bool {
        !matches!(self, Tier::InMemory)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Persisted => "persisted",
            Tier::Summarized => "summarized",
            Tier::InMemory => "in-memory",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
