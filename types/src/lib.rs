//! Data model shared by the shoebox execution engine and simulator.

pub mod api;
pub mod card;
pub mod config;
pub mod game;
pub mod road;

pub use card::{Card, Rank, Suit};
pub use config::{ConfigError, SimulationConfig, Tier};
pub use game::{GameResult, Hand, HandRecord, Outcome, PlayResult, Tally, WorkUnit};
pub use road::{Histogram, SeriesPoint, StreakCell, StreakStats, ROAD_ROWS};
