pub mod baccarat;
pub mod executor;
pub mod partition;
pub mod rng;
pub mod road;
pub mod runner;
pub mod shoe;
pub mod worker;

pub use executor::{Dispatch, Executor, ExecutorError, WorkerError, WorkerMessage};
pub use rng::GameRng;
pub use runner::{run_game, GameRun, Table};
pub use shoe::{Shoe, ShoeSpec, LOW_WATER_MARK};
pub use worker::{Batch, Fragment, Report, RunSettings};

use thiserror::Error;

/// Error during game execution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    /// Deck is exhausted (no more cards to draw).
    #[error("shoe exhausted mid-hand")]
    DeckExhausted,
    /// The simulation was abandoned before this work finished.
    #[error("cancelled")]
    Cancelled,
}
