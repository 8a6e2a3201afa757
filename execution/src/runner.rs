use crate::{
    baccarat,
    rng::GameRng,
    shoe::{Shoe, ShoeSpec},
    GameError,
};
use shoebox_types::{Card, GameResult, Hand, HandRecord, Outcome, Tally, WorkUnit};
use tracing::trace;

/// A shoe together with the RNG that rebuilds it.
pub struct Table {
    spec: ShoeSpec,
    rng: GameRng,
    shoe: Shoe,
    rebuilds: u32,
}

impl Table {
    /// Build and shuffle a fresh shoe.
    pub fn open(spec: ShoeSpec, mut rng: GameRng) -> Self {
        let shoe = Shoe::new(spec, &mut rng);
        Self::with_shoe(spec, rng, shoe)
    }

    fn with_shoe(spec: ShoeSpec, rng: GameRng, shoe: Shoe) -> Self {
        Self {
            spec,
            rng,
            shoe,
            rebuilds: 0,
        }
    }

    /// Discard cards from the top of the shoe before play starts.
    pub fn burn(&mut self, count: usize) -> Vec<Card> {
        self.shoe.burn(count)
    }

    /// Deal one hand, replacing the shoe first if it has run low.
    pub fn deal(&mut self) -> Result<Hand, GameError> {
        if self.shoe.is_low() {
            trace!(remaining = self.shoe.remaining(), "rebuilding shoe");
            self.shoe = Shoe::new(self.spec, &mut self.rng);
            self.rebuilds += 1;
        }
        baccarat::play_hand(&mut self.shoe)
    }

    pub fn remaining(&self) -> usize {
        self.shoe.remaining()
    }

    /// Number of times the shoe has been replaced mid-play.
    pub fn rebuilds(&self) -> u32 {
        self.rebuilds
    }
}

/// Most hands reserved up front for one game; longer games grow on demand.
const RESERVED_HANDS: usize = 1_024;

/// One finished game plus its outcomes in deal order.
#[derive(Clone, Debug)]
pub struct GameRun {
    pub result: GameResult,
    pub outcomes: Vec<Outcome>,
}

/// Deal `hands_per_game` hands at `table`.
pub fn run_game(
    table: &mut Table,
    unit: WorkUnit,
    hands_per_game: u32,
    keep_hands: bool,
) -> Result<GameRun, GameError> {
    let mut tally = Tally::default();
    let reserved = (hands_per_game as usize).min(RESERVED_HANDS);
    let mut outcomes = Vec::with_capacity(reserved);
    let mut hands = keep_hands.then(|| Vec::with_capacity(reserved));

    for hand_number in 1..=hands_per_game {
        let hand = table.deal()?;
        tally.record(&hand);
        outcomes.push(hand.result);
        if let Some(hands) = hands.as_mut() {
            hands.push(HandRecord { hand_number, hand });
        }
    }

    Ok(GameRun {
        result: GameResult {
            play_number: unit.play_number,
            game_number: unit.game_number,
            tally,
            hands,
        },
        outcomes,
    })
}
