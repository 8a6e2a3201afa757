//! Multi-deck shoe with optional card-density reductions.

use crate::{rng::GameRng, GameError};
use shoebox_types::{Card, Rank, SimulationConfig, Suit};

/// A shoe holding fewer cards than this is rebuilt before the next hand.
///
/// A baccarat hand never uses more than six cards, so this leaves room for
/// several hands of slack.
pub const LOW_WATER_MARK: usize = 20;

/// Everything needed to (re)build a shoe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShoeSpec {
    pub deck_count: u32,
    pub small_reduction_pct: u8,
    pub big_reduction_pct: u8,
}

impl From<&SimulationConfig> for ShoeSpec {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            deck_count: config.deck_count,
            small_reduction_pct: config.small_card_reduction_pct,
            big_reduction_pct: config.big_card_reduction_pct,
        }
    }
}

impl ShoeSpec {
    pub fn standard(deck_count: u32) -> Self {
        Self {
            deck_count,
            small_reduction_pct: 0,
            big_reduction_pct: 0,
        }
    }

    /// Whether a card of this rank survives construction.
    ///
    /// Each card is tested independently; 10s, faces and aces are never removed.
    fn keep(&self, rank: Rank, rng: &mut GameRng) -> bool {
        if rank.is_small() {
            !rng.chance(self.small_reduction_pct)
        } else if rank.is_big() {
            !rng.chance(self.big_reduction_pct)
        } else {
            true
        }
    }
}

/// Ordered cards remaining to be dealt. The next card is at the back.
#[derive(Clone, Debug)]
pub struct Shoe {
    cards: Vec<Card>,
}

impl Shoe {
    /// Build `deck_count` standard decks, apply the reductions and shuffle.
    pub fn new(spec: ShoeSpec, rng: &mut GameRng) -> Self {
        let mut cards = Vec::with_capacity(spec.deck_count as usize * 52);
        for _ in 0..spec.deck_count {
            for suit in Suit::ALL {
                for rank in Rank::ALL {
                    if spec.keep(rank, rng) {
                        cards.push(Card::new(rank, suit));
                    }
                }
            }
        }
        rng.shuffle(&mut cards);
        Self { cards }
    }

    /// A shoe that deals `cards` in the given order.
    #[cfg(test)]
    pub(crate) fn stacked(mut cards: Vec<Card>) -> Self {
        cards.reverse();
        Self { cards }
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    pub fn is_low(&self) -> bool {
        self.cards.len() < LOW_WATER_MARK
    }

    pub fn draw(&mut self) -> Result<Card, GameError> {
        self.cards.pop().ok_or(GameError::DeckExhausted)
    }

    /// Remove up to `count` cards from the top, returned in deal order.
    pub fn burn(&mut self, count: usize) -> Vec<Card> {
        let keep = self.cards.len().saturating_sub(count);
        let mut burned = self.cards.split_off(keep);
        burned.reverse();
        burned
    }
}
