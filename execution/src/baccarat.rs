//! Punto banco hand evaluation.
//!
//! Deal order is Player, Banker, Player, Banker. If either two-card total is
//! a natural (8 or 9) both sides stand. Otherwise the Player draws on 0-5 and
//! the Banker follows the tableau below.

use crate::{shoe::Shoe, GameError};
use shoebox_types::{Card, Hand, Outcome};

/// Calculate hand total (mod 10).
pub fn hand_total(cards: &[Card]) -> u8 {
    cards.iter().map(|c| c.value()).sum::<u8>() % 10
}

/// Check if first two cards are a pair (same rank).
pub fn is_pair(cards: &[Card]) -> bool {
    cards.len() >= 2 && cards[0].rank == cards[1].rank
}

/// Determine if player should draw third card.
/// Player draws on 0-5, stands on 6-7.
fn player_draws(player_total: u8) -> bool {
    player_total <= 5
}

/// Determine if banker should draw third card.
/// Depends on banker's total and player's third card (if any).
fn banker_draws(banker_total: u8, player_third_card: Option<Card>) -> bool {
    let third = player_third_card.map(|c| c.value());
    match banker_total {
        0..=2 => true,
        3 => third != Some(8),
        4 => third.map_or(true, |v| (2..=7).contains(&v)),
        5 => third.map_or(true, |v| (4..=7).contains(&v)),
        6 => third.map_or(false, |v| v == 6 || v == 7),
        _ => false, // 7-9 stands
    }
}

/// Deal and resolve one hand from `shoe`.
pub fn play_hand(shoe: &mut Shoe) -> Result<Hand, GameError> {
    let p1 = shoe.draw()?;
    let b1 = shoe.draw()?;
    let p2 = shoe.draw()?;
    let b2 = shoe.draw()?;
    let mut player_cards = vec![p1, p2];
    let mut banker_cards = vec![b1, b2];

    let mut player_total = hand_total(&player_cards);
    let mut banker_total = hand_total(&banker_cards);

    // Natural check (8 or 9 on first two cards)
    let natural = player_total >= 8 || banker_total >= 8;
    if !natural {
        let mut player_third_card = None;
        if player_draws(player_total) {
            let card = shoe.draw()?;
            player_cards.push(card);
            player_third_card = Some(card);
            player_total = hand_total(&player_cards);
        }

        if banker_draws(banker_total, player_third_card) {
            banker_cards.push(shoe.draw()?);
            banker_total = hand_total(&banker_cards);
        }
    }

    Ok(Hand {
        player_pair: is_pair(&player_cards),
        banker_pair: is_pair(&banker_cards),
        result: Outcome::from_totals(player_total, banker_total),
        player_cards,
        banker_cards,
        player_total,
        banker_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{rng::GameRng, shoe::ShoeSpec};
    use shoebox_types::{Rank, Suit};

    fn card(rank: Rank) -> Card {
        Card::new(rank, Suit::Spades)
    }

    #[test]
    fn test_hand_total() {
        // 7 + 8 = 15 mod 10 = 5
        assert_eq!(hand_total(&[card(Rank::Seven), card(Rank::Eight)]), 5);

        // Ace + 3 = 4
        assert_eq!(hand_total(&[card(Rank::Ace), card(Rank::Three)]), 4);

        // King + Queen = 0
        assert_eq!(hand_total(&[card(Rank::King), card(Rank::Queen)]), 0);

        // 9 + 9 = 18 mod 10 = 8 (natural)
        assert_eq!(hand_total(&[card(Rank::Nine), card(Rank::Nine)]), 8);
    }

    #[test]
    fn test_player_draws() {
        assert!(player_draws(0));
        assert!(player_draws(5));
        assert!(!player_draws(6));
        assert!(!player_draws(7));
    }

    #[test]
    fn test_banker_draws_no_player_third() {
        // Banker draws on 0-5 when player stands
        assert!(banker_draws(0, None));
        assert!(banker_draws(5, None));
        assert!(!banker_draws(6, None));
        assert!(!banker_draws(7, None));
    }

    #[test]
    fn test_banker_draws_with_player_third() {
        // Banker on 3, player drew 8 -> banker stands
        assert!(!banker_draws(3, Some(card(Rank::Eight))));
        assert!(banker_draws(3, Some(card(Rank::Nine))));

        // Banker on 4, player drew 2 -> banker draws; drew ace -> stands
        assert!(banker_draws(4, Some(card(Rank::Two))));
        assert!(!banker_draws(4, Some(card(Rank::Ace))));

        // Banker on 5, player drew 4 -> draws; drew 3 -> stands
        assert!(banker_draws(5, Some(card(Rank::Four))));
        assert!(!banker_draws(5, Some(card(Rank::Three))));

        // Banker on 6, player drew 6 -> banker draws; drew 10 -> stands
        assert!(banker_draws(6, Some(card(Rank::Six))));
        assert!(!banker_draws(6, Some(card(Rank::Ten))));
    }

    #[test]
    fn test_natural_stands() {
        // P: 9, K = 9 natural; B: 2, 3 = 5
        let mut shoe = Shoe::stacked(vec![
            card(Rank::Nine),
            card(Rank::Two),
            card(Rank::King),
            card(Rank::Three),
            card(Rank::Ace),
        ]);
        let hand = play_hand(&mut shoe).unwrap();
        assert_eq!(hand.player_cards.len(), 2);
        assert_eq!(hand.banker_cards.len(), 2);
        assert_eq!(hand.player_total, 9);
        assert_eq!(hand.banker_total, 5);
        assert_eq!(hand.result, Outcome::Player);
        assert_eq!(shoe.remaining(), 1);
    }

    #[test]
    fn test_banker_on_three_draws_unless_player_third_is_eight() {
        for rank in Rank::ALL {
            assert_eq!(
                banker_draws(3, Some(card(rank))),
                rank != Rank::Eight,
                "banker on 3 against {rank:?}"
            );
        }
    }

    #[test]
    fn test_banker_natural_stands() {
        // P: 2, 3 = 5 would draw; B: 4, 5 = 9 natural
        let mut shoe = Shoe::stacked(vec![
            card(Rank::Two),
            card(Rank::Four),
            card(Rank::Three),
            card(Rank::Five),
            card(Rank::Six),
            card(Rank::Seven),
        ]);
        let hand = play_hand(&mut shoe).unwrap();
        assert_eq!(hand.player_cards.len() + hand.banker_cards.len(), 4);
        assert_eq!(hand.player_total, 5);
        assert_eq!(hand.banker_total, 9);
        assert_eq!(hand.result, Outcome::Banker);
        assert_eq!(shoe.remaining(), 2);
    }

    #[test]
    fn test_banker_stands_on_three_against_eight() {
        // P: A, 2 = 3 draws 8 -> 1; B: 10, 3 = 3 stands
        let mut shoe = Shoe::stacked(vec![
            card(Rank::Ace),
            card(Rank::Ten),
            card(Rank::Two),
            card(Rank::Three),
            card(Rank::Eight),
            card(Rank::Nine),
        ]);
        let hand = play_hand(&mut shoe).unwrap();
        assert_eq!(hand.player_cards.len(), 3);
        assert_eq!(hand.banker_cards.len(), 2);
        assert_eq!(hand.player_total, 1);
        assert_eq!(hand.banker_total, 3);
        assert_eq!(hand.result, Outcome::Banker);
    }

    #[test]
    fn test_pairs_and_tie() {
        // P: 4, 4 = 8; B: J, 8 = 8
        let mut shoe = Shoe::stacked(vec![
            Card::new(Rank::Four, Suit::Hearts),
            card(Rank::Jack),
            Card::new(Rank::Four, Suit::Clubs),
            card(Rank::Eight),
        ]);
        let hand = play_hand(&mut shoe).unwrap();
        assert!(hand.player_pair);
        assert!(!hand.banker_pair);
        assert_eq!(hand.result, Outcome::Tie);
    }

    #[test]
    fn test_exhausted_shoe() {
        let mut shoe = Shoe::stacked(vec![card(Rank::Ace), card(Rank::Two)]);
        assert_eq!(play_hand(&mut shoe), Err(GameError::DeckExhausted));
    }

    #[test]
    fn test_random_hands_are_well_formed() {
        let mut rng = GameRng::new(99, 1, 1);
        let mut shoe = Shoe::new(ShoeSpec::standard(8), &mut rng);
        while shoe.remaining() >= 6 {
            let hand = play_hand(&mut shoe).unwrap();
            assert!(hand.player_total <= 9 && hand.banker_total <= 9);
            assert!((2..=3).contains(&hand.player_cards.len()));
            assert!((2..=3).contains(&hand.banker_cards.len()));
            assert_eq!(
                hand.result,
                Outcome::from_totals(hand.player_total, hand.banker_total)
            );
        }
    }
}
