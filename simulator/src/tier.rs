//! Aggregation strategy per tier.
//!
//! Every tier produces the same counters and histograms for the same seed.
//! The persisted tier derives streak statistics from returned hands; the
//! other two merge fragments the workers already computed. Only the
//! persisted and summarized tiers write to the store.

use crate::store::{Store, StoreError};
use shoebox_execution::{road, Batch};
use shoebox_types::{GameResult, Outcome, PlayResult, StreakStats, Tier};
use std::collections::BTreeMap;
use tracing::debug;

/// Fold worker batches into per-play results sorted by play then game.
pub fn aggregate(tier: Tier, continuous: bool, batches: Vec<Batch>) -> Vec<PlayResult> {
    match tier {
        Tier::Persisted => from_hands(continuous, batches),
        Tier::Summarized | Tier::InMemory => from_fragments(batches),
    }
}

/// Write what `tier` retains. Returns the number of rows written.
pub fn persist(
    tier: Tier,
    store: &dyn Store,
    simulation: &str,
    plays: &[PlayResult],
) -> Result<usize, StoreError> {
    let keep_hands = match tier {
        Tier::InMemory => return Ok(0),
        Tier::Summarized => false,
        Tier::Persisted => true,
    };

    let mut rows = 0;
    for play in plays {
        for game in &play.games {
            let game_id =
                store.insert_game_summary(simulation, play.play_number, game.game_number, &game.tally)?;
            rows += 1;
            if !keep_hands {
                continue;
            }
            for hand in game.hands.iter().flatten() {
                store.insert_hand(game_id, hand)?;
                rows += 1;
            }
        }
        if let Some(analysis) = &play.analysis {
            for (outcome, length, count) in analysis.streaks.entries() {
                store.insert_streak_histogram_entry(
                    simulation,
                    play.play_number,
                    length,
                    outcome,
                    count,
                )?;
                rows += 1;
            }
        }
    }
    debug!(simulation, %tier, rows, "persisted");
    Ok(rows)
}

fn group_games(batches: &mut [Batch]) -> BTreeMap<u32, Vec<GameResult>> {
    let mut plays: BTreeMap<u32, Vec<GameResult>> = BTreeMap::new();
    for batch in batches {
        for game in batch.games.drain(..) {
            plays.entry(game.play_number).or_default().push(game);
        }
    }
    for games in plays.values_mut() {
        games.sort_by_key(|g| g.game_number);
    }
    plays
}

fn from_fragments(mut batches: Vec<Batch>) -> Vec<PlayResult> {
    let mut analyses: BTreeMap<u32, StreakStats> = BTreeMap::new();
    for batch in &batches {
        for fragment in &batch.fragments {
            analyses
                .entry(fragment.play_number)
                .or_default()
                .merge(&fragment.stats);
        }
    }

    group_games(&mut batches)
        .into_iter()
        .map(|(play_number, games)| PlayResult {
            play_number,
            games,
            analysis: Some(analyses.remove(&play_number).unwrap_or_default()),
        })
        .collect()
}

/// Rebuild streak statistics from hand detail using the same segmentation
/// the workers use: one sequence per game, or one per play when continuous.
fn from_hands(continuous: bool, mut batches: Vec<Batch>) -> Vec<PlayResult> {
    group_games(&mut batches)
        .into_iter()
        .map(|(play_number, games)| {
            let outcomes: Vec<Vec<Outcome>> = games
                .iter()
                .map(|game| game.outcomes().unwrap_or_default())
                .collect();
            let analysis = if continuous {
                road::analyze(&outcomes.concat())
            } else {
                let mut analysis = StreakStats::default();
                for sequence in &outcomes {
                    analysis.merge(&road::analyze(sequence));
                }
                analysis
            };
            PlayResult {
                play_number,
                games,
                analysis: Some(analysis),
            }
        })
        .collect()
}
