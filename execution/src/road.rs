//! Big Road placement and the two streak statistics derived from a sequence
//! of outcomes.

use shoebox_types::{Histogram, Outcome, StreakCell, StreakStats, ROAD_ROWS};
use std::collections::HashSet;

/// Whether tie outcomes take part in run detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ties {
    /// Ties are dropped before runs are found, so `B T B` is one run of two.
    Exclude,
    /// Ties form their own runs and break the flanking of their neighbours.
    Include,
}

/// Place a sequence of outcomes on the streak grid.
///
/// A repeat of the previous outcome moves down one row. At the bottom row, or
/// when the cell below is taken, the streak turns right along its current row
/// (the dragon tail). A new outcome starts one column right of where the
/// previous streak started, skipping any column whose top cell is already
/// taken. Ties never get a cell; they bump `tie_count` on the most recent one
/// and are dropped when no cell exists yet.
pub fn to_grid(outcomes: &[Outcome]) -> Vec<StreakCell> {
    let mut cells: Vec<StreakCell> = Vec::new();
    let mut occupied: HashSet<(u32, u32)> = HashSet::new();
    let mut start_column = 0;
    let mut tailing = false;

    for &outcome in outcomes {
        if outcome.is_tie() {
            if let Some(last) = cells.last_mut() {
                last.tie_count += 1;
            }
            continue;
        }

        let (column, row, streak) = match cells.last() {
            None => (0, 0, 0),
            Some(last) if last.outcome == outcome => {
                let below = (last.column, last.row + 1);
                if !tailing && below.1 < ROAD_ROWS && !occupied.contains(&below) {
                    (below.0, below.1, last.streak)
                } else {
                    tailing = true;
                    let mut column = last.column + 1;
                    while occupied.contains(&(column, last.row)) {
                        column += 1;
                    }
                    (column, last.row, last.streak)
                }
            }
            Some(last) => {
                tailing = false;
                start_column += 1;
                while occupied.contains(&(start_column, 0)) {
                    start_column += 1;
                }
                (start_column, 0, last.streak + 1)
            }
        };

        occupied.insert((column, row));
        cells.push(StreakCell {
            outcome,
            column,
            row,
            tie_count: 0,
            streak,
        });
    }
    cells
}

/// Count streaks by length.
///
/// Cells are grouped by the streak they belong to rather than by physical
/// column, so a run that tails off past the bottom row is still counted once
/// at its full length.
pub fn streak_histogram(cells: &[StreakCell]) -> Histogram {
    let mut histogram = Histogram::default();
    for streak in cells.chunk_by(|a, b| a.streak == b.streak) {
        histogram.increment(streak[0].outcome, streak.len() as u32);
    }
    histogram
}

/// Run-length encode `outcomes`.
pub fn runs(outcomes: &[Outcome]) -> Vec<(Outcome, u32)> {
    let mut runs: Vec<(Outcome, u32)> = Vec::new();
    for &outcome in outcomes {
        match runs.last_mut() {
            Some((last, length)) if *last == outcome => *length += 1,
            _ => runs.push((outcome, 1)),
        }
    }
    runs
}

/// Count runs that sit between two runs of the opposite outcome.
///
/// The first run is always counted under its own outcome. Interior runs are
/// counted only when both neighbours are the opposite outcome. The final run
/// is never counted (it has no right neighbour), unless it is also the first.
pub fn between_counts(outcomes: &[Outcome], ties: Ties) -> Histogram {
    let runs = match ties {
        Ties::Exclude => {
            let decided: Vec<Outcome> = outcomes.iter().copied().filter(|o| !o.is_tie()).collect();
            runs(&decided)
        }
        Ties::Include => runs(outcomes),
    };

    let mut histogram = Histogram::default();
    let Some(&(first, length)) = runs.first() else {
        return histogram;
    };
    histogram.increment(first, length);

    for window in runs.windows(3) {
        let [(prev, _), (current, length), (next, _)] = window else {
            continue;
        };
        if let Some(opposite) = current.opposite() {
            if *prev == opposite && *next == opposite {
                histogram.increment(*current, *length);
            }
        }
    }
    histogram
}

/// Both statistics for one sequence. Ties are excluded from between-counts.
pub fn analyze(outcomes: &[Outcome]) -> StreakStats {
    StreakStats {
        streaks: streak_histogram(&to_grid(outcomes)),
        between: between_counts(outcomes, Ties::Exclude),
    }
}
