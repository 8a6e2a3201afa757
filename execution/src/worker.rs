//! The body of one worker: deal every game in a chunk and fold outcomes into
//! streak fragments.

use crate::{
    rng::GameRng,
    road,
    runner::{run_game, Table},
    shoe::ShoeSpec,
    GameError,
};
use shoebox_types::{Card, GameResult, Outcome, SimulationConfig, StreakStats, WorkUnit};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Per-simulation parameters shared by every worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSettings {
    pub seed: u64,
    pub shoe: ShoeSpec,
    pub skip_card: u32,
    pub hands_per_game: u32,
    pub continuous: bool,
    pub keep_hands: bool,
}

impl RunSettings {
    pub fn new(config: &SimulationConfig, seed: u64, keep_hands: bool) -> Self {
        Self {
            seed,
            shoe: ShoeSpec::from(config),
            skip_card: config.skip_card,
            hands_per_game: config.hands_per_game,
            continuous: config.continuous_mode,
            keep_hands,
        }
    }

    /// RNG for the shoe segment that begins at `unit`.
    fn rng(&self, unit: WorkUnit) -> GameRng {
        if self.continuous {
            GameRng::for_play(self.seed, unit.play_number)
        } else {
            GameRng::new(self.seed, unit.play_number, unit.game_number)
        }
    }
}

/// Streak statistics for one shoe segment, tagged with its play.
///
/// A segment is one game in standard mode and one whole play in continuous
/// mode. Fragments of the same play are merged additively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    pub play_number: u32,
    pub stats: StreakStats,
}

/// Everything a worker produced for its chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    pub games: Vec<GameResult>,
    pub fragments: Vec<Fragment>,
}

/// Progress a worker reports while it runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Report {
    /// Cards burned when a fresh shoe was opened for `unit`.
    Skipped { unit: WorkUnit, cards: Vec<Card> },
    /// `unit` has been dealt in full.
    Dealt(WorkUnit),
}

/// A chunk of work units assigned to one worker.
#[derive(Clone, Debug)]
pub struct Task {
    pub worker: usize,
    pub units: Vec<WorkUnit>,
    pub settings: RunSettings,
}

struct Segment {
    play_number: u32,
    table: Table,
    outcomes: Vec<Outcome>,
}

impl Segment {
    fn close(self) -> Fragment {
        Fragment {
            play_number: self.play_number,
            stats: road::analyze(&self.outcomes),
        }
    }
}

impl Task {
    /// Run every unit in order, reporting burns and finished games.
    ///
    /// `cancel` is checked before each unit; once set the task stops with
    /// [GameError::Cancelled].
    pub fn run(
        self,
        cancel: &AtomicBool,
        mut report: impl FnMut(Report),
    ) -> Result<Batch, GameError> {
        let settings = self.settings;
        let mut batch = Batch {
            games: Vec::with_capacity(self.units.len()),
            fragments: Vec::new(),
        };
        let mut segment: Option<Segment> = None;

        for unit in self.units {
            if cancel.load(Ordering::Relaxed) {
                debug!(worker = self.worker, ?unit, "cancelled");
                return Err(GameError::Cancelled);
            }
            let continues = settings.continuous
                && segment
                    .as_ref()
                    .is_some_and(|s| s.play_number == unit.play_number);
            if !continues {
                if let Some(done) = segment.take() {
                    batch.fragments.push(done.close());
                }
                let mut table = Table::open(settings.shoe, settings.rng(unit));
                let burned = table.burn(settings.skip_card as usize);
                if !burned.is_empty() {
                    report(Report::Skipped {
                        unit,
                        cards: burned,
                    });
                }
                segment = Some(Segment {
                    play_number: unit.play_number,
                    table,
                    outcomes: Vec::new(),
                });
            }
            let Some(current) = segment.as_mut() else {
                continue;
            };

            let run = run_game(
                &mut current.table,
                unit,
                settings.hands_per_game,
                settings.keep_hands,
            )?;
            current.outcomes.extend(run.outcomes);
            batch.games.push(run.result);
            report(Report::Dealt(unit));
        }
        if let Some(done) = segment.take() {
            batch.fragments.push(done.close());
        }

        debug!(
            worker = self.worker,
            games = batch.games.len(),
            fragments = batch.fragments.len(),
            "worker finished"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::units;

    fn skips(reports: &[Report]) -> Vec<(WorkUnit, Vec<Card>)> {
        reports
            .iter()
            .filter_map(|report| match report {
                Report::Skipped { unit, cards } => Some((*unit, cards.clone())),
                Report::Dealt(_) => None,
            })
            .collect()
    }

    fn settings(continuous: bool, skip_card: u32) -> RunSettings {
        let config = SimulationConfig {
            plays: 2,
            games_per_play: 3,
            hands_per_game: 20,
            skip_card,
            continuous_mode: continuous,
            ..Default::default()
        };
        RunSettings::new(&config, 1234, true)
    }

    #[test]
    fn test_standard_mode_fragment_per_game() {
        let task = Task {
            worker: 0,
            units: units(2, 3),
            settings: settings(false, 0),
        };
        let mut reports = Vec::new();
        let batch = task
            .run(&AtomicBool::new(false), |report| reports.push(report))
            .unwrap();
        assert!(skips(&reports).is_empty());
        assert_eq!(batch.games.len(), 6);
        assert_eq!(batch.fragments.len(), 6);
        assert_eq!(
            batch.fragments.iter().map(|f| f.play_number).collect::<Vec<_>>(),
            vec![1, 1, 1, 2, 2, 2]
        );
    }

    #[test]
    fn test_continuous_mode_fragment_per_play() {
        let mut reports = Vec::new();
        let task = Task {
            worker: 0,
            units: units(2, 3),
            settings: settings(true, 5),
        };
        let batch = task
            .run(&AtomicBool::new(false), |report| reports.push(report))
            .unwrap();
        let skipped = skips(&reports);
        assert_eq!(batch.games.len(), 6);
        assert_eq!(batch.fragments.len(), 2);

        // One burn per play, reported against its first game
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].0, WorkUnit::new(1, 1));
        assert_eq!(skipped[1].0, WorkUnit::new(2, 1));
        assert!(skipped.iter().all(|(_, cards)| cards.len() == 5));

        // The play's fragment covers the concatenation of its games
        let outcomes: Vec<Outcome> = batch.games[..3]
            .iter()
            .flat_map(|g| g.outcomes().unwrap())
            .collect();
        assert_eq!(batch.fragments[0].stats, road::analyze(&outcomes));
    }

    #[test]
    fn test_results_do_not_depend_on_chunking() {
        let whole = Task {
            worker: 0,
            units: units(2, 3),
            settings: settings(false, 3),
        }
        .run(&AtomicBool::new(false), |_| {})
        .unwrap();

        let mut split = Batch::default();
        for (worker, chunk) in units(2, 3).chunks(2).enumerate() {
            let part = Task {
                worker,
                units: chunk.to_vec(),
                settings: settings(false, 3),
            }
            .run(&AtomicBool::new(false), |_| {})
            .unwrap();
            split.games.extend(part.games);
            split.fragments.extend(part.fragments);
        }
        assert_eq!(whole, split);
    }

    #[test]
    fn test_skip_and_deal_reported_per_game() {
        let mut reports = Vec::new();
        Task {
            worker: 0,
            units: units(1, 4),
            settings: settings(false, 2),
        }
        .run(&AtomicBool::new(false), |report| reports.push(report))
        .unwrap();

        let skipped = skips(&reports);
        assert_eq!(skipped.len(), 4);
        assert!(skipped.iter().all(|(_, cards)| cards.len() == 2));
        assert_eq!(reports[0], Report::Skipped {
            unit: WorkUnit::new(1, 1),
            cards: skipped[0].1.clone(),
        });
        assert_eq!(reports[1], Report::Dealt(WorkUnit::new(1, 1)));
        let dealt: Vec<WorkUnit> = reports
            .iter()
            .filter_map(|report| match report {
                Report::Dealt(unit) => Some(*unit),
                Report::Skipped { .. } => None,
            })
            .collect();
        assert_eq!(dealt, units(1, 4));
    }

    #[test]
    fn test_cancelled_task_stops() {
        let mut dealt = 0;
        let result = Task {
            worker: 0,
            units: units(2, 3),
            settings: settings(false, 0),
        }
        .run(&AtomicBool::new(true), |_| dealt += 1);
        assert_eq!(result, Err(GameError::Cancelled));
        assert_eq!(dealt, 0);
    }
}
