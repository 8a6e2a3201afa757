//! Splits a simulation into contiguous chunks of work units, one per worker.

use shoebox_types::{SimulationConfig, WorkUnit};

/// Below this many games every game may get its own worker.
const SMALL_WORKLOAD: u64 = 10;
/// Below this many games each worker should get at least this many games.
const MEDIUM_WORKLOAD: u64 = 100;
const MIN_GAMES_PER_WORKER: u64 = 5;

/// Number of workers to spawn for `total` units on `cores` threads.
pub fn worker_count(total: u64, cores: usize) -> usize {
    let cores = cores.max(1) as u64;
    let workers = if total < SMALL_WORKLOAD {
        cores.min(total)
    } else if total < MEDIUM_WORKLOAD {
        cores.min(total.div_ceil(MIN_GAMES_PER_WORKER))
    } else {
        cores
    };
    workers.max(1) as usize
}

/// Split `items` into at most `workers` contiguous chunks of `ceil(n / workers)`.
/// The last chunk may be shorter.
fn chunk<T: Clone>(items: &[T], workers: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = items.len().div_ceil(workers.max(1));
    items.chunks(size).map(<[T]>::to_vec).collect()
}

/// Every (play, game) pair, play-major.
pub fn units(plays: u32, games_per_play: u32) -> Vec<WorkUnit> {
    (1..=plays)
        .flat_map(|play| (1..=games_per_play).map(move |game| WorkUnit::new(play, game)))
        .collect()
}

/// Partition at game granularity.
pub fn partition(plays: u32, games_per_play: u32, cores: usize) -> Vec<Vec<WorkUnit>> {
    let units = units(plays, games_per_play);
    let workers = worker_count(units.len() as u64, cores);
    chunk(&units, workers)
}

/// Partition at play granularity so no play is split across workers.
///
/// Continuous mode carries one shoe through every game of a play, which
/// only one worker can own.
pub fn partition_by_play(plays: u32, games_per_play: u32, cores: usize) -> Vec<Vec<WorkUnit>> {
    let play_numbers: Vec<u32> = (1..=plays).collect();
    let workers = worker_count(plays as u64, cores);
    chunk(&play_numbers, workers)
        .into_iter()
        .map(|chunk| {
            chunk
                .into_iter()
                .flat_map(|play| (1..=games_per_play).map(move |game| WorkUnit::new(play, game)))
                .collect()
        })
        .collect()
}

/// Choose the partitioning that matches the configured shoe mode.
pub fn plan(config: &SimulationConfig, cores: usize) -> Vec<Vec<WorkUnit>> {
    if config.continuous_mode {
        partition_by_play(config.plays, config.games_per_play, cores)
    } else {
        partition(config.plays, config.games_per_play, cores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn assert_covers(chunks: &[Vec<WorkUnit>], plays: u32, games_per_play: u32) {
        let flat: Vec<WorkUnit> = chunks.iter().flatten().copied().collect();
        assert_eq!(flat, units(plays, games_per_play), "chunks must be contiguous and ordered");
        let unique: BTreeSet<WorkUnit> = flat.iter().copied().collect();
        assert_eq!(unique.len(), flat.len());
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(1, 8), 1);
        assert_eq!(worker_count(4, 8), 4);
        assert_eq!(worker_count(9, 4), 4);
        assert_eq!(worker_count(10, 8), 2);
        assert_eq!(worker_count(11, 8), 3);
        assert_eq!(worker_count(99, 8), 8);
        assert_eq!(worker_count(99, 32), 20);
        assert_eq!(worker_count(100, 8), 8);
        assert_eq!(worker_count(1_000_000, 16), 16);
        assert_eq!(worker_count(0, 8), 1);
        assert_eq!(worker_count(50, 0), 1);
    }

    #[test]
    fn test_partition_small() {
        let chunks = partition(1, 3, 8);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 1));
        assert_covers(&chunks, 1, 3);
    }

    #[test]
    fn test_partition_uneven() {
        // 2 plays x 5 games = 10 units -> 2 workers on 8 cores
        let chunks = partition(2, 5, 8);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 5);
        assert_covers(&chunks, 2, 5);

        // 1000 units on 3 cores -> 334, 334, 332
        let chunks = partition(10, 100, 3);
        assert_eq!(
            chunks.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![334, 334, 332]
        );
        assert_covers(&chunks, 10, 100);
    }

    #[test]
    fn test_partition_by_play_keeps_plays_whole() {
        let chunks = partition_by_play(7, 4, 3);
        assert_eq!(chunks.len(), 3);
        assert_covers(&chunks, 7, 4);
        for (i, a) in chunks.iter().enumerate() {
            let plays: BTreeSet<u32> = a.iter().map(|u| u.play_number).collect();
            for b in &chunks[i + 1..] {
                assert!(b.iter().all(|u| !plays.contains(&u.play_number)));
            }
        }
    }

    #[test]
    fn test_plan_follows_mode() {
        let mut config = SimulationConfig {
            plays: 1,
            games_per_play: 40,
            ..Default::default()
        };
        assert_eq!(plan(&config, 4).len(), 4);
        config.continuous_mode = true;
        assert_eq!(plan(&config, 4).len(), 1);
    }
}
