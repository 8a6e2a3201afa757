use shoebox_types::StreakStats;
use std::{collections::HashMap, sync::RwLock};

/// Streak analysis keyed by (simulation, play).
///
/// Holds entries for at most one simulation: registering a new simulation id
/// clears everything cached for the previous one.
#[derive(Default)]
pub struct AnalysisCache {
    inner: RwLock<Entries>,
}

#[derive(Default)]
struct Entries {
    simulation: Option<String>,
    plays: HashMap<u32, StreakStats>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `simulation` the current one, dropping entries of any other.
    pub fn register(&self, simulation: &str) {
        let Ok(mut entries) = self.inner.write() else {
            tracing::error!("Failed to acquire write lock in register");
            return;
        };
        if entries.simulation.as_deref() != Some(simulation) {
            entries.simulation = Some(simulation.to_string());
            entries.plays.clear();
        }
    }

    /// Cache `stats`. Ignored unless `simulation` is the registered one.
    pub fn insert(&self, simulation: &str, play_number: u32, stats: StreakStats) {
        let Ok(mut entries) = self.inner.write() else {
            tracing::error!("Failed to acquire write lock in insert");
            return;
        };
        if entries.simulation.as_deref() == Some(simulation) {
            entries.plays.insert(play_number, stats);
        }
    }

    pub fn get(&self, simulation: &str, play_number: u32) -> Option<StreakStats> {
        let entries = self.inner.read().ok()?;
        if entries.simulation.as_deref() != Some(simulation) {
            return None;
        }
        entries.plays.get(&play_number).cloned()
    }

    /// Forget `simulation` if it is the registered one.
    pub fn remove(&self, simulation: &str) {
        let Ok(mut entries) = self.inner.write() else {
            tracing::error!("Failed to acquire write lock in remove");
            return;
        };
        if entries.simulation.as_deref() == Some(simulation) {
            *entries = Entries::default();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|e| e.plays.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoebox_types::Outcome;

    fn stats(length: u32) -> StreakStats {
        let mut stats = StreakStats::default();
        stats.streaks.increment(Outcome::Banker, length);
        stats
    }

    #[test]
    fn test_new_simulation_clears_cache() {
        let cache = AnalysisCache::new();
        cache.register("a");
        cache.insert("a", 1, stats(2));
        cache.insert("a", 2, stats(3));
        assert_eq!(cache.get("a", 1), Some(stats(2)));
        assert_eq!(cache.len(), 2);

        // Re-registering the same id keeps entries
        cache.register("a");
        assert_eq!(cache.len(), 2);

        cache.register("b");
        assert!(cache.is_empty());
        assert_eq!(cache.get("a", 1), None);
    }

    #[test]
    fn test_insert_for_stale_simulation_is_ignored() {
        let cache = AnalysisCache::new();
        cache.insert("a", 1, stats(1));
        assert!(cache.is_empty());

        cache.register("b");
        cache.insert("a", 1, stats(1));
        assert_eq!(cache.get("a", 1), None);
        cache.insert("b", 1, stats(1));
        assert_eq!(cache.get("b", 1), Some(stats(1)));

        cache.remove("a");
        assert_eq!(cache.len(), 1);
        cache.remove("b");
        assert!(cache.is_empty());
    }
}
