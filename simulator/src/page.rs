//! Per-play game tables: page slicing and the size guard.

use crate::config::MAX_PAGE_SIZE;
use shoebox_types::{
    api::{GameId, GameRow, PageQuery, PageSummary, Pagination, PlayPage},
    GameResult, StreakStats,
};
use std::ops::Range;
use tracing::warn;

/// A resolved, 1-based page window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Fill in defaults and clamp to sane bounds.
    pub fn resolve(query: PageQuery, default_page_size: u32) -> Self {
        Self {
            page: query.page.unwrap_or(1).max(1),
            page_size: query
                .page_size
                .unwrap_or(default_page_size)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Index of the first row on this page.
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }

    /// `(page-1)*pageSize .. page*pageSize`, clipped to `total`.
    pub fn range(&self, total: usize) -> Range<usize> {
        let start = (self.offset() as usize).min(total);
        let end = (start + self.page_size as usize).min(total);
        start..end
    }

    pub fn pagination(&self, total: u64) -> Pagination {
        let total_pages = total.div_ceil(self.page_size as u64);
        Pagination {
            page: self.page,
            page_size: self.page_size,
            total,
            total_pages,
            has_more: (self.page as u64) < total_pages,
        }
    }
}

/// One game as shown in a page, with its store id when it has one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRow {
    pub game_id: Option<GameId>,
    pub game: GameResult,
}

/// Build the page for one play.
///
/// When the play has more than `limit` games no rows are fetched: the table
/// comes back empty with `dataLimitExceeded` set. The streak analysis is
/// included either way.
pub fn build<E>(
    play_number: u32,
    total: u64,
    limit: u64,
    request: PageRequest,
    analysis: StreakStats,
    fetch: impl FnOnce(PageRequest) -> Result<Vec<PageRow>, E>,
) -> Result<PlayPage, E> {
    let consecutive_wins_data = analysis.streaks.series();

    if total > limit {
        warn!(play = play_number, total, limit, "play exceeds size limit");
        return Ok(PlayPage {
            play_number,
            table_data: Vec::new(),
            games: Vec::new(),
            analysis,
            consecutive_wins_data,
            pagination: Pagination {
                page: request.page,
                page_size: 0,
                total,
                total_pages: 0,
                has_more: false,
            },
            summary: PageSummary {
                total_games: total,
                data_limit_exceeded: true,
                limit,
                message: format!(
                    "Dataset contains {total} games. Data arrays empty to prevent system overload. Use summary statistics instead."
                ),
            },
        });
    }

    let rows = fetch(request)?;
    let table_data = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            GameRow::new(
                request.offset() + i as u64 + 1,
                row.game.game_number,
                row.game_id,
                row.game.tally,
            )
        })
        .collect();

    Ok(PlayPage {
        play_number,
        table_data,
        games: rows.into_iter().map(|row| row.game).collect(),
        analysis,
        consecutive_wins_data,
        pagination: request.pagination(total),
        summary: PageSummary {
            total_games: total,
            data_limit_exceeded: false,
            limit,
            message: format!("Dataset size: {total} games (within limit)"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoebox_types::{Outcome, Tally};
    use std::convert::Infallible;

    fn games(count: u32) -> Vec<GameResult> {
        (1..=count)
            .map(|game_number| GameResult {
                play_number: 1,
                game_number,
                tally: Tally {
                    total_hands: 10,
                    banker_wins: 5,
                    player_wins: 4,
                    tie_wins: 1,
                    ..Default::default()
                },
                hands: None,
            })
            .collect()
    }

    fn analysis() -> StreakStats {
        let mut stats = StreakStats::default();
        stats.streaks.increment(Outcome::Banker, 3);
        stats.between.increment(Outcome::Player, 1);
        stats
    }

    fn slice(all: &[GameResult], request: PageRequest) -> Result<Vec<PageRow>, Infallible> {
        Ok(all[request.range(all.len())]
            .iter()
            .map(|game| PageRow {
                game_id: None,
                game: game.clone(),
            })
            .collect())
    }

    #[test]
    fn test_resolve_defaults_and_clamps() {
        let request = PageRequest::resolve(PageQuery::default(), 50);
        assert_eq!(request, PageRequest { page: 1, page_size: 50 });

        let request = PageRequest::resolve(
            PageQuery {
                page: Some(0),
                page_size: Some(100_000),
            },
            50,
        );
        assert_eq!(request.page, 1);
        assert_eq!(request.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_second_page() {
        let all = games(25);
        let request = PageRequest {
            page: 2,
            page_size: 10,
        };
        let page = build(1, 25, 500, request, analysis(), |r| slice(&all, r)).unwrap();

        assert_eq!(
            page.games.iter().map(|g| g.game_number).collect::<Vec<_>>(),
            (11..=20).collect::<Vec<_>>()
        );
        assert_eq!(page.table_data.len(), 10);
        assert_eq!(page.table_data[0].key, 11);
        assert_eq!(page.table_data[0].banker_wins, "5 (50.0%)");
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.pagination.has_more);
        assert!(!page.summary.data_limit_exceeded);
    }

    #[test]
    fn test_last_and_out_of_range_pages() {
        let all = games(25);
        let last = PageRequest {
            page: 3,
            page_size: 10,
        };
        let page = build(1, 25, 500, last, analysis(), |r| slice(&all, r)).unwrap();
        assert_eq!(page.games.len(), 5);
        assert!(!page.pagination.has_more);

        let beyond = PageRequest {
            page: 9,
            page_size: 10,
        };
        let page = build(1, 25, 500, beyond, analysis(), |r| slice(&all, r)).unwrap();
        assert!(page.games.is_empty());
        assert_eq!(page.pagination.total_pages, 3);
    }

    #[test]
    fn test_size_guard() {
        let request = PageRequest {
            page: 1,
            page_size: 50,
        };
        let page = build(1, 501, 500, request, analysis(), |_| -> Result<Vec<PageRow>, Infallible> {
            panic!("rows must not be fetched")
        })
        .unwrap();

        assert!(page.summary.data_limit_exceeded);
        assert_eq!(page.summary.total_games, 501);
        assert_eq!(page.summary.limit, 500);
        assert!(page.table_data.is_empty());
        assert!(page.games.is_empty());
        assert!(!page.analysis.streaks.is_empty());
        assert!(page.consecutive_wins_data.iter().any(|p| p.y > 0));
    }

    #[test]
    fn test_at_limit_is_allowed() {
        let all = games(500);
        let request = PageRequest {
            page: 1,
            page_size: 500,
        };
        let page = build(1, 500, 500, request, analysis(), |r| slice(&all, r)).unwrap();
        assert_eq!(page.games.len(), 500);
        assert!(!page.summary.data_limit_exceeded);
    }
}
