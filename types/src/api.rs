//! Request and response bodies exchanged with the HTTP surface.

use crate::{
    config::{SimulationConfig, Tier},
    game::{GameResult, HandRecord, PlayResult, Tally},
    road::{SeriesPoint, StreakStats},
};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the store to a persisted game row.
pub type GameId = u64;

/// Wall-clock cost of a simulation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub duration_seconds: f64,
    pub hands_per_second: u64,
    pub total_hands: u64,
}

impl Timing {
    pub fn new(duration_seconds: f64, total_hands: u64) -> Self {
        let hands_per_second = if duration_seconds > 0.0 {
            (total_hands as f64 / duration_seconds).round() as u64
        } else {
            total_hands
        };
        Self {
            duration_seconds,
            hands_per_second,
            total_hands,
        }
    }
}

/// One play in a simulation response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResponse {
    #[serde(flatten)]
    pub play: PlayResult,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consecutive_wins_data: Vec<SeriesPoint>,
}

impl From<PlayResult> for PlayResponse {
    fn from(play: PlayResult) -> Self {
        let consecutive_wins_data = play
            .analysis
            .as_ref()
            .map(|analysis| analysis.streaks.series())
            .unwrap_or_default();
        Self {
            play,
            consecutive_wins_data,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResponse {
    pub simulation_id: String,
    pub status: SimulationStatus,
    pub tier: Tier,
    pub total_games: u64,
    pub seed: u64,
    pub config: SimulationConfig,
    pub results: Vec<PlayResponse>,
    pub timing: Timing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    Running,
    Completed,
    Failed,
}

impl SimulationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SimulationStatus::Running => "running",
            SimulationStatus::Completed => "completed",
            SimulationStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentage of `total` games finished, rounded down.
pub fn progress(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (completed.min(total) * 100 / total) as u8
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub simulation_id: String,
    pub status: SimulationStatus,
    /// Finished games as a percentage of the total.
    pub progress: u8,
    pub completed_games: u64,
    pub total_games: u64,
    pub tier: Tier,
    pub plays: u32,
    pub games_per_play: u32,
    pub hands_per_game: u32,
    pub deck_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Returned when a simulation is started in the background.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub simulation_id: String,
    pub status: SimulationStatus,
    pub tier: Tier,
    pub total_games: u64,
    pub seed: u64,
}

/// Paging window requested by the caller (1-based page).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_more: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub total_games: u64,
    pub data_limit_exceeded: bool,
    pub limit: u64,
    pub message: String,
}

/// Pre-formatted table row for one game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRow {
    pub key: u64,
    pub game_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<GameId>,
    pub total_hands: u32,
    pub banker_wins: String,
    pub player_wins: String,
    pub tie_wins: String,
    pub banker_pair: String,
    pub player_pair: String,
    pub raw_data: Tally,
}

impl GameRow {
    pub fn new(key: u64, game_number: u32, game_id: Option<GameId>, tally: Tally) -> Self {
        let total = tally.total_hands;
        Self {
            key,
            game_number,
            game_id,
            total_hands: total,
            banker_wins: share(tally.banker_wins, total),
            player_wins: share(tally.player_wins, total),
            tie_wins: share(tally.tie_wins, total),
            banker_pair: share(tally.banker_pairs, total),
            player_pair: share(tally.player_pairs, total),
            raw_data: tally,
        }
    }
}

/// `"12 (40.0%)"`
pub fn share(count: u32, total: u32) -> String {
    if total == 0 {
        return format!("{count} (0%)");
    }
    format!("{count} ({:.1}%)", count as f64 / total as f64 * 100.0)
}

/// A page of games for one play plus its always-present streak analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayPage {
    pub play_number: u32,
    pub table_data: Vec<GameRow>,
    pub games: Vec<GameResult>,
    pub analysis: StreakStats,
    pub consecutive_wins_data: Vec<SeriesPoint>,
    pub pagination: Pagination,
    pub summary: PageSummary,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayOverview {
    pub play_number: u32,
    pub total_games: u64,
    pub total_hands: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaysResponse {
    pub plays: Vec<PlayOverview>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandsResponse {
    pub hands: Vec<HandRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub simulations: usize,
}

/// Streak statistics for one play, with the chart series pre-rendered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsecutiveAnalysis {
    pub play_number: u32,
    pub analysis: StreakStats,
    pub consecutive_wins_data: Vec<SeriesPoint>,
}

impl ConsecutiveAnalysis {
    pub fn new(play_number: u32, analysis: StreakStats) -> Self {
        Self {
            play_number,
            consecutive_wins_data: analysis.streaks.series(),
            analysis,
        }
    }
}
