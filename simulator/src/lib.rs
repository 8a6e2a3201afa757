use axum::{
    extract::{Path, Query, State as AxumState},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rand::Rng;
use serde::Deserialize;
use shoebox_execution::{partition, Executor, ExecutorError, Report, RunSettings};
use shoebox_types::{
    api::{
        progress, ConsecutiveAnalysis, ErrorBody, GameId, HandsResponse, HealthResponse,
        PageQuery, PlayOverview, PlayPage, PlayResponse, PlaysResponse, SimulationResponse,
        SimulationStatus, StartResponse, StatusResponse, Timing,
    },
    Card, ConfigError, GameResult, SimulationConfig, StreakStats, Tier,
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
    time::{Duration, Instant},
};
use thiserror::Error;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub mod cache;
pub mod config;
pub mod page;
pub mod store;
pub mod tier;

use cache::AnalysisCache;
use config::SimulatorSettings;
use page::{PageRequest, PageRow};
use store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error("workers did not finish within {0:?}")]
    Timeout(Duration),
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("simulation not found: {0}")]
    SimulationNotFound(String),
    #[error("play {play} not found in simulation {simulation}")]
    PlayNotFound { simulation: String, play: u32 },
    #[error("game not found: {0}")]
    GameNotFound(GameId),
    #[error("simulation {simulation} is {status}")]
    Unavailable {
        simulation: String,
        status: SimulationStatus,
    },
}

impl SimulationError {
    pub fn status(&self) -> StatusCode {
        match self {
            SimulationError::Config(_) => StatusCode::BAD_REQUEST,
            SimulationError::SimulationNotFound(_)
            | SimulationError::PlayNotFound { .. }
            | SimulationError::GameNotFound(_) => StatusCode::NOT_FOUND,
            SimulationError::Unavailable { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SimulationError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Lifecycle of one registered simulation.
enum State {
    Running,
    Completed(Arc<SimulationResponse>),
    Failed(String),
}

struct Entry {
    config: SimulationConfig,
    tier: Tier,
    completed_games: Arc<AtomicU64>,
    state: State,
}

impl Entry {
    fn status(&self) -> SimulationStatus {
        match self.state {
            State::Running => SimulationStatus::Running,
            State::Completed(_) => SimulationStatus::Completed,
            State::Failed(_) => SimulationStatus::Failed,
        }
    }
}

/// Registered simulations, oldest first.
#[derive(Default)]
struct Registry {
    order: VecDeque<String>,
    entries: HashMap<String, Entry>,
}

impl Registry {
    /// Drop the oldest finished entries until at most `max` remain.
    /// Running entries are never evicted.
    fn evict(&mut self, max: usize) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.entries.len() > max {
            let oldest = self.order.iter().position(|id| {
                self.entries
                    .get(id)
                    .is_some_and(|entry| !matches!(entry.state, State::Running))
            });
            let Some(id) = oldest.and_then(|position| self.order.remove(position)) else {
                break;
            };
            self.entries.remove(&id);
            evicted.push(id);
        }
        evicted
    }
}

/// A validated, registered simulation that has not run yet.
struct Prepared {
    simulation_id: String,
    config: SimulationConfig,
    seed: u64,
    tier: Tier,
    completed_games: Arc<AtomicU64>,
}

pub struct Simulator {
    settings: SimulatorSettings,
    executor: Executor,
    store: Arc<dyn Store>,
    cache: AnalysisCache,
    registry: RwLock<Registry>,
}

impl Simulator {
    pub fn new(settings: SimulatorSettings, store: Arc<dyn Store>) -> Result<Self, SimulationError> {
        let executor = Executor::new(settings.worker_threads)?;
        info!(workers = executor.threads(), "worker pool ready");
        Ok(Self {
            settings,
            executor,
            store,
            cache: AnalysisCache::new(),
            registry: RwLock::new(Registry::default()),
        })
    }

    pub fn settings(&self) -> &SimulatorSettings {
        &self.settings
    }

    /// Validate `config`, run every game on the worker pool and aggregate
    /// according to the selected tier.
    ///
    /// Stored rows are kept only if every worker succeeds. A failed run stays
    /// registered with status `failed`.
    pub async fn run(&self, config: SimulationConfig) -> Result<SimulationResponse, SimulationError> {
        let prepared = self.prepare(config)?;
        self.execute(prepared).await
    }

    /// Validate and register `config`, then run it on a background task.
    ///
    /// Progress and the final outcome are reported through [Simulator::status].
    pub fn start(self: &Arc<Self>, config: SimulationConfig) -> Result<StartResponse, SimulationError> {
        let prepared = self.prepare(config)?;
        let started = StartResponse {
            simulation_id: prepared.simulation_id.clone(),
            status: SimulationStatus::Running,
            tier: prepared.tier,
            total_games: prepared.config.total_games(),
            seed: prepared.seed,
        };
        let simulator = self.clone();
        tokio::spawn(async move {
            // The outcome is recorded in the registry
            let _ = simulator.execute(prepared).await;
        });
        Ok(started)
    }

    fn prepare(&self, config: SimulationConfig) -> Result<Prepared, SimulationError> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let config = SimulationConfig {
            seed: Some(seed),
            ..config
        };
        let total_games = config.total_games();
        let tier = Tier::select(
            config.use_in_memory,
            total_games,
            self.settings.persist_threshold,
        );
        let simulation_id = Uuid::new_v4().to_string();
        let completed_games = Arc::new(AtomicU64::new(0));
        info!(simulation = %simulation_id, %tier, total_games, seed, "starting simulation");

        match self.registry.write() {
            Ok(mut registry) => {
                registry.order.push_back(simulation_id.clone());
                registry.entries.insert(
                    simulation_id.clone(),
                    Entry {
                        config: config.clone(),
                        tier,
                        completed_games: completed_games.clone(),
                        state: State::Running,
                    },
                );
            }
            Err(e) => error!("Failed to acquire write lock in prepare: {}", e),
        }

        Ok(Prepared {
            simulation_id,
            config,
            seed,
            tier,
            completed_games,
        })
    }

    async fn execute(&self, prepared: Prepared) -> Result<SimulationResponse, SimulationError> {
        let id = prepared.simulation_id.clone();
        match self.simulate(prepared).await {
            Ok(response) => {
                self.complete(response.clone());
                Ok(response)
            }
            Err(err) => {
                error!(simulation = %id, %err, "simulation failed");
                self.finish(&id, State::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    async fn simulate(&self, prepared: Prepared) -> Result<SimulationResponse, SimulationError> {
        let Prepared {
            simulation_id,
            config,
            seed,
            tier,
            completed_games,
        } = prepared;

        let start = Instant::now();
        let chunks = partition::plan(&config, self.executor.threads());
        let chunk_sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        info!(simulation = %simulation_id, workers = chunks.len(), ?chunk_sizes, "partitioned");

        let dispatch = self.executor.dispatch(
            chunks,
            RunSettings::new(&config, seed, tier.keeps_hands()),
        );
        let collect = dispatch.collect(|worker, report| match report {
            Report::Skipped { unit, cards } => debug!(
                worker,
                play = unit.play_number,
                game = unit.game_number,
                cards = %format_cards(&cards),
                "skipped cards"
            ),
            Report::Dealt(_) => {
                completed_games.fetch_add(1, Ordering::Relaxed);
            }
        });
        let timeout = self.settings.worker_timeout;
        let batches = tokio::time::timeout(timeout, collect)
            .await
            .map_err(|_| SimulationError::Timeout(timeout))??;

        let mut plays = tier::aggregate(tier, config.continuous_mode, batches);
        if let Err(err) = tier::persist(tier, self.store.as_ref(), &simulation_id, &plays) {
            error!(simulation = %simulation_id, ?err, "failed to persist simulation");
            if let Err(err) = self.store.remove_simulation(&simulation_id) {
                warn!(simulation = %simulation_id, ?err, "failed to remove partial simulation");
            }
            return Err(err.into());
        }
        for play in &mut plays {
            play.games.iter_mut().for_each(|game| game.hands = None);
        }

        let timing = Timing::new(start.elapsed().as_secs_f64(), config.total_hands());
        info!(
            simulation = %simulation_id,
            duration_seconds = timing.duration_seconds,
            hands_per_second = timing.hands_per_second,
            total_hands = timing.total_hands,
            "simulation completed"
        );

        Ok(SimulationResponse {
            simulation_id,
            status: SimulationStatus::Completed,
            tier,
            total_games: config.total_games(),
            seed,
            config,
            results: plays.into_iter().map(PlayResponse::from).collect(),
            timing,
        })
    }

    fn complete(&self, response: SimulationResponse) {
        let id = response.simulation_id.clone();
        self.cache.register(&id);
        for play in &response.results {
            if let Some(analysis) = &play.play.analysis {
                self.cache.insert(&id, play.play.play_number, analysis.clone());
            }
        }
        self.finish(&id, State::Completed(Arc::new(response)));
    }

    fn finish(&self, id: &str, state: State) {
        let evicted = {
            let mut registry = match self.registry.write() {
                Ok(registry) => registry,
                Err(e) => {
                    error!("Failed to acquire write lock in finish: {}", e);
                    return;
                }
            };
            if let Some(entry) = registry.entries.get_mut(id) {
                entry.state = state;
            }
            registry.evict(self.settings.max_retained_simulations)
        }; // Release lock before touching the store

        for id in evicted {
            debug!(simulation = %id, "evicting simulation");
            self.cache.remove(&id);
            if let Err(err) = self.store.remove_simulation(&id) {
                warn!(simulation = %id, ?err, "failed to remove evicted simulation");
            }
        }
    }

    fn with_entry<T>(&self, id: &str, f: impl FnOnce(&Entry) -> T) -> Result<T, SimulationError> {
        let registry = match self.registry.read() {
            Ok(registry) => registry,
            Err(e) => {
                error!("Failed to acquire read lock in with_entry: {}", e);
                return Err(SimulationError::SimulationNotFound(id.to_string()));
            }
        };
        registry
            .entries
            .get(id)
            .map(f)
            .ok_or_else(|| SimulationError::SimulationNotFound(id.to_string()))
    }

    /// The finished response for `id`.
    fn record(&self, id: &str) -> Result<Arc<SimulationResponse>, SimulationError> {
        self.with_entry(id, |entry| match &entry.state {
            State::Completed(response) => Ok(response.clone()),
            State::Running | State::Failed(_) => Err(SimulationError::Unavailable {
                simulation: id.to_string(),
                status: entry.status(),
            }),
        })?
    }

    fn play<'a>(
        record: &'a SimulationResponse,
        play_number: u32,
    ) -> Result<&'a PlayResponse, SimulationError> {
        record
            .results
            .iter()
            .find(|p| p.play.play_number == play_number)
            .ok_or_else(|| SimulationError::PlayNotFound {
                simulation: record.simulation_id.clone(),
                play: play_number,
            })
    }

    /// Number of registered simulations in any state.
    pub fn simulations(&self) -> usize {
        self.registry.read().map(|r| r.entries.len()).unwrap_or(0)
    }

    pub fn results(&self, id: &str) -> Result<SimulationResponse, SimulationError> {
        Ok(self.record(id)?.as_ref().clone())
    }

    /// Current state and progress of `id`.
    ///
    /// Progress counts dealt games and stays below 100 until aggregation and
    /// persistence have finished.
    pub fn status(&self, id: &str) -> Result<StatusResponse, SimulationError> {
        self.with_entry(id, |entry| {
            let total_games = entry.config.total_games();
            let completed_games = entry.completed_games.load(Ordering::Relaxed);
            let status = entry.status();
            let percent = match status {
                SimulationStatus::Completed => 100,
                _ => progress(completed_games, total_games).min(99),
            };
            StatusResponse {
                simulation_id: id.to_string(),
                status,
                progress: percent,
                completed_games,
                total_games,
                tier: entry.tier,
                plays: entry.config.plays,
                games_per_play: entry.config.games_per_play,
                hands_per_game: entry.config.hands_per_game,
                deck_count: entry.config.deck_count,
                error: match &entry.state {
                    State::Failed(error) => Some(error.clone()),
                    _ => None,
                },
            }
        })
    }

    pub fn plays(&self, id: &str) -> Result<PlaysResponse, SimulationError> {
        let record = self.record(id)?;
        let plays = record
            .results
            .iter()
            .map(|p| PlayOverview {
                play_number: p.play.play_number,
                total_games: p.play.games.len() as u64,
                total_hands: p.play.total_hands(),
            })
            .collect();
        Ok(PlaysResponse { plays })
    }

    /// Streak statistics for one play, served from the analysis cache when
    /// the simulation is the most recent one.
    pub fn consecutive_analysis(
        &self,
        id: &str,
        play_number: u32,
    ) -> Result<ConsecutiveAnalysis, SimulationError> {
        let record = self.record(id)?;
        let play = Self::play(&record, play_number)?;
        Ok(ConsecutiveAnalysis::new(
            play_number,
            self.analysis(&record, play),
        ))
    }

    fn analysis(&self, record: &SimulationResponse, play: &PlayResponse) -> StreakStats {
        let play_number = play.play.play_number;
        if let Some(stats) = self.cache.get(&record.simulation_id, play_number) {
            return stats;
        }
        let stats = play.play.analysis.clone().unwrap_or_default();
        self.cache
            .insert(&record.simulation_id, play_number, stats.clone());
        stats
    }

    /// One page of the per-game table for a play.
    ///
    /// Stored tiers read rows back from the store; the in-memory tier slices
    /// the retained results.
    pub fn games_page(
        &self,
        id: &str,
        play_number: u32,
        query: PageQuery,
    ) -> Result<PlayPage, SimulationError> {
        let record = self.record(id)?;
        let play = Self::play(&record, play_number)?;
        let analysis = self.analysis(&record, play);
        let request = PageRequest::resolve(query, self.settings.default_page_size);
        let limit = self.settings.size_limit;

        let page = if record.tier.writes_to_store() {
            let total = self.store.count_games_for_play(id, play_number)?;
            page::build(play_number, total, limit, request, analysis, |r| {
                let rows = self
                    .store
                    .games_for_play(id, play_number, r.page, r.page_size)?
                    .into_iter()
                    .map(|stored| PageRow {
                        game_id: Some(stored.game_id),
                        game: GameResult {
                            play_number: stored.play_number,
                            game_number: stored.game_number,
                            tally: stored.tally,
                            hands: None,
                        },
                    })
                    .collect();
                Ok::<_, StoreError>(rows)
            })?
        } else {
            let games = &play.play.games;
            page::build(play_number, games.len() as u64, limit, request, analysis, |r| {
                let rows = games[r.range(games.len())]
                    .iter()
                    .map(|game| PageRow {
                        game_id: None,
                        game: game.clone(),
                    })
                    .collect();
                Ok::<_, StoreError>(rows)
            })?
        };
        Ok(page)
    }

    pub fn hands(&self, game_id: GameId) -> Result<HandsResponse, SimulationError> {
        match self.store.hands_for_game(game_id) {
            Ok(hands) => Ok(HandsResponse { hands }),
            Err(StoreError::UnknownGame(id)) => Err(SimulationError::GameNotFound(id)),
            Err(err) => Err(err.into()),
        }
    }
}

fn format_cards(cards: &[Card]) -> String {
    cards
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct Api {
    simulator: Arc<Simulator>,
    rate_limit_per_second: Option<u64>,
}

impl Api {
    pub fn new(simulator: Arc<Simulator>) -> Self {
        Self {
            simulator,
            rate_limit_per_second: None,
        }
    }

    /// Limit each client IP to `per_second` requests.
    pub fn with_rate_limit(mut self, per_second: Option<u64>) -> Self {
        self.rate_limit_per_second = per_second;
        self
    }

    pub fn router(&self) -> Router {
        // Configure CORS
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);

        let mut router = Router::new()
            .route("/api/health", get(health))
            .route("/api/simulations", post(create_simulation))
            .route("/api/simulations/:id/status", get(simulation_status))
            .route("/api/simulations/:id/results", get(simulation_results))
            .route("/api/simulations/:id/plays", get(simulation_plays))
            .route("/api/simulations/:id/plays/:play/games", get(play_games))
            .route(
                "/api/simulations/:id/plays/:play/consecutive-analysis",
                get(play_consecutive_analysis),
            )
            .route("/api/games/:game_id/hands", get(game_hands))
            .layer(cors);

        // Configure Rate Limiting
        if let Some(per_second) = self.rate_limit_per_second {
            let governor_conf = GovernorConfigBuilder::default()
                .per_millisecond((1_000 / per_second).max(1))
                .burst_size(per_second.clamp(1, u32::MAX as u64) as u32)
                .key_extractor(SmartIpKeyExtractor)
                .finish();
            match governor_conf {
                Some(config) => {
                    router = router.layer(GovernorLayer {
                        config: Arc::new(config),
                    });
                }
                None => warn!(per_second, "invalid rate limit, serving without one"),
            }
        }

        router.with_state(self.simulator.clone())
    }
}

async fn health(AxumState(simulator): AxumState<Arc<Simulator>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        simulations: simulator.simulations(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct CreateQuery {
    /// Return `202 Accepted` at once and run in the background.
    #[serde(default)]
    background: bool,
}

async fn create_simulation(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Query(query): Query<CreateQuery>,
    Json(config): Json<SimulationConfig>,
) -> Result<Response, SimulationError> {
    if query.background {
        let started = simulator.start(config)?;
        return Ok((StatusCode::ACCEPTED, Json(started)).into_response());
    }
    let response = simulator.run(config).await?;
    Ok(Json(response).into_response())
}

async fn simulation_status(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, SimulationError> {
    simulator.status(&id).map(Json)
}

async fn simulation_results(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(id): Path<String>,
) -> Result<Json<SimulationResponse>, SimulationError> {
    simulator.results(&id).map(Json)
}

async fn simulation_plays(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(id): Path<String>,
) -> Result<Json<PlaysResponse>, SimulationError> {
    simulator.plays(&id).map(Json)
}

async fn play_games(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path((id, play)): Path<(String, u32)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PlayPage>, SimulationError> {
    simulator.games_page(&id, play, query).map(Json)
}

async fn play_consecutive_analysis(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path((id, play)): Path<(String, u32)>,
) -> Result<Json<ConsecutiveAnalysis>, SimulationError> {
    simulator.consecutive_analysis(&id, play).map(Json)
}

async fn game_hands(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(game_id): Path<GameId>,
) -> Result<Json<HandsResponse>, SimulationError> {
    simulator.hands(game_id).map(Json)
}
